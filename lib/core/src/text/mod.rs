//! Text normalization and tokenization
//!
//! The indexes only rely on the [`TextNormalizer`] and [`Tokenizer`]
//! contracts; [`NaiveNormalizer`] and [`WordTokenizer`] are the defaults.

pub mod normalizer;
pub mod tokenizer;
pub mod token_set;

pub use normalizer::{NaiveNormalizer, TextNormalizer};
pub use tokenizer::{Token, Tokenizer, WordTokenizer, DEFAULT_STOPWORDS};
pub use token_set::TokenSet;
