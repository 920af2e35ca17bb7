use ahash::{AHashMap, AHashSet};
use std::sync::Arc;
use super::normalizer::{NaiveNormalizer, TextNormalizer};

pub const DEFAULT_STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

/// A distinct token of a text with its (possibly normalized) frequency and
/// the word offsets it appeared at
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub text: String,
    pub frequency: f64,
    pub offsets: Vec<usize>,
}

impl Token {
    pub fn new(text: impl Into<String>, frequency: f64, offsets: Vec<usize>) -> Self {
        Self {
            text: text.into(),
            frequency,
            offsets,
        }
    }

    /// Fold `other` into this token, shifting its offsets by `base_offset`
    pub fn merge(&mut self, other: &Token, base_offset: usize) {
        self.frequency += other.frequency;
        self.offsets.extend(other.offsets.iter().map(|o| o + base_offset));
    }
}

pub trait Tokenizer: Send + Sync {
    /// Distinct tokens in order of first appearance
    fn tokenize(&self, text: &str) -> Vec<Token>;
}

/// Splits normalized text on spaces and drops stopwords
pub struct WordTokenizer {
    normalizer: Arc<dyn TextNormalizer>,
    stopwords: AHashSet<String>,
    normalize_frequencies: bool,
}

impl WordTokenizer {
    pub fn new(
        normalizer: Arc<dyn TextNormalizer>,
        normalize_frequencies: bool,
        stopwords: Option<&[&str]>,
    ) -> Self {
        let stopwords = stopwords
            .unwrap_or(DEFAULT_STOPWORDS)
            .iter()
            .map(|s| s.to_string())
            .collect();
        Self {
            normalizer,
            stopwords,
            normalize_frequencies,
        }
    }
}

impl Default for WordTokenizer {
    /// Raw counts, default stopwords
    fn default() -> Self {
        Self::new(Arc::new(NaiveNormalizer), false, None)
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Vec<Token> {
        let normalized = self.normalizer.normalize(text);

        let mut tokens: Vec<Token> = Vec::new();
        let mut positions: AHashMap<&str, usize> = AHashMap::new();
        let mut offset = 0usize;

        for word in normalized.split(' ').filter(|w| !w.is_empty()) {
            if self.stopwords.contains(word) {
                continue;
            }
            match positions.get(word) {
                Some(&i) => {
                    tokens[i].frequency += 1.0;
                    tokens[i].offsets.push(offset);
                }
                None => {
                    positions.insert(word, tokens.len());
                    tokens.push(Token::new(word, 1.0, vec![offset]));
                }
            }
            offset += 1;
        }

        if offset > 0 && self.normalize_frequencies {
            for t in &mut tokens {
                t.frequency /= offset as f64;
            }
        }
        tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_normalized_frequencies() {
        let s = "Hello \"world\", I will miss? you... world? you are still here? Hello?";
        let tokenizer = WordTokenizer::new(Arc::new(NaiveNormalizer), true, None);
        let tokens = tokenizer.tokenize(s);

        // "will" and "are" are stopwords
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["hello", "world", "i", "miss", "you", "still", "here"]);

        let hello = &tokens[0];
        assert_eq!(hello.offsets, vec![0, 9]);
        assert!((hello.frequency - 2.0 / 10.0).abs() < 1e-9);

        let you = tokens.iter().find(|t| t.text == "you").unwrap();
        assert_eq!(you.offsets, vec![4, 6]);
    }

    #[test]
    fn test_tokenize_raw_counts() {
        let tokenizer = WordTokenizer::default();
        let tokens = tokenizer.tokenize("hello world hello");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].frequency, 2.0);
        assert_eq!(tokens[1].frequency, 1.0);
    }

    #[test]
    fn test_only_stopwords() {
        let tokenizer = WordTokenizer::default();
        assert!(tokenizer.tokenize("the and of").is_empty());
        assert!(tokenizer.tokenize("").is_empty());
    }

    #[test]
    fn test_custom_stopwords() {
        let tokenizer = WordTokenizer::new(Arc::new(NaiveNormalizer), false, Some(&["hello"]));
        let tokens = tokenizer.tokenize("hello the world");
        let texts: Vec<&str> = tokens.iter().map(|t| t.text.as_str()).collect();
        assert_eq!(texts, vec!["the", "world"]);
    }
}
