//! # zindex Core
//!
//! Core library for the zindex secondary-index engine.
//!
//! This crate provides the data model and the pure algorithms the indexes
//! are built from:
//!
//! - [`Document`] - Id, score and typed properties
//! - [`Spec`] / [`Field`] - Ordered schema of an index
//! - [`Query`] - Filters and paging
//! - [`EncoderSet`] - Order-preserving byte encoders per spec
//! - [`geohash`] - Cell encoding, neighbors and spherical distances
//! - [`text`] - Normalizer, tokenizer and weighted token sets
//! - [`BucketEstimator`] - Streaming quantiles for score bucketing
//!
//! ## Example
//!
//! ```rust
//! use zindex_core::{Document, EncoderSet, Field, Query, Spec};
//!
//! let spec = Spec::new(vec![Field::prefix("name", true), Field::numeric("age")]).unwrap();
//! let encoders = EncoderSet::new(&spec);
//!
//! let doc = Document::new("user1").set("name", "El Niño").set("age", 30);
//! let keys = encoders.encode("name", doc.property("name").unwrap()).unwrap();
//! assert_eq!(keys, vec![b"el nino".to_vec(), b"nino".to_vec()]);
//!
//! let query = Query::new("users").filter_prefix("name", "el").limit(0, 10);
//! assert!(query.validate(&spec).is_ok());
//! ```

pub mod error;
pub mod value;
pub mod document;
pub mod entry;
pub mod spec;
pub mod query;
pub mod encoders;
pub mod geohash;
pub mod quantile;
pub mod text;

pub use error::{Error, Result, SearchError};
pub use value::{GeoPoint, Value};
pub use document::Document;
pub use entry::Entry;
pub use spec::{Field, FieldKind, Spec};
pub use query::{Filter, Op, Query, Sorting};
pub use encoders::{Encoder, EncoderSet};
pub use quantile::{BucketConfig, BucketEstimator, Estimator, Target};
pub use text::{NaiveNormalizer, TextNormalizer, Token, TokenSet, Tokenizer, WordTokenizer};
