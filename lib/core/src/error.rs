use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// The umbrella error surfaced by `get`, `index`, `delete` and `drop`.
pub type SearchError = Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad spec, field or encoder wiring. Never retried.
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// A document property could not be encoded for a field.
    #[error("Cannot encode field '{field}': {reason}")]
    Encoding { field: String, reason: String },

    #[error("Unsupported filter: {0}")]
    UnsupportedFilter(String),

    #[error("Partitions timed out or failed: {partitions:?}")]
    PartitionTimeout { partitions: Vec<usize> },

    #[error("Corrupt index entry: {0}")]
    CorruptEntry(String),

    #[error("Index not found: {0}")]
    IndexNotFound(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn encoding(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Encoding {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Errors that only affect a single document and leave the batch usable.
    #[inline]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Encoding { .. } | Error::PartitionTimeout { .. })
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}
