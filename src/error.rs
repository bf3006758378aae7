//! Error types for the dictionary engine.
//!
//! Only [`InitializationError`] and [`ParseError`] reach callers of the cache
//! manager; blob-store failures are recovered locally as cache misses.

use thiserror::Error;

/// The lexicon XML could not be turned into entries.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {message}")]
    Malformed { position: u64, message: String },

    #[error("unclosed element <{0}> at end of document")]
    Unclosed(String),

    #[error("document has no root element")]
    NoRoot,

    #[error("required element <{0}> not found")]
    MissingElement(&'static str),

    #[error("entry #{index} has no <{element}> element")]
    IncompleteEntry { index: usize, element: &'static str },
}

#[derive(Debug, Error)]
pub enum BlobStoreError {
    #[error("no blob stored under key {0:?}")]
    NotFound(String),

    #[error("blob store I/O failed for key {key:?}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    #[error("blob {key:?} could not be encoded or decoded: {source}")]
    Codec {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Error)]
pub enum BundleError {
    #[error("bundle has no member {0:?}")]
    MemberNotFound(String),

    #[error("bundle I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("bundle archive is unreadable: {0}")]
    Archive(#[from] zip::result::ZipError),
}

/// Building the entry set failed; the cache stays uninitialized and a later
/// call may retry.
#[derive(Debug, Error)]
pub enum InitializationError {
    #[error("failed to read lexicon from asset bundle: {0}")]
    Bundle(#[from] BundleError),

    #[error("failed to parse lexicon: {0}")]
    Parse(#[from] ParseError),
}

#[derive(Debug, Error)]
pub enum SelectionError {
    #[error("請輸入介於1到{total}之間的數字")]
    OutOfRange { total: usize },

    #[error("dictionary has no entries")]
    Empty,

    #[error(transparent)]
    Initialization(#[from] InitializationError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}
