//! Error types for the indexer pipeline

use alloy_primitives::Address;
use thiserror::Error;

/// Storage-layer failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("document (de)serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Log-event decoding failures. These are loud by design: silently skipping
/// an undecodable parameter would corrupt aggregate state.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("undecoded parameter `{name}` has unsupported type `{ty}`")]
    UnsupportedType { name: String, ty: String },

    #[error("missing raw topic {index} for undecoded parameter `{name}`")]
    MissingTopic { index: usize, name: String },

    #[error("invalid topic value `{0}`")]
    InvalidTopic(String),

    #[error("event `{name}` carries {got} parameters, expected {expected}")]
    ParamCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("parameter `{name}` has unexpected value shape")]
    UnexpectedValue { name: String },

    #[error("packed price is not valid base64: {0}")]
    InvalidPriceEncoding(#[from] base64::DecodeError),

    #[error("packed price must be 4 bytes, got {0}")]
    InvalidPriceWidth(usize),

    #[error("amount does not fit the supported numeric range")]
    AmountOverflow,
}

/// Failures while replaying events into an aggregate.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("aggregate inconsistency: {0}")]
    InconsistentAggregate(String),
}

/// Top-level error type for engine passes and service assembly.
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transport error: {0}")]
    Transport(#[from] covalent_client::Error),

    #[error(transparent)]
    Handler(#[from] HandlerError),

    #[error("page {page_number} for {address} is not in descending block order")]
    PageOrdering { address: Address, page_number: u64 },

    #[error("configuration error: {0}")]
    Config(String),
}

/// Result type alias for the indexer
pub type Result<T> = std::result::Result<T, IndexerError>;
