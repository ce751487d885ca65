//! Error types for data-index retrieval.
//!
//! Most failures in this crate never reach the caller of an iterator: fetch and decode errors
//! are logged and degrade to a missing row. `RetrievalError` is what travels between the
//! backends, the batching engine and the futures it hands out, which is why it is `Clone`:
//! one failed batch fetch is delivered to every request in that batch.

use thiserror::Error;

/// Result type alias using [`RetrievalError`]
pub type Result<T> = std::result::Result<T, RetrievalError>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RetrievalError {
    /// The injected single- or multi-key fetch failed
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Backend storage failure (object store, local filesystem)
    #[error("Storage error: {0}")]
    Storage(String),

    /// An adapter could not turn a row into a domain value
    #[error("Decode error: {0}")]
    Decode(String),

    /// No adapter is registered for the row's adapter id
    #[error("Unknown adapter: {0}")]
    UnknownAdapter(i16),

    /// Rejected configuration value
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// `set_params` was called on a retrieval that already has params bound
    #[error("Retrieval params are already bound")]
    ParamsAlreadyBound,

    /// Stored record bytes could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RetrievalError {
    /// Create a fetch error
    pub fn fetch(msg: impl Into<String>) -> Self {
        RetrievalError::Fetch(msg.into())
    }

    /// Create a decode error
    pub fn decode(msg: impl Into<String>) -> Self {
        RetrievalError::Decode(msg.into())
    }

    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        RetrievalError::InvalidConfig(msg.into())
    }
}

impl From<object_store::Error> for RetrievalError {
    fn from(err: object_store::Error) -> Self {
        RetrievalError::Storage(err.to_string())
    }
}

impl From<rkyv::rancor::Error> for RetrievalError {
    fn from(err: rkyv::rancor::Error) -> Self {
        RetrievalError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for RetrievalError {
    fn from(err: url::ParseError) -> Self {
        RetrievalError::InvalidConfig(format!("invalid url: {}", err))
    }
}

impl From<std::io::Error> for RetrievalError {
    fn from(err: std::io::Error) -> Self {
        RetrievalError::Storage(err.to_string())
    }
}
