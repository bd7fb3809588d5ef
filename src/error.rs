//! Error types for the coordination layer.
//!
//! Nothing here is fatal. Storage and codec errors are recovered inside the
//! [`StateStore`](crate::state::StateStore); listener errors are reported and
//! swallowed by the bus; binding errors surface through
//! [`Transition`](crate::resources::Transition).

use thiserror::Error;

/// Failure of a host storage backend.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },
}

/// Failure to encode or decode a persisted entry.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

impl From<rmp_serde::encode::Error> for CodecError {
    fn from(e: rmp_serde::encode::Error) -> Self {
        CodecError::Serialization(e.to_string())
    }
}

impl From<rmp_serde::decode::Error> for CodecError {
    fn from(e: rmp_serde::decode::Error) -> Self {
        CodecError::Deserialization(e.to_string())
    }
}

/// Rejection from a [`ResourceBinding`](crate::resources::ResourceBinding).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{0}")]
pub struct BindingError(pub String);

impl BindingError {
    pub fn new(message: impl Into<String>) -> Self {
        BindingError(message.into())
    }
}

/// Main error type for bus operations.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum BusError {
    #[error("Resource binding failed for {resource}: {source}")]
    Binding {
        resource: String,
        #[source]
        source: BindingError,
    },

    #[error("No DOM host configured")]
    NoDom,

    #[error("Failed to spawn lifecycle task: {0}")]
    Spawn(String),

    #[error("Lifecycle task for {0} was dropped before completing")]
    Abandoned(String),
}

/// Error returned by a listener callback.
pub type ListenerError = Box<dyn std::error::Error>;

/// What a listener callback returns.
pub type ListenerResult = std::result::Result<(), ListenerError>;

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;
