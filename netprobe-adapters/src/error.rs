//! Error types for adapters.

use thiserror::Error;

use netprobe_engine::SinkError;

/// Errors that can occur when publishing records through an adapter.
#[derive(Debug, Error)]
pub enum AdapterError {
    /// Failed to serialize the record.
    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Authentication failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Connection failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// The bus rejected or dropped the message.
    #[error("Publish failed: {0}")]
    Publish(String),
}

impl From<AdapterError> for SinkError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Serialize(err) => SinkError::Serialize(err),
            other => SinkError::Publish(other.to_string()),
        }
    }
}
