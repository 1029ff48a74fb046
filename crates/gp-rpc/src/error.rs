//! Transport error types

use std::time::Duration;

use thiserror::Error;

/// Transport error type
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Worker device not found: {0}")]
    NoDevice(String),

    #[error("Failed to connect to worker: {0}")]
    ConnectFailed(String),

    #[error("Transport is not connected")]
    NotConnected,

    #[error("Transport disconnected")]
    Disconnected,

    #[error("Call to '{method}' timed out after {}s", timeout.as_secs())]
    Timeout { method: String, timeout: Duration },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Worker error {code}: {message}")]
    RemoteError { code: i64, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;
