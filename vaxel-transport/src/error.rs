use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to bind {endpoint}: {source}")]
    Bind {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Socket path {0} is in use")]
    PathInUse(PathBuf),

    #[error("I/O runtime failed to start: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("Transport I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Transport has been shut down")]
    Stopped,
}

/// Why an outbound message was not queued.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("send queue full")]
    Full,

    #[error("connection closed")]
    Closed,
}
