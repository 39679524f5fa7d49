//! Error types for the call transport.

use filestream_protocol::Status;

/// Errors produced while moving frames over a byte stream.
#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed frame: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("frame of {size} bytes exceeds limit of {max}")]
    FrameTooLarge { size: usize, max: usize },

    #[error("connection timed out")]
    Timeout,

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl From<RpcError> for Status {
    fn from(err: RpcError) -> Self {
        match err {
            RpcError::Io(_) | RpcError::Timeout => Status::unavailable(err.to_string()),
            RpcError::Decode(_) | RpcError::FrameTooLarge { .. } | RpcError::Protocol(_) => {
                Status::invalid_argument(err.to_string())
            }
        }
    }
}
