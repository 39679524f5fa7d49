//! Client for the filestream file service.
//!
//! [`FileClient`] exposes the four calls: [`list`](FileClient::list),
//! [`download`](FileClient::download), [`upload`](FileClient::upload) and
//! [`upload_with_progress`](FileClient::upload_with_progress). Each call
//! opens its own connection through a [`Connector`].

mod client;
mod config;
mod connector;

pub use client::{DownloadStream, FileClient, UploadSummary};
pub use config::ClientConfig;
pub use connector::{ConnectFuture, Connector, TcpConnector};

pub use filestream_protocol::{Code, Status};
pub use filestream_transfer::ProgressEvent;

use filestream_transfer::TransferError;

/// Errors returned by [`FileClient`] calls.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The call ended with a non-ok status (from the server or local
    /// deadline/cancellation).
    #[error(transparent)]
    Status(#[from] Status),

    #[error("transfer error: {0}")]
    Transfer(#[from] TransferError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("checksum mismatch: sent {local}, server computed {remote}")]
    ChecksumMismatch { local: String, remote: String },

    #[error("size mismatch: sent {sent} bytes, server counted {reported}")]
    SizeMismatch { sent: u64, reported: u64 },

    #[error("progress mismatch: expected {expected:?} bytes, server reported {reported}")]
    ProgressMismatch {
        expected: Option<u64>,
        reported: u64,
    },
}

impl ClientError {
    /// The status code to branch on.
    pub fn code(&self) -> Code {
        match self {
            ClientError::Status(status) => status.code,
            ClientError::Transfer(err) => err.code(),
            ClientError::Config(_) => Code::InvalidArgument,
            ClientError::Io(_)
            | ClientError::ChecksumMismatch { .. }
            | ClientError::SizeMismatch { .. }
            | ClientError::ProgressMismatch { .. } => Code::Internal,
        }
    }

    pub fn to_status(&self) -> Status {
        match self {
            ClientError::Status(status) => status.clone(),
            other => Status::new(other.code(), other.to_string()),
        }
    }
}
