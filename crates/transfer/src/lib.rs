//! Chunked file transfer primitives.
//!
//! - [`codec`]: splitting payloads and byte sources into bounded chunks.
//! - [`session`]: the per-call transfer state machine.
//! - [`storage`]: the read-only storage backend consumed by the server.

mod checksum;
pub mod codec;
pub mod session;
pub mod storage;
mod types;
mod validation;

pub use checksum::{Checksum, checksum_bytes};
pub use codec::{Chunk, ChunkReader, read_next, reassemble, split};
pub use session::{Direction, SessionState, SessionSummary, TransferSession};
pub use storage::{ByteSource, FsStorage, Storage, StorageFuture};
pub use types::{FileHandle, ProgressEvent};
pub use validation::validate_file_name;

use filestream_protocol::{Code, Status};

pub use filestream_protocol::constants::DEFAULT_MAX_CHUNK_SIZE;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("empty chunk is not valid data")]
    EmptyChunk,

    #[error("transfer exceeds declared length: {transferred} > {declared} bytes")]
    LengthExceeded { declared: u64, transferred: u64 },

    #[error("invalid transition: cannot {event} a {from} session")]
    InvalidTransition {
        from: SessionState,
        event: &'static str,
    },

    #[error("invalid file name: {0}")]
    InvalidName(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("storage root unreadable: {0}")]
    StorageUnavailable(std::io::Error),
}

impl TransferError {
    /// Status code surfaced to callers for this error.
    pub fn code(&self) -> Code {
        match self {
            TransferError::InvalidChunkSize
            | TransferError::EmptyChunk
            | TransferError::LengthExceeded { .. }
            | TransferError::InvalidName(_) => Code::InvalidArgument,
            TransferError::NotFound(_) => Code::NotFound,
            TransferError::Io(_)
            | TransferError::InvalidTransition { .. }
            | TransferError::StorageUnavailable(_) => Code::Internal,
        }
    }
}

impl From<TransferError> for Status {
    fn from(err: TransferError) -> Self {
        Status::new(err.code(), err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes() {
        assert_eq!(
            Status::from(TransferError::NotFound("a.txt".into())).code,
            Code::NotFound
        );
        assert_eq!(
            Status::from(TransferError::EmptyChunk).code,
            Code::InvalidArgument
        );
        let unreadable = TransferError::StorageUnavailable(std::io::Error::other("denied"));
        assert_eq!(Status::from(unreadable).code, Code::Internal);
    }
}
