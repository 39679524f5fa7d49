//! Wire protocol types shared by the filestream server and client.
//!
//! A call is carried over one ordered byte stream as a sequence of
//! length-prefixed JSON [`Frame`]s: an `open` header, zero or more
//! messages in each direction, and a terminal status from the server.

pub mod constants;
pub mod envelope;
pub mod messages;
pub mod metadata;
pub mod status;

// Re-export primary types for convenience.
pub use constants::{CallShape, Method};
pub use envelope::{CallHeader, Frame};
pub use messages::{
    DownloadRequest, DownloadResponse, ListRequest, ListResponse, Message, ProgressRequest,
    ProgressResponse, UploadRequest, UploadResponse,
};
pub use metadata::Metadata;
pub use status::{Code, Status};
