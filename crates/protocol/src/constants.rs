use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default maximum chunk size in bytes.
///
/// Deliberately tiny so a handful of bytes exercises the streaming paths;
/// deployments raise it through configuration.
pub const DEFAULT_MAX_CHUNK_SIZE: usize = 5;

/// Maximum encoded frame size in bytes (16 MiB).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Largest chunk whose base64 message frame still fits in [`MAX_FRAME_SIZE`].
pub const MAX_CHUNK_SIZE: usize = MAX_FRAME_SIZE / 4 * 3 - 1024;

/// Metadata key carrying the bearer credential.
pub const AUTHORIZATION_KEY: &str = "authorization";

/// Authorization scheme expected in front of the token.
pub const BEARER_SCHEME: &str = "Bearer";

/// Capacity of each direction of a duplex channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 32;

/// Timeout for reading the `open` frame of a freshly accepted call.
pub const OPEN_TIMEOUT: Duration = Duration::from_secs(5);

/// The RPC methods exposed by the file service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Method {
    ListFiles,
    Download,
    Upload,
    UploadAndNotifyProgress,
}

/// Interaction shape of a call: how many messages flow in each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallShape {
    /// One request, one response.
    Unary,
    /// One request, a stream of responses.
    ServerStream,
    /// A stream of requests, one response.
    ClientStream,
    /// Both directions stream concurrently.
    BidiStream,
}

impl Method {
    pub const ALL: [Method; 4] = [
        Method::ListFiles,
        Method::Download,
        Method::Upload,
        Method::UploadAndNotifyProgress,
    ];

    /// Wire name carried in the `open` frame.
    pub fn name(self) -> &'static str {
        match self {
            Method::ListFiles => "ListFiles",
            Method::Download => "Download",
            Method::Upload => "Upload",
            Method::UploadAndNotifyProgress => "UploadAndNotifyProgress",
        }
    }

    /// Resolves a wire name. Returns `None` for unknown methods.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }

    pub fn shape(self) -> CallShape {
        match self {
            Method::ListFiles => CallShape::Unary,
            Method::Download => CallShape::ServerStream,
            Method::Upload => CallShape::ClientStream,
            Method::UploadAndNotifyProgress => CallShape::BidiStream,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
