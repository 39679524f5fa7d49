use serde::{Deserialize, Serialize};

use crate::status::Status;

// ---------------------------------------------------------------------------
// Unary: ListFiles
// ---------------------------------------------------------------------------

/// Lists the files in the server's storage root.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ListRequest {}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListResponse {
    #[serde(default)]
    pub file_names: Vec<String>,
}

// ---------------------------------------------------------------------------
// Server streaming: Download
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub file_name: String,
}

/// One chunk of a downloaded file.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadResponse {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

// ---------------------------------------------------------------------------
// Client streaming: Upload
// ---------------------------------------------------------------------------

/// One chunk of an uploaded file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRequest {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Sent once after the client closes its side of an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    /// Total bytes accumulated by the server.
    pub size: u64,
    /// SHA-256 hex digest of the accumulated bytes.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub checksum: String,
}

// ---------------------------------------------------------------------------
// Bidirectional streaming: UploadAndNotifyProgress
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressRequest {
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Acknowledges one received chunk with the cumulative byte count.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub message: String,
    /// Cumulative bytes received so far.
    #[serde(default)]
    pub received: u64,
}

impl ProgressResponse {
    pub fn for_received(received: u64) -> Self {
        Self {
            message: format!("received {received}bytes"),
            received,
        }
    }
}

// ---------------------------------------------------------------------------
// Message union
// ---------------------------------------------------------------------------

/// Any message that can travel inside a `message` frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum Message {
    ListRequest(ListRequest),
    ListResponse(ListResponse),
    DownloadRequest(DownloadRequest),
    DownloadResponse(DownloadResponse),
    UploadRequest(UploadRequest),
    UploadResponse(UploadResponse),
    ProgressRequest(ProgressRequest),
    ProgressResponse(ProgressResponse),
}

impl Message {
    /// Wire name of the variant, used in logs and protocol errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Message::ListRequest(_) => "list_request",
            Message::ListResponse(_) => "list_response",
            Message::DownloadRequest(_) => "download_request",
            Message::DownloadResponse(_) => "download_response",
            Message::UploadRequest(_) => "upload_request",
            Message::UploadResponse(_) => "upload_response",
            Message::ProgressRequest(_) => "progress_request",
            Message::ProgressResponse(_) => "progress_response",
        }
    }
}

macro_rules! message_variant {
    ($($ty:ident),* $(,)?) => {
        $(
            impl From<$ty> for Message {
                fn from(m: $ty) -> Self {
                    Message::$ty(m)
                }
            }

            impl TryFrom<Message> for $ty {
                type Error = Status;

                fn try_from(msg: Message) -> Result<Self, Status> {
                    match msg {
                        Message::$ty(m) => Ok(m),
                        other => Err(Status::invalid_argument(format!(
                            "unexpected {} message, expected {}",
                            other.kind(),
                            stringify!($ty),
                        ))),
                    }
                }
            }
        )*
    };
}

message_variant!(
    ListRequest,
    ListResponse,
    DownloadRequest,
    DownloadResponse,
    UploadRequest,
    UploadResponse,
    ProgressRequest,
    ProgressResponse,
);

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}
