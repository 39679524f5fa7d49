use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::constants::Method;
use crate::messages::Message;
use crate::metadata::Metadata;
use crate::status::{Code, Status};

/// First frame of every call, sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallHeader {
    /// Wire name of the method (see [`Method::name`]).
    pub method: String,
    #[serde(default, skip_serializing_if = "Metadata::is_empty")]
    pub metadata: Metadata,
    /// Caller deadline relative to the moment the call was opened.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
}

impl CallHeader {
    pub fn new(method: Method, metadata: Metadata, timeout: Option<Duration>) -> Self {
        Self {
            method: method.name().to_string(),
            metadata,
            timeout_ms: timeout.map(|t| t.as_millis().min(u64::MAX as u128) as u64),
        }
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

/// Unit of transmission on a call's byte stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Frame {
    /// Opens a call (client to server, exactly once, first).
    Open(CallHeader),
    /// One application message, either direction.
    Message { message: Message },
    /// The client will send no further messages.
    HalfClose,
    /// The client abandons the call (deadline or explicit cancel).
    Cancel { code: Code },
    /// Terminal outcome (server to client, exactly once, last).
    Status(Status),
}

impl Frame {
    pub fn message(message: impl Into<Message>) -> Self {
        Frame::Message {
            message: message.into(),
        }
    }

    /// Short name of the frame kind, for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Open(_) => "open",
            Frame::Message { .. } => "message",
            Frame::HalfClose => "half_close",
            Frame::Cancel { .. } => "cancel",
            Frame::Status(_) => "status",
        }
    }
}
