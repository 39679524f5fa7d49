//! Call outcome codes.
//!
//! Callers branch on [`Code`], never on the message text.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Status code surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Code {
    Ok,
    Cancelled,
    InvalidArgument,
    NotFound,
    DeadlineExceeded,
    Unauthenticated,
    Internal,
    /// The underlying transport failed.
    Unavailable,
    /// The method is not served.
    Unimplemented,
}

impl Code {
    pub fn as_str(self) -> &'static str {
        match self {
            Code::Ok => "ok",
            Code::Cancelled => "cancelled",
            Code::InvalidArgument => "invalid_argument",
            Code::NotFound => "not_found",
            Code::DeadlineExceeded => "deadline_exceeded",
            Code::Unauthenticated => "unauthenticated",
            Code::Internal => "internal",
            Code::Unavailable => "unavailable",
            Code::Unimplemented => "unimplemented",
        }
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a call: a code plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{code}: {message}")]
pub struct Status {
    pub code: Code,
    pub message: String,
}

impl Status {
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn ok() -> Self {
        Self::new(Code::Ok, "")
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(Code::Cancelled, message)
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    pub fn deadline_exceeded(message: impl Into<String>) -> Self {
        Self::new(Code::DeadlineExceeded, message)
    }

    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Code::Internal, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(Code::Unavailable, message)
    }

    pub fn unimplemented(message: impl Into<String>) -> Self {
        Self::new(Code::Unimplemented, message)
    }

    pub fn is_ok(&self) -> bool {
        self.code == Code::Ok
    }

    /// `true` for the two cancellation causes (deadline or explicit cancel).
    pub fn is_cancellation(&self) -> bool {
        matches!(self.code, Code::Cancelled | Code::DeadlineExceeded)
    }
}
