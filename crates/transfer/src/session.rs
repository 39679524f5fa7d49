//! Per-call transfer state machine.
//!
//! ```text
//! Idle ──chunk──▶ Active ──chunk──▶ Active
//!  │                │
//!  │                ├──end-of-stream──▶ Completed
//!  │                ├──error──────────▶ Failed
//!  └──cancel/deadline──┴───────────────▶ Cancelled
//! ```
//!
//! Terminal states are sticky. A session is owned by exactly one call and
//! never shared.

use std::fmt;
use std::time::{Duration, Instant};

use filestream_protocol::{Code, Status};

use crate::TransferError;

/// Which way bytes flow, from the server's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Upload,
    Download,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionState {
    Idle,
    Active,
    Completed,
    Failed,
    Cancelled,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Failed | SessionState::Cancelled
        )
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Direction::Upload => "upload",
            Direction::Download => "download",
        })
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Active => "active",
            SessionState::Completed => "completed",
            SessionState::Failed => "failed",
            SessionState::Cancelled => "cancelled",
        })
    }
}

/// Snapshot of a session, reported when it ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub id: String,
    pub direction: Direction,
    pub state: SessionState,
    pub bytes_transferred: u64,
    pub chunks: u64,
    /// Status that ended the session, for `Failed` and `Cancelled`.
    pub error: Option<Status>,
    pub elapsed: Duration,
}

/// Tracks one logical transfer for the lifetime of one call.
#[derive(Debug)]
pub struct TransferSession {
    id: String,
    direction: Direction,
    state: SessionState,
    bytes_transferred: u64,
    chunks: u64,
    expected_len: Option<u64>,
    error: Option<Status>,
    created_at: Instant,
    finished_at: Option<Instant>,
}

impl TransferSession {
    /// Creates an idle session with a fresh id.
    pub fn new(direction: Direction) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            direction,
            state: SessionState::Idle,
            bytes_transferred: 0,
            chunks: 0,
            expected_len: None,
            error: None,
            created_at: Instant::now(),
            finished_at: None,
        }
    }

    /// Creates an idle session whose total length is known in advance.
    pub fn with_expected_len(direction: Direction, len: u64) -> Self {
        Self {
            expected_len: Some(len),
            ..Self::new(direction)
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn bytes_transferred(&self) -> u64 {
        self.bytes_transferred
    }

    pub fn chunks(&self) -> u64 {
        self.chunks
    }

    pub fn expected_len(&self) -> Option<u64> {
        self.expected_len
    }

    /// Returns `true` until the session reaches a terminal state.
    pub fn is_open(&self) -> bool {
        !self.state.is_terminal()
    }

    /// Records one processed chunk and returns the cumulative byte count.
    pub fn record_chunk(&mut self, len: usize) -> Result<u64, TransferError> {
        self.ensure_open("record a chunk on")?;
        if len == 0 {
            return Err(TransferError::EmptyChunk);
        }

        let transferred = self.bytes_transferred + len as u64;
        if let Some(declared) = self.expected_len {
            if transferred > declared {
                return Err(TransferError::LengthExceeded {
                    declared,
                    transferred,
                });
            }
        }

        self.state = SessionState::Active;
        self.bytes_transferred = transferred;
        self.chunks += 1;
        Ok(transferred)
    }

    /// Peer signalled end-of-stream with no outstanding error.
    pub fn complete(&mut self) -> Result<(), TransferError> {
        self.ensure_open("complete")?;
        self.finish(SessionState::Completed, None);
        Ok(())
    }

    /// Moves the session to `Failed`. No-op on a terminal session.
    pub fn fail(&mut self, status: Status) {
        if self.is_open() {
            self.finish(SessionState::Failed, Some(status));
        }
    }

    /// Moves the session to `Cancelled`. No-op on a terminal session.
    pub fn cancel(&mut self, status: Status) {
        if self.is_open() {
            self.finish(SessionState::Cancelled, Some(status));
        }
    }

    /// Settles an open session from a call outcome.
    ///
    /// Cancellation codes end in `Cancelled`, any other error in `Failed`,
    /// and success in `Completed`.
    pub fn settle(&mut self, outcome: &Result<(), Status>) {
        if !self.is_open() {
            return;
        }
        match outcome {
            Ok(()) => self.finish(SessionState::Completed, None),
            Err(status) if status.is_cancellation() => self.cancel(status.clone()),
            Err(status) => self.fail(status.clone()),
        }
    }

    pub fn error(&self) -> Option<&Status> {
        self.error.as_ref()
    }

    /// Time from creation until the terminal transition (or now).
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .unwrap_or_else(Instant::now)
            .duration_since(self.created_at)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            id: self.id.clone(),
            direction: self.direction,
            state: self.state,
            bytes_transferred: self.bytes_transferred,
            chunks: self.chunks,
            error: self.error.clone(),
            elapsed: self.elapsed(),
        }
    }

    fn ensure_open(&self, event: &'static str) -> Result<(), TransferError> {
        if self.state.is_terminal() {
            return Err(TransferError::InvalidTransition {
                from: self.state,
                event,
            });
        }
        Ok(())
    }

    fn finish(&mut self, state: SessionState, error: Option<Status>) {
        self.state = state;
        self.error = error;
        self.finished_at = Some(Instant::now());
        tracing::debug!(
            session_id = %self.id,
            direction = %self.direction,
            state = %state,
            bytes = self.bytes_transferred,
            "transfer session finished"
        );
    }
}

/// Maps a terminal session back to the status a call should report.
impl From<&TransferSession> for Status {
    fn from(session: &TransferSession) -> Self {
        match (&session.state, &session.error) {
            (_, Some(status)) => status.clone(),
            (SessionState::Completed, None) => Status::ok(),
            (state, None) => Status::new(Code::Internal, format!("session is {state}")),
        }
    }
}
