//! Per-call deadline and cancellation.

use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use filestream_protocol::Status;

/// Deadline and cancellation state shared by everything working on one call.
///
/// Clones observe the same cancellation. The first cancel wins: its status
/// becomes the cause reported by [`done`](Self::done).
#[derive(Debug, Clone)]
pub struct CallContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
    cause: Arc<OnceLock<Status>>,
}

impl CallContext {
    /// Creates a context expiring `timeout` from now, or never.
    pub fn new(timeout: Option<Duration>) -> Self {
        Self {
            deadline: timeout.map(|t| Instant::now() + t),
            cancel: CancellationToken::new(),
            cause: Arc::new(OnceLock::new()),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline, `None` without one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Cancels the call. Later calls keep the first cause.
    pub fn cancel(&self, status: Status) {
        let _ = self.cause.set(status);
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The cancellation cause, once cancelled.
    pub fn cause(&self) -> Option<Status> {
        self.cause.get().cloned()
    }

    /// Resolves when the call is cancelled or its deadline passes.
    ///
    /// Deadline expiry cancels the context with `DeadlineExceeded`, so every
    /// clone sees the same cause.
    pub async fn done(&self) -> Status {
        let deadline = async {
            match self.deadline {
                Some(at) => tokio::time::sleep_until(at).await,
                None => std::future::pending::<()>().await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {}
            _ = deadline => {
                self.cancel(Status::deadline_exceeded("deadline exceeded"));
            }
        }
        self.cause()
            .unwrap_or_else(|| Status::cancelled("call cancelled"))
    }

    /// Runs `fut` unless the call ends first, in which case the
    /// cancellation status is returned and `fut` is dropped.
    pub async fn guard<T, F>(&self, fut: F) -> Result<T, Status>
    where
        F: Future<Output = Result<T, Status>>,
    {
        tokio::select! {
            biased;
            status = self.done() => Err(status),
            result = fut => result,
        }
    }
}

impl Default for CallContext {
    fn default() -> Self {
        Self::new(None)
    }
}
