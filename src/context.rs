//! Per-request cancellation and deadline handling.
//!
//! Every point where a request can block (waiting for a rate-limit token,
//! sleeping between retries, waiting on the transport) goes through a
//! [`RequestContext`], so a caller can abandon the request at any of them.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::errors::{CancelReason, LcscError, LcscResult};

/// Cancellation signal plus an optional deadline for one logical request.
///
/// Cloning shares the same token, so cancelling any clone cancels them all.
/// Use [`RequestContext::child`] for a context that can be cancelled on its
/// own but still follows its parent.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl RequestContext {
    /// Creates a context that never cancels on its own.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a context driven by an existing cancellation token.
    pub fn with_token(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets a deadline `timeout` from now, keeping an earlier one if present.
    ///
    /// A timeout too long to represent as an instant adds no deadline.
    #[must_use]
    pub fn with_timeout(self, timeout: Duration) -> Self {
        match Instant::now().checked_add(timeout) {
            Some(deadline) => self.with_deadline(deadline),
            None => self,
        }
    }

    /// Sets an absolute deadline, keeping an earlier one if present.
    #[must_use]
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        });
        self
    }

    /// Derives a context that is cancelled with its parent but can also be
    /// cancelled independently.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the underlying cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns the time left before the deadline.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Returns true once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Fails fast if the context is already cancelled or expired.
    pub fn check(&self) -> LcscResult<()> {
        if self.token.is_cancelled() {
            return Err(LcscError::cancelled(CancelReason::Cancelled));
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => {
                Err(LcscError::cancelled(CancelReason::DeadlineExceeded))
            }
            _ => Ok(()),
        }
    }

    /// Drives `future` to completion unless the context ends first.
    ///
    /// When the context wins the race the future is dropped.
    pub async fn run<F>(&self, future: F) -> LcscResult<F::Output>
    where
        F: Future,
    {
        self.check()?;

        tokio::select! {
            biased;
            () = self.token.cancelled() => Err(LcscError::cancelled(CancelReason::Cancelled)),
            () = wait_for_deadline(self.deadline) => {
                Err(LcscError::cancelled(CancelReason::DeadlineExceeded))
            }
            output = future => Ok(output),
        }
    }

    /// Sleeps for `duration`, returning early with an error if the context ends.
    pub async fn sleep(&self, duration: Duration) -> LcscResult<()> {
        self.run(tokio::time::sleep(duration)).await
    }
}

async fn wait_for_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
