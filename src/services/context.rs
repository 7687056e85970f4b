//! Request-scoped cancellation and deadline propagation.

use std::future::Future;
use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};

/// Carried from the inbound handler to every outbound call.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    pub cancel: CancellationToken,
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            cancel: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Context for work not tied to an inbound request (startup, CLI).
    pub fn background() -> Self {
        Self::new("background")
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    /// Time left before the caller deadline, if one was given.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// Bound `limit` by the caller deadline.
    pub fn bounded(&self, limit: Duration) -> Duration {
        match self.remaining() {
            Some(left) => left.min(limit),
            None => limit,
        }
    }

    /// Fail fast when the caller is gone or out of time.
    pub fn check(&self) -> AppResult<()> {
        if self.cancel.is_cancelled() || self.remaining().is_some_and(|r| r.is_zero()) {
            return Err(AppError::Cancelled);
        }
        Ok(())
    }

    /// Run `fut` until it completes, the token fires or the deadline elapses.
    pub async fn run<T, F>(&self, fut: F) -> AppResult<T>
    where
        F: Future<Output = AppResult<T>>,
    {
        self.check()?;
        let deadline = self.remaining();
        tokio::select! {
            _ = self.cancel.cancelled() => Err(AppError::Cancelled),
            _ = sleep_or_forever(deadline) => Err(AppError::Cancelled),
            result = fut => result,
        }
    }
}

async fn sleep_or_forever(duration: Option<Duration>) {
    match duration {
        Some(d) => tokio::time::sleep(d).await,
        None => std::future::pending::<()>().await,
    }
}
