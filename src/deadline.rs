//! Cooperative request deadlines.
//!
//! Pixel primitives are never interrupted. The pipeline calls
//! [`Deadline::check`] between stages instead, so an expired request stops at
//! the next checkpoint with its partial work discarded.

use std::time::{Duration, Instant};
use thiserror::Error;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("deadline exceeded after {}ms", elapsed.as_millis())]
pub struct DeadlineExceeded {
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started: Instant,
    limit: Option<Instant>,
}

impl Deadline {
    /// Expires `budget` from now.
    pub fn after(budget: Duration) -> Self {
        let started = Instant::now();
        Self {
            started,
            limit: started.checked_add(budget),
        }
    }

    /// Expires at `limit`.
    pub fn at(limit: Instant) -> Self {
        Self {
            started: Instant::now(),
            limit: Some(limit),
        }
    }

    /// Never expires.
    pub fn none() -> Self {
        Self {
            started: Instant::now(),
            limit: None,
        }
    }

    /// `after(budget)` when a budget is given, otherwise [`none`](Self::none).
    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map_or_else(Self::none, Self::after)
    }

    pub fn is_expired(&self) -> bool {
        self.limit.is_some_and(|limit| Instant::now() >= limit)
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Checkpoint: `Err` once the deadline has passed.
    pub fn check(&self) -> Result<(), DeadlineExceeded> {
        if self.is_expired() {
            return Err(DeadlineExceeded {
                elapsed: self.elapsed(),
            });
        }
        Ok(())
    }
}
