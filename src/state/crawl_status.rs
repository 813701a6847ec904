//! Lifecycle states of a crawl
//!
//! A crawl starts `Running`. A stop request moves it to `Stopping`; the worker
//! honours that at the next page boundary and finishes as `Stopped`. Every
//! other ending goes straight from `Running` (or `Stopping`) to `Finished`.

use crate::LedgerError;
use serde::Serialize;
use std::fmt;

/// Why a crawl ended before reaching the end of the listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AbortReason {
    /// The remote site rejected the session token
    AuthFailure,

    /// Too many consecutive pages failed with transient errors
    TooManyFailures,

    /// The store rejected a write
    Storage,

    /// The crawl worker panicked
    WorkerPanic,
}

/// Terminal result of a crawl
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrawlOutcome {
    /// Reached the natural end of the listing or the page ceiling
    Completed,

    /// Stopped cleanly on request
    Stopped,

    /// Terminated by a fatal error
    Aborted(AbortReason),
}

impl CrawlOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Aborted(_))
    }
}

impl fmt::Display for CrawlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Stopped => write!(f, "stopped by request"),
            Self::Aborted(AbortReason::AuthFailure) => {
                write!(f, "aborted: authentication rejected")
            }
            Self::Aborted(AbortReason::TooManyFailures) => {
                write!(f, "aborted: too many consecutive page failures")
            }
            Self::Aborted(AbortReason::Storage) => write!(f, "aborted: storage error"),
            Self::Aborted(AbortReason::WorkerPanic) => {
                write!(f, "aborted: crawl worker panicked")
            }
        }
    }
}

/// Represents where a crawl is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrawlStatus {
    /// The worker is fetching pages
    Running,

    /// A stop was requested; the worker has not reached a page boundary yet
    Stopping,

    /// The worker has exited
    Finished(CrawlOutcome),
}

impl CrawlStatus {
    /// Returns true once the worker has exited
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished(_))
    }

    /// The terminal outcome, if finished
    pub fn outcome(&self) -> Option<CrawlOutcome> {
        match self {
            Self::Finished(outcome) => Some(*outcome),
            _ => None,
        }
    }

    /// Checks whether moving from `self` to `to` is a legal transition
    ///
    /// `Stopped` is only reachable through `Stopping`. A repeated stop request
    /// is accepted and leaves the status unchanged.
    pub fn can_transition_to(&self, to: CrawlStatus) -> bool {
        match (self, to) {
            (Self::Running, Self::Stopping) => true,
            (Self::Running, Self::Finished(CrawlOutcome::Stopped)) => false,
            (Self::Running, Self::Finished(_)) => true,
            (Self::Stopping, Self::Stopping) => true,
            (Self::Stopping, Self::Finished(_)) => true,
            _ => false,
        }
    }

    /// Performs a checked transition
    pub fn transition(self, to: CrawlStatus) -> Result<CrawlStatus, LedgerError> {
        if self.can_transition_to(to) {
            Ok(to)
        } else {
            Err(LedgerError::InvalidTransition { from: self, to })
        }
    }
}

impl fmt::Display for CrawlStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Stopping => write!(f, "stopping"),
            Self::Finished(outcome) => write!(f, "{}", outcome),
        }
    }
}
