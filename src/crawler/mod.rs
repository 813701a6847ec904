//! Crawler module for mirroring a user's review listing
//!
//! This module contains the core crawling logic, including:
//! - The authenticated session client and request pacing
//! - Listing page fetching and response classification
//! - Entry parsing and normalization
//! - Overall crawl coordination on a background worker
//!
//! [`Crawler::start_crawl`] is the entry point. It returns a [`CrawlHandle`]
//! for requesting a stop, watching status and receiving progress events.

mod coordinator;
mod fetcher;
mod parser;
mod rate_limit;
mod session;

pub use coordinator::{Coordinator, CrawlPlan};
pub use fetcher::{classify, PageFetcher, PageResult, PageSource};
pub use parser::{
    canonicalize_link, normalize_date, parse_page, parse_pub_line, PageStructureError, ParseError,
};
pub use rate_limit::RateLimiter;
pub use session::{RawResponse, SessionClient};

pub use crate::state::{AbortReason, CrawlOutcome};

use crate::config::Config;
use crate::state::{CrawlLifecycle, CrawlStatus};
use crate::storage::{PageTally, SqliteStorage};
use crate::{ConfigError, LedgerError};
use serde::Serialize;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// Counts after one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlProgress {
    /// Page number this event is about
    pub page: u32,

    /// Pages committed so far
    pub pages_done: u32,

    /// Cumulative reconcile outcomes
    pub tally: PageTally,

    pub message: String,
}

/// Terminal summary of a crawl
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    pub pages_done: u32,
    pub pages_skipped: u32,
    pub tally: PageTally,

    /// Records confirmed in the store by this crawl
    pub committed: u64,

    /// Error text behind an abort, when there is one
    pub detail: Option<String>,
}

/// Message from the crawl worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CrawlEvent {
    /// A page was committed
    Progress(CrawlProgress),

    /// A page failed and the crawl moved past it
    PageSkipped(CrawlProgress),

    /// The worker is done; always the last event
    Finished(CrawlReport),
}

/// Receives crawl progress
///
/// `on_progress` is called at most once per page.
pub trait ProgressObserver {
    fn on_progress(
        &mut self,
        pages_done: u32,
        inserted: u64,
        updated: u64,
        unchanged: u64,
        status_message: &str,
    );

    fn on_finished(&mut self, _report: &CrawlReport) {}
}

/// Cloneable stop switch for a running crawl
#[derive(Debug, Clone)]
pub struct StopHandle {
    lifecycle: CrawlLifecycle,
}

impl StopHandle {
    /// Requests a cooperative stop; false if the crawl already finished
    pub fn request_stop(&self) -> bool {
        self.lifecycle.request_stop()
    }
}

/// Handle to a crawl running on a background worker
pub struct CrawlHandle {
    lifecycle: CrawlLifecycle,
    events: mpsc::UnboundedReceiver<CrawlEvent>,
    task: JoinHandle<CrawlReport>,
}

impl CrawlHandle {
    /// Requests a cooperative stop at the next page boundary
    ///
    /// Returns false if the crawl already finished.
    pub fn request_stop(&self) -> bool {
        let accepted = self.lifecycle.request_stop();
        if accepted {
            tracing::info!("Stop requested");
        }
        accepted
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            lifecycle: self.lifecycle.clone(),
        }
    }

    pub fn status(&self) -> CrawlStatus {
        self.lifecycle.status()
    }

    /// Receiver notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<CrawlStatus> {
        self.lifecycle.subscribe()
    }

    /// Next event from the worker; None once the worker has exited
    pub async fn next_event(&mut self) -> Option<CrawlEvent> {
        self.events.recv().await
    }

    /// Feeds every event to `observer` and returns the terminal report
    pub async fn observe<O: ProgressObserver>(
        mut self,
        observer: &mut O,
    ) -> Result<CrawlReport, LedgerError> {
        while let Some(event) = self.events.recv().await {
            match event {
                CrawlEvent::Progress(p) | CrawlEvent::PageSkipped(p) => observer.on_progress(
                    p.pages_done,
                    p.tally.inserted,
                    p.tally.updated,
                    p.tally.unchanged,
                    &p.message,
                ),
                CrawlEvent::Finished(report) => observer.on_finished(&report),
            }
        }
        self.wait().await
    }

    /// Waits for the worker and returns its report
    pub async fn wait(self) -> Result<CrawlReport, LedgerError> {
        self.task
            .await
            .map_err(|e| LedgerError::Worker(e.to_string()))
    }
}

impl CrawlReport {
    fn worker_panicked(detail: String) -> Self {
        Self {
            outcome: CrawlOutcome::Aborted(AbortReason::WorkerPanic),
            pages_done: 0,
            pages_skipped: 0,
            tally: PageTally::default(),
            committed: 0,
            detail: Some(detail),
        }
    }
}

/// Set while a crawl runs anywhere in this process
static ACTIVE_CRAWL: AtomicBool = AtomicBool::new(false);

/// Holds the process-wide crawl slot until dropped
struct CrawlGuard;

impl CrawlGuard {
    fn acquire() -> Option<Self> {
        ACTIVE_CRAWL
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self)
    }
}

impl Drop for CrawlGuard {
    fn drop(&mut self) {
        ACTIVE_CRAWL.store(false, Ordering::Release);
    }
}

/// Starts crawls against one store
///
/// At most one crawl runs per process, whichever `Crawler` started it.
pub struct Crawler {
    config: Arc<Config>,
    storage: Arc<Mutex<SqliteStorage>>,
}

impl Crawler {
    /// Creates a crawler writing to `storage`
    pub fn new(config: Config, storage: Arc<Mutex<SqliteStorage>>) -> Self {
        Self {
            config: Arc::new(config),
            storage,
        }
    }

    /// Creates a crawler over the database named in the configuration
    pub fn open(config: Config) -> Result<Self, LedgerError> {
        let storage = SqliteStorage::new(Path::new(&config.output.database_path))?;
        Ok(Self::new(config, Arc::new(Mutex::new(storage))))
    }

    pub fn storage(&self) -> Arc<Mutex<SqliteStorage>> {
        self.storage.clone()
    }

    /// Whether a crawl is currently running in this process
    pub fn is_running(&self) -> bool {
        ACTIVE_CRAWL.load(Ordering::Acquire)
    }

    /// Starts crawling `user_id`'s listing over HTTP
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Arguments
    ///
    /// * `user_id` - Account whose listing is mirrored
    /// * `auth_token` - Session token sent with every request
    /// * `max_pages` - Page ceiling; falls back to the configured one
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlHandle)` - The crawl is running
    /// * `Err(LedgerError::CrawlInProgress)` - Another crawl holds the slot
    /// * `Err(LedgerError)` - Invalid arguments or client construction failed
    pub fn start_crawl(
        &self,
        user_id: &str,
        auth_token: &str,
        max_pages: Option<u32>,
    ) -> Result<CrawlHandle, LedgerError> {
        validate_user_id(user_id)?;
        let source = PageFetcher::new(&self.config, auth_token)?;
        self.start_crawl_with_source(user_id, source, max_pages)
    }

    /// Starts a crawl that reads pages from `source`
    pub fn start_crawl_with_source<S: PageSource + 'static>(
        &self,
        user_id: &str,
        source: S,
        max_pages: Option<u32>,
    ) -> Result<CrawlHandle, LedgerError> {
        validate_user_id(user_id)?;

        let max_pages = max_pages.or(self.config.crawler.max_pages);
        if max_pages == Some(0) {
            return Err(ConfigError::Validation("max-pages must be at least 1".to_string()).into());
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| LedgerError::Worker(e.to_string()))?;
        let guard = CrawlGuard::acquire().ok_or(LedgerError::CrawlInProgress)?;

        let lifecycle = CrawlLifecycle::new();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let plan = CrawlPlan {
            user_id: user_id.to_string(),
            max_pages,
            failure_threshold: self.config.crawler.failure_threshold,
        };
        let coordinator = Coordinator::new(
            source,
            self.storage.clone(),
            lifecycle.clone(),
            events_tx.clone(),
            plan,
        );

        let worker_lifecycle = lifecycle.clone();
        let worker = runtime.spawn(coordinator.run());
        let task = runtime.spawn(async move {
            let report = match worker.await {
                Ok(report) => report,
                Err(e) => {
                    tracing::error!("Crawl worker failed: {}", e);
                    CrawlReport::worker_panicked(e.to_string())
                }
            };

            // Release the slot before anyone can observe the terminal state
            drop(guard);
            if let Err(e) = worker_lifecycle.finish(report.outcome) {
                tracing::error!("Failed to record crawl outcome: {}", e);
            }
            let _ = events_tx.send(CrawlEvent::Finished(report.clone()));

            report
        });

        Ok(CrawlHandle {
            lifecycle,
            events: events_rx,
            task,
        })
    }
}

/// Rejects ids that cannot form a single listing path segment
pub fn validate_user_id(user_id: &str) -> Result<(), LedgerError> {
    let valid = !matches!(user_id, "" | "." | "..")
        && user_id
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && !matches!(c, '/' | '?' | '#' | '%'));

    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidUserId(user_id.to_string()))
    }
}
