//! Crawler coordinator - main crawl orchestration logic
//!
//! This module contains the page loop that drives one crawl:
//! - Fetching listing pages in order, starting at page 1
//! - Parsing and reconciling each page into the store in one transaction
//! - Tolerating a bounded run of failed pages
//! - Honouring stop requests and the page ceiling at page boundaries
//! - Publishing progress after every page

use crate::crawler::fetcher::{PageResult, PageSource};
use crate::crawler::parser::parse_page;
use crate::crawler::{CrawlEvent, CrawlProgress, CrawlReport};
use crate::state::{AbortReason, CrawlLifecycle, CrawlOutcome};
use crate::storage::{Candidate, PageTally, SqliteStorage, Storage, StorageError};
use chrono::Utc;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedSender;

/// Parameters of one crawl
#[derive(Debug, Clone)]
pub struct CrawlPlan {
    pub user_id: String,

    /// Highest page number that may be fetched
    pub max_pages: Option<u32>,

    /// Consecutive failed pages that abort the crawl
    pub failure_threshold: u32,
}

/// Drives the fetch → parse → reconcile loop for one crawl
pub struct Coordinator<S: PageSource> {
    source: S,
    storage: Arc<Mutex<SqliteStorage>>,
    lifecycle: CrawlLifecycle,
    events: UnboundedSender<CrawlEvent>,
    plan: CrawlPlan,

    pages_done: u32,
    pages_skipped: u32,
    tally: PageTally,
}

impl<S: PageSource> Coordinator<S> {
    pub fn new(
        source: S,
        storage: Arc<Mutex<SqliteStorage>>,
        lifecycle: CrawlLifecycle,
        events: UnboundedSender<CrawlEvent>,
        plan: CrawlPlan,
    ) -> Self {
        Self {
            source,
            storage,
            lifecycle,
            events,
            plan,
            pages_done: 0,
            pages_skipped: 0,
            tally: PageTally::default(),
        }
    }

    /// Runs the page loop to a terminal outcome
    ///
    /// Every committed page stays committed whatever the outcome; the report
    /// says how far the crawl got.
    pub async fn run(mut self) -> CrawlReport {
        tracing::info!(
            "Starting crawl for {} (page ceiling: {:?})",
            self.plan.user_id,
            self.plan.max_pages
        );

        let start_time = std::time::Instant::now();
        let mut page = 1u32;
        let mut consecutive_failures = 0u32;
        let mut detail = None;

        let outcome = loop {
            if self.lifecycle.is_stop_requested() {
                tracing::info!("Stop requested, ending before page {}", page);
                break CrawlOutcome::Stopped;
            }

            if self.plan.max_pages.is_some_and(|max| page > max) {
                tracing::info!("Page ceiling reached after page {}", page - 1);
                break CrawlOutcome::Completed;
            }

            match self.source.fetch_page(&self.plan.user_id, page).await {
                PageResult::AuthFailure => {
                    tracing::error!("Session rejected on page {}", page);
                    break CrawlOutcome::Aborted(AbortReason::AuthFailure);
                }

                PageResult::NotFound => {
                    tracing::info!("Page {} not found, end of listing", page);
                    break CrawlOutcome::Completed;
                }

                PageResult::Transient(reason) => {
                    consecutive_failures += 1;
                    if consecutive_failures >= self.plan.failure_threshold {
                        tracing::error!(
                            "Page {} failed ({}); {} consecutive failed pages, aborting",
                            page,
                            reason,
                            consecutive_failures
                        );
                        detail = Some(reason);
                        break CrawlOutcome::Aborted(AbortReason::TooManyFailures);
                    }

                    tracing::warn!("Skipping page {}: {}", page, reason);
                    self.pages_skipped += 1;
                    let message = format!("page {} skipped: {}", page, reason);
                    self.publish(CrawlEvent::PageSkipped(self.progress(page, message)));
                }

                PageResult::Ok(body) => {
                    let candidates = match parse_page(&body, self.source.base_url()) {
                        Ok(candidates) => candidates,
                        Err(e) => {
                            tracing::warn!("Page {} not recognized as a listing: {}", page, e);
                            Vec::new()
                        }
                    };

                    if candidates.is_empty() {
                        tracing::info!("Page {} has no entries, end of listing", page);
                        break CrawlOutcome::Completed;
                    }

                    let page_tally = match self.commit_page(&candidates) {
                        Ok(tally) => tally,
                        Err(e) => {
                            tracing::error!("Failed to store page {}: {}", page, e);
                            detail = Some(e.to_string());
                            break CrawlOutcome::Aborted(AbortReason::Storage);
                        }
                    };

                    consecutive_failures = 0;
                    self.pages_done += 1;
                    self.tally.merge(page_tally);

                    let message = format!(
                        "page {}: {} entries ({} new, {} updated, {} unchanged)",
                        page,
                        candidates.len(),
                        page_tally.inserted,
                        page_tally.updated,
                        page_tally.unchanged
                    );
                    tracing::info!("{}", message);
                    self.publish(CrawlEvent::Progress(self.progress(page, message)));
                }
            }

            page += 1;
        };

        let report = CrawlReport {
            outcome,
            pages_done: self.pages_done,
            pages_skipped: self.pages_skipped,
            tally: self.tally,
            committed: self.tally.total(),
            detail,
        };

        tracing::info!(
            "Crawl {} in {:?}: {} pages, {} records ({} new, {} updated)",
            outcome,
            start_time.elapsed(),
            report.pages_done,
            report.committed,
            report.tally.inserted,
            report.tally.updated
        );

        report
    }

    fn commit_page(&self, candidates: &[Candidate]) -> Result<PageTally, StorageError> {
        let mut storage = self
            .storage
            .lock()
            .map_err(|_| StorageError::LockPoisoned)?;
        storage.reconcile_page(&self.plan.user_id, candidates, Utc::now())
    }

    fn progress(&self, page: u32, message: String) -> CrawlProgress {
        CrawlProgress {
            page,
            pages_done: self.pages_done,
            tally: self.tally,
            message,
        }
    }

    fn publish(&self, event: CrawlEvent) {
        // The observer may have gone away; the crawl carries on regardless
        let _ = self.events.send(event);
    }
}
