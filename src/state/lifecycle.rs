use crate::state::{CrawlOutcome, CrawlStatus};
use crate::LedgerError;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Shared lifecycle of one crawl
///
/// The worker owns the crawl loop; the handle holds a clone of this instance
/// to request a stop and to observe status changes. The stop flag is only
/// polled by the worker at page boundaries.
#[derive(Debug, Clone)]
pub struct CrawlLifecycle {
    status: std::sync::Arc<watch::Sender<CrawlStatus>>,
    stop: CancellationToken,
}

impl CrawlLifecycle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(CrawlStatus::Running);
        Self {
            status: std::sync::Arc::new(tx),
            stop: CancellationToken::new(),
        }
    }

    /// Current status
    pub fn status(&self) -> CrawlStatus {
        *self.status.borrow()
    }

    /// Receiver that is notified on every status change
    pub fn subscribe(&self) -> watch::Receiver<CrawlStatus> {
        self.status.subscribe()
    }

    /// Requests a cooperative stop
    ///
    /// Returns false if the crawl had already finished.
    pub fn request_stop(&self) -> bool {
        match self.transition(CrawlStatus::Stopping) {
            Ok(_) => {
                self.stop.cancel();
                true
            }
            Err(_) => false,
        }
    }

    /// Whether a stop has been requested
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_cancelled()
    }

    /// Moves the crawl into its terminal state
    pub fn finish(&self, outcome: CrawlOutcome) -> Result<CrawlStatus, LedgerError> {
        self.transition(CrawlStatus::Finished(outcome))
    }

    fn transition(&self, to: CrawlStatus) -> Result<CrawlStatus, LedgerError> {
        let mut result = Ok(to);
        self.status.send_if_modified(|current| match current.transition(to) {
            Ok(next) => {
                let changed = *current != next;
                *current = next;
                changed
            }
            Err(e) => {
                result = Err(e);
                false
            }
        });
        result
    }
}

impl Default for CrawlLifecycle {
    fn default() -> Self {
        Self::new()
    }
}
