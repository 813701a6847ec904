//! State module for tracking a crawl's lifecycle
//!
//! # Components
//!
//! - `CrawlStatus`: where a crawl is in its lifecycle (running, stopping, finished)
//! - `CrawlOutcome` / `AbortReason`: the terminal result of a finished crawl
//! - `CrawlLifecycle`: the shared state machine instance a crawl handle and its
//!   worker both reference; it carries the stop flag and the current status

mod crawl_status;
mod lifecycle;

pub use crawl_status::{AbortReason, CrawlOutcome, CrawlStatus};
pub use lifecycle::CrawlLifecycle;
