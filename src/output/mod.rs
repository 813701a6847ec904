//! Output module for read-only views over the ledger
//!
//! This module handles:
//! - Summary statistics (counts, rating histogram, last change)
//! - The export projection report renderers consume
//! - Printing a summary to the terminal

pub mod projection;
pub mod stats;

pub use projection::{get_export_projection, ExportProjection};
pub use stats::{get_summary, print_summary, LedgerSummary};
