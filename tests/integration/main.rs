//! Integration tests for Reading-Ledger
//!
//! These tests stand up wiremock servers in place of the remote site and run
//! complete crawls into a temporary database.

mod crawl_tests;
mod support;
