//! Shared test utilities for sopn integration tests.
//!
//! This module provides:
//! - `TestHarness` for an isolated database, storage directory and pipeline
//! - Builders for nomination statement PDFs and ballot rows

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
