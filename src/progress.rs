//! Progress-callback trait for per-page extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as the engine moves each page to its terminal state. The CLI uses
//! this to drive its progress bar.
//!
//! # Example
//!
//! ```rust
//! use fieldguide_layout::{ExtractionConfig, ExtractionProgressCallback, PageOutcome};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, index: usize, total: usize, outcome: &PageOutcome) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {} -> {:?}", index + 1, total, outcome.page, outcome.status);
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{PageOutcome, RunSummary};
use std::sync::Arc;

/// Called by the engine as it processes each page.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Pages are processed sequentially, so calls never
/// overlap within one run, but the trait is `Send + Sync` so a callback can
/// be shared with other tasks.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first page.
    fn on_run_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is looked at.
    ///
    /// # Arguments
    /// * `index`: 0-based position in the run
    /// * `total`: number of pages in the run
    /// * `page`:  page identifier (file name)
    fn on_page_start(&self, index: usize, total: usize, page: &str) {
        let _ = (index, total, page);
    }

    /// Called when a page reaches Succeeded, Skipped or Failed.
    fn on_page_complete(&self, index: usize, total: usize, outcome: &PageOutcome) {
        let _ = (index, total, outcome);
    }

    /// Called once after every page has been attempted.
    fn on_run_complete(&self, summary: &RunSummary) {
        let _ = summary;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
