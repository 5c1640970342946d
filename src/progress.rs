//! Progress events for per-page policy extraction.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExpenseConfigBuilder::progress_callback`] to observe a
//! policy document as its pages are processed. The host decides where events
//! go (a terminal progress bar, a job record, a websocket).
//!
//! # Example
//!
//! ```rust
//! use expensepal::{ExpenseConfig, ExtractionProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct RuleCounter {
//!     found: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for RuleCounter {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, policies_found: usize) {
//!         self.found.fetch_add(policies_found, Ordering::SeqCst);
//!         eprintln!("Page {}/{}: {} rules", page_num, total_pages, policies_found);
//!     }
//! }
//!
//! let counter = Arc::new(RuleCounter { found: AtomicUsize::new(0) });
//!
//! let config = ExpenseConfig::builder()
//!     .progress_callback(counter as Arc<dyn ExtractionProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the page processor as it works through a policy document.
///
/// `on_page_start` fires from concurrently running page tasks; the
/// completion and error events fire from the single task that merges
/// results, in completion order. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once after rendering, before any page is sent to the reasoner.
    fn on_extraction_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the reasoner request for a page. `page_num` is 1-based.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page yields a policy list (possibly empty).
    fn on_page_complete(&self, page_num: usize, total_pages: usize, policies_found: usize) {
        let _ = (page_num, total_pages, policies_found);
    }

    /// Called when a page fails; the page contributes no rules.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    ///
    /// `policies_found` counts rules before deduplication.
    fn on_extraction_complete(&self, total_pages: usize, success_count: usize, policies_found: usize) {
        let _ = (total_pages, success_count, policies_found);
    }
}

/// The default when no callback is configured.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::ExpenseConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
