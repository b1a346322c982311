//! Progress-callback trait for per-file extraction events.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as a batch is processed. Files are handled strictly one after
//! another, so events for different files never interleave.
//!
//! # Example
//!
//! ```rust
//! use bloodcount::{ExtractionProgressCallback, ExtractionConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl ExtractionProgressCallback for CountingCallback {
//!     fn on_file_succeeded(&self, file_name: &str, text_len: usize) {
//!         self.done.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{file_name}: {text_len} chars");
//!     }
//! }
//!
//! let config = ExtractionConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { done: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the extractor as it processes each file of a batch.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Implementations must be `Send + Sync` because the
/// blocking work runs on tokio's blocking pool.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called once before the first file.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when a file is about to be classified and processed.
    ///
    /// `index` is 1-based.
    fn on_file_start(&self, index: usize, total_files: usize, file_name: &str) {
        let _ = (index, total_files, file_name);
    }

    /// Called when the OCR fallback starts for a PDF.
    fn on_ocr_fallback(&self, file_name: &str, pages: usize) {
        let _ = (file_name, pages);
    }

    /// Called when a file produced text.
    fn on_file_succeeded(&self, file_name: &str, text_len: usize) {
        let _ = (file_name, text_len);
    }

    /// Called when a file was skipped (unsupported extension).
    fn on_file_skipped(&self, file_name: &str, reason: &str) {
        let _ = (file_name, reason);
    }

    /// Called when a file failed; the batch continues.
    fn on_file_failed(&self, file_name: &str, error: &str) {
        let _ = (file_name, error);
    }

    /// Called once after every file has been attempted.
    fn on_batch_complete(&self, total_files: usize, succeeded: usize) {
        let _ = (total_files, succeeded);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::ExtractionConfig`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;
