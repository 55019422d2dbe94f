//! Progress-callback trait for batch transcription events.
//!
//! Inject an [`Arc<dyn TranscriptionProgress>`] via
//! [`crate::config::VlmConfigBuilder::progress_callback`] (VLM batches) or
//! pass one to [`crate::transcribe::transcribe_batch`] directly.
//!
//! # Example
//!
//! ```rust
//! use edgequake_page2md::{TranscriptionProgress, VlmConfig};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl TranscriptionProgress for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page_num, total_pages, markdown_len);
//!     }
//! }
//!
//! let config = VlmConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { completed: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the batch entry points as each page is transcribed.
///
/// Pages run concurrently, so `on_page_*` may be called from several tasks
/// at once. All methods default to no-ops.
pub trait TranscriptionProgress: Send + Sync {
    /// Called once before any page starts.
    fn on_batch_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page is handed to the recogniser. `page_num` is
    /// 1-indexed.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page is transcribed successfully.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
        let _ = (page_num, total_pages, markdown_len);
    }

    /// Called when a page fails.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_batch_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl TranscriptionProgress for NoopProgressCallback {}

pub type ProgressCallback = Arc<dyn TranscriptionProgress>;
