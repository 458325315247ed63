//! Progress-callback trait for page and window events.
//!
//! Inject an [`Arc<dyn PipelineProgress>`] via
//! [`crate::config::ConversionConfigBuilder::progress_callback`] or
//! [`crate::config::ExtractionConfigBuilder::progress_callback`] to receive
//! events as each page is transcribed and each window is analysed.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2rules::{ConversionConfig, PipelineProgress};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     completed: AtomicUsize,
//! }
//!
//! impl PipelineProgress for CountingCallback {
//!     fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
//!         self.completed.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} bytes)", page_num, total_pages, markdown_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { completed: AtomicUsize::new(0) });
//!
//! let config = ConversionConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgress>)
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by both pipeline stages as they make progress.
///
/// All methods have default no-op implementations so callers only override
/// what they care about.
///
/// # Thread safety
///
/// Pages (and windows, when `concurrency > 1`) are processed concurrently,
/// so the per-unit methods may be called from different tasks in any order.
/// Protect shared mutable state with `Mutex` or atomics.
pub trait PipelineProgress: Send + Sync {
    // ── Stage 1: transcription ───────────────────────────────────────────

    /// Called once, after the PDF has been opened and rendered.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the vision request is sent for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page is transcribed.
    fn on_page_complete(&self, page_num: usize, total_pages: usize, markdown_len: usize) {
        let _ = (page_num, total_pages, markdown_len);
    }

    /// Called when a page fails to render, encode, or transcribe.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: String) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after every page has been attempted.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }

    // ── Stage 2: rule extraction ─────────────────────────────────────────

    /// Called once the window plan is known.
    fn on_extraction_start(&self, total_pages: usize, total_windows: usize) {
        let _ = (total_pages, total_windows);
    }

    /// Called just before a window is sent. `window_num` is 1-indexed.
    fn on_window_start(&self, window_num: usize, total_windows: usize, start: usize, end: usize) {
        let _ = (window_num, total_windows, start, end);
    }

    /// Called when a window's rule listing parsed successfully.
    fn on_window_complete(&self, window_num: usize, total_windows: usize, rule_count: usize) {
        let _ = (window_num, total_windows, rule_count);
    }

    /// Called when a window's call failed or its output did not parse.
    fn on_window_error(&self, window_num: usize, total_windows: usize, error: String) {
        let _ = (window_num, total_windows, error);
    }

    /// Called once after every window has been attempted.
    fn on_extraction_complete(&self, total_windows: usize, success_count: usize) {
        let _ = (total_windows, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgress;

impl PipelineProgress for NoopProgress {}

/// Convenience alias matching the type stored in the configs.
pub type ProgressCallback = Arc<dyn PipelineProgress>;
