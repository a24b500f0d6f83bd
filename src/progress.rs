//! Per-page progress events for document conversion.
//!
//! Attach an `Arc<dyn ConversionProgressCallback>` with
//! [`crate::config::LayoutConfigBuilder::progress_callback`]. Pages are
//! processed on a blocking thread pool, so events for different pages can
//! arrive concurrently and out of order.
//!
//! ```rust
//! use layout2md::{ConversionProgressCallback, LayoutConfig, PageSummary};
//! use std::sync::Arc;
//!
//! struct Log;
//!
//! impl ConversionProgressCallback for Log {
//!     fn on_page_complete(&self, summary: &PageSummary) {
//!         eprintln!("page {} → {} blocks", summary.page_num, summary.blocks);
//!     }
//! }
//!
//! let config = LayoutConfig::builder()
//!     .progress_callback(Arc::new(Log))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// What a finished page produced, reported to [`ConversionProgressCallback::on_page_complete`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageSummary {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Number of pages selected for conversion.
    pub total_pages: usize,
    /// Layout blocks found on the page.
    pub blocks: usize,
    /// Image crops extracted from the page.
    pub images: usize,
    /// Byte length of the page's Markdown.
    pub markdown_len: usize,
}

/// Receives events as the pipeline processes each page.
///
/// All methods default to no-ops.
pub trait ConversionProgressCallback: Send + Sync {
    /// Called once, after rasterisation, with the number of pages to process.
    fn on_conversion_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called before a page's annotated HTML is parsed.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page has been converted.
    fn on_page_complete(&self, summary: &PageSummary) {
        let _ = summary;
    }

    /// Called when a page fails; the rest of the document continues.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after all pages have been attempted.
    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let _ = (total_pages, success_count);
    }
}

/// Callback that ignores every event.
pub struct NoopProgressCallback;

impl ConversionProgressCallback for NoopProgressCallback {}

/// Type stored in [`crate::config::LayoutConfig`].
pub type ProgressCallback = Arc<dyn ConversionProgressCallback>;
