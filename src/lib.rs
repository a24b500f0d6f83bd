//! # layout2md
//!
//! Turn the layout-annotated HTML emitted by document-understanding models
//! into clean HTML, typed layout blocks, Markdown and figure crops.
//!
//! ## Input
//!
//! One HTML document per page whose `<body>` children are the page's layout
//! blocks, each carrying a label and a box on a `BBOX_SCALE`² grid:
//!
//! ```html
//! <div data-label="Section-Header" data-bbox="[62, 40, 960, 88]"><h1>Results</h1></div>
//! <div data-label="Text" data-bbox="62 100 960 300">Accuracy rose by 4%.</div>
//! <div data-label="Figure" data-bbox="[62, 320, 960, 700]"><img alt="Chart"></div>
//! ```
//!
//! plus the page bitmap the boxes refer to.
//!
//! ## Pipeline Overview
//!
//! ```text
//! annotated HTML + bitmap
//!  │
//!  ├─ 1. Layout    one block per top-level element, boxes in pixel space
//!  ├─ 2. Rewrite   drop headers/footers, name <img>s, wrap bare text
//!  ├─ 3. Markdown  math → $…$ / $$…$$, tables kept as HTML, escaping
//!  ├─ 4. Images    crop figures under the names the rewriter assigned
//!  └─ 5. Overlay   optional debug drawing of every box
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use layout2md::{process_page, LayoutConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let html = std::fs::read_to_string("page1.html")?;
//! let bitmap = image::open("page1.png")?;
//! let page = process_page(&html, &bitmap, &LayoutConfig::default())?;
//! println!("{}", page.markdown);
//! for (name, crop) in &page.images {
//!     crop.save(name)?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! For whole PDFs use [`convert`], which renders the pages with pdfium and
//! processes them concurrently.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `layout2md` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! layout2md = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod convert;
pub mod error;
pub mod html;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{LayoutConfig, LayoutConfigBuilder, PageSelection, PageSeparator, DEFAULT_BBOX_SCALE};
pub use convert::{
    convert, convert_sync, convert_to_dir, convert_with_rasterizer, parse_layout, process_page,
};
pub use error::{BlockError, LayoutError, PageError};
pub use html::AnnotatedDocument;
pub use output::{ConversionStats, DocumentOutput, PageOutput};
pub use pipeline::bbox::BBox;
pub use pipeline::images::{extract_images, image_name};
pub use pipeline::layout::{extract_layout, LayoutBlock};
pub use pipeline::markdown::html_to_markdown;
pub use pipeline::overlay::{draw_layout, OverlayConfig};
pub use pipeline::render::{FileRasterizer, PageImage, Rasterizer};
pub use pipeline::rewrite::{rewrite_html, RewriteOptions};
pub use progress::{ConversionProgressCallback, NoopProgressCallback, PageSummary, ProgressCallback};
