//! Pipeline stages for layout-annotated HTML.
//!
//! Each submodule implements one transformation step; all per-page stages
//! are synchronous and read the same immutable inputs.
//!
//! ## Data Flow
//!
//! ```text
//!                              ┌──▶ rewrite ──▶ markdown
//! annotated HTML ──▶ layout ───┼──▶ images    (crops keyed by content hash)
//!   + bitmap          (bbox)   └──▶ overlay   (debug drawing)
//! ```
//!
//! 1. [`bbox`]     — parse and rescale `data-bbox` values into pixel space
//! 2. [`layout`]   — one [`layout::LayoutBlock`] per top-level element
//! 3. [`rewrite`]  — label filtering, `<img>` naming, bare-text wrapping
//! 4. [`markdown`] — HTML → Markdown with math/table/link rules
//! 5. [`images`]   — crop figures under the names the rewriter assigned
//! 6. [`overlay`]  — draw boxes and labels on a copy of the page
//!
//! Getting the bitmap in the first place is the job of [`input`] (PDF or
//! image?) and [`render`] (pdfium / `image`); [`encode`] turns output
//! bitmaps into file bytes.

pub mod bbox;
pub mod encode;
pub mod images;
pub mod input;
pub mod layout;
pub mod markdown;
pub mod overlay;
pub mod render;
pub mod rewrite;
