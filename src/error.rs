//! Error types for the layout2md library.
//!
//! Three error types match the three scopes a failure can have:
//!
//! * [`LayoutError`] — **Fatal**: the document cannot be processed at all
//!   (input file missing, not a PDF or image, pdfium unavailable, output
//!   directory not writable). Returned as `Err(LayoutError)` from the
//!   document-level entry points.
//!
//! * [`PageError`] — **Non-fatal**: one page of a multi-page document failed
//!   to render or process. Stored inside [`crate::output::PageOutput`]; the
//!   other pages are still converted.
//!
//! * [`BlockError`] — **Local**: one layout block had a malformed bbox, a crop
//!   that fell outside the bitmap, or Markdown that could not be produced.
//!   These are recovered on the spot (default box, skipped crop, empty
//!   Markdown) and only ever logged.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the layout2md library.
#[derive(Debug, Error)]
pub enum LayoutError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Input file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file is neither a PDF nor a raster image format we can decode.
    #[error("Unsupported input '{path}': not a PDF or a known image format (first bytes: {magic:?})")]
    UnsupportedInput { path: PathBuf, magic: [u8; 4] },

    /// A raster image input could not be decoded.
    #[error("Failed to load image '{path}': {detail}")]
    ImageLoadFailed { path: PathBuf, detail: String },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// Selected page numbers exceed the actual page count.
    #[error("Page {page} is out of range (document has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium, place the library in the working\n\
directory, or install it system-wide.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Annotation errors ─────────────────────────────────────────────────
    /// The annotated HTML document itself could not be read.
    #[error("Failed to parse annotated HTML: {0}")]
    HtmlParse(String),

    /// The caller supplied a different number of HTML pages than were rendered.
    #[error("Got {html_pages} annotated HTML pages for {rendered_pages} rendered pages")]
    PageCountMismatch {
        html_pages: usize,
        rendered_pages: usize,
    },

    /// Every page failed; output would be empty.
    #[error("All {total} pages failed.\nFirst error: {first_error}")]
    AllPagesFailed { total: usize, first_error: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// An output bitmap could not be encoded.
    #[error("Failed to encode image '{name}': {detail}")]
    ImageEncodeFailed { name: String, detail: String },

    /// Could not create or write an output artifact.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single page of a multi-page conversion.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("Page {page}: rasterisation failed: {detail}")]
    RenderFailed { page: usize, detail: String },

    /// The annotated HTML for this page could not be processed.
    #[error("Page {page}: processing failed: {detail}")]
    ProcessFailed { page: usize, detail: String },
}

/// A recovered failure local to one layout block.
///
/// Never returned from public functions; constructed so that the log line
/// carries a consistent message.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BlockError {
    /// The bbox attribute was missing, not numeric, or not four values.
    #[error("malformed bbox {raw:?}, falling back to [0, 0, 1, 1]")]
    MalformedBbox { raw: Option<String> },

    /// The block's bbox does not describe a region inside the bitmap.
    #[error("block {index}: cannot crop {bbox:?} from a {width}x{height} bitmap")]
    CropFailed {
        index: usize,
        bbox: [u32; 4],
        width: u32,
        height: u32,
    },

    /// HTML to Markdown conversion failed.
    #[error("markdown conversion failed: {0}")]
    MarkdownConversion(String),
}
