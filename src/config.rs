//! Configuration types for layout conversion.
//!
//! All conversion behaviour is controlled through [`LayoutConfig`], built via
//! its [`LayoutConfigBuilder`]. The per-page components only read the few
//! fields they need (`bbox_scale` and the two label filters); the remaining
//! knobs drive rasterisation and document assembly.

use crate::error::LayoutError;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Side length of the logical grid input bboxes are expressed in.
pub const DEFAULT_BBOX_SCALE: u32 = 1024;

/// Configuration for a layout conversion.
///
/// # Example
/// ```rust
/// use layout2md::LayoutConfig;
///
/// let config = LayoutConfig::builder()
///     .bbox_scale(1000)
///     .include_headers_footers(true)
///     .build()
///     .unwrap();
/// assert_eq!(config.bbox_scale, 1000);
/// ```
#[derive(Clone)]
pub struct LayoutConfig {
    /// Side of the logical coordinate grid (`BBOX_SCALE`). Default: 1024.
    ///
    /// Raw bbox coordinates are multiplied by `bitmap_width / bbox_scale`
    /// (x axis) and `bitmap_height / bbox_scale` (y axis).
    pub bbox_scale: u32,

    /// Keep `Page-Header` and `Page-Footer` blocks in HTML and Markdown. Default: false.
    pub include_headers_footers: bool,

    /// Keep `Image` and `Figure` blocks in HTML and Markdown. Default: true.
    ///
    /// Image crops are extracted regardless of this flag.
    pub include_images: bool,

    /// Minimum rendering DPI for PDF pages. Range: 72–600. Default: 192.
    pub image_dpi: u32,

    /// Minimum length of the short side of a rendered PDF page in pixels. Default: 1024.
    ///
    /// Small pages are rendered at a higher effective DPI so the bitmap
    /// reaches this size.
    pub min_pdf_image_dim: u32,

    /// Minimum length of both sides of a raster image input. Default: 1536.
    ///
    /// Smaller inputs are upscaled (Lanczos3), preserving aspect ratio.
    pub min_image_dim: u32,

    /// Page selection. Default: all pages.
    pub pages: PageSelection,

    /// Page separator in assembled Markdown. Default: none.
    pub page_separator: PageSeparator,

    /// Render a debug overlay for each page. Default: false.
    pub draw_overlay: bool,

    /// Number of pages processed in parallel. Default: available parallelism.
    pub concurrency: usize,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// Optional progress callback invoked per page.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            bbox_scale: DEFAULT_BBOX_SCALE,
            include_headers_footers: false,
            include_images: true,
            image_dpi: 192,
            min_pdf_image_dim: 1024,
            min_image_dim: 1536,
            pages: PageSelection::default(),
            page_separator: PageSeparator::default(),
            draw_overlay: false,
            concurrency: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(4),
            password: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for LayoutConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LayoutConfig")
            .field("bbox_scale", &self.bbox_scale)
            .field("include_headers_footers", &self.include_headers_footers)
            .field("include_images", &self.include_images)
            .field("image_dpi", &self.image_dpi)
            .field("min_pdf_image_dim", &self.min_pdf_image_dim)
            .field("min_image_dim", &self.min_image_dim)
            .field("pages", &self.pages)
            .field("page_separator", &self.page_separator)
            .field("draw_overlay", &self.draw_overlay)
            .field("concurrency", &self.concurrency)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn ConversionProgressCallback>"),
            )
            .finish()
    }
}

impl LayoutConfig {
    /// Create a new builder for `LayoutConfig`.
    pub fn builder() -> LayoutConfigBuilder {
        LayoutConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`LayoutConfig`].
#[derive(Debug)]
pub struct LayoutConfigBuilder {
    config: LayoutConfig,
}

impl LayoutConfigBuilder {
    pub fn bbox_scale(mut self, scale: u32) -> Self {
        self.config.bbox_scale = scale;
        self
    }

    pub fn include_headers_footers(mut self, v: bool) -> Self {
        self.config.include_headers_footers = v;
        self
    }

    pub fn include_images(mut self, v: bool) -> Self {
        self.config.include_images = v;
        self
    }

    pub fn image_dpi(mut self, dpi: u32) -> Self {
        self.config.image_dpi = dpi.clamp(72, 600);
        self
    }

    pub fn min_pdf_image_dim(mut self, px: u32) -> Self {
        self.config.min_pdf_image_dim = px;
        self
    }

    pub fn min_image_dim(mut self, px: u32) -> Self {
        self.config.min_image_dim = px;
        self
    }

    pub fn pages(mut self, selection: PageSelection) -> Self {
        self.config.pages = selection;
        self
    }

    pub fn page_separator(mut self, sep: PageSeparator) -> Self {
        self.config.page_separator = sep;
        self
    }

    pub fn draw_overlay(mut self, v: bool) -> Self {
        self.config.draw_overlay = v;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<LayoutConfig, LayoutError> {
        let c = &self.config;
        if c.bbox_scale == 0 {
            return Err(LayoutError::InvalidConfig(
                "bbox scale must be > 0".into(),
            ));
        }
        if c.image_dpi < 72 || c.image_dpi > 600 {
            return Err(LayoutError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.image_dpi
            )));
        }
        if c.concurrency == 0 {
            return Err(LayoutError::InvalidConfig(
                "Concurrency must be ≥ 1".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Specifies which pages of a PDF to convert.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSelection {
    /// Convert all pages (default).
    #[default]
    All,
    /// Convert a single page (1-indexed).
    Single(usize),
    /// Convert a contiguous range of pages (1-indexed, inclusive).
    Range(usize, usize),
    /// Convert specific pages (1-indexed, deduplicated).
    Set(Vec<usize>),
    /// Convert the union of several inclusive ranges (1-indexed). Ranges are
    /// only expanded up to the document's page count.
    Ranges(Vec<(usize, usize)>),
}

impl PageSelection {
    /// Expand the selection into a sorted, deduplicated list of 0-indexed page numbers.
    pub fn to_indices(&self, total_pages: usize) -> Vec<usize> {
        let mut indices: Vec<usize> = match self {
            PageSelection::All => (0..total_pages).collect(),
            PageSelection::Single(p) => {
                if *p >= 1 && *p <= total_pages {
                    vec![p - 1]
                } else {
                    vec![]
                }
            }
            PageSelection::Range(start, end) => {
                let s = (*start).max(1) - 1;
                let e = (*end).min(total_pages);
                (s..e).collect()
            }
            PageSelection::Set(pages) => pages
                .iter()
                .filter(|&&p| p >= 1 && p <= total_pages)
                .map(|p| p - 1)
                .collect(),
            PageSelection::Ranges(ranges) => ranges
                .iter()
                .flat_map(|&(start, end)| (start.max(1) - 1)..end.min(total_pages))
                .collect(),
        };
        indices.sort_unstable();
        indices.dedup();
        indices
    }
}

impl FromStr for PageSelection {
    type Err = LayoutError;

    /// Parse `all`, `5`, `3-15` or a comma list mixing both (`1-3,7,9-10`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || s.eq_ignore_ascii_case("all") {
            return Ok(PageSelection::All);
        }

        let invalid = |why: &str| LayoutError::InvalidConfig(format!("invalid page selection '{s}': {why}"));
        let parse_page = |part: &str| match part.trim().parse::<usize>() {
            Ok(0) => Err(invalid("pages are numbered from 1")),
            Ok(n) => Ok(n),
            Err(_) => Err(invalid("expected a page number")),
        };
        let parse_range = |part: &str| -> Result<(usize, usize), LayoutError> {
            match part.split_once('-') {
                Some((a, b)) => {
                    let (start, end) = (parse_page(a)?, parse_page(b)?);
                    if start > end {
                        return Err(invalid("range start is after its end"));
                    }
                    Ok((start, end))
                }
                None => parse_page(part).map(|n| (n, n)),
            }
        };

        let parts: Vec<&str> = s.split(',').map(str::trim).filter(|p| !p.is_empty()).collect();
        if parts.len() == 1 {
            let single = parts[0];
            return match parse_range(single)? {
                (page, _) if !single.contains('-') => Ok(PageSelection::Single(page)),
                (start, end) => Ok(PageSelection::Range(start, end)),
            };
        }

        let mut ranges = parts
            .into_iter()
            .map(parse_range)
            .collect::<Result<Vec<_>, _>>()?;
        ranges.sort_unstable();
        ranges.dedup();
        Ok(PageSelection::Ranges(ranges))
    }
}

/// How to separate pages in the assembled Markdown output.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageSeparator {
    /// No separator; pages joined with "\n\n". (default)
    #[default]
    None,
    /// Horizontal rule: "\n\n---\n\n"
    HorizontalRule,
    /// HTML comment with page number: "<!-- page N -->"
    Comment,
    /// Custom string inserted between pages.
    Custom(String),
}

impl PageSeparator {
    /// Render the separator string for the given page number (1-indexed).
    pub fn render(&self, page_num: usize) -> String {
        match self {
            PageSeparator::None => "\n\n".to_string(),
            PageSeparator::HorizontalRule => "\n\n---\n\n".to_string(),
            PageSeparator::Comment => format!("\n\n<!-- page {} -->\n\n", page_num),
            PageSeparator::Custom(s) => format!("\n\n{}\n\n", s),
        }
    }
}
