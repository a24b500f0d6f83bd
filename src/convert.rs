//! Page- and document-level conversion entry points.
//!
//! [`process_page`] is the whole per-page pipeline and needs nothing but an
//! HTML string and a bitmap. [`convert`] adds rasterisation: it renders the
//! selected pages of a PDF or image file, pairs the k-th selected page with
//! the k-th annotated HTML page, and processes pages concurrently.

use crate::config::LayoutConfig;
use crate::error::{LayoutError, PageError};
use crate::html::AnnotatedDocument;
use crate::output::{ConversionStats, DocumentOutput, PageOutput};
use crate::pipeline::images::extract_images;
use crate::pipeline::layout::{extract_layout, LayoutBlock};
use crate::pipeline::markdown::html_to_markdown;
use crate::pipeline::overlay::{draw_layout, OverlayConfig};
use crate::pipeline::render::{load_file_async, FileRasterizer, Rasterizer};
use crate::pipeline::rewrite::{rewrite_html, RewriteOptions};
use crate::progress::PageSummary;
use futures::stream::{self, StreamExt};
use image::DynamicImage;
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

static OVERLAY_CONFIG: Lazy<OverlayConfig> = Lazy::new(OverlayConfig::with_system_font);

/// Layout blocks of one annotated HTML page, in the pixel space of `image`.
pub fn parse_layout(
    html: &str,
    image: &DynamicImage,
    bbox_scale: u32,
) -> Result<Vec<LayoutBlock>, LayoutError> {
    let doc = AnnotatedDocument::parse(html)?;
    Ok(extract_layout(&doc, image.width(), image.height(), bbox_scale))
}

/// Run the full pipeline on one page.
///
/// The returned page is numbered 1; [`convert`] numbers pages itself.
///
/// # Errors
/// Only [`LayoutError::HtmlParse`]: everything below document level
/// (bad boxes, failed crops, unconvertible Markdown) is recovered and logged.
pub fn process_page(
    html: &str,
    image: &DynamicImage,
    config: &LayoutConfig,
) -> Result<PageOutput, LayoutError> {
    process_numbered_page(1, html, image, config)
}

fn process_numbered_page(
    page_num: usize,
    html: &str,
    image: &DynamicImage,
    config: &LayoutConfig,
) -> Result<PageOutput, LayoutError> {
    let start = Instant::now();
    let doc = AnnotatedDocument::parse(html)?;

    let layout = extract_layout(&doc, image.width(), image.height(), config.bbox_scale);
    let clean_html = rewrite_html(
        &doc,
        RewriteOptions {
            include_headers_footers: config.include_headers_footers,
            include_images: config.include_images,
        },
    );
    let markdown = html_to_markdown(&clean_html);
    let images = extract_images(&doc, &layout, image);
    let overlay = config
        .draw_overlay
        .then(|| draw_layout(image, &layout, &OVERLAY_CONFIG));

    info!(
        "Page {}: {} blocks, {} images, {} chars markdown in {}ms",
        page_num,
        layout.len(),
        images.len(),
        markdown.len(),
        start.elapsed().as_millis()
    );

    Ok(PageOutput {
        page_num,
        html: clean_html,
        markdown,
        layout,
        images,
        overlay,
        error: None,
    })
}

/// Convert a PDF or image file whose pages have been annotated.
///
/// `html_pages[k]` is the annotated HTML of the k-th page selected by
/// `config.pages`.
///
/// # Returns
/// `Ok(DocumentOutput)` even if some pages failed (check
/// `output.stats.failed_pages`).
///
/// # Errors
/// Input errors (missing file, unsupported format, PDF that cannot be
/// opened), [`LayoutError::PageCountMismatch`] when `html_pages` does not
/// match the selection, and [`LayoutError::AllPagesFailed`].
pub async fn convert(
    input_path: impl AsRef<Path>,
    html_pages: Vec<String>,
    config: &LayoutConfig,
) -> Result<DocumentOutput, LayoutError> {
    convert_with_rasterizer(
        FileRasterizer::from_config(config),
        input_path,
        html_pages,
        config,
    )
    .await
}

/// [`convert`] with a caller-supplied rasteriser.
pub async fn convert_with_rasterizer<R>(
    rasterizer: R,
    input_path: impl AsRef<Path>,
    html_pages: Vec<String>,
    config: &LayoutConfig,
) -> Result<DocumentOutput, LayoutError>
where
    R: Rasterizer + Clone + 'static,
{
    let total_start = Instant::now();
    let path = input_path.as_ref().to_path_buf();
    info!("Starting conversion: {}", path.display());

    // ── Step 1: Select pages ─────────────────────────────────────────────
    let total_pages = {
        let rasterizer = rasterizer.clone();
        let path = path.clone();
        tokio::task::spawn_blocking(move || rasterizer.page_count(&path))
            .await
            .map_err(|e| LayoutError::Internal(format!("Page count task panicked: {}", e)))??
    };
    let page_indices = config.pages.to_indices(total_pages);
    if page_indices.is_empty() {
        return Err(LayoutError::PageOutOfRange {
            page: 0,
            total: total_pages,
        });
    }
    if html_pages.len() != page_indices.len() {
        return Err(LayoutError::PageCountMismatch {
            html_pages: html_pages.len(),
            rendered_pages: page_indices.len(),
        });
    }
    debug!("Selected {} of {} pages", page_indices.len(), total_pages);

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_start(page_indices.len());
    }

    // ── Step 2: Rasterise ────────────────────────────────────────────────
    let render_start = Instant::now();
    let rendered = load_file_async(rasterizer, path.clone(), page_indices.clone()).await?;
    info!(
        "Rendered {}/{} pages in {}ms",
        rendered.len(),
        page_indices.len(),
        render_start.elapsed().as_millis()
    );
    let mut bitmaps: HashMap<usize, DynamicImage> = rendered
        .into_iter()
        .map(|p| (p.page_index, p.image))
        .collect();

    // ── Step 3: Process pages ────────────────────────────────────────────
    let jobs: Vec<(usize, String, Option<DynamicImage>)> = page_indices
        .iter()
        .zip(html_pages)
        .map(|(&idx, html)| (idx + 1, html, bitmaps.remove(&idx)))
        .collect();
    let pages = process_concurrent(jobs, config).await;

    // ── Step 4: Assemble ─────────────────────────────────────────────────
    let markdown = assemble_document(&pages, config);

    let processed = pages.iter().filter(|p| p.error.is_none()).count();
    let failed = pages.len() - processed;
    if processed == 0 {
        let first_error = pages
            .iter()
            .find_map(|p| p.error.as_ref())
            .map(|e| format!("{}", e))
            .unwrap_or_else(|| "Unknown error".to_string());
        return Err(LayoutError::AllPagesFailed {
            total: pages.len(),
            first_error,
        });
    }

    let stats = ConversionStats {
        total_pages: page_indices.len(),
        processed_pages: processed,
        failed_pages: failed,
        total_blocks: pages.iter().map(|p| p.layout.len()).sum(),
        total_images: pages.iter().map(|p| p.images.len()).sum(),
        duration_ms: total_start.elapsed().as_millis() as u64,
    };

    info!(
        "Conversion complete: {}/{} pages, {} blocks, {} images, {}ms",
        processed, stats.total_pages, stats.total_blocks, stats.total_images, stats.duration_ms
    );

    if let Some(ref cb) = config.progress_callback {
        cb.on_conversion_complete(page_indices.len(), processed);
    }

    Ok(DocumentOutput {
        pages,
        markdown,
        stats,
    })
}

/// Synchronous wrapper around [`convert`].
///
/// Creates a temporary tokio runtime internally.
pub fn convert_sync(
    input_path: impl AsRef<Path>,
    html_pages: Vec<String>,
    config: &LayoutConfig,
) -> Result<DocumentOutput, LayoutError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| LayoutError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(convert(input_path, html_pages, config))
}

/// Convert and save every artefact into `output_dir`, named after the
/// input file's stem (see [`DocumentOutput::save`]).
pub async fn convert_to_dir(
    input_path: impl AsRef<Path>,
    html_pages: Vec<String>,
    output_dir: impl AsRef<Path>,
    config: &LayoutConfig,
) -> Result<DocumentOutput, LayoutError> {
    let input_path = input_path.as_ref();
    let stem = input_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string());
    let output = convert(input_path, html_pages, config).await?;

    let dir: PathBuf = output_dir.as_ref().to_path_buf();
    tokio::task::spawn_blocking(move || output.save(&dir, &stem).map(|_| output))
        .await
        .map_err(|e| LayoutError::Internal(format!("Save task panicked: {}", e)))?
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// Process pages on the blocking pool, at most `config.concurrency` at a
/// time. Results come back in page order.
async fn process_concurrent(
    jobs: Vec<(usize, String, Option<DynamicImage>)>,
    config: &LayoutConfig,
) -> Vec<PageOutput> {
    let total_pages = jobs.len();
    stream::iter(jobs.into_iter().map(|(page_num, html, image)| {
        let config = config.clone();
        async move {
            if let Some(ref cb) = config.progress_callback {
                cb.on_page_start(page_num, total_pages);
            }

            let result = match image {
                None => Err(PageError::RenderFailed {
                    page: page_num,
                    detail: "page was not rendered".to_string(),
                }),
                Some(image) => {
                    let cfg = config.clone();
                    tokio::task::spawn_blocking(move || {
                        process_numbered_page(page_num, &html, &image, &cfg)
                    })
                    .await
                    .map_err(|e| format!("task panicked: {}", e))
                    .and_then(|r| r.map_err(|e| e.to_string()))
                    .map_err(|detail| PageError::ProcessFailed {
                        page: page_num,
                        detail,
                    })
                }
            };

            let page = match result {
                Ok(page) => page,
                Err(e) => {
                    warn!("{}", e);
                    PageOutput::failed(page_num, e)
                }
            };

            if let Some(ref cb) = config.progress_callback {
                match &page.error {
                    None => cb.on_page_complete(&PageSummary {
                        page_num,
                        total_pages,
                        blocks: page.layout.len(),
                        images: page.images.len(),
                        markdown_len: page.markdown.len(),
                    }),
                    Some(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                }
            }
            page
        }
    }))
    .buffered(config.concurrency.max(1))
    .collect()
    .await
}

/// Join the Markdown of the successful pages with the configured separator.
fn assemble_document(pages: &[PageOutput], config: &LayoutConfig) -> String {
    let mut parts: Vec<String> = Vec::new();
    let successful_pages = pages.iter().filter(|p| p.error.is_none());

    for (i, page) in successful_pages.enumerate() {
        if i > 0 {
            parts.push(config.page_separator.render(page.page_num));
        }
        parts.push(page.markdown.clone());
    }

    parts.join("")
}
