//! Page rasterisation: PDF pages via pdfium, raster images via `image`.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with global state and image decoding is
//! CPU-bound; neither belongs on a Tokio worker thread. [`load_file_async`]
//! moves the whole load onto the blocking pool.
//!
//! ## Resolution
//!
//! PDF pages are rendered at `max(image_dpi, dpi needed for the short side to
//! reach min_pdf_image_dim)`, so small pages (receipts, slides) still come
//! out large enough for layout boxes to be meaningful. Raster inputs below
//! `min_image_dim` on either side are upscaled with Lanczos3.

use crate::config::LayoutConfig;
use crate::error::LayoutError;
use crate::pipeline::input::{detect_input, InputKind};
use image::imageops::FilterType;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Environment variable naming the pdfium library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// One rendered page.
#[derive(Debug, Clone)]
pub struct PageImage {
    /// 0-based page index within the source document.
    pub page_index: usize,
    pub image: DynamicImage,
}

impl PageImage {
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// Turns a document on disk into page bitmaps.
pub trait Rasterizer: Send + Sync {
    /// Number of pages in the document at `path`.
    fn page_count(&self, path: &Path) -> Result<usize, LayoutError>;

    /// Render the given 0-based pages in order. Pages that fail are logged
    /// and left out of the result.
    fn render(&self, path: &Path, page_indices: &[usize]) -> Result<Vec<PageImage>, LayoutError>;
}

/// Rasteriser for PDF and image files on the local filesystem.
#[derive(Debug, Clone)]
pub struct FileRasterizer {
    pub image_dpi: u32,
    pub min_pdf_image_dim: u32,
    pub min_image_dim: u32,
    pub password: Option<String>,
}

impl Default for FileRasterizer {
    fn default() -> Self {
        Self::from_config(&LayoutConfig::default())
    }
}

impl FileRasterizer {
    pub fn from_config(config: &LayoutConfig) -> Self {
        Self {
            image_dpi: config.image_dpi,
            min_pdf_image_dim: config.min_pdf_image_dim,
            min_image_dim: config.min_image_dim,
            password: config.password.clone(),
        }
    }
}

impl Rasterizer for FileRasterizer {
    fn page_count(&self, path: &Path) -> Result<usize, LayoutError> {
        match detect_input(path)?.kind {
            InputKind::Image(_) => Ok(1),
            InputKind::Pdf => {
                let pdfium = bind_pdfium()?;
                let document = open_pdf(&pdfium, path, self.password.as_deref())?;
                Ok(document.pages().len() as usize)
            }
        }
    }

    fn render(&self, path: &Path, page_indices: &[usize]) -> Result<Vec<PageImage>, LayoutError> {
        match detect_input(path)?.kind {
            InputKind::Image(_) => {
                if !page_indices.contains(&0) {
                    return Ok(Vec::new());
                }
                Ok(vec![PageImage {
                    page_index: 0,
                    image: load_image(path, self.min_image_dim)?,
                }])
            }
            InputKind::Pdf => render_pdf_pages(
                path,
                page_indices,
                self.image_dpi,
                self.min_pdf_image_dim,
                self.password.as_deref(),
            ),
        }
    }
}

/// Run [`Rasterizer::render`] on the blocking thread pool.
pub async fn load_file_async<R>(
    rasterizer: R,
    path: PathBuf,
    page_indices: Vec<usize>,
) -> Result<Vec<PageImage>, LayoutError>
where
    R: Rasterizer + 'static,
{
    tokio::task::spawn_blocking(move || rasterizer.render(&path, &page_indices))
        .await
        .map_err(|e| LayoutError::Internal(format!("Render task panicked: {}", e)))?
}

/// Decode a raster image as RGB, upscaling it if either side is below `min_dim`.
pub fn load_image(path: &Path, min_dim: u32) -> Result<DynamicImage, LayoutError> {
    let image = image::open(path).map_err(|e| LayoutError::ImageLoadFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    let image = DynamicImage::ImageRgb8(image.to_rgb8());
    Ok(upscale_to_min(image, min_dim))
}

/// Scale so the short side reaches `min_dim`; no-op for large enough images.
pub fn upscale_to_min(image: DynamicImage, min_dim: u32) -> DynamicImage {
    let (w, h) = (image.width(), image.height());
    if w == 0 || h == 0 || (w >= min_dim && h >= min_dim) {
        return image;
    }
    let scale = min_dim as f64 / w.min(h) as f64;
    let (nw, nh) = ((w as f64 * scale) as u32, (h as f64 * scale) as u32);
    debug!("Upscaling {}x{} → {}x{}", w, h, nw, nh);
    image.resize_exact(nw, nh, FilterType::Lanczos3)
}

/// DPI at which a page of `width_pt` × `height_pt` points is rendered.
pub fn page_render_dpi(width_pt: f32, height_pt: f32, dpi: u32, min_dim: u32) -> f32 {
    let short = width_pt.min(height_pt);
    if short <= 0.0 {
        return dpi as f32;
    }
    (min_dim as f32 / short * 72.0).max(dpi as f32)
}

/// Render the given 0-based pages of a PDF as RGB bitmaps.
pub fn render_pdf_pages(
    pdf_path: &Path,
    page_indices: &[usize],
    dpi: u32,
    min_dim: u32,
    password: Option<&str>,
) -> Result<Vec<PageImage>, LayoutError> {
    let pdfium = bind_pdfium()?;
    let document = open_pdf(&pdfium, pdf_path, password)?;

    let pages = document.pages();
    let total_pages = pages.len() as usize;
    info!("PDF loaded: {} pages", total_pages);

    let mut results = Vec::with_capacity(page_indices.len());
    for &idx in page_indices {
        if idx >= total_pages {
            warn!(
                "Skipping page {} (out of range, total={})",
                idx + 1,
                total_pages
            );
            continue;
        }

        let rendered = pages
            .get(idx as u16)
            .and_then(|page| {
                let scale_dpi =
                    page_render_dpi(page.width().value, page.height().value, dpi, min_dim);
                let render_config = PdfRenderConfig::new()
                    .scale_page_by_factor(scale_dpi / 72.0)
                    .render_form_data(true);
                page.render_with_config(&render_config)
                    .map(|bitmap| DynamicImage::ImageRgb8(bitmap.as_image().to_rgb8()))
            });

        match rendered {
            Ok(image) => {
                debug!(
                    "Rendered page {} → {}x{} px",
                    idx + 1,
                    image.width(),
                    image.height()
                );
                results.push(PageImage {
                    page_index: idx,
                    image,
                });
            }
            Err(e) => {
                let err = LayoutError::RasterisationFailed {
                    page: idx + 1,
                    detail: format!("{:?}", e),
                };
                warn!("Skipping page: {}", err);
            }
        }
    }

    Ok(results)
}

/// Bind pdfium from `PDFIUM_LIB_PATH`, the working directory, or the system.
pub fn bind_pdfium() -> Result<Pdfium, LayoutError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(p) if !p.is_empty() => {
            let path = PathBuf::from(&p);
            let lib = if path.is_dir() {
                Pdfium::pdfium_platform_library_name_at_path(&path)
            } else {
                path
            };
            debug!("Binding pdfium from {}", lib.display());
            Pdfium::bind_to_library(&lib)
        }
        _ => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            .or_else(|_| Pdfium::bind_to_system_library()),
    }
    .map_err(|e| LayoutError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}

fn open_pdf<'a>(
    pdfium: &'a Pdfium,
    pdf_path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, LayoutError> {
    pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{:?}", e);
        if err_str.contains("Password") || err_str.contains("password") {
            if password.is_some() {
                LayoutError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                LayoutError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            LayoutError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })
}
