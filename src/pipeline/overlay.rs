//! Debug overlay: layout boxes drawn over the page bitmap.

use crate::pipeline::bbox::BBox;
use crate::pipeline::layout::LayoutBlock;
use ab_glyph::FontVec;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use tracing::{debug, info};

const BLOCK_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
const LABEL_COLOR: Rgb<u8> = Rgb([0, 0, 255]);
const ROW_COLOR: Rgb<u8> = Rgb([0, 160, 0]);

/// How the overlay is drawn.
pub struct OverlayConfig {
    /// Font for labels. Without one, only boxes are drawn.
    pub font: Option<FontVec>,
    /// Label height in pixels.
    pub font_scale: f32,
    /// Box outline width in pixels.
    pub thickness: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            font: None,
            font_scale: 16.0,
            thickness: 2,
        }
    }
}

impl std::fmt::Debug for OverlayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayConfig")
            .field("font", &self.font.as_ref().map(|_| "<loaded>"))
            .field("font_scale", &self.font_scale)
            .field("thickness", &self.thickness)
            .finish()
    }
}

impl OverlayConfig {
    /// Load the label font from `path`.
    pub fn with_font_path(path: &Path) -> std::io::Result<Self> {
        let data = std::fs::read(path)?;
        let font = FontVec::try_from_vec(data).map_err(|_| {
            std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!("not a usable font: {}", path.display()),
            )
        })?;
        Ok(Self {
            font: Some(font),
            ..Self::default()
        })
    }

    /// Use the first common system font found; boxes only if none is.
    pub fn with_system_font() -> Self {
        const FONT_PATHS: &[&str] = &[
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/dejavu/DejaVuSans.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "/System/Library/Fonts/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ];

        for path in FONT_PATHS {
            if let Ok(config) = Self::with_font_path(Path::new(path)) {
                info!("Overlay font: {}", path);
                return config;
            }
        }
        debug!("No system font found, overlay labels will be skipped");
        Self::default()
    }
}

/// Draw every block's box and label, and each table row's box, on a copy
/// of `image`.
///
/// Blocks with a degenerate box are skipped together with their table rows.
pub fn draw_layout(image: &DynamicImage, blocks: &[LayoutBlock], config: &OverlayConfig) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let mut drawn = 0usize;

    for block in blocks {
        if block.bbox.is_degenerate() {
            continue;
        }
        if draw_box(&mut canvas, block.bbox, BLOCK_COLOR, config.thickness) {
            draw_label(&mut canvas, block.bbox, &block.label, LABEL_COLOR, config);
            drawn += 1;
        }
        for (row, bbox) in block.table_row_bboxes.iter().enumerate() {
            if draw_box(&mut canvas, *bbox, ROW_COLOR, 1) {
                draw_label(&mut canvas, *bbox, &format!("Row {row}"), ROW_COLOR, config);
            }
        }
    }

    debug!("Overlay: {} of {} blocks drawn", drawn, blocks.len());
    canvas
}

/// Outline `bbox`, growing inwards by `thickness`. Returns false when
/// nothing was drawn.
fn draw_box(canvas: &mut RgbImage, bbox: BBox, color: Rgb<u8>, thickness: u32) -> bool {
    let Some(rect) = to_rect(bbox, canvas.width(), canvas.height()) else {
        return false;
    };

    for inset in 0..thickness.max(1) {
        let (w, h) = (rect.width(), rect.height());
        if w <= 2 * inset || h <= 2 * inset {
            break;
        }
        let inner = Rect::at(rect.left() + inset as i32, rect.top() + inset as i32)
            .of_size(w - 2 * inset, h - 2 * inset);
        draw_hollow_rect_mut(canvas, inner, color);
    }
    true
}

fn draw_label(canvas: &mut RgbImage, bbox: BBox, text: &str, color: Rgb<u8>, config: &OverlayConfig) {
    let Some(font) = &config.font else { return };
    if bbox.x0() >= canvas.width() || bbox.y0() >= canvas.height() {
        return;
    }
    let x = bbox.x0() as i32 + config.thickness as i32 + 1;
    let y = bbox.y0() as i32 + config.thickness as i32 + 1;
    draw_text_mut(canvas, color, x, y, config.font_scale, font, text);
}

/// Clip `bbox` to the canvas; `None` if nothing of it remains.
fn to_rect(bbox: BBox, width: u32, height: u32) -> Option<Rect> {
    if bbox.is_degenerate() {
        return None;
    }
    let x1 = bbox.x1().min(width);
    let y1 = bbox.y1().min(height);
    if bbox.x0() >= x1 || bbox.y0() >= y1 {
        return None;
    }
    Some(Rect::at(bbox.x0() as i32, bbox.y0() as i32).of_size(x1 - bbox.x0(), y1 - bbox.y0()))
}
