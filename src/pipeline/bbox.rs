//! Bounding-box parsing and rescaling.
//!
//! The document model annotates every block with a box on a fixed logical
//! grid of `bbox_scale × bbox_scale`, independent of the page resolution.
//! The attribute comes in two spellings, a JSON array (`[10, 20, 300, 400]`)
//! and a space-separated list (`10 20 300 400`). Anything else degrades to
//! [`BBox::DEFAULT`] with a warning; one bad box never fails a page.

use crate::error::BlockError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// A rectangle `[x0, y0, x1, y1]` in the pixel space of one bitmap.
///
/// `x1 > x0` and `y1 > y0` are not guaranteed; check
/// [`BBox::is_degenerate`] before drawing or cropping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BBox(pub [u32; 4]);

impl BBox {
    /// Box used when the annotation cannot be parsed.
    pub const DEFAULT: BBox = BBox([0, 0, 1, 1]);

    pub fn x0(&self) -> u32 {
        self.0[0]
    }

    pub fn y0(&self) -> u32 {
        self.0[1]
    }

    pub fn x1(&self) -> u32 {
        self.0[2]
    }

    pub fn y1(&self) -> u32 {
        self.0[3]
    }

    /// Width, or 0 when `x1 <= x0`.
    pub fn width(&self) -> u32 {
        self.x1().saturating_sub(self.x0())
    }

    /// Height, or 0 when `y1 <= y0`.
    pub fn height(&self) -> u32 {
        self.y1().saturating_sub(self.y0())
    }

    /// True when the box has no area.
    pub fn is_degenerate(&self) -> bool {
        self.x1() <= self.x0() || self.y1() <= self.y0()
    }
}

impl From<[u32; 4]> for BBox {
    fn from(v: [u32; 4]) -> Self {
        BBox(v)
    }
}

/// Parse a raw bbox attribute into four integer coordinates.
///
/// JSON array first, then whitespace-separated numbers; each must yield
/// exactly four finite values. Fractional values are truncated toward zero.
pub fn parse_bbox(raw: &str) -> Option<[i64; 4]> {
    let values = serde_json::from_str::<Vec<f64>>(raw)
        .ok()
        .filter(|v| v.len() == 4)
        .or_else(|| {
            raw.split_whitespace()
                .map(|part| part.parse::<f64>().ok().filter(|f| f.is_finite()))
                .collect::<Option<Vec<f64>>>()
                .filter(|v| v.len() == 4)
        })?;

    Some([
        values[0] as i64,
        values[1] as i64,
        values[2] as i64,
        values[3] as i64,
    ])
}

/// Rescale a box from the `scale × scale` logical grid to a `width × height`
/// bitmap.
///
/// Every coordinate is clamped at 0; `x1` is capped at `width` and `y1` at
/// `height`.
pub fn scale_bbox(raw: [i64; 4], width: u32, height: u32, scale: u32) -> BBox {
    let scale = f64::from(scale.max(1));
    let sx = f64::from(width) / scale;
    let sy = f64::from(height) / scale;

    let px = |v: i64, s: f64| ((v as f64) * s).round().max(0.0) as u32;

    BBox([
        px(raw[0], sx),
        px(raw[1], sy),
        px(raw[2], sx).min(width),
        px(raw[3], sy).min(height),
    ])
}

/// Parse and rescale a bbox attribute in one step.
///
/// A missing or malformed attribute logs a warning and yields
/// [`BBox::DEFAULT`].
pub fn normalize_bbox(raw: Option<&str>, width: u32, height: u32, scale: u32) -> BBox {
    match raw.and_then(parse_bbox) {
        Some(coords) => scale_bbox(coords, width, height, scale),
        None => {
            let err = BlockError::MalformedBbox {
                raw: raw.map(str::to_string),
            };
            warn!("{}", err);
            BBox::DEFAULT
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_array_is_scaled_per_axis() {
        let b = normalize_bbox(Some("[100, 100, 900, 900]"), 1000, 2000, 1000);
        assert_eq!(b, BBox([100, 200, 900, 1800]));
    }

    #[test]
    fn space_separated_is_accepted() {
        let b = normalize_bbox(Some(" 100 100  900 900 "), 1000, 2000, 1000);
        assert_eq!(b, BBox([100, 200, 900, 1800]));
    }

    #[test]
    fn malformed_falls_back_to_default() {
        assert_eq!(normalize_bbox(Some("abc"), 1000, 2000, 1000), BBox::DEFAULT);
        assert_eq!(normalize_bbox(None, 1000, 2000, 1000), BBox::DEFAULT);
        assert_eq!(normalize_bbox(Some(""), 1000, 2000, 1000), BBox::DEFAULT);
    }

    #[test]
    fn wrong_arity_falls_back() {
        assert_eq!(normalize_bbox(Some("[1, 2, 3]"), 100, 100, 100), BBox::DEFAULT);
        assert_eq!(normalize_bbox(Some("1 2 3 4 5"), 100, 100, 100), BBox::DEFAULT);
        assert_eq!(normalize_bbox(Some("1 2 nan 4"), 100, 100, 100), BBox::DEFAULT);
    }

    #[test]
    fn json_with_wrong_arity_does_not_fall_through_to_garbage() {
        // "[1 2 3 4]" is not JSON and not four bare numbers either.
        assert_eq!(parse_bbox("[1 2 3 4]"), None);
    }

    #[test]
    fn fractional_values_truncate_before_scaling() {
        assert_eq!(parse_bbox("[10.9, 20.2, 30.5, 40.99]"), Some([10, 20, 30, 40]));
    }

    #[test]
    fn clamped_to_bitmap() {
        let b = normalize_bbox(Some("[-50, -10, 2000, 1500]"), 500, 400, 1000);
        assert_eq!(b, BBox([0, 0, 500, 400]));
    }

    #[test]
    fn rounding_is_to_nearest() {
        // 333 * 100 / 1024 = 32.52 → 33
        let b = scale_bbox([333, 0, 333, 0], 100, 100, 1024);
        assert_eq!(b.x0(), 33);
    }

    #[test]
    fn renormalising_is_stable_when_grid_matches_bitmap() {
        let first = normalize_bbox(Some("[12, 34, 560, 780]"), 1024, 1024, 1024);
        let again = normalize_bbox(
            Some(&serde_json::to_string(&first).unwrap()),
            1024,
            1024,
            1024,
        );
        assert_eq!(first, again);
        assert_eq!(
            normalize_bbox(Some("[12, 34, 560, 780]"), 1024, 1024, 1024),
            first
        );
    }

    #[test]
    fn degenerate_detection() {
        assert!(BBox([5, 5, 5, 5]).is_degenerate());
        assert!(BBox([10, 0, 5, 20]).is_degenerate());
        assert!(!BBox([0, 0, 1, 1]).is_degenerate());
        assert_eq!(BBox([10, 0, 5, 20]).width(), 0);
    }

    #[test]
    fn serialises_as_plain_array() {
        let json = serde_json::to_string(&BBox([1, 2, 3, 4])).unwrap();
        assert_eq!(json, "[1,2,3,4]");
    }
}
