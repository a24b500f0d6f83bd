//! Image encoding for saved artefacts.
//!
//! Figure crops are written as lossless WebP: the crops are mostly line art
//! and text, where lossy artefacts are visible. Overlays are PNG so they open
//! in any viewer.

use crate::error::LayoutError;
use image::{DynamicImage, ImageFormat, RgbImage};
use std::io::Cursor;
use tracing::debug;

/// Encode a figure crop as lossless WebP.
pub fn encode_webp(name: &str, img: &DynamicImage) -> Result<Vec<u8>, LayoutError> {
    // The WebP encoder only accepts 8-bit RGB(A).
    let img = match img {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => img.clone(),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    };
    encode(name, &img, ImageFormat::WebP)
}

/// Encode an overlay as PNG.
pub fn encode_png(name: &str, img: &RgbImage) -> Result<Vec<u8>, LayoutError> {
    encode(name, &DynamicImage::ImageRgb8(img.clone()), ImageFormat::Png)
}

fn encode(name: &str, img: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, LayoutError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| LayoutError::ImageEncodeFailed {
            name: name.to_string(),
            detail: e.to_string(),
        })?;
    debug!("Encoded {} → {} bytes {:?}", name, buf.len(), format);
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, Rgba, RgbaImage};

    #[test]
    fn webp_round_trips_losslessly() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_fn(8, 6, |x, y| Rgb([x as u8 * 30, y as u8 * 40, 7])));
        let bytes = encode_webp("a_1_img.webp", &img).expect("encode should succeed");
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn webp_accepts_other_colour_types() {
        let grey = DynamicImage::ImageLuma8(image::GrayImage::from_pixel(4, 4, Luma([90])));
        assert!(encode_webp("g", &grey).is_ok());
        let rgba = DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([1, 2, 3, 128])));
        assert!(encode_webp("t", &rgba).is_ok());
    }

    #[test]
    fn png_has_signature() {
        let bytes = encode_png("o", &RgbImage::new(3, 3)).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
