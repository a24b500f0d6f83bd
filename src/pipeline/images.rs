//! Content-addressed image names and figure cropping.
//!
//! The rewriter and the extractor run independently over the same page and
//! must agree on filenames without sharing state. Both derive the name from
//! `(hash of the full annotated HTML, 1-based block index)`:
//!
//! ```text
//! 3f2a…c91e_4_img.webp
//! └─hash──┘ └┘
//!  128 bit   index among *all* top-level blocks
//! ```

use crate::error::BlockError;
use crate::html::{self, AnnotatedDocument};
use crate::pipeline::bbox::BBox;
use crate::pipeline::layout::LayoutBlock;
use image::DynamicImage;
use once_cell::sync::Lazy;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;
use tracing::{debug, warn};

/// Entries kept before the hash cache is cleared.
const HASH_CACHE_CAPACITY: usize = 256;

static HASH_CACHE: Lazy<RwLock<HashMap<String, String>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

/// Lowercase hex of the first 128 bits of SHA-256 over `html`.
///
/// Memoised per document text.
pub fn content_hash(html: &str) -> String {
    if let Some(hash) = HASH_CACHE.read().ok().and_then(|c| c.get(html).cloned()) {
        return hash;
    }

    let digest = Sha256::digest(html.as_bytes());
    let hash = hex::encode(&digest[..16]);

    if let Ok(mut cache) = HASH_CACHE.write() {
        if cache.len() >= HASH_CACHE_CAPACITY {
            cache.clear();
        }
        cache.insert(html.to_string(), hash.clone());
    }
    hash
}

/// Filename for the image of block `block_index` (1-based) of a document.
pub fn image_name(html: &str, block_index: usize) -> String {
    format!("{}_{}_img.webp", content_hash(html), block_index)
}

/// Cut `bbox` out of `image`.
///
/// # Errors
/// [`BlockError::CropFailed`] if the box is degenerate or does not start
/// inside the bitmap.
pub fn crop_block(
    image: &DynamicImage,
    bbox: BBox,
    block_index: usize,
) -> Result<DynamicImage, BlockError> {
    let (width, height) = (image.width(), image.height());
    if bbox.is_degenerate() || bbox.x0() >= width || bbox.y0() >= height {
        return Err(BlockError::CropFailed {
            index: block_index,
            bbox: bbox.0,
            width,
            height,
        });
    }

    let w = bbox.width().min(width - bbox.x0());
    let h = bbox.height().min(height - bbox.y0());
    Ok(image.crop_imm(bbox.x0(), bbox.y0(), w, h))
}

/// Crop every `Image`/`Figure` block that contains an `<img>`, keyed by the
/// same name the rewriter writes into its `src`.
///
/// Blocks without an `<img>` are layout-only placeholders and are skipped.
/// Blocks whose crop fails are logged and skipped.
pub fn extract_images(
    doc: &AnnotatedDocument,
    blocks: &[LayoutBlock],
    image: &DynamicImage,
) -> BTreeMap<String, DynamicImage> {
    let mut images = BTreeMap::new();

    for (i, block) in blocks.iter().enumerate() {
        let block_index = i + 1;
        if !block.is_image() || !contains_img(&block.content) {
            continue;
        }

        match crop_block(image, block.bbox, block_index) {
            Ok(crop) => {
                let name = image_name(doc.source(), block_index);
                debug!("Cropped {} ({}x{})", name, crop.width(), crop.height());
                images.insert(name, crop);
            }
            Err(e) => warn!("Skipping image: {}", e),
        }
    }

    images
}

fn contains_img(content: &str) -> bool {
    let Ok(dom) = html::parse_html(content) else {
        return false;
    };
    html::body(&dom)
        .and_then(|body| html::find_descendant(&body, "img"))
        .is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::layout::extract_layout;
    use image::{Rgb, RgbImage};

    fn page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 0])
        }))
    }

    #[test]
    fn names_are_deterministic() {
        let html = "<div data-label=\"Image\"><img></div>";
        assert_eq!(image_name(html, 3), image_name(html, 3));
        assert_ne!(image_name(html, 3), image_name(html, 4));
        assert_ne!(image_name(html, 3), image_name("<p>other</p>", 3));
    }

    #[test]
    fn name_format() {
        let name = image_name("x", 7);
        let (hash, rest) = name.split_once('_').unwrap();
        assert_eq!(hash.len(), 32);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(rest, "7_img.webp");
    }

    #[test]
    fn crop_matches_bbox() {
        let img = page(100, 80);
        let crop = crop_block(&img, BBox([10, 20, 40, 60]), 1).unwrap();
        assert_eq!((crop.width(), crop.height()), (30, 40));
        assert_eq!(crop.to_rgb8().get_pixel(0, 0), &Rgb([10, 20, 0]));
    }

    #[test]
    fn crop_rejects_degenerate_and_outside() {
        let img = page(100, 80);
        assert!(crop_block(&img, BBox([5, 5, 5, 5]), 1).is_err());
        assert!(crop_block(&img, BBox([100, 0, 120, 10]), 1).is_err());
    }

    #[test]
    fn extracts_only_figures_with_img() {
        let html = concat!(
            r#"<div data-label="Text" data-bbox="[0,0,50,10]">intro</div>"#,
            r#"<div data-label="Figure" data-bbox="[0,10,50,50]"><img alt="chart"></div>"#,
            r#"<div data-label="Image" data-bbox="[50,50,100,100]">placeholder only</div>"#,
            r#"<div data-label="Image" data-bbox="[5,5,5,5]"><img></div>"#,
        );
        let doc = AnnotatedDocument::parse(html).unwrap();
        let img = page(100, 100);
        let blocks = extract_layout(&doc, 100, 100, 100);
        let images = extract_images(&doc, &blocks, &img);

        assert_eq!(images.len(), 1);
        let name = image_name(html, 2);
        let crop = images.get(&name).expect("figure at block 2");
        assert_eq!((crop.width(), crop.height()), (50, 40));
    }

    #[test]
    fn figure_with_sourced_img_is_cropped() {
        assert!(contains_img(r#"<img src="x.png">"#));
        assert!(contains_img(r#"<p>caption</p><figure><img src="x.png"></figure>"#));
        assert!(!contains_img("<p>no picture</p>"));

        let html = r#"<div data-label="Figure" data-bbox="[10, 10, 60, 60]"><img src="x.png"></div>"#;
        let doc = AnnotatedDocument::parse(html).unwrap();
        let blocks = extract_layout(&doc, 100, 100, 100);
        let images = extract_images(&doc, &blocks, &page(100, 100));

        assert_eq!(images.len(), 1);
        let crop = &images[&image_name(html, 1)];
        assert_eq!(crop.to_rgb8().get_pixel(0, 0), &Rgb([10, 10, 0]));
    }
}
