//! Input detection: decide whether a path is a PDF or a raster image.
//!
//! The decision is made from the file's leading bytes, not its extension:
//! `%PDF` selects the pdfium path, anything `image` can sniff selects the
//! image path, everything else is rejected before any rendering starts.

use crate::error::LayoutError;
use image::ImageFormat;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Bytes read for format sniffing.
const SNIFF_LEN: usize = 32;

/// The kind of document an input path holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Pdf,
    Image(ImageFormat),
}

/// A validated, readable input file.
#[derive(Debug, Clone)]
pub struct DetectedInput {
    pub path: PathBuf,
    pub kind: InputKind,
}

/// Validate `path` and classify it by content.
///
/// # Errors
/// * [`LayoutError::FileNotFound`] if nothing exists at `path`
/// * [`LayoutError::PermissionDenied`] if it cannot be opened for reading
/// * [`LayoutError::UnsupportedInput`] if it is neither a PDF nor an image
pub fn detect_input(path: &Path) -> Result<DetectedInput, LayoutError> {
    let path = path.to_path_buf();
    if !path.is_file() {
        return Err(LayoutError::FileNotFound { path });
    }

    let mut head = Vec::with_capacity(SNIFF_LEN);
    match std::fs::File::open(&path) {
        Ok(f) => {
            f.take(SNIFF_LEN as u64)
                .read_to_end(&mut head)
                .map_err(|e| LayoutError::Internal(format!("reading {}: {e}", path.display())))?;
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(LayoutError::PermissionDenied { path });
        }
        Err(_) => return Err(LayoutError::FileNotFound { path }),
    }

    let kind = classify(&head).ok_or_else(|| {
        let mut magic = [0u8; 4];
        let n = head.len().min(4);
        magic[..n].copy_from_slice(&head[..n]);
        LayoutError::UnsupportedInput {
            path: path.clone(),
            magic,
        }
    })?;

    debug!("Detected {:?} input: {}", kind, path.display());
    Ok(DetectedInput { path, kind })
}

fn classify(head: &[u8]) -> Option<InputKind> {
    if head.starts_with(b"%PDF") {
        return Some(InputKind::Pdf);
    }
    image::guess_format(head).ok().map(InputKind::Image)
}
