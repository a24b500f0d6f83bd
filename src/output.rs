//! Conversion results and saving them to disk.

use crate::error::{LayoutError, PageError};
use crate::pipeline::encode;
use crate::pipeline::layout::LayoutBlock;
use image::{DynamicImage, RgbImage};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Everything produced for one page.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PageOutput {
    /// 1-indexed page number.
    pub page_num: usize,
    /// Filtered, rewritten HTML fragment.
    pub html: String,
    pub markdown: String,
    pub layout: Vec<LayoutBlock>,
    /// Figure crops keyed by content-addressed name.
    #[serde(skip)]
    pub images: BTreeMap<String, DynamicImage>,
    /// Debug overlay, when requested.
    #[serde(skip)]
    pub overlay: Option<RgbImage>,
    /// Set when this page failed; the other fields are then empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<PageError>,
}

impl PageOutput {
    /// A page that could not be rendered or processed.
    pub fn failed(page_num: usize, error: PageError) -> Self {
        Self {
            page_num,
            error: Some(error),
            ..Self::default()
        }
    }

    /// Names of the extracted images, in name order.
    pub fn image_names(&self) -> Vec<&str> {
        self.images.keys().map(String::as_str).collect()
    }
}

/// Counters for a whole document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConversionStats {
    /// Pages selected for conversion.
    pub total_pages: usize,
    pub processed_pages: usize,
    pub failed_pages: usize,
    pub total_blocks: usize,
    pub total_images: usize,
    pub duration_ms: u64,
}

/// A converted document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DocumentOutput {
    /// Pages in page order, failed ones included.
    pub pages: Vec<PageOutput>,
    /// Markdown of the successful pages joined with the page separator.
    pub markdown: String,
    pub stats: ConversionStats,
}

#[derive(Serialize)]
struct PageLayout<'a> {
    page_num: usize,
    blocks: &'a [LayoutBlock],
}

impl DocumentOutput {
    /// Fragments of the successful pages, one per line.
    pub fn html(&self) -> String {
        self.successful_pages()
            .map(|p| p.html.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Layout of every successful page as pretty JSON.
    pub fn layout_json(&self) -> Result<String, LayoutError> {
        let pages: Vec<PageLayout<'_>> = self
            .successful_pages()
            .map(|p| PageLayout {
                page_num: p.page_num,
                blocks: &p.layout,
            })
            .collect();
        serde_json::to_string_pretty(&pages)
            .map_err(|e| LayoutError::Internal(format!("layout serialisation: {}", e)))
    }

    fn successful_pages(&self) -> impl Iterator<Item = &PageOutput> {
        self.pages.iter().filter(|p| p.error.is_none())
    }

    /// Write all artefacts into `dir`:
    ///
    /// | file | content |
    /// |------|---------|
    /// | `{stem}.md` | assembled Markdown |
    /// | `{stem}.html` | page fragments |
    /// | `{stem}_layout.json` | `[{page_num, blocks}]` |
    /// | `{name}` | each image crop, lossless WebP |
    /// | `{stem}_page{N}_overlay.png` | overlays, when drawn |
    ///
    /// Every file is written to a temporary sibling and renamed into place.
    /// Returns the paths written.
    pub fn save(&self, dir: &Path, stem: &str) -> Result<Vec<PathBuf>, LayoutError> {
        std::fs::create_dir_all(dir).map_err(|e| LayoutError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })?;

        let mut written = Vec::new();
        let mut put = |name: String, bytes: &[u8]| -> Result<(), LayoutError> {
            let path = dir.join(name);
            write_atomic(&path, bytes)?;
            written.push(path);
            Ok(())
        };

        put(format!("{stem}.md"), self.markdown.as_bytes())?;
        put(format!("{stem}.html"), self.html().as_bytes())?;
        put(format!("{stem}_layout.json"), self.layout_json()?.as_bytes())?;

        for page in self.successful_pages() {
            for (name, img) in &page.images {
                put(name.clone(), &encode::encode_webp(name, img)?)?;
            }
            if let Some(overlay) = &page.overlay {
                let name = format!("{stem}_page{}_overlay.png", page.page_num);
                let bytes = encode::encode_png(&name, overlay)?;
                put(name, &bytes)?;
            }
        }

        info!("Saved {} files to {}", written.len(), dir.display());
        Ok(written)
    }
}

/// Write via a `.tmp` sibling and rename, so readers never see a partial file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), LayoutError> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let to_err = |e: std::io::Error| LayoutError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };
    std::fs::write(&tmp_path, bytes).map_err(to_err)?;
    std::fs::rename(&tmp_path, path).map_err(to_err)?;
    debug!("Wrote {} ({} bytes)", path.display(), bytes.len());
    Ok(())
}
