//! Layout extraction: one [`LayoutBlock`] per top-level annotated element.

use crate::html::{self, AnnotatedDocument};
use crate::pipeline::bbox::{normalize_bbox, BBox};
use markup5ever_rcdom::Handle;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Attribute carrying the block's layout label.
pub const LABEL_ATTR: &str = "data-label";
/// Attribute carrying the block's (or table row's) logical bbox.
pub const BBOX_ATTR: &str = "data-bbox";
/// Label given to elements without a label attribute.
pub const DEFAULT_LABEL: &str = "block";

pub const LABEL_TEXT: &str = "Text";
pub const LABEL_IMAGE: &str = "Image";
pub const LABEL_FIGURE: &str = "Figure";
pub const LABEL_TABLE: &str = "Table";
pub const LABEL_PAGE_HEADER: &str = "Page-Header";
pub const LABEL_PAGE_FOOTER: &str = "Page-Footer";

/// True for labels whose blocks hold a picture to crop.
pub fn is_image_label(label: &str) -> bool {
    label == LABEL_IMAGE || label == LABEL_FIGURE
}

/// True for running headers and footers.
pub fn is_header_footer_label(label: &str) -> bool {
    label == LABEL_PAGE_HEADER || label == LABEL_PAGE_FOOTER
}

/// One structural unit of a page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutBlock {
    /// Box in the pixel space of the page bitmap.
    pub bbox: BBox,
    /// Layout label, e.g. `Text`, `Table`, `Figure`. Open-ended.
    pub label: String,
    /// Inner HTML of the source element.
    pub content: String,
    /// Per-row boxes of a `Table` block, top to bottom. Empty otherwise.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub table_row_bboxes: Vec<BBox>,
}

impl LayoutBlock {
    pub fn is_image(&self) -> bool {
        is_image_label(&self.label)
    }

    pub fn is_table(&self) -> bool {
        self.label == LABEL_TABLE
    }
}

/// Label of a top-level element, [`DEFAULT_LABEL`] when absent.
pub(crate) fn block_label(element: &Handle) -> String {
    html::attr(element, LABEL_ATTR).unwrap_or_else(|| DEFAULT_LABEL.to_string())
}

/// Build the layout of a page.
///
/// `width`/`height` are the page bitmap's dimensions; `bbox_scale` is the
/// side of the logical grid the annotations use.
pub fn extract_layout(
    doc: &AnnotatedDocument,
    width: u32,
    height: u32,
    bbox_scale: u32,
) -> Vec<LayoutBlock> {
    let blocks: Vec<LayoutBlock> = doc
        .top_level_elements()
        .iter()
        .map(|element| {
            let label = block_label(element);
            let bbox = normalize_bbox(
                html::attr(element, BBOX_ATTR).as_deref(),
                width,
                height,
                bbox_scale,
            );
            let table_row_bboxes = if label == LABEL_TABLE {
                table_row_bboxes(element, width, height, bbox_scale)
            } else {
                Vec::new()
            };

            LayoutBlock {
                bbox,
                label,
                content: html::inner_html(element),
                table_row_bboxes,
            }
        })
        .collect();

    debug!("Extracted {} layout blocks ({}x{} px)", blocks.len(), width, height);
    blocks
}

/// Rows of a table that carry their own bbox annotation; unannotated rows
/// are skipped.
fn table_row_bboxes(table: &Handle, width: u32, height: u32, bbox_scale: u32) -> Vec<BBox> {
    html::find_all_descendants(table, "tr")
        .iter()
        .filter_map(|row| html::attr(row, BBOX_ATTR))
        .map(|raw| normalize_bbox(Some(&raw), width, height, bbox_scale))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(html: &str) -> Vec<LayoutBlock> {
        let doc = AnnotatedDocument::parse(html).unwrap();
        extract_layout(&doc, 1000, 2000, 1000)
    }

    #[test]
    fn blocks_follow_document_order() {
        let blocks = layout(concat!(
            r#"<div data-label="Section-Header" data-bbox="[0, 0, 500, 50]"><h1>Title</h1></div>"#,
            r#"<div data-label="Text" data-bbox="0 60 500 100">Body text</div>"#,
        ));
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].label, "Section-Header");
        assert_eq!(blocks[0].bbox, BBox([0, 0, 500, 100]));
        assert_eq!(blocks[0].content, "<h1>Title</h1>");
        assert_eq!(blocks[1].label, "Text");
        assert_eq!(blocks[1].bbox, BBox([0, 120, 500, 200]));
        assert_eq!(blocks[1].content, "Body text");
    }

    #[test]
    fn missing_attributes_use_defaults() {
        let blocks = layout("<div>orphan</div>");
        assert_eq!(blocks[0].label, DEFAULT_LABEL);
        assert_eq!(blocks[0].bbox, BBox::DEFAULT);
    }

    #[test]
    fn malformed_bbox_does_not_drop_block() {
        let blocks = layout(r#"<div data-label="Text" data-bbox="abc">x</div><div data-label="Text" data-bbox="[0,0,10,10]">y</div>"#);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].bbox, BBox::DEFAULT);
        assert_eq!(blocks[1].bbox, BBox([0, 0, 10, 20]));
    }

    #[test]
    fn table_rows_are_collected() {
        let blocks = layout(concat!(
            r#"<div data-label="Table" data-bbox="[0, 0, 1000, 500]"><table>"#,
            r#"<tr data-bbox="[0, 0, 1000, 100]"><td>a</td></tr>"#,
            r#"<tr><td>no box</td></tr>"#,
            r#"<tr data-bbox="0 100 1000 200"><td>b</td></tr>"#,
            r#"</table></div>"#,
        ));
        assert!(blocks[0].is_table());
        assert_eq!(
            blocks[0].table_row_bboxes,
            vec![BBox([0, 0, 1000, 200]), BBox([0, 200, 1000, 400])]
        );
    }

    #[test]
    fn rows_outside_tables_are_ignored() {
        let blocks = layout(r#"<div data-label="Text"><table><tr data-bbox="[0,0,1,1]"><td>x</td></tr></table></div>"#);
        assert!(blocks[0].table_row_bboxes.is_empty());
    }

    #[test]
    fn serialises_as_plain_records() {
        let blocks = layout(r#"<div data-label="Text" data-bbox="[0,0,10,10]">Hi</div>"#);
        let json = serde_json::to_value(&blocks).unwrap();
        assert_eq!(json[0]["label"], "Text");
        assert_eq!(json[0]["bbox"], serde_json::json!([0, 0, 10, 20]));
        assert_eq!(json[0]["content"], "Hi");
    }

    #[test]
    fn labels() {
        assert!(is_image_label("Figure"));
        assert!(is_image_label("Image"));
        assert!(!is_image_label("Picture"));
        assert!(is_header_footer_label("Page-Footer"));
    }
}
