//! Label-driven filtering and rewriting of annotated HTML.
//!
//! Produces the page's clean HTML fragment: the inner content of every
//! surviving top-level block, concatenated in order. Block indices used for
//! image names count every top-level element, including the ones dropped
//! here, so they line up with [`crate::pipeline::images::extract_images`].

use crate::html::{self, AnnotatedDocument};
use crate::pipeline::images::image_name;
use crate::pipeline::layout::{block_label, is_header_footer_label, is_image_label, LABEL_TEXT};
use markup5ever_rcdom::Handle;
use tracing::debug;

/// Which block kinds survive the rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RewriteOptions {
    pub include_headers_footers: bool,
    pub include_images: bool,
}

impl Default for RewriteOptions {
    fn default() -> Self {
        Self {
            include_headers_footers: false,
            include_images: true,
        }
    }
}

/// Filter and rewrite the top-level blocks of `doc` into one HTML fragment.
///
/// Per block, in order:
/// 1. drop `Page-Header`/`Page-Footer` unless headers and footers are included;
/// 2. drop `Image`/`Figure` unless images are included;
/// 3. point the first `<img>` of an image block at its content-addressed
///    name, appending an `<img>` when the block has none;
/// 4. wrap a `Text` block holding only text in `<p>`, or drop it when that
///    text is blank;
/// 5. append the block's inner HTML.
pub fn rewrite_html(doc: &AnnotatedDocument, options: RewriteOptions) -> String {
    let mut out = String::new();
    let mut kept = 0usize;

    for (i, element) in doc.top_level_elements().iter().enumerate() {
        let block_index = i + 1;
        let label = block_label(element);

        if is_header_footer_label(&label) && !options.include_headers_footers {
            continue;
        }
        if is_image_label(&label) && !options.include_images {
            continue;
        }

        if is_image_label(&label) {
            let name = image_name(doc.source(), block_index);
            out.push_str(&rewrite_image_block(element, &name));
        } else if label == LABEL_TEXT && !has_child_elements(element) {
            let text = html::text_content(element);
            let text = text.trim();
            if !text.is_empty() {
                out.push_str(&html::element_html("p", &[], text));
            }
        } else {
            out.push_str(&html::inner_html(element));
        }
        kept += 1;
    }

    debug!("Rewrote HTML: kept {} blocks", kept);
    out
}

fn rewrite_image_block(element: &Handle, name: &str) -> String {
    let (mut out, replaced) = html::inner_html_with_img_src(element, name);
    if !replaced {
        out.push_str(&html::element_html("img", &[("src", name)], ""));
    }
    out
}

fn has_child_elements(element: &Handle) -> bool {
    !html::element_children(element).is_empty()
}
