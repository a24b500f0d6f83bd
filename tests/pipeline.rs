//! End-to-end tests over synthetic annotated HTML and in-memory bitmaps.
//!
//! No pdfium and no network: page images are generated with `image` and
//! PNG inputs stand in for rendered PDFs.

use image::{DynamicImage, Rgb, RgbImage};
use layout2md::{
    convert, convert_to_dir, extract_images, extract_layout, html_to_markdown, image_name,
    process_page, rewrite_html, AnnotatedDocument, ConversionProgressCallback, LayoutConfig,
    LayoutError, PageSelection, PageSeparator, PageSummary, RewriteOptions,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// A 1000×2000 page with a distinct colour per quadrant.
fn page_bitmap() -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(1000, 2000, |x, y| {
        match (x < 500, y < 1000) {
            (true, true) => Rgb([255, 0, 0]),
            (false, true) => Rgb([0, 255, 0]),
            (true, false) => Rgb([0, 0, 255]),
            (false, false) => Rgb([255, 255, 255]),
        }
    }))
}

const ARTICLE: &str = concat!(
    r#"<div data-label="Page-Header" data-bbox="[0, 0, 1000, 40]">Proceedings, vol. 3</div>"#,
    r#"<div data-label="Section-Header" data-bbox="[50, 50, 950, 100]"><h1>Results</h1></div>"#,
    r#"<div data-label="Text" data-bbox="50 110 950 300">Revenue grew by $5 million.</div>"#,
    r#"<div data-label="Figure" data-bbox="[500, 0, 1000, 500]"><img alt="Growth chart"><p>Figure 1</p></div>"#,
    r#"<div data-label="Equation-Block" data-bbox="[50, 620, 950, 700]"><math display="block">E = mc^2</math></div>"#,
    r#"<div data-label="Table" data-bbox="[0, 700, 1000, 900]"><table><tr data-bbox="[0,700,1000,800]"><td>a</td></tr><tr data-bbox="[0,800,1000,900]"><td>b</td></tr></table></div>"#,
    r#"<div data-label="Image" data-bbox="[0, 900, 100, 950]">decorative rule</div>"#,
    r#"<div data-label="Page-Footer" data-bbox="[0, 960, 1000, 1000]">12</div>"#,
);

fn config_1000() -> LayoutConfig {
    LayoutConfig::builder().bbox_scale(1000).build().unwrap()
}

#[test]
fn bbox_scaling_follows_bitmap_size() {
    let doc = AnnotatedDocument::parse(
        r#"<div data-label="Text" data-bbox="[100, 100, 900, 900]">x</div>"#,
    )
    .unwrap();
    let blocks = extract_layout(&doc, 1000, 2000, 1000);
    assert_eq!(blocks[0].bbox.0, [100, 200, 900, 1800]);
}

#[test]
fn rewriter_and_extractor_agree_on_names() {
    let doc = AnnotatedDocument::parse(ARTICLE).unwrap();
    let bitmap = page_bitmap();
    let blocks = extract_layout(&doc, bitmap.width(), bitmap.height(), 1000);
    let html = rewrite_html(&doc, RewriteOptions::default());
    let images = extract_images(&doc, &blocks, &bitmap);

    // Only the Figure block has an <img>; the Image placeholder does not.
    assert_eq!(images.len(), 1);
    let name = image_name(ARTICLE, 4);
    assert!(images.contains_key(&name));
    assert!(html.contains(&format!(r#"src="{name}""#)), "html: {html}");

    // Every src the rewriter wrote that points at a crop is in the map,
    // and every crop is referenced.
    for key in images.keys() {
        assert!(html.contains(key.as_str()));
    }
}

#[test]
fn figure_crop_covers_its_quadrant() {
    let page = process_page(ARTICLE, &page_bitmap(), &config_1000()).unwrap();
    let crop = page.images.get(&image_name(ARTICLE, 4)).unwrap().to_rgb8();
    assert_eq!(crop.dimensions(), (500, 1000));
    assert_eq!(crop.get_pixel(0, 0), &Rgb([0, 255, 0]));
    assert_eq!(crop.get_pixel(499, 999), &Rgb([0, 255, 0]));
}

#[test]
fn header_filter_round_trip() {
    let html = concat!(
        r#"<div data-label="Page-Header" data-bbox="[0,0,10,10]">Running head</div>"#,
        r#"<div data-label="Text" data-bbox="[0,10,10,20]">Body</div>"#,
    );
    let doc = AnnotatedDocument::parse(html).unwrap();
    let out = rewrite_html(&doc, RewriteOptions::default());
    assert_eq!(out, "<p>Body</p>");
    assert!(!out.contains("Running head"));
}

#[test]
fn bare_text_becomes_plain_markdown() {
    let doc = AnnotatedDocument::parse(r#"<div data-label="Text">Hello</div>"#).unwrap();
    let html = rewrite_html(&doc, RewriteOptions::default());
    assert_eq!(html, "<p>Hello</p>");
    assert_eq!(html_to_markdown(&html), "Hello");
}

#[test]
fn article_markdown() {
    let page = process_page(ARTICLE, &page_bitmap(), &config_1000()).unwrap();
    let md = &page.markdown;

    assert!(md.starts_with("# Results"), "markdown:\n{md}");
    assert!(md.contains(r"Revenue grew by \$5 million."));
    assert!(md.contains(&format!("![Growth chart]({})", image_name(ARTICLE, 4))));
    assert!(md.contains("\n$$E = mc^2$$\n"));
    assert!(md.contains("<table>"));
    assert!(md.contains(r#"<tr data-bbox="[0,700,1000,800]"><td>a</td></tr>"#));
    assert!(!md.contains("Proceedings"));
    assert!(!md.contains("\n12"));
}

#[test]
fn table_rows_reach_the_layout() {
    let page = process_page(ARTICLE, &page_bitmap(), &config_1000()).unwrap();
    let table = page.layout.iter().find(|b| b.is_table()).unwrap();
    assert_eq!(table.table_row_bboxes.len(), 2);
    assert_eq!(table.table_row_bboxes[1].0, [0, 1600, 1000, 1800]);
}

#[test]
fn overlay_draws_on_a_copy() {
    let bitmap = page_bitmap();
    let config = LayoutConfig::builder()
        .bbox_scale(1000)
        .draw_overlay(true)
        .build()
        .unwrap();
    let page = process_page(ARTICLE, &bitmap, &config).unwrap();
    let overlay = page.overlay.expect("overlay requested");
    assert_eq!(overlay.dimensions(), (1000, 2000));
    assert_ne!(overlay, bitmap.to_rgb8());
    assert_eq!(bitmap.to_rgb8().get_pixel(0, 0), &Rgb([255, 0, 0]));
}

#[test]
fn malformed_annotations_degrade_gracefully() {
    let html = concat!(
        r#"<div data-label="Text" data-bbox="abc">kept</div>"#,
        r#"<div data-bbox="[1,2,3]">no label</div>"#,
        r#"<div data-label="Figure" data-bbox="[5,5,5,5]"><img></div>"#,
    );
    let page = process_page(html, &page_bitmap(), &config_1000()).unwrap();
    assert_eq!(page.layout.len(), 3);
    assert_eq!(page.layout[0].bbox.0, [0, 0, 1, 1]);
    assert_eq!(page.layout[1].label, "block");
    assert!(page.images.is_empty());
    assert!(page.markdown.contains("kept"));
}

#[test]
fn identical_documents_hash_identically_across_threads() {
    let names: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|_| s.spawn(|| image_name(ARTICLE, 4)))
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });
    assert!(names.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn deeply_nested_blocks_do_not_exhaust_the_stack() {
    let depth = 5_000;
    let html = format!(
        r#"<div data-label="Text" data-bbox="[0,0,500,500]">{}deep{}</div><div data-label="Figure" data-bbox="[500,0,1000,500]"><img src="model.png"></div>"#,
        "<div>".repeat(depth),
        "</div>".repeat(depth),
    );
    let page = process_page(&html, &page_bitmap(), &config_1000()).unwrap();

    assert_eq!(page.layout.len(), 2);
    assert!(page.layout[0].content.contains("deep"));
    assert!(page.html.contains("deep"));
    // Too deep for Markdown; the page degrades instead of failing.
    assert!(page.markdown.is_empty());
    assert_eq!(page.images.len(), 1);
}

// ── Document-level ───────────────────────────────────────────────────────

fn write_png(dir: &std::path::Path) -> std::path::PathBuf {
    let path = dir.join("scan.png");
    page_bitmap().save(&path).unwrap();
    path
}

#[derive(Default)]
struct Recorder {
    started: AtomicUsize,
    completed: AtomicUsize,
    blocks: AtomicUsize,
}

impl ConversionProgressCallback for Recorder {
    fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
        self.started.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_complete(&self, summary: &PageSummary) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.blocks.fetch_add(summary.blocks, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn image_input_converts_as_one_page() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path());

    let recorder = Arc::new(Recorder::default());
    let config = LayoutConfig::builder()
        .bbox_scale(1000)
        .min_image_dim(100)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    let output = convert(&input, vec![ARTICLE.to_string()], &config)
        .await
        .unwrap();
    assert_eq!(output.pages.len(), 1);
    assert_eq!(output.stats.processed_pages, 1);
    assert_eq!(output.stats.total_blocks, 8);
    assert_eq!(output.stats.total_images, 1);
    assert_eq!(output.markdown, output.pages[0].markdown);

    assert_eq!(recorder.started.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.completed.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.blocks.load(Ordering::SeqCst), 8);
}

#[tokio::test]
async fn html_page_count_must_match_selection() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path());

    let err = convert(&input, vec![ARTICLE.into(), ARTICLE.into()], &config_1000())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        LayoutError::PageCountMismatch {
            html_pages: 2,
            rendered_pages: 1
        }
    ));
}

#[tokio::test]
async fn selecting_a_missing_page_fails() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path());
    let config = LayoutConfig::builder()
        .pages(PageSelection::Single(3))
        .page_separator(PageSeparator::HorizontalRule)
        .build()
        .unwrap();

    let err = convert(&input, vec![], &config).await.unwrap_err();
    assert!(matches!(err, LayoutError::PageOutOfRange { total: 1, .. }));
}

#[tokio::test]
async fn unsupported_input_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("notes.txt");
    std::fs::write(&input, "just text").unwrap();

    let err = convert(&input, vec![ARTICLE.into()], &config_1000())
        .await
        .unwrap_err();
    assert!(matches!(err, LayoutError::UnsupportedInput { .. }));
}

#[tokio::test]
async fn convert_to_dir_saves_artefacts() {
    let dir = tempfile::tempdir().unwrap();
    let input = write_png(dir.path());
    let out_dir = dir.path().join("out");
    let config = LayoutConfig::builder()
        .bbox_scale(1000)
        .draw_overlay(true)
        .build()
        .unwrap();

    convert_to_dir(&input, vec![ARTICLE.into()], &out_dir, &config)
        .await
        .unwrap();

    let md = std::fs::read_to_string(out_dir.join("scan.md")).unwrap();
    let name = image_name(ARTICLE, 4);
    assert!(md.contains(&name));
    assert!(out_dir.join(&name).exists());
    assert!(out_dir.join("scan.html").exists());
    assert!(out_dir.join("scan_page1_overlay.png").exists());

    let layout: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(out_dir.join("scan_layout.json")).unwrap())
            .unwrap();
    assert_eq!(layout[0]["blocks"].as_array().unwrap().len(), 8);
}
