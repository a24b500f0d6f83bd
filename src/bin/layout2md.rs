//! CLI binary for layout2md.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `LayoutConfig` and prints or saves results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use layout2md::{
    convert, convert_to_dir, ConversionProgressCallback, LayoutConfig, PageSelection,
    PageSeparator, PageSummary, ProgressCallback, DEFAULT_BBOX_SCALE,
};
use std::collections::HashMap;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar plus one log line per finished page. Pages can finish
/// out of order.
struct CliProgressCallback {
    bar: ProgressBar,
    start_times: Mutex<HashMap<usize, Instant>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until `on_conversion_start` tells us the page count.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Rendering pages…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            start_times: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn elapsed_secs(&self, page_num: usize) -> f64 {
        self.start_times
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&page_num))
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }
}

impl ConversionProgressCallback for CliProgressCallback {
    fn on_conversion_start(&self, total_pages: usize) {
        self.activate_bar(total_pages);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_pages} pages…"))
        ));
    }

    fn on_page_start(&self, page_num: usize, _total: usize) {
        if let Ok(mut m) = self.start_times.lock() {
            m.insert(page_num, Instant::now());
        }
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, summary: &PageSummary) {
        let elapsed = self.elapsed_secs(summary.page_num);
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            green("✓"),
            summary.page_num,
            summary.total_pages,
            dim(&format!(
                "{:>3} blocks {:>2} images {:>6} chars",
                summary.blocks, summary.images, summary.markdown_len
            )),
            dim(&format!("{elapsed:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, page_num: usize, total: usize, error: &str) {
        let elapsed = self.elapsed_secs(page_num);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(['…']).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}  {}",
            red("✗"),
            page_num,
            total,
            red(&msg),
            dim(&format!("{elapsed:.2}s")),
        ));
        self.bar.inc(1);
    }

    fn on_conversion_complete(&self, total_pages: usize, success_count: usize) {
        let failed = total_pages.saturating_sub(success_count);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} pages converted successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} pages converted  ({} failed)",
                if failed == total_pages {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_pages,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # One annotated page of a scanned image, Markdown to stdout
  layout2md scan.png --html scan.html

  # First three pages of a PDF, all artefacts into out/
  layout2md paper.pdf --pages 1-3 --html p1.html p2.html p3.html -o out/

  # Keep running headers/footers, draw debug overlays
  layout2md paper.pdf --html page*.html --include-headers-footers --overlay -o out/

  # Layout blocks as JSON
  layout2md scan.png --html scan.html --json

OUTPUT FILES (with -o DIR, STEM = input file name without extension):
  STEM.md                    assembled Markdown
  STEM.html                  filtered HTML, one page fragment per line
  STEM_layout.json           [{page_num, blocks: [{bbox, label, content}]}]
  <hash>_<block>_img.webp    figure crops, referenced from the Markdown
  STEM_pageN_overlay.png     layout overlays (with --overlay)

ENVIRONMENT VARIABLES:
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Log filter, overrides -v / -q
"#;

/// Convert layout-annotated HTML into clean HTML, Markdown and figure crops.
#[derive(Parser, Debug)]
#[command(
    name = "layout2md",
    version,
    about = "Convert layout-annotated HTML into clean HTML, Markdown and figure crops",
    long_about = "Takes a PDF or image plus the layout-annotated HTML a document model produced \
for each page (top-level elements carrying data-label and data-bbox), and writes clean HTML, \
Markdown, the layout as JSON, and crops of every figure.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// PDF or image file the annotations refer to.
    input: PathBuf,

    /// Annotated HTML, one file per selected page, in page order.
    #[arg(long, required = true, num_args = 1..)]
    html: Vec<PathBuf>,

    /// Save all artefacts into this directory instead of printing Markdown.
    #[arg(short, long, env = "LAYOUT2MD_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Page selection: all, 5, 3-15, or 1,3,5-7.
    #[arg(long, env = "LAYOUT2MD_PAGES", default_value = "all")]
    pages: String,

    /// Keep Page-Header and Page-Footer blocks.
    #[arg(long, env = "LAYOUT2MD_INCLUDE_HEADERS_FOOTERS")]
    include_headers_footers: bool,

    /// Drop Image and Figure blocks from HTML and Markdown.
    #[arg(long, env = "LAYOUT2MD_NO_IMAGES")]
    no_images: bool,

    /// Side of the logical grid the data-bbox values use.
    #[arg(long, env = "LAYOUT2MD_BBOX_SCALE", default_value_t = DEFAULT_BBOX_SCALE,
          value_parser = clap::value_parser!(u32).range(1..))]
    bbox_scale: u32,

    /// Minimum rendering DPI for PDF pages (72–600).
    #[arg(long, env = "LAYOUT2MD_DPI", default_value_t = 192,
          value_parser = clap::value_parser!(u32).range(72..=600))]
    dpi: u32,

    /// Draw layout overlays (saved with -o, which it requires).
    #[arg(long, env = "LAYOUT2MD_OVERLAY", requires = "output_dir")]
    overlay: bool,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, env = "LAYOUT2MD_SEPARATOR", default_value = "none")]
    separator: String,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "LAYOUT2MD_PASSWORD")]
    password: Option<String>,

    /// Pages processed in parallel (default: number of CPUs).
    #[arg(short, long, env = "LAYOUT2MD_CONCURRENCY")]
    concurrency: Option<usize>,

    /// Print the layout as JSON instead of Markdown.
    #[arg(long, env = "LAYOUT2MD_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "LAYOUT2MD_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "LAYOUT2MD_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "LAYOUT2MD_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose asks for them.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Read annotated pages ─────────────────────────────────────────────
    let mut html_pages = Vec::with_capacity(cli.html.len());
    for path in &cli.html {
        let html = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read annotated HTML {:?}", path))?;
        html_pages.push(html);
    }

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn ConversionProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Run conversion ───────────────────────────────────────────────────
    if let Some(ref dir) = cli.output_dir {
        let output = convert_to_dir(&cli.input, html_pages, dir, &config)
            .await
            .context("Conversion failed")?;

        if !cli.quiet {
            let stats = &output.stats;
            eprintln!(
                "{}  {}/{} pages  {} blocks  {} images  {}ms  →  {}",
                if stats.failed_pages == 0 {
                    green("✔")
                } else {
                    cyan("⚠")
                },
                stats.processed_pages,
                stats.total_pages,
                stats.total_blocks,
                stats.total_images,
                stats.duration_ms,
                bold(&dir.display().to_string()),
            );
        }
    } else {
        let output = convert(&cli.input, html_pages, &config)
            .await
            .context("Conversion failed")?;

        let stdout = io::stdout();
        let mut handle = stdout.lock();
        let text = if cli.json {
            output.layout_json().context("Failed to serialise layout")?
        } else {
            output.markdown.clone()
        };
        handle
            .write_all(text.as_bytes())
            .context("Failed to write to stdout")?;
        if !text.ends_with('\n') {
            handle.write_all(b"\n").ok();
        }

        if !cli.quiet && !show_progress {
            eprintln!(
                "Converted {}/{} pages in {}ms",
                output.stats.processed_pages, output.stats.total_pages, output.stats.duration_ms
            );
            if output.stats.failed_pages > 0 {
                eprintln!("  {} pages failed", output.stats.failed_pages);
            }
        }
    }

    Ok(())
}

/// Map CLI args to `LayoutConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<LayoutConfig> {
    let pages: PageSelection = cli
        .pages
        .parse()
        .with_context(|| format!("Invalid --pages value '{}'", cli.pages))?;

    let mut builder = LayoutConfig::builder()
        .bbox_scale(cli.bbox_scale)
        .include_headers_footers(cli.include_headers_footers)
        .include_images(!cli.no_images)
        .image_dpi(cli.dpi)
        .draw_overlay(cli.overlay)
        .pages(pages)
        .page_separator(parse_separator(&cli.separator));

    if let Some(n) = cli.concurrency {
        builder = builder.concurrency(n);
    }
    if let Some(ref pwd) = cli.password {
        builder = builder.password(pwd.clone());
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn separator_parsing() {
        assert_eq!(parse_separator("HR"), PageSeparator::HorizontalRule);
        assert_eq!(parse_separator("comment"), PageSeparator::Comment);
        assert_eq!(
            parse_separator("* * *"),
            PageSeparator::Custom("* * *".into())
        );
    }

    #[test]
    fn cli_maps_to_config() {
        let cli = Cli::parse_from([
            "layout2md",
            "doc.pdf",
            "--html",
            "a.html",
            "b.html",
            "--pages",
            "2-3",
            "--no-images",
            "--bbox-scale",
            "1000",
        ]);
        assert_eq!(cli.html.len(), 2);
        let config = build_config(&cli, None).unwrap();
        assert_eq!(config.pages, PageSelection::Range(2, 3));
        assert!(!config.include_images);
        assert_eq!(config.bbox_scale, 1000);
    }

    #[test]
    fn overlay_needs_an_output_dir() {
        let err = Cli::try_parse_from(["layout2md", "doc.pdf", "--html", "a.html", "--overlay"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "layout2md", "doc.pdf", "--html", "a.html", "--overlay", "-o", "out",
        ])
        .unwrap();
        assert!(cli.overlay);
    }
}
