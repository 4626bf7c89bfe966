//! CLI binary for ocr-batch.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `PipelineConfig`, renders progress and prints the batch summary.

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use indicatif::{ProgressBar, ProgressStyle};
use ocr_batch::{
    discover, inspect, process_tree, BatchReport, BatchStats, DownsampleFilter, FileReport,
    FileStatus, OcrFailurePolicy, PipelineConfig, PipelineProgressCallback, ProgressCallback,
    Stage,
};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

const SPINNER: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over the discovered files, a status
/// message for the current stage, and a log line per finished file.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(SPINNER);
        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Looking for PDFs…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }

    fn short_name(path: &Path) -> String {
        path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string())
    }
}

impl PipelineProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(SPINNER);

        self.bar.set_length(total_files as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Processing");
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Found {total_files} PDF file(s)"))
        ));
    }

    fn on_file_start(&self, _file_num: usize, _total: usize, source: &Path) {
        self.bar.set_message(Self::short_name(source));
    }

    fn on_file_skipped(&self, file_num: usize, total: usize, output: &Path) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            dim("↷"),
            file_num,
            total,
            Self::short_name(output),
            dim("already processed"),
        ));
        self.bar.inc(1);
    }

    fn on_stage(&self, source: &Path, stage: Stage) {
        self.bar
            .set_message(format!("{}  {}", Self::short_name(source), dim(&stage.to_string())));
    }

    fn on_file_complete(&self, file_num: usize, total: usize, report: &FileReport) {
        let route = report.route.map(|r| r.to_string()).unwrap_or_default();
        let (mark, note) = match report.status {
            FileStatus::Partial => (
                yellow("⚠"),
                yellow(&format!("{} chunk(s) not recognised", report.ocr_errors.len())),
            ),
            _ => (green("✓"), String::new()),
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}  {}  {}",
            mark,
            file_num,
            total,
            Self::short_name(&report.source),
            dim(&route),
            dim(&format!("{:.1}s", report.duration_ms as f64 / 1000.0)),
            note,
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, file_num: usize, total: usize, source: &Path, error: &str) {
        let first_line = error.lines().next().unwrap_or(error);
        let msg = if first_line.chars().count() > 100 {
            format!("{}\u{2026}", first_line.chars().take(99).collect::<String>())
        } else {
            first_line.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3} {}  {}",
            red("✗"),
            file_num,
            total,
            Self::short_name(source),
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, _stats: &BatchStats) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Process a tree; outputs mirror the source layout
  ocr-batch ./archive ./processed

  # English only, larger chunks, stop a file on the first OCR failure
  ocr-batch ./archive ./processed --languages eng --chunk-size 25 --on-ocr-failure abort

  # See which files would be rasterised and rebuilt
  ocr-batch ./archive ./processed --inspect-only

  # Machine-readable report
  ocr-batch ./archive ./processed --json > report.json

ROUTING:
  A file whose /Producer contains one of --producers (case-sensitive) and has
  at least --min-pages pages is rasterised, rebuilt from page images, OCR'd in
  chunks of --chunk-size pages, and gets its bookmarks copied back from the
  source. Everything else is OCR'd directly. Both paths finish with a
  Ghostscript pass to PDF 1.4.

  Existing outputs are never overwritten: re-running the same command only
  processes files that have not been published yet.

REQUIREMENTS:
  ocrmypdf      with the tesseract language packs for --languages
  gs            Ghostscript
  libpdfium     for the raster-rebuild path; set PDFIUM_LIB_PATH or --pdfium-lib

ENVIRONMENT VARIABLES:
  Every option can also be set as OCR_BATCH_<OPTION>, e.g. OCR_BATCH_CHUNK_SIZE=20.
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
  RUST_LOG                Override the log filter (e.g. ocr_batch=debug)
"#;

/// Batch-OCR a folder tree of PDFs into searchable PDF 1.4 files.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-batch",
    version,
    about = "Batch-OCR a folder tree of PDFs into searchable PDF 1.4 files",
    long_about = "Walk SOURCE for PDF files and write a searchable, normalised copy of each to the \
mirrored path under DESTINATION. Documents from producers known to emit problematic text layers \
are flattened to images and rebuilt before OCR; bookmarks are restored afterwards.",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// SOURCE and DESTINATION folders.
    #[arg(value_name = "SOURCE DESTINATION")]
    paths: Vec<PathBuf>,

    /// Producer substrings that trigger the raster-rebuild path (comma separated).
    #[arg(long, env = "OCR_BATCH_PRODUCERS", value_delimiter = ',',
          default_value = "TCPDF,ReportLab,GPL")]
    producers: Vec<String>,

    /// Minimum page count before a matching document is rebuilt.
    #[arg(long, env = "OCR_BATCH_MIN_PAGES", default_value_t = 5)]
    min_pages: usize,

    /// Render scale relative to the page size in points.
    #[arg(long, env = "OCR_BATCH_ZOOM", default_value_t = 5.0)]
    zoom: f32,

    /// Largest width or height of a page image, in pixels.
    #[arg(long, env = "OCR_BATCH_MAX_DIMENSION", default_value_t = 2000)]
    max_dimension: u32,

    /// Refuse to render pages whose bitmap exceeds this many pixels.
    #[arg(long, env = "OCR_BATCH_MAX_RENDER_PIXELS", default_value_t = 933_120_000)]
    max_render_pixels: u64,

    /// Disable the render pixel limit.
    #[arg(long, env = "OCR_BATCH_NO_PIXEL_LIMIT")]
    no_pixel_limit: bool,

    /// JPEG quality for colour pages (1–100).
    #[arg(long, env = "OCR_BATCH_COLOR_QUALITY", default_value_t = 100,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    color_quality: u8,

    /// JPEG quality for grayscale pages (1–100).
    #[arg(long, env = "OCR_BATCH_GRAY_QUALITY", default_value_t = 50,
          value_parser = clap::value_parser!(u8).range(1..=100))]
    gray_quality: u8,

    /// Store pages that render without colour as single-channel JPEGs.
    /// By default every rendered page is kept in colour.
    #[arg(long, env = "OCR_BATCH_DETECT_GRAYSCALE")]
    detect_grayscale: bool,

    /// Pages per OCR chunk on the raster-rebuild path.
    #[arg(long, env = "OCR_BATCH_CHUNK_SIZE", default_value_t = 10,
          value_parser = clap::value_parser!(u64).range(1..))]
    chunk_size: u64,

    /// OCR languages (comma or '+' separated tesseract codes).
    #[arg(short, long, env = "OCR_BATCH_LANGUAGES", value_delimiter = ',',
          default_value = "eng,hin")]
    languages: Vec<String>,

    /// ocrmypdf optimisation level (0–3).
    #[arg(long, env = "OCR_BATCH_OCR_LEVEL", default_value_t = 3,
          value_parser = clap::value_parser!(u8).range(0..=3))]
    ocr_level: u8,

    /// Worker processes per ocrmypdf invocation.
    #[arg(short, long, env = "OCR_BATCH_JOBS", default_value_t = 4)]
    jobs: usize,

    /// What to do when OCR fails on a chunk or file.
    #[arg(long, env = "OCR_BATCH_ON_OCR_FAILURE", value_enum, default_value = "continue")]
    on_ocr_failure: FailureArg,

    /// Image downsampling method for the final Ghostscript pass.
    #[arg(long, env = "OCR_BATCH_DOWNSAMPLE", value_enum, default_value = "bicubic")]
    downsample: DownsampleArg,

    /// Target image resolution of the final pass, in dpi (72–2400).
    #[arg(long, env = "OCR_BATCH_RESOLUTION", default_value_t = 300,
          value_parser = clap::value_parser!(u32).range(72..=2400))]
    resolution: u32,

    /// Embed all fonts in the final output.
    #[arg(long, env = "OCR_BATCH_EMBED_FONTS")]
    embed_fonts: bool,

    /// Per-invocation timeout for ocrmypdf and gs in seconds (0 = none).
    #[arg(long, env = "OCR_BATCH_TOOL_TIMEOUT", default_value_t = 3600)]
    tool_timeout: u64,

    /// Parent directory for per-file working directories.
    #[arg(long, env = "OCR_BATCH_WORK_ROOT")]
    work_root: Option<PathBuf>,

    /// ocrmypdf executable.
    #[arg(long, env = "OCR_BATCH_OCRMYPDF", default_value = "ocrmypdf")]
    ocrmypdf: PathBuf,

    /// Ghostscript executable.
    #[arg(long, env = "OCR_BATCH_GS", default_value = "gs")]
    gs: PathBuf,

    /// Path to libpdfium (file or directory).
    #[arg(long, env = "OCR_BATCH_PDFIUM_LIB")]
    pdfium_lib: Option<PathBuf>,

    /// Classify files and print the route, no conversion.
    #[arg(long)]
    inspect_only: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "OCR_BATCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCR_BATCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_BATCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR_BATCH_QUIET")]
    quiet: bool,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum FailureArg {
    Continue,
    Abort,
}

impl From<FailureArg> for OcrFailurePolicy {
    fn from(v: FailureArg) -> Self {
        match v {
            FailureArg::Continue => OcrFailurePolicy::Continue,
            FailureArg::Abort => OcrFailurePolicy::Abort,
        }
    }
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
enum DownsampleArg {
    Subsample,
    Average,
    Bicubic,
}

impl From<DownsampleArg> for DownsampleFilter {
    fn from(v: DownsampleArg) -> Self {
        match v {
            DownsampleArg::Subsample => DownsampleFilter::Subsample,
            DownsampleArg::Average => DownsampleFilter::Average,
            DownsampleArg::Bicubic => DownsampleFilter::Bicubic,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let [source, dest] = cli.paths.as_slice() else {
        Cli::command()
            .print_help()
            .context("Failed to print usage")?;
        println!();
        return Ok(());
    };

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.inspect_only;
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

    // ── Inspect-only mode ────────────────────────────────────────────────
    if cli.inspect_only {
        let config = build_config(&cli, None)?;
        return run_inspect(source, dest, &config, cli.json).await;
    }

    // ── Run batch ────────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn PipelineProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    let report = process_tree(source, dest, &config)
        .await
        .with_context(|| format!("Batch over '{}' failed", source.display()))?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report);
    }

    if !report.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Map CLI args to `PipelineConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<PipelineConfig> {
    let languages: Vec<String> = cli
        .languages
        .iter()
        .flat_map(|l| l.split('+'))
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .collect();

    let mut builder = PipelineConfig::builder()
        .untrusted_producers(cli.producers.iter().map(|p| p.trim().to_string()))
        .min_reroute_pages(cli.min_pages)
        .zoom(cli.zoom)
        .max_image_dimension(cli.max_dimension)
        .max_render_pixels((!cli.no_pixel_limit).then_some(cli.max_render_pixels))
        .color_quality(cli.color_quality)
        .gray_quality(cli.gray_quality)
        .detect_grayscale(cli.detect_grayscale)
        .chunk_size(cli.chunk_size as usize)
        .ocr_languages(languages)
        .ocr_optimize_level(cli.ocr_level)
        .ocr_jobs(cli.jobs)
        .ocr_failure_policy(cli.on_ocr_failure.into())
        .downsample_filter(cli.downsample.into())
        .target_resolution(cli.resolution)
        .embed_fonts(cli.embed_fonts)
        .tool_timeout_secs(Some(cli.tool_timeout))
        .ocrmypdf_binary(&cli.ocrmypdf)
        .ghostscript_binary(&cli.gs);

    if let Some(ref root) = cli.work_root {
        builder = builder.work_root(root);
    }
    if let Some(ref lib) = cli.pdfium_lib {
        builder = builder.pdfium_library_path(lib);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn run_inspect(source: &Path, dest: &Path, config: &PipelineConfig, json: bool) -> Result<()> {
    let files = discover(source, dest)
        .with_context(|| format!("Failed to scan '{}'", source.display()))?;

    let mut inspections = Vec::with_capacity(files.len());
    for file in &files {
        match inspect(&file.source, config).await {
            Ok(i) => inspections.push(i),
            Err(e) => eprintln!("{} {}: {}", red("✗"), file.source.display(), e),
        }
    }

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&inspections).context("Failed to serialize inspections")?
        );
        return Ok(());
    }

    for i in &inspections {
        let producer = i
            .metadata
            .as_ref()
            .and_then(|m| m.producer.clone())
            .unwrap_or_else(|| "-".into());
        let pages = i
            .metadata
            .as_ref()
            .map(|m| m.page_count.to_string())
            .unwrap_or_else(|| "?".into());
        println!(
            "{:<15} {:>5} pages  {:>4} bookmarks  {}  {}",
            i.route.to_string(),
            pages,
            i.outline_entries,
            i.source.display(),
            dim(&producer),
        );
    }
    Ok(())
}

fn print_summary(report: &BatchReport) {
    let s = &report.stats;
    let mark = if s.failed > 0 {
        red("✘")
    } else if s.partial > 0 {
        yellow("⚠")
    } else {
        green("✔")
    };
    eprintln!(
        "{}  {} converted, {} partial, {} skipped, {} failed  {}",
        mark,
        bold(&s.converted.to_string()),
        s.partial,
        s.skipped,
        s.failed,
        dim(&format!("{}ms", s.total_duration_ms)),
    );

    for file in &report.files {
        match file.status {
            FileStatus::Partial => {
                eprintln!("   {} {}", yellow("partial"), file.source.display());
                for e in &file.ocr_errors {
                    eprintln!("      {}", dim(&e.to_string()));
                }
            }
            FileStatus::Failed => eprintln!(
                "   {} {}: {}",
                red("failed"),
                file.source.display(),
                file.error.as_deref().unwrap_or("unknown error")
            ),
            FileStatus::Converted | FileStatus::Skipped => {}
        }
    }
}
