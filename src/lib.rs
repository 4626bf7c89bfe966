//! # ocr-batch
//!
//! Turn a folder tree of PDFs into searchable, ingest-friendly PDFs.
//!
//! ## Why this crate?
//!
//! Running an OCR engine over an arbitrary archive works until it meets the
//! documents some generators produce: broken text layers, odd fonts, object
//! streams older servers reject. This crate decides per file whether the PDF
//! can be OCR'd as-is or must first be flattened to page images and rebuilt,
//! OCRs long documents in bounded chunks, puts the bookmarks back, and
//! rewrites the result as PDF 1.4 with downsampled images.
//!
//! ## Pipeline Overview
//!
//! ```text
//! source tree
//!  │
//!  ├─ 1. Discover   every *.pdf, mirrored under the destination; existing outputs skipped
//!  ├─ 2. Classify   /Producer + page count → direct | raster-rebuild
//!  ├─ 3a. Direct    ocrmypdf on the whole file
//!  ├─ 3b. Rebuild   pdfium → JPEG per page → image-only PDF → chunks → ocrmypdf each
//!  │               → recombine → copy bookmarks from the source
//!  ├─ 4. Normalize  Ghostscript pdfwrite, PDF 1.4, downsampled images
//!  └─ 5. Publish    <output>.partial then rename; per-file report
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ocr_batch::{process_tree, PipelineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .ocr_languages(["eng"])
//!         .chunk_size(20)
//!         .build()?;
//!     let report = process_tree("archive/", "processed/", &config).await?;
//!     eprintln!(
//!         "{} converted, {} partial, {} skipped, {} failed",
//!         report.stats.converted,
//!         report.stats.partial,
//!         report.stats.skipped,
//!         report.stats.failed
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## External tools
//!
//! | Engine | Default | Override |
//! |--------|---------|----------|
//! | Page renderer | pdfium (`PDFIUM_LIB_PATH` or system library) | [`PipelineConfigBuilder::renderer`] |
//! | Recognition | `ocrmypdf` on `PATH` | [`PipelineConfigBuilder::recognizer`] |
//! | Compressor | `gs` on `PATH` | [`PipelineConfigBuilder::compressor`] |
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-batch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! ocr-batch = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod convert;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{discover, process_tree, process_tree_sync, DiscoveredFile};
pub use config::{
    ClassifierOptions, DownsampleFilter, NormalizeOptions, OcrFailurePolicy, OcrOptions,
    PipelineConfig, PipelineConfigBuilder, RasterOptions,
};
pub use convert::{check_tools, convert_file, inspect, Engines};
pub use error::{ChunkError, PipelineError};
pub use output::{
    BatchReport, BatchStats, DocumentMetadata, FileReport, FileStatus, Inspection, Route,
};
pub use pipeline::normalize::{Compressor, Ghostscript};
pub use pipeline::ocr::{OcrMyPdf, Recognizer};
pub use pipeline::outline::OutlineNode;
pub use pipeline::render::{PageRenderer, PdfiumRenderer, RenderSession};
pub use progress::{NoopProgressCallback, PipelineProgressCallback, ProgressCallback, Stage};
