//! Error types for the ocr-batch library.
//!
//! Two error types cover two failure scopes:
//!
//! * [`PipelineError`]: **fatal** for the file being processed (corrupt
//!   input, rasterisation failure, a dropped chunk, a bookmark that points
//!   past the end of the rebuilt document). When it comes out of batch setup
//!   (engine binding, missing tools, bad source root) it is fatal for the
//!   whole run.
//!
//! * [`ChunkError`]: **non-fatal** recognition failure on a single chunk or
//!   file. Under [`crate::config::OcrFailurePolicy::Continue`] it is stored in
//!   [`crate::output::FileReport::ocr_errors`] and the file finishes as
//!   [`crate::output::FileStatus::Partial`].

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the ocr-batch library.
#[derive(Debug, Error)]
pub enum PipelineError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file has a `.pdf` name but does not start with `%PDF`.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    /// The source root handed to the batch is not a directory.
    #[error("Source folder '{path}' does not exist or is not a directory")]
    SourceNotADirectory { path: PathBuf },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF structure could not be parsed or written.
    #[error("PDF '{path}' is corrupt: {detail}")]
    CorruptPdf { path: PathBuf, detail: String },

    /// The rendering engine failed on a specific page (1-based).
    #[error("Rasterisation failed for page {page}: {detail}")]
    RasterisationFailed { page: usize, detail: String },

    /// A page would render to a bitmap larger than the configured pixel limit.
    #[error("Page {page} would render to {width}x{height} px, above the {limit} pixel limit")]
    PixelLimitExceeded {
        page: usize,
        width: u64,
        height: u64,
        limit: u64,
    },

    /// A page image could not be read, decoded or encoded.
    #[error("Image '{path}' is unusable: {detail}")]
    InvalidImage { path: PathBuf, detail: String },

    /// Rebuilding a document from page images failed.
    #[error("Failed to rebuild PDF from images: {detail}")]
    RebuildFailed { detail: String },

    // ── Chunk / combine errors ────────────────────────────────────────────
    /// Chunk indices handed to the combiner are not exactly `1..=n`.
    #[error("Chunk sequence is broken: expected chunk {expected}, found {found}")]
    ChunkSequenceBroken { expected: usize, found: usize },

    /// A combined document lost or gained pages.
    #[error("Page count mismatch in {context}: expected {expected}, found {actual}")]
    PageCountMismatch {
        context: String,
        expected: usize,
        actual: usize,
    },

    // ── Outline errors ────────────────────────────────────────────────────
    /// A source bookmark targets a page the destination does not have.
    #[error("Bookmark '{title}' targets page index {page_index} but the destination has {page_count} pages")]
    BookmarkOutOfRange {
        title: String,
        page_index: usize,
        page_count: usize,
    },

    // ── External tool errors ──────────────────────────────────────────────
    /// Recognition failed and the failure policy is `Abort`.
    #[error("Text recognition failed for '{path}': {detail}")]
    RecognitionFailed { path: PathBuf, detail: String },

    /// An external binary is not on `PATH`.
    #[error("Required tool '{tool}' was not found.\n{hint}")]
    ToolNotFound { tool: String, hint: String },

    /// An external binary exited unsuccessfully.
    #[error("{tool} exited with {status}: {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    /// An external binary ran past the per-invocation timeout and was killed.
    #[error("{tool} timed out after {secs}s")]
    ToolTimedOut { tool: String, secs: u64 },

    // ── I/O errors ────────────────────────────────────────────────────────
    /// Filesystem operation failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Set PDFIUM_LIB_PATH=/path/to/libpdfium (or pass --pdfium-lib) to use a specific copy,\n\
or install libpdfium where the system loader can find it.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl PipelineError {
    /// Wrap an [`std::io::Error`] with the path it concerns.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        PipelineError::Io {
            path: path.into(),
            source,
        }
    }

    /// Wrap an [`lopdf::Error`] raised while handling `path`.
    pub fn pdf(path: impl Into<PathBuf>, err: impl std::fmt::Display) -> Self {
        PipelineError::CorruptPdf {
            path: path.into(),
            detail: err.to_string(),
        }
    }
}

/// A non-fatal recognition failure.
///
/// `chunk` is the 1-based chunk index, or `None` when the whole file was
/// recognised in one call (direct path).
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("{}: text recognition failed: {detail}", chunk.map(|c| format!("Chunk {c}")).unwrap_or_else(|| "Document".to_string()))]
pub struct ChunkError {
    pub chunk: Option<usize>,
    pub detail: String,
}
