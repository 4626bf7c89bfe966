//! Result types returned by the orchestrator.

use crate::error::ChunkError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Processing route chosen once per file by the producer classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Route {
    /// OCR the document as-is.
    Direct,
    /// Flatten pages to images, rebuild, OCR in chunks, restore bookmarks.
    RasterRebuild,
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Route::Direct => f.write_str("direct"),
            Route::RasterRebuild => f.write_str("raster-rebuild"),
        }
    }
}

/// Metadata read from a PDF's trailer `/Info` dictionary and page tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub producer: Option<String>,
    pub title: Option<String>,
    pub page_count: usize,
    pub pdf_version: String,
}

/// Final state of one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileStatus {
    /// Fully processed and published.
    Converted,
    /// Published, but at least one recognition call failed.
    Partial,
    /// Output already existed; nothing was done.
    Skipped,
    /// Processing stopped with a [`crate::error::PipelineError`].
    Failed,
}

/// Per-file outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub output: PathBuf,
    pub status: FileStatus,
    /// `None` for skipped files and files that failed before classification.
    pub route: Option<Route>,
    /// Page count of the published document.
    pub page_count: Option<usize>,
    /// Number of OCR chunks (1 on the direct path).
    pub chunks: usize,
    /// Outline entries written by the bookmark reconciler (raster path only).
    pub bookmarks: Option<usize>,
    /// Recognition failures tolerated under the `Continue` policy.
    pub ocr_errors: Vec<ChunkError>,
    /// Fatal error message for `Failed` files.
    pub error: Option<String>,
    pub duration_ms: u64,
}

impl FileReport {
    pub(crate) fn skipped(source: PathBuf, output: PathBuf) -> Self {
        Self {
            source,
            output,
            status: FileStatus::Skipped,
            route: None,
            page_count: None,
            chunks: 0,
            bookmarks: None,
            ocr_errors: Vec::new(),
            error: None,
            duration_ms: 0,
        }
    }

    pub(crate) fn failed(source: PathBuf, output: PathBuf, error: String, duration_ms: u64) -> Self {
        Self {
            status: FileStatus::Failed,
            error: Some(error),
            duration_ms,
            ..Self::skipped(source, output)
        }
    }
}

/// Aggregate counters for a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub discovered: usize,
    pub converted: usize,
    pub partial: usize,
    pub skipped: usize,
    pub failed: usize,
    pub total_duration_ms: u64,
}

impl BatchStats {
    pub(crate) fn record(&mut self, status: FileStatus) {
        match status {
            FileStatus::Converted => self.converted += 1,
            FileStatus::Partial => self.partial += 1,
            FileStatus::Skipped => self.skipped += 1,
            FileStatus::Failed => self.failed += 1,
        }
    }
}

/// Everything a batch run produced.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    pub files: Vec<FileReport>,
    pub stats: BatchStats,
}

impl BatchReport {
    /// True when no file failed (partial files still count as success).
    pub fn is_success(&self) -> bool {
        self.stats.failed == 0
    }
}

/// Dry-run classification of one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Inspection {
    pub source: PathBuf,
    /// `None` when the metadata could not be read.
    pub metadata: Option<DocumentMetadata>,
    pub route: Route,
    /// Total number of outline entries, `0` when the document has none.
    pub outline_entries: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stats_record_each_status() {
        let mut stats = BatchStats::default();
        for s in [
            FileStatus::Converted,
            FileStatus::Converted,
            FileStatus::Partial,
            FileStatus::Skipped,
            FileStatus::Failed,
        ] {
            stats.record(s);
        }
        assert_eq!(stats.converted, 2);
        assert_eq!(stats.partial, 1);
        assert_eq!(stats.skipped, 1);
        assert_eq!(stats.failed, 1);
    }

    #[test]
    fn route_serialises_kebab_case() {
        let json = serde_json::to_string(&Route::RasterRebuild).unwrap();
        assert_eq!(json, "\"raster-rebuild\"");
    }
}
