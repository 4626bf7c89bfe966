//! Progress-callback trait for per-file and per-stage batch events.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the tree. The library itself only logs
//! through `tracing`; the callback is how a host renders a progress bar or
//! forwards events elsewhere.
//!
//! # Example
//!
//! ```rust
//! use ocr_batch::{FileReport, PipelineConfig, PipelineProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     finished: AtomicUsize,
//! }
//!
//! impl PipelineProgressCallback for CountingCallback {
//!     fn on_file_complete(&self, file_num: usize, total_files: usize, report: &FileReport) {
//!         self.finished.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("{}/{} {:?}", file_num, total_files, report.status);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { finished: AtomicUsize::new(0) });
//!
//! let config = PipelineConfig::builder()
//!     .progress_callback(counter as Arc<dyn PipelineProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::output::{BatchStats, FileReport, Route};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// One step of the per-file state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Stage {
    /// Metadata read and route decided.
    Classified(Route),
    /// Rendering pages to JPEG (raster-rebuild path).
    Rasterizing,
    /// Assembling a fresh PDF from page images.
    Rebuilding,
    /// Splitting into OCR chunks.
    Splitting,
    /// Running the recognition engine. `chunk` is `None` on the direct path.
    Recognizing { chunk: Option<usize>, of: usize },
    /// Concatenating recognised chunks.
    Combining,
    /// Copying the source outline onto the rebuilt document.
    Reconciling,
    /// Running the compatibility compressor.
    Normalizing,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Classified(route) => write!(f, "classified ({route})"),
            Stage::Rasterizing => f.write_str("rasterizing"),
            Stage::Rebuilding => f.write_str("rebuilding"),
            Stage::Splitting => f.write_str("splitting"),
            Stage::Recognizing { chunk: Some(c), of } => write!(f, "OCR chunk {c}/{of}"),
            Stage::Recognizing { chunk: None, .. } => f.write_str("OCR"),
            Stage::Combining => f.write_str("combining"),
            Stage::Reconciling => f.write_str("restoring bookmarks"),
            Stage::Normalizing => f.write_str("normalizing"),
        }
    }
}

/// Called by the orchestrator as it processes each file.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Files are processed one at a time, but the trait is
/// `Send + Sync` so implementations can be shared with other threads.
pub trait PipelineProgressCallback: Send + Sync {
    /// Called once after discovery, before any file is processed.
    fn on_batch_start(&self, total_files: usize) {
        let _ = total_files;
    }

    /// Called when work on a file begins (1-indexed `file_num`).
    fn on_file_start(&self, file_num: usize, total_files: usize, source: &Path) {
        let _ = (file_num, total_files, source);
    }

    /// Called when a file is skipped because its output already exists.
    fn on_file_skipped(&self, file_num: usize, total_files: usize, output: &Path) {
        let _ = (file_num, total_files, output);
    }

    /// Called as a file enters each pipeline stage.
    fn on_stage(&self, source: &Path, stage: Stage) {
        let _ = (source, stage);
    }

    /// Called when a file finishes, fully or partially recognised.
    fn on_file_complete(&self, file_num: usize, total_files: usize, report: &FileReport) {
        let _ = (file_num, total_files, report);
    }

    /// Called when a file fails.
    fn on_file_error(&self, file_num: usize, total_files: usize, source: &Path, error: &str) {
        let _ = (file_num, total_files, source, error);
    }

    /// Called once after every discovered file has been attempted.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
///
/// This is the default when no callback is configured.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct StageRecorder {
        stages: Mutex<Vec<Stage>>,
    }

    impl PipelineProgressCallback for StageRecorder {
        fn on_stage(&self, _source: &Path, stage: Stage) {
            self.stages.lock().unwrap().push(stage);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_batch_start(3);
        cb.on_file_start(1, 3, Path::new("a.pdf"));
        cb.on_stage(Path::new("a.pdf"), Stage::Rasterizing);
        cb.on_file_skipped(2, 3, Path::new("b.pdf"));
        cb.on_file_error(3, 3, Path::new("c.pdf"), "boom");
        cb.on_batch_complete(&BatchStats::default());
    }

    #[test]
    fn recorder_sees_stages_in_order() {
        let recorder = Arc::new(StageRecorder::default());
        let cb: Arc<dyn PipelineProgressCallback> = recorder.clone();
        cb.on_stage(Path::new("a.pdf"), Stage::Classified(Route::Direct));
        cb.on_stage(Path::new("a.pdf"), Stage::Recognizing { chunk: None, of: 1 });
        cb.on_stage(Path::new("a.pdf"), Stage::Normalizing);

        let stages = recorder.stages.lock().unwrap();
        assert_eq!(
            *stages,
            vec![
                Stage::Classified(Route::Direct),
                Stage::Recognizing { chunk: None, of: 1 },
                Stage::Normalizing,
            ]
        );
    }

    #[test]
    fn stage_display() {
        assert_eq!(
            Stage::Recognizing { chunk: Some(2), of: 3 }.to_string(),
            "OCR chunk 2/3"
        );
        assert_eq!(
            Stage::Classified(Route::RasterRebuild).to_string(),
            "classified (raster-rebuild)"
        );
    }
}
