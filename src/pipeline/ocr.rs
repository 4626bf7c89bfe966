//! Recognition adapter: add a text layer to a PDF with `ocrmypdf`.
//!
//! The engine is behind the [`Recognizer`] trait so the orchestrator never
//! builds command lines itself and tests can swap in a fake. The failure
//! policy lives here too: [`recognize_with_policy`] turns an engine error
//! into either a recorded [`ChunkError`] (with the unrecognised pages kept)
//! or a fatal [`PipelineError::RecognitionFailed`].

use crate::config::{OcrFailurePolicy, OcrOptions};
use crate::error::{ChunkError, PipelineError};
use crate::pipeline::command;
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// A text-recognition engine.
#[async_trait]
pub trait Recognizer: Send + Sync {
    /// Recognise `input` and write a searchable PDF to `output`.
    async fn recognize(&self, input: &Path, output: &Path, options: &OcrOptions) -> Result<(), PipelineError>;
}

/// [`Recognizer`] that shells out to `ocrmypdf`.
#[derive(Debug, Clone)]
pub struct OcrMyPdf {
    pub binary: PathBuf,
    pub timeout: Option<Duration>,
}

impl OcrMyPdf {
    pub fn new(binary: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        Self {
            binary: binary.into(),
            timeout,
        }
    }

    /// Command-line arguments for one invocation.
    pub fn args(input: &Path, output: &Path, options: &OcrOptions) -> Vec<OsString> {
        vec![
            input.into(),
            output.into(),
            "-l".into(),
            options.lang_spec().into(),
            "-O".into(),
            options.optimize_level.to_string().into(),
            "--redo-ocr".into(),
            "--clean".into(),
            "--jobs".into(),
            options.jobs.to_string().into(),
            "--output-type".into(),
            "pdf".into(),
        ]
    }
}

#[async_trait]
impl Recognizer for OcrMyPdf {
    async fn recognize(&self, input: &Path, output: &Path, options: &OcrOptions) -> Result<(), PipelineError> {
        let args = Self::args(input, output, options);
        command::run_tool(&self.binary, &args, self.timeout).await
    }
}

/// Run `recognizer` and apply the failure policy.
///
/// Returns `Ok(None)` on success. Under [`OcrFailurePolicy::Continue`] a
/// failure copies `input` to `output` unchanged and returns the
/// [`ChunkError`] to record. `chunk` is the 1-based chunk index, `None` for a
/// whole-file call.
pub async fn recognize_with_policy(
    recognizer: &dyn Recognizer,
    input: &Path,
    output: &Path,
    options: &OcrOptions,
    policy: OcrFailurePolicy,
    chunk: Option<usize>,
) -> Result<Option<ChunkError>, PipelineError> {
    let err = match recognizer.recognize(input, output, options).await {
        Ok(()) => {
            debug!("Recognised {} → {}", input.display(), output.display());
            return Ok(None);
        }
        Err(e) => e,
    };

    match policy {
        OcrFailurePolicy::Abort => Err(PipelineError::RecognitionFailed {
            path: input.to_path_buf(),
            detail: err.to_string(),
        }),
        OcrFailurePolicy::Continue => {
            let failure = ChunkError {
                chunk,
                detail: err.to_string(),
            };
            warn!("{} ({}); keeping unrecognised pages", failure, input.display());
            tokio::fs::copy(input, output)
                .await
                .map_err(|e| PipelineError::io(output, e))?;
            Ok(Some(failure))
        }
    }
}
