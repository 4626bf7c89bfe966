//! Per-file conversion: the state machine that takes one source PDF to its
//! published output.
//!
//! ```text
//! validate ─▶ classify ─┬─ raster-rebuild: rasterize ─▶ rebuild ─▶ split ─▶ OCR×N ─▶ combine ─▶ bookmarks ─┬─▶ normalize ─▶ publish
//!                       └─ direct:         OCR ───────────────────────────────────────────────────────────┘
//! ```
//!
//! Every intermediate artifact lives in a per-file [`TempDir`] that is
//! removed on every exit path when it drops. The output only appears once
//! the file is complete: the final document is copied next to it as
//! `<output>.partial` and renamed into place, so an existing output is a
//! trustworthy "already done" marker for the next run.

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::output::{DocumentMetadata, FileReport, FileStatus, Inspection, Route};
use crate::pipeline::chunk::{self, ChunkOutput};
use crate::pipeline::classify::classify;
use crate::pipeline::normalize::{Compressor, Ghostscript};
use crate::pipeline::ocr::{self, OcrMyPdf, Recognizer};
use crate::pipeline::render::{PageRenderer, PdfiumRenderer};
use crate::pipeline::{command, input, outline, pdf, raster};
use crate::progress::Stage;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// The three external engines, resolved once per batch.
#[derive(Clone)]
pub struct Engines {
    pub renderer: Arc<dyn PageRenderer>,
    pub recognizer: Arc<dyn Recognizer>,
    pub compressor: Arc<dyn Compressor>,
}

impl Engines {
    /// Use the engines injected into `config`, binding defaults for the rest.
    ///
    /// 1. **Injected engine** (`config.renderer` / `recognizer` / `compressor`)
    ///    is used as-is. Tests and embedders supply their own here.
    /// 2. **Default**: pdfium bound from `pdfium_library_path`,
    ///    `$PDFIUM_LIB_PATH` or the system library; `ocrmypdf` and `gs` from
    ///    the configured binaries with the configured tool timeout.
    pub fn resolve(config: &PipelineConfig) -> Result<Self, PipelineError> {
        let renderer: Arc<dyn PageRenderer> = match &config.renderer {
            Some(r) => Arc::clone(r),
            None => Arc::new(PdfiumRenderer::bind(config.pdfium_library_path.as_deref())?),
        };
        let recognizer: Arc<dyn Recognizer> = match &config.recognizer {
            Some(r) => Arc::clone(r),
            None => Arc::new(OcrMyPdf::new(&config.ocrmypdf_binary, config.tool_timeout())),
        };
        let compressor: Arc<dyn Compressor> = match &config.compressor {
            Some(c) => Arc::clone(c),
            None => Arc::new(Ghostscript::new(&config.ghostscript_binary, config.tool_timeout())),
        };
        Ok(Self {
            renderer,
            recognizer,
            compressor,
        })
    }
}

/// Check that the default external tools are installed.
///
/// Tools replaced by an injected engine are not checked.
pub fn check_tools(config: &PipelineConfig) -> Result<(), PipelineError> {
    if config.recognizer.is_none() {
        let path = command::require_tool(&config.ocrmypdf_binary)?;
        debug!("ocrmypdf: {}", path.display());
    }
    if config.compressor.is_none() {
        let path = command::require_tool(&config.ghostscript_binary)?;
        debug!("ghostscript: {}", path.display());
    }
    Ok(())
}

/// Convert one source PDF and publish it at `output`.
///
/// Any existing file at `output` is replaced. Returns a report with status
/// [`FileStatus::Converted`], or [`FileStatus::Partial`] when recognition
/// failed on some chunk under the `Continue` policy.
///
/// # Errors
/// Any [`PipelineError`] is fatal for this file only; nothing is written to
/// `output` in that case.
pub async fn convert_file(
    source: &Path,
    output: &Path,
    engines: &Engines,
    config: &PipelineConfig,
) -> Result<FileReport, PipelineError> {
    let start = Instant::now();
    info!("Processing {}", source.display());

    input::validate_pdf(source)?;
    let work = create_work_dir(config)?;
    debug!("Working directory: {}", work.path().display());

    let metadata = read_metadata_lenient(source).await;
    let route = classify(metadata.as_ref(), &config.classifier);
    emit(config, source, Stage::Classified(route));

    let mut report = FileReport {
        source: source.to_path_buf(),
        output: output.to_path_buf(),
        status: FileStatus::Converted,
        route: Some(route),
        page_count: None,
        chunks: 0,
        bookmarks: None,
        ocr_errors: Vec::new(),
        error: None,
        duration_ms: 0,
    };

    let recognized = match route {
        Route::RasterRebuild => raster_rebuild(source, work.path(), engines, config, &mut report).await?,
        Route::Direct => direct(source, work.path(), metadata.as_ref(), engines, config, &mut report).await?,
    };

    emit(config, source, Stage::Normalizing);
    let normalized = work.path().join("normalized.pdf");
    engines
        .compressor
        .normalize(&recognized, &normalized, &config.normalize)
        .await?;

    publish(&normalized, output).await?;

    if !report.ocr_errors.is_empty() {
        report.status = FileStatus::Partial;
        warn!(
            "{}: published with {} unrecognised chunk(s)",
            source.display(),
            report.ocr_errors.len()
        );
    }
    report.duration_ms = start.elapsed().as_millis() as u64;
    info!(
        "Finished {} → {} ({} ms)",
        source.display(),
        output.display(),
        report.duration_ms
    );
    Ok(report)
}

/// Classify a file without converting it.
///
/// Unreadable metadata is reported as `None` with the direct route, exactly
/// as the pipeline would treat it.
pub async fn inspect(source: &Path, config: &PipelineConfig) -> Result<Inspection, PipelineError> {
    input::validate_pdf(source)?;
    let path = source.to_path_buf();
    let (metadata, outline_entries) = tokio::task::spawn_blocking(move || {
        let metadata = pdf::read_metadata(&path);
        let entries = outline::read_outline(&path)
            .ok()
            .flatten()
            .map(|nodes| outline::count_entries(&nodes))
            .unwrap_or(0);
        (metadata, entries)
    })
    .await
    .map_err(|e| PipelineError::Internal(format!("Inspect task panicked: {}", e)))?;

    let metadata = metadata
        .map_err(|e| warn!("Cannot read metadata of {}: {}", source.display(), e))
        .ok();
    let route = classify(metadata.as_ref(), &config.classifier);
    Ok(Inspection {
        source: source.to_path_buf(),
        metadata,
        route,
        outline_entries,
    })
}

// ── Routes ───────────────────────────────────────────────────────────────

async fn raster_rebuild(
    source: &Path,
    work: &Path,
    engines: &Engines,
    config: &PipelineConfig,
    report: &mut FileReport,
) -> Result<PathBuf, PipelineError> {
    emit(config, source, Stage::Rasterizing);
    let images_dir = make_dir(work.join("images")).await?;
    let images = raster::rasterize(Arc::clone(&engines.renderer), source, &images_dir, &config.raster).await?;

    emit(config, source, Stage::Rebuilding);
    let rebuilt = work.join("rebuilt.pdf");
    let page_count = raster::rebuild(&images, &rebuilt).await?;

    emit(config, source, Stage::Splitting);
    let chunks_dir = make_dir(work.join("chunks")).await?;
    let chunks = chunk::split(&rebuilt, config.chunk_size, &chunks_dir).await?;
    let total_chunks = chunks.len();

    let mut recognized = Vec::with_capacity(total_chunks);
    for file in &chunks {
        let index = file.range.index;
        emit(
            config,
            source,
            Stage::Recognizing {
                chunk: Some(index),
                of: total_chunks,
            },
        );
        let out = chunks_dir.join(format!("ocr_{}", chunk::chunk_file_name(index)));
        if let Some(failure) = ocr::recognize_with_policy(
            engines.recognizer.as_ref(),
            &file.path,
            &out,
            &config.ocr,
            config.ocr_failure_policy,
            Some(index),
        )
        .await?
        {
            report.ocr_errors.push(failure);
        }
        recognized.push(ChunkOutput {
            index,
            path: out,
            expected_pages: file.range.page_count,
        });
    }

    emit(config, source, Stage::Combining);
    let combined = work.join("combined.pdf");
    let combined_pages = chunk::combine(&recognized, &combined).await?;
    if combined_pages != page_count {
        return Err(PipelineError::PageCountMismatch {
            context: "recombined document".into(),
            expected: page_count,
            actual: combined_pages,
        });
    }

    emit(config, source, Stage::Reconciling);
    let with_bookmarks = work.join("with_bookmarks.pdf");
    let bookmarks = outline::transfer(source, &combined, &with_bookmarks).await?;

    report.page_count = Some(combined_pages);
    report.chunks = total_chunks;
    report.bookmarks = Some(bookmarks);
    Ok(with_bookmarks)
}

async fn direct(
    source: &Path,
    work: &Path,
    metadata: Option<&DocumentMetadata>,
    engines: &Engines,
    config: &PipelineConfig,
    report: &mut FileReport,
) -> Result<PathBuf, PipelineError> {
    emit(config, source, Stage::Recognizing { chunk: None, of: 1 });
    let out = work.join("ocr.pdf");
    if let Some(failure) = ocr::recognize_with_policy(
        engines.recognizer.as_ref(),
        source,
        &out,
        &config.ocr,
        config.ocr_failure_policy,
        None,
    )
    .await?
    {
        report.ocr_errors.push(failure);
    }

    report.chunks = 1;
    report.page_count = metadata.map(|m| m.page_count);
    Ok(out)
}

// ── Internal helpers ─────────────────────────────────────────────────────

fn emit(config: &PipelineConfig, source: &Path, stage: Stage) {
    info!("{}: {}", source.display(), stage);
    if let Some(ref cb) = config.progress_callback {
        cb.on_stage(source, stage);
    }
}

async fn read_metadata_lenient(source: &Path) -> Option<DocumentMetadata> {
    let path = source.to_path_buf();
    let result = tokio::task::spawn_blocking(move || pdf::read_metadata(&path))
        .await
        .map_err(|e| PipelineError::Internal(format!("Metadata task panicked: {}", e)))
        .and_then(|r| r);
    match result {
        Ok(meta) => Some(meta),
        Err(e) => {
            warn!(
                "Cannot read metadata of {}: {}; treating as direct",
                source.display(),
                e
            );
            None
        }
    }
}

fn create_work_dir(config: &PipelineConfig) -> Result<TempDir, PipelineError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("ocr-batch-");
    match &config.work_root {
        Some(root) => {
            std::fs::create_dir_all(root).map_err(|e| PipelineError::io(root, e))?;
            builder.tempdir_in(root).map_err(|e| PipelineError::io(root, e))
        }
        None => builder
            .tempdir()
            .map_err(|e| PipelineError::io(std::env::temp_dir(), e)),
    }
}

async fn make_dir(path: PathBuf) -> Result<PathBuf, PipelineError> {
    tokio::fs::create_dir_all(&path)
        .await
        .map_err(|e| PipelineError::io(&path, e))?;
    Ok(path)
}

/// `<output>.partial`, next to the output.
pub(crate) fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("output"));
    name.push(".partial");
    output.with_file_name(name)
}

/// Copy `from` next to `output` and rename it into place.
async fn publish(from: &Path, output: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = output.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }

    let partial = partial_path(output);
    tokio::fs::copy(from, &partial)
        .await
        .map_err(|e| PipelineError::io(&partial, e))?;

    if let Err(e) = tokio::fs::rename(&partial, output).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(PipelineError::io(output, e));
    }
    debug!("Published {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn partial_path_keeps_directory_and_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("out/sub/report.pdf")),
            PathBuf::from("out/sub/report.pdf.partial")
        );
    }

    #[tokio::test]
    async fn publish_creates_parent_and_leaves_no_partial() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("final.pdf");
        std::fs::write(&from, b"%PDF-1.4 done").unwrap();
        let output = dir.path().join("a/b/doc.pdf");

        publish(&from, &output).await.unwrap();
        assert_eq!(std::fs::read(&output).unwrap(), b"%PDF-1.4 done");
        assert!(!partial_path(&output).exists());
    }

    #[test]
    fn work_dir_lives_under_work_root() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("work");
        let config = PipelineConfig::builder().work_root(&root).build().unwrap();
        let work = create_work_dir(&config).unwrap();
        assert!(work.path().starts_with(&root));
        let kept = work.path().to_path_buf();
        drop(work);
        assert!(!kept.exists());
    }

    #[tokio::test]
    async fn inspect_reports_route_metadata_and_outline() {
        let dir = tempdir().unwrap();
        let config = PipelineConfig::default();

        let flagged = dir.path().join("flagged.pdf");
        let widths: Vec<i64> = (0..12).map(|i| 100 + i).collect();
        let mut doc = pdf::testing::blank_pdf(&widths, Some("TCPDF 6.0"));
        let nodes = vec![outline::OutlineNode::new("Intro", Some(0)).with_children(vec![
            outline::OutlineNode::new("Detail", Some(3)),
        ])];
        outline::write_outline(&mut doc, &nodes).unwrap();
        doc.save(&flagged).unwrap();

        let found = inspect(&flagged, &config).await.unwrap();
        assert_eq!(found.route, Route::RasterRebuild);
        let meta = found.metadata.unwrap();
        assert_eq!(meta.page_count, 12);
        assert_eq!(meta.producer.as_deref(), Some("TCPDF 6.0"));
        assert_eq!(found.outline_entries, 2);

        let plain = dir.path().join("plain.pdf");
        pdf::testing::write_blank_pdf(&plain, 12, None);
        let found = inspect(&plain, &config).await.unwrap();
        assert_eq!(found.route, Route::Direct);
        assert!(found.metadata.unwrap().producer.is_none());
        assert_eq!(found.outline_entries, 0);

        let broken = dir.path().join("broken.pdf");
        std::fs::write(&broken, b"%PDF-1.4 garbage").unwrap();
        let found = inspect(&broken, &config).await.unwrap();
        assert!(found.metadata.is_none());
        assert_eq!(found.route, Route::Direct);
    }

    #[test]
    fn check_tools_reports_missing_binaries() {
        let config = PipelineConfig::builder()
            .ocrmypdf_binary("definitely-not-a-real-tool-3f9a")
            .ghostscript_binary("definitely-not-a-real-tool-3f9a")
            .build()
            .unwrap();
        assert!(matches!(
            check_tools(&config),
            Err(PipelineError::ToolNotFound { .. })
        ));
    }
}
