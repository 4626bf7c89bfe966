//! Batch entry points: walk a source tree and convert every PDF into the
//! mirrored location under the destination root.
//!
//! Files are processed one at a time, in sorted path order. A failing file is
//! recorded in the [`BatchReport`] and the walk moves on; only batch-level
//! problems (bad source root, missing tools, pdfium binding) abort the run.
//! Re-running over the same trees is cheap: files whose output already
//! exists are skipped without touching any engine.

use crate::config::PipelineConfig;
use crate::convert::{self, Engines};
use crate::error::PipelineError;
use crate::output::{BatchReport, BatchStats, FileReport};
use crate::pipeline::input::has_pdf_extension;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// A source PDF and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredFile {
    pub source: PathBuf,
    pub output: PathBuf,
}

/// Recursively collect `.pdf` files (any case) under `source_root`.
///
/// Each output path mirrors the source path relative to `source_root` under
/// `dest_root`. When `dest_root` lies inside `source_root` its subtree is not
/// walked, so a second run never picks up its own outputs.
pub fn discover(source_root: &Path, dest_root: &Path) -> Result<Vec<DiscoveredFile>, PipelineError> {
    if !source_root.is_dir() {
        return Err(PipelineError::SourceNotADirectory {
            path: source_root.to_path_buf(),
        });
    }
    let excluded = dest_root.canonicalize().ok();

    let mut sources = Vec::new();
    walk(source_root, excluded.as_deref(), &mut sources)?;
    sources.sort();

    let files = sources
        .into_iter()
        .filter_map(|source| {
            let relative = source.strip_prefix(source_root).ok()?.to_path_buf();
            Some(DiscoveredFile {
                output: dest_root.join(relative),
                source,
            })
        })
        .collect::<Vec<_>>();
    info!("Discovered {} PDF(s) under {}", files.len(), source_root.display());
    Ok(files)
}

fn walk(dir: &Path, excluded: Option<&Path>, out: &mut Vec<PathBuf>) -> Result<(), PipelineError> {
    if let (Some(excluded), Ok(canonical)) = (excluded, dir.canonicalize()) {
        if canonical == excluded {
            debug!("Not descending into destination {}", dir.display());
            return Ok(());
        }
    }

    let entries = std::fs::read_dir(dir).map_err(|e| PipelineError::io(dir, e))?;
    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                continue;
            }
        };
        let path = entry.path();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
        if is_dir {
            if let Err(e) = walk(&path, excluded, out) {
                warn!("Skipping directory {}: {}", path.display(), e);
            }
        } else if path.is_file() && has_pdf_extension(&path) {
            out.push(path);
        }
    }
    Ok(())
}

/// Convert every PDF under `source_root` into `dest_root`.
///
/// # Errors
/// Returns `Err` only for batch-level failures. Per-file failures are in the
/// returned report with [`crate::output::FileStatus::Failed`].
pub async fn process_tree(
    source_root: impl AsRef<Path>,
    dest_root: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchReport, PipelineError> {
    let source_root = source_root.as_ref();
    let dest_root = dest_root.as_ref();
    let batch_start = Instant::now();

    if !source_root.is_dir() {
        return Err(PipelineError::SourceNotADirectory {
            path: source_root.to_path_buf(),
        });
    }
    convert::check_tools(config)?;
    let engines = Engines::resolve(config)?;
    let files = discover(source_root, dest_root)?;

    let callback: ProgressCallback = config
        .progress_callback
        .clone()
        .unwrap_or_else(|| Arc::new(NoopProgressCallback));

    let total = files.len();
    callback.on_batch_start(total);

    let mut stats = BatchStats {
        discovered: total,
        ..BatchStats::default()
    };
    let mut reports = Vec::with_capacity(total);

    for (i, file) in files.into_iter().enumerate() {
        let file_num = i + 1;
        let report = process_one(file, file_num, total, &engines, config, &callback).await;
        stats.record(report.status);
        reports.push(report);
    }

    stats.total_duration_ms = batch_start.elapsed().as_millis() as u64;
    info!(
        "Batch complete: {} converted, {} partial, {} skipped, {} failed ({} ms)",
        stats.converted, stats.partial, stats.skipped, stats.failed, stats.total_duration_ms
    );
    callback.on_batch_complete(&stats);

    Ok(BatchReport {
        files: reports,
        stats,
    })
}

async fn process_one(
    file: DiscoveredFile,
    file_num: usize,
    total: usize,
    engines: &Engines,
    config: &PipelineConfig,
    callback: &ProgressCallback,
) -> FileReport {
    if file.output.exists() {
        info!("Skipping {}: {} already exists", file.source.display(), file.output.display());
        callback.on_file_skipped(file_num, total, &file.output);
        return FileReport::skipped(file.source, file.output);
    }

    callback.on_file_start(file_num, total, &file.source);
    let start = Instant::now();
    match convert::convert_file(&file.source, &file.output, engines, config).await {
        Ok(report) => {
            callback.on_file_complete(file_num, total, &report);
            report
        }
        Err(e) => {
            error!("Failed to process {}: {}", file.source.display(), e);
            let message = e.to_string();
            callback.on_file_error(file_num, total, &file.source, &message);
            FileReport::failed(
                file.source,
                file.output,
                message,
                start.elapsed().as_millis() as u64,
            )
        }
    }
}

/// Synchronous wrapper around [`process_tree`].
///
/// Creates a temporary tokio runtime internally.
pub fn process_tree_sync(
    source_root: impl AsRef<Path>,
    dest_root: impl AsRef<Path>,
    config: &PipelineConfig,
) -> Result<BatchReport, PipelineError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| PipelineError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(process_tree(source_root, dest_root, config))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn touch(path: &Path) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, b"%PDF-1.4\n").unwrap();
    }

    #[test]
    fn discover_is_recursive_sorted_and_case_insensitive() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("in");
        touch(&src.join("b.pdf"));
        touch(&src.join("a/UPPER.PDF"));
        touch(&src.join("a/deep/c.Pdf"));
        touch(&src.join("notes.txt"));

        let dest = dir.path().join("out");
        let files = discover(&src, &dest).unwrap();
        let rel: Vec<_> = files
            .iter()
            .map(|f| f.source.strip_prefix(&src).unwrap().to_path_buf())
            .collect();
        assert_eq!(
            rel,
            vec![
                PathBuf::from("a/UPPER.PDF"),
                PathBuf::from("a/deep/c.Pdf"),
                PathBuf::from("b.pdf"),
            ]
        );
        assert_eq!(files[1].output, dest.join("a/deep/c.Pdf"));
    }

    #[test]
    fn discover_skips_destination_nested_in_source() {
        let dir = tempdir().unwrap();
        let src = dir.path().to_path_buf();
        let dest = src.join("processed");
        touch(&src.join("doc.pdf"));
        touch(&dest.join("doc.pdf"));

        let files = discover(&src, &dest).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].source, src.join("doc.pdf"));
        assert_eq!(files[0].output, dest.join("doc.pdf"));
    }

    #[test]
    fn discover_rejects_missing_root() {
        let dir = tempdir().unwrap();
        let err = discover(&dir.path().join("missing"), dir.path()).unwrap_err();
        assert!(matches!(err, PipelineError::SourceNotADirectory { .. }));
    }
}
