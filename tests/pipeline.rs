//! Integration tests for the batch orchestrator.
//!
//! The three external engines are replaced by in-process fakes so these run
//! without pdfium, ocrmypdf or Ghostscript installed:
//!
//! * `FlatRenderer` reads the page count with lopdf and returns a flat
//!   gray image per page.
//! * `CopyRecognizer` copies its input to its output, optionally failing on
//!   one chunk file name, and counts calls.
//! * `CopyCompressor` copies its input to its output and counts calls.
//!
//! Fixture PDFs are built with lopdf in a temporary directory. Pipeline logs
//! go to the test writer; set `RUST_LOG=ocr_batch=debug` to see them.

use async_trait::async_trait;
use image::{DynamicImage, GrayImage, Luma};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use ocr_batch::pipeline::outline::{read_outline, NO_BOOKMARKS_TITLE};
use ocr_batch::{
    process_tree, FileStatus, NormalizeOptions, OcrFailurePolicy, OcrOptions, PageRenderer,
    PipelineConfig, PipelineError, Route, RenderSession, Compressor, Recognizer,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::tempdir;
use tracing_subscriber::EnvFilter;

// ── Fakes ────────────────────────────────────────────────────────────────────

#[derive(Default)]
struct FlatRenderer {
    opened: AtomicUsize,
}

struct FlatSession {
    pages: usize,
    broken: bool,
}

impl PageRenderer for FlatRenderer {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn RenderSession + 'a>, PipelineError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let doc = Document::load(path).map_err(|e| PipelineError::CorruptPdf {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        let broken = path
            .file_name()
            .is_some_and(|n| n.to_string_lossy().contains("broken"));
        Ok(Box::new(FlatSession {
            pages: doc.get_pages().len(),
            broken,
        }))
    }
}

impl RenderSession for FlatSession {
    fn page_count(&self) -> usize {
        self.pages
    }

    fn page_size(&self, _index: usize) -> Result<(f32, f32), PipelineError> {
        Ok((60.0, 80.0))
    }

    fn render(&self, index: usize, _zoom: f32) -> Result<DynamicImage, PipelineError> {
        if self.broken && index == 2 {
            return Err(PipelineError::RasterisationFailed {
                page: index + 1,
                detail: "simulated renderer crash".into(),
            });
        }
        Ok(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            60,
            80,
            Luma([200]),
        )))
    }
}

#[derive(Default)]
struct CopyRecognizer {
    fail_on: Option<String>,
    calls: AtomicUsize,
}

impl CopyRecognizer {
    fn failing_on(name: &str) -> Self {
        Self {
            fail_on: Some(name.to_string()),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl Recognizer for CopyRecognizer {
    async fn recognize(
        &self,
        input: &Path,
        output: &Path,
        _options: &OcrOptions,
    ) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let name = input.file_name().map(|n| n.to_string_lossy().into_owned());
        if name.is_some() && name == self.fail_on {
            return Err(PipelineError::ToolFailed {
                tool: "ocrmypdf".into(),
                status: "exit status: 2".into(),
                stderr: "simulated failure".into(),
            });
        }
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;
        Ok(())
    }
}

#[derive(Default)]
struct CopyCompressor {
    calls: AtomicUsize,
}

#[async_trait]
impl Compressor for CopyCompressor {
    async fn normalize(
        &self,
        input: &Path,
        output: &Path,
        _options: &NormalizeOptions,
    ) -> Result<(), PipelineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::fs::copy(input, output)
            .await
            .map_err(|e| PipelineError::io(output, e))?;
        Ok(())
    }
}

struct Harness {
    renderer: Arc<FlatRenderer>,
    recognizer: Arc<CopyRecognizer>,
    compressor: Arc<CopyCompressor>,
}

impl Harness {
    fn new(recognizer: CopyRecognizer) -> Self {
        Self {
            renderer: Arc::new(FlatRenderer::default()),
            recognizer: Arc::new(recognizer),
            compressor: Arc::new(CopyCompressor::default()),
        }
    }

    fn config(&self, work_root: &Path, policy: OcrFailurePolicy) -> PipelineConfig {
        PipelineConfig::builder()
            .chunk_size(10)
            .work_root(work_root)
            .ocr_failure_policy(policy)
            .renderer(self.renderer.clone())
            .recognizer(self.recognizer.clone())
            .compressor(self.compressor.clone())
            .build()
            .unwrap()
    }

    fn engine_calls(&self) -> usize {
        self.renderer.opened.load(Ordering::SeqCst)
            + self.recognizer.calls.load(Ordering::SeqCst)
            + self.compressor.calls.load(Ordering::SeqCst)
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

/// A document with `pages` blank pages, an optional `/Producer` and an
/// optional outline of `(title, page_index)` entries.
fn write_pdf(path: &Path, pages: usize, producer: Option<&str>, outline: &[(&str, usize)]) {
    let mut doc = Document::with_version("1.5");
    let pages_id: ObjectId = doc.new_object_id();
    let mut page_ids = Vec::with_capacity(pages);
    for _ in 0..pages {
        let content_id = doc.add_object(Stream::new(dictionary! {}, b"q Q".to_vec()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
            "Contents" => content_id,
            "Resources" => dictionary! {},
        });
        page_ids.push(page_id);
    }
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => page_ids.iter().map(|id| Object::Reference(*id)).collect::<Vec<_>>(),
            "Count" => pages as i64,
        }),
    );

    let mut catalog = dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    };

    if !outline.is_empty() {
        let outlines_id = doc.new_object_id();
        let item_ids: Vec<ObjectId> = outline.iter().map(|_| doc.new_object_id()).collect();
        for (i, (title, page)) in outline.iter().enumerate() {
            let mut item = dictionary! {
                "Title" => Object::string_literal(*title),
                "Parent" => outlines_id,
                "Dest" => vec![Object::Reference(page_ids[*page]), "Fit".into()],
            };
            if i > 0 {
                item.set("Prev", item_ids[i - 1]);
            }
            if i + 1 < item_ids.len() {
                item.set("Next", item_ids[i + 1]);
            }
            doc.objects.insert(item_ids[i], Object::Dictionary(item));
        }
        doc.objects.insert(
            outlines_id,
            Object::Dictionary(dictionary! {
                "Type" => "Outlines",
                "First" => item_ids[0],
                "Last" => item_ids[item_ids.len() - 1],
                "Count" => item_ids.len() as i64,
            }),
        );
        catalog.set("Outlines", outlines_id);
    }

    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    if let Some(p) = producer {
        let info_id = doc.add_object(dictionary! {
            "Producer" => Object::string_literal(p),
        });
        doc.trailer.set("Info", info_id);
    }

    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    doc.save(path).unwrap();
}

fn page_count(path: &Path) -> usize {
    Document::load(path).unwrap().get_pages().len()
}

fn dir_is_empty(path: &Path) -> bool {
    std::fs::read_dir(path)
        .map(|mut entries| entries.next().is_none())
        .unwrap_or(true)
}

struct Trees {
    _root: tempfile::TempDir,
    source: PathBuf,
    dest: PathBuf,
    work: PathBuf,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Several tests share one process; only the first install wins.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_test_writer()
        .try_init();
}

fn trees() -> Trees {
    init_tracing();
    let root = tempdir().unwrap();
    let source = root.path().join("in");
    let dest = root.path().join("out");
    let work = root.path().join("work");
    std::fs::create_dir_all(&source).unwrap();
    Trees {
        source,
        dest,
        work,
        _root: root,
    }
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn trusted_producer_goes_direct() {
    let t = trees();
    write_pdf(&t.source.join("letter.pdf"), 4, Some("Adobe PDF Library 15.0"), &[]);

    let h = Harness::new(CopyRecognizer::default());
    let report = process_tree(&t.source, &t.dest, &h.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();

    assert_eq!(report.stats.converted, 1);
    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Converted);
    assert_eq!(file.route, Some(Route::Direct));
    assert_eq!(file.chunks, 1);
    assert_eq!(file.page_count, Some(4));
    assert_eq!(file.bookmarks, None);

    assert_eq!(h.renderer.opened.load(Ordering::SeqCst), 0);
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 1);
    assert_eq!(page_count(&t.dest.join("letter.pdf")), 4);
}

#[tokio::test]
async fn untrusted_producer_is_rebuilt_in_chunks_with_bookmarks() {
    let t = trees();
    write_pdf(
        &t.source.join("reports/annual.pdf"),
        12,
        Some("TCPDF 6.0"),
        &[("Introduction", 0), ("Figures", 5), ("Appendix", 11)],
    );

    let h = Harness::new(CopyRecognizer::default());
    let report = process_tree(&t.source, &t.dest, &h.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();

    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Converted, "{:?}", file.error);
    assert_eq!(file.route, Some(Route::RasterRebuild));
    assert_eq!(file.chunks, 2);
    assert_eq!(file.page_count, Some(12));
    assert_eq!(file.bookmarks, Some(3));
    assert_eq!(h.recognizer.calls.load(Ordering::SeqCst), 2);

    let output = t.dest.join("reports/annual.pdf");
    assert_eq!(page_count(&output), 12);
    let outline = read_outline(&output).unwrap().expect("outline restored");
    let restored: Vec<_> = outline
        .iter()
        .map(|n| (n.title.as_str(), n.page_index))
        .collect();
    assert_eq!(
        restored,
        vec![
            ("Introduction", Some(0)),
            ("Figures", Some(5)),
            ("Appendix", Some(11)),
        ]
    );
    assert!(dir_is_empty(&t.work));
}

#[tokio::test]
async fn rebuilt_document_without_outline_gets_placeholder_bookmark() {
    let t = trees();
    write_pdf(&t.source.join("scan.pdf"), 6, Some("ReportLab PDF Library"), &[]);

    let h = Harness::new(CopyRecognizer::default());
    let report = process_tree(&t.source, &t.dest, &h.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();

    assert_eq!(report.files[0].route, Some(Route::RasterRebuild));
    assert_eq!(report.files[0].bookmarks, Some(1));
    let outline = read_outline(&t.dest.join("scan.pdf")).unwrap().unwrap();
    assert_eq!(outline.len(), 1);
    assert_eq!(outline[0].title, NO_BOOKMARKS_TITLE);
    assert_eq!(outline[0].page_index, Some(0));
}

#[tokio::test]
async fn failed_chunk_under_continue_policy_yields_partial_file() {
    let t = trees();
    write_pdf(&t.source.join("long.pdf"), 25, Some("TCPDF 6.2.13"), &[]);

    let h = Harness::new(CopyRecognizer::failing_on("chunk_2.pdf"));
    let report = process_tree(&t.source, &t.dest, &h.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();

    assert!(report.is_success());
    assert_eq!(report.stats.partial, 1);
    let file = &report.files[0];
    assert_eq!(file.status, FileStatus::Partial);
    assert_eq!(file.chunks, 3);
    assert_eq!(file.ocr_errors.len(), 1);
    assert_eq!(file.ocr_errors[0].chunk, Some(2));
    assert_eq!(page_count(&t.dest.join("long.pdf")), 25);
}

#[tokio::test]
async fn failed_chunk_under_abort_policy_fails_only_that_file() {
    let t = trees();
    write_pdf(&t.source.join("a.pdf"), 25, Some("TCPDF 6.2.13"), &[]);
    write_pdf(&t.source.join("b.pdf"), 3, Some("Microsoft Word"), &[]);

    let h = Harness::new(CopyRecognizer::failing_on("chunk_2.pdf"));
    let report = process_tree(&t.source, &t.dest, &h.config(&t.work, OcrFailurePolicy::Abort))
        .await
        .unwrap();

    assert!(!report.is_success());
    assert_eq!(report.files[0].status, FileStatus::Failed);
    assert!(report.files[0].error.as_deref().unwrap().contains("chunk_2.pdf"));
    assert_eq!(report.files[1].status, FileStatus::Converted);
    assert!(!t.dest.join("a.pdf").exists());
    assert!(t.dest.join("b.pdf").exists());
}

#[tokio::test]
async fn rasterize_failure_is_isolated_and_cleans_up() {
    let t = trees();
    write_pdf(&t.source.join("1-broken.pdf"), 8, Some("TCPDF 5.9"), &[]);
    write_pdf(&t.source.join("2-fine.pdf"), 8, Some("TCPDF 5.9"), &[]);
    std::fs::write(t.source.join("3-fake.pdf"), b"<html>not a pdf</html>").unwrap();

    let h = Harness::new(CopyRecognizer::default());
    let report = process_tree(&t.source, &t.dest, &h.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();

    assert_eq!(report.stats.discovered, 3);
    assert_eq!(report.stats.failed, 2);
    assert_eq!(report.stats.converted, 1);

    let broken = &report.files[0];
    assert_eq!(broken.status, FileStatus::Failed);
    assert!(broken.error.as_deref().unwrap().contains("page 3"));
    assert!(!t.dest.join("1-broken.pdf").exists());

    assert_eq!(report.files[1].status, FileStatus::Converted);
    assert_eq!(page_count(&t.dest.join("2-fine.pdf")), 8);

    assert_eq!(report.files[2].status, FileStatus::Failed);
    assert_eq!(report.files[2].route, None);

    assert!(dir_is_empty(&t.work));
    assert!(!t.dest.join("1-broken.pdf.partial").exists());
}

#[tokio::test]
async fn second_run_skips_published_outputs() {
    let t = trees();
    write_pdf(&t.source.join("a.pdf"), 3, None, &[]);
    write_pdf(&t.source.join("nested/b.pdf"), 7, Some("GPL Ghostscript 9.5"), &[]);

    let first = Harness::new(CopyRecognizer::default());
    let report = process_tree(&t.source, &t.dest, &first.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();
    assert_eq!(report.stats.converted, 2);

    let second = Harness::new(CopyRecognizer::default());
    let report = process_tree(&t.source, &t.dest, &second.config(&t.work, OcrFailurePolicy::Continue))
        .await
        .unwrap();
    assert_eq!(report.stats.skipped, 2);
    assert_eq!(report.stats.converted, 0);
    assert!(report
        .files
        .iter()
        .all(|f| f.status == FileStatus::Skipped && f.route.is_none()));
    assert_eq!(second.engine_calls(), 0);
}

#[tokio::test]
async fn missing_source_root_is_a_batch_error() {
    let t = trees();
    let h = Harness::new(CopyRecognizer::default());
    let err = process_tree(
        t.source.join("nope"),
        &t.dest,
        &h.config(&t.work, OcrFailurePolicy::Continue),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, PipelineError::SourceNotADirectory { .. }));
}
