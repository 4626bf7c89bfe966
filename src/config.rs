//! Configuration types for batch PDF normalisation.
//!
//! Every knob lives in [`PipelineConfig`], built via its
//! [`PipelineConfigBuilder`]. Stage-specific settings are grouped into small
//! serialisable option structs ([`ClassifierOptions`], [`RasterOptions`],
//! [`OcrOptions`], [`NormalizeOptions`]) so each pipeline stage only sees
//! the settings it uses.
//!
//! Engines (renderer, recogniser, compressor) can be injected as trait
//! objects; when absent, [`crate::convert::Engines::resolve`] binds the
//! defaults (PDFium, `ocrmypdf`, Ghostscript).

use crate::error::PipelineError;
use crate::pipeline::normalize::Compressor;
use crate::pipeline::ocr::Recognizer;
use crate::pipeline::render::PageRenderer;
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a batch run.
///
/// Built via [`PipelineConfig::builder()`] or using
/// [`PipelineConfig::default()`].
///
/// # Example
/// ```rust
/// use ocr_batch::PipelineConfig;
///
/// let config = PipelineConfig::builder()
///     .chunk_size(20)
///     .ocr_languages(["eng", "deu"])
///     .target_resolution(200)
///     .build()
///     .unwrap();
/// assert_eq!(config.ocr.lang_spec(), "eng+deu");
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Producer-based routing rule.
    pub classifier: ClassifierOptions,

    /// Page rendering for the raster-rebuild path.
    pub raster: RasterOptions,

    /// Pages per OCR chunk on the raster-rebuild path. Default: 10.
    ///
    /// Bounds the runtime and memory of each `ocrmypdf` invocation.
    pub chunk_size: usize,

    /// Recognition engine settings.
    pub ocr: OcrOptions,

    /// What to do when the recognition engine fails. Default: [`OcrFailurePolicy::Continue`].
    pub ocr_failure_policy: OcrFailurePolicy,

    /// Compatibility-normaliser settings.
    pub normalize: NormalizeOptions,

    /// Per-invocation timeout for external tools in seconds. Default: 3600.
    ///
    /// `None` waits forever; a hung tool then stalls the batch on that file.
    pub tool_timeout_secs: Option<u64>,

    /// Parent directory for per-file working directories.
    /// If None, the system temp directory is used.
    pub work_root: Option<PathBuf>,

    /// `ocrmypdf` executable name or path. Default: "ocrmypdf".
    pub ocrmypdf_binary: PathBuf,

    /// Ghostscript executable name or path. Default: "gs".
    pub ghostscript_binary: PathBuf,

    /// Explicit path to the pdfium shared library.
    /// If None, `PDFIUM_LIB_PATH` and then the system library are tried.
    pub pdfium_library_path: Option<PathBuf>,

    /// Pre-constructed page renderer. Takes precedence over pdfium binding.
    pub renderer: Option<Arc<dyn PageRenderer>>,

    /// Pre-constructed recognition engine. Takes precedence over `ocrmypdf_binary`.
    pub recognizer: Option<Arc<dyn Recognizer>>,

    /// Pre-constructed compressor. Takes precedence over `ghostscript_binary`.
    pub compressor: Option<Arc<dyn Compressor>>,

    /// Receives per-file and per-stage progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            classifier: ClassifierOptions::default(),
            raster: RasterOptions::default(),
            chunk_size: 10,
            ocr: OcrOptions::default(),
            ocr_failure_policy: OcrFailurePolicy::default(),
            normalize: NormalizeOptions::default(),
            tool_timeout_secs: Some(3600),
            work_root: None,
            ocrmypdf_binary: PathBuf::from("ocrmypdf"),
            ghostscript_binary: PathBuf::from("gs"),
            pdfium_library_path: None,
            renderer: None,
            recognizer: None,
            compressor: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("classifier", &self.classifier)
            .field("raster", &self.raster)
            .field("chunk_size", &self.chunk_size)
            .field("ocr", &self.ocr)
            .field("ocr_failure_policy", &self.ocr_failure_policy)
            .field("normalize", &self.normalize)
            .field("tool_timeout_secs", &self.tool_timeout_secs)
            .field("work_root", &self.work_root)
            .field("ocrmypdf_binary", &self.ocrmypdf_binary)
            .field("ghostscript_binary", &self.ghostscript_binary)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("renderer", &self.renderer.as_ref().map(|_| "<dyn PageRenderer>"))
            .field("recognizer", &self.recognizer.as_ref().map(|_| "<dyn Recognizer>"))
            .field("compressor", &self.compressor.as_ref().map(|_| "<dyn Compressor>"))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn PipelineProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// The tool timeout as a [`Duration`], if one is configured.
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(Duration::from_secs)
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn untrusted_producers<I, S>(mut self, producers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.classifier.untrusted_producers =
            producers.into_iter().map(Into::into).collect();
        self
    }

    pub fn min_reroute_pages(mut self, n: usize) -> Self {
        self.config.classifier.min_pages = n;
        self
    }

    pub fn zoom(mut self, zoom: f32) -> Self {
        self.config.raster.zoom = zoom;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.raster.max_dimension = px.max(16);
        self
    }

    pub fn max_render_pixels(mut self, limit: Option<u64>) -> Self {
        self.config.raster.max_render_pixels = limit;
        self
    }

    pub fn color_quality(mut self, q: u8) -> Self {
        self.config.raster.color_quality = q.clamp(1, 100);
        self
    }

    pub fn gray_quality(mut self, q: u8) -> Self {
        self.config.raster.gray_quality = q.clamp(1, 100);
        self
    }

    pub fn detect_grayscale(mut self, v: bool) -> Self {
        self.config.raster.detect_grayscale = v;
        self
    }

    pub fn chunk_size(mut self, pages: usize) -> Self {
        self.config.chunk_size = pages.max(1);
        self
    }

    pub fn ocr_languages<I, S>(mut self, languages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.ocr.languages = languages.into_iter().map(Into::into).collect();
        self
    }

    pub fn ocr_optimize_level(mut self, level: u8) -> Self {
        self.config.ocr.optimize_level = level.min(3);
        self
    }

    pub fn ocr_jobs(mut self, jobs: usize) -> Self {
        self.config.ocr.jobs = jobs.max(1);
        self
    }

    pub fn ocr_failure_policy(mut self, policy: OcrFailurePolicy) -> Self {
        self.config.ocr_failure_policy = policy;
        self
    }

    pub fn downsample_filter(mut self, filter: DownsampleFilter) -> Self {
        self.config.normalize.downsample_filter = filter;
        self
    }

    pub fn target_resolution(mut self, dpi: u32) -> Self {
        self.config.normalize.target_resolution = dpi;
        self
    }

    pub fn embed_fonts(mut self, v: bool) -> Self {
        self.config.normalize.embed_fonts = v;
        self
    }

    pub fn tool_timeout_secs(mut self, secs: Option<u64>) -> Self {
        self.config.tool_timeout_secs = secs.filter(|s| *s > 0);
        self
    }

    pub fn work_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.work_root = Some(dir.into());
        self
    }

    pub fn ocrmypdf_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ocrmypdf_binary = path.into();
        self
    }

    pub fn ghostscript_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.ghostscript_binary = path.into();
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn PageRenderer>) -> Self {
        self.config.renderer = Some(renderer);
        self
    }

    pub fn recognizer(mut self, recognizer: Arc<dyn Recognizer>) -> Self {
        self.config.recognizer = Some(recognizer);
        self
    }

    pub fn compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.config.compressor = Some(compressor);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PipelineError> {
        let c = &self.config;
        if !(c.raster.zoom.is_finite() && c.raster.zoom > 0.0 && c.raster.zoom <= 20.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "Zoom must be in (0, 20], got {}",
                c.raster.zoom
            )));
        }
        if c.chunk_size == 0 {
            return Err(PipelineError::InvalidConfig(
                "Chunk size must be ≥ 1".into(),
            ));
        }
        if c.ocr.languages.is_empty() || c.ocr.languages.iter().any(|l| l.trim().is_empty()) {
            return Err(PipelineError::InvalidConfig(
                "At least one non-empty OCR language is required".into(),
            ));
        }
        if !(72..=2400).contains(&c.normalize.target_resolution) {
            return Err(PipelineError::InvalidConfig(format!(
                "Target resolution must be 72–2400 dpi, got {}",
                c.normalize.target_resolution
            )));
        }
        Ok(self.config)
    }
}

// ── Stage options ────────────────────────────────────────────────────────

/// Routing rule for the producer classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifierOptions {
    /// Case-sensitive substrings of the `/Producer` field that mark a
    /// document as untrusted. Default: TCPDF, ReportLab, GPL.
    pub untrusted_producers: Vec<String>,

    /// Minimum page count before an untrusted document is rerouted. Default: 5.
    pub min_pages: usize,
}

impl Default for ClassifierOptions {
    fn default() -> Self {
        Self {
            untrusted_producers: vec!["TCPDF".into(), "ReportLab".into(), "GPL".into()],
            min_pages: 5,
        }
    }
}

/// Page rasterisation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterOptions {
    /// Linear scale applied to the native page size in points. Default: 5.0.
    pub zoom: f32,

    /// Largest allowed width or height of a saved page image. Default: 2000.
    ///
    /// Larger renders are downscaled to fit, keeping the aspect ratio.
    pub max_dimension: u32,

    /// Refuse to render pages whose raw bitmap exceeds this many pixels.
    /// Default: 933 120 000. `None` disables the guard.
    pub max_render_pixels: Option<u64>,

    /// JPEG quality for colour pages (1–100). Default: 100.
    pub color_quality: u8,

    /// JPEG quality for grayscale pages (1–100). Default: 50.
    pub gray_quality: u8,

    /// Treat RGB renders with no visible colour as grayscale. Default: false.
    ///
    /// When off, the colour mode follows the rendered bitmap: pdfium renders
    /// RGB, so every page is stored as colour at `color_quality`.
    #[serde(default)]
    pub detect_grayscale: bool,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self {
            zoom: 5.0,
            max_dimension: 2000,
            max_render_pixels: Some(933_120_000),
            color_quality: 100,
            gray_quality: 50,
            detect_grayscale: false,
        }
    }
}

/// Recognition-engine settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OcrOptions {
    /// Tesseract language codes. Default: eng, hin.
    pub languages: Vec<String>,

    /// `ocrmypdf -O` optimisation level (0–3). Default: 3.
    pub optimize_level: u8,

    /// Worker processes inside the engine for one invocation. Default: 4.
    pub jobs: usize,
}

impl OcrOptions {
    /// Languages joined the way `ocrmypdf -l` expects (`eng+hin`).
    pub fn lang_spec(&self) -> String {
        self.languages.join("+")
    }
}

impl Default for OcrOptions {
    fn default() -> Self {
        Self {
            languages: vec!["eng".into(), "hin".into()],
            optimize_level: 3,
            jobs: 4,
        }
    }
}

/// Compatibility-normaliser settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizeOptions {
    /// Downsampling method for colour, gray and mono images. Default: Bicubic.
    pub downsample_filter: DownsampleFilter,

    /// Target image resolution in dpi. Default: 300.
    pub target_resolution: u32,

    /// Embed all fonts in the output. Default: false.
    pub embed_fonts: bool,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self {
            downsample_filter: DownsampleFilter::default(),
            target_resolution: 300,
            embed_fonts: false,
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Ghostscript image downsampling method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DownsampleFilter {
    /// Pick one pixel per block.
    Subsample,
    /// Average each block.
    Average,
    /// Bicubic interpolation. (default)
    #[default]
    Bicubic,
}

impl DownsampleFilter {
    /// The Ghostscript name for this filter (without the leading `/`).
    pub fn gs_name(self) -> &'static str {
        match self {
            DownsampleFilter::Subsample => "Subsample",
            DownsampleFilter::Average => "Average",
            DownsampleFilter::Bicubic => "Bicubic",
        }
    }
}

/// Call-site policy for recognition-engine failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OcrFailurePolicy {
    /// Keep the unrecognised pages, log the failure and mark the file
    /// [`crate::output::FileStatus::Partial`]. (default)
    #[default]
    Continue,
    /// Fail the file with [`PipelineError::RecognitionFailed`].
    Abort,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = PipelineConfig::default();
        assert_eq!(c.classifier.untrusted_producers, ["TCPDF", "ReportLab", "GPL"]);
        assert_eq!(c.classifier.min_pages, 5);
        assert_eq!(c.raster.zoom, 5.0);
        assert_eq!(c.raster.max_dimension, 2000);
        assert_eq!(c.raster.color_quality, 100);
        assert_eq!(c.raster.gray_quality, 50);
        assert!(!c.raster.detect_grayscale);
        assert_eq!(c.chunk_size, 10);
        assert_eq!(c.ocr.lang_spec(), "eng+hin");
        assert_eq!(c.ocr.optimize_level, 3);
        assert_eq!(c.ocr.jobs, 4);
        assert_eq!(c.normalize.downsample_filter, DownsampleFilter::Bicubic);
        assert_eq!(c.normalize.target_resolution, 300);
        assert!(!c.normalize.embed_fonts);
        assert_eq!(c.ocr_failure_policy, OcrFailurePolicy::Continue);
    }

    #[test]
    fn builder_clamps_out_of_range_values() {
        let c = PipelineConfig::builder()
            .color_quality(0)
            .gray_quality(255)
            .chunk_size(0)
            .ocr_optimize_level(9)
            .ocr_jobs(0)
            .tool_timeout_secs(Some(0))
            .build()
            .unwrap();
        assert_eq!(c.raster.color_quality, 1);
        assert_eq!(c.raster.gray_quality, 100);
        assert_eq!(c.chunk_size, 1);
        assert_eq!(c.ocr.optimize_level, 3);
        assert_eq!(c.ocr.jobs, 1);
        assert_eq!(c.tool_timeout_secs, None);
    }

    #[test]
    fn builder_rejects_bad_zoom_and_languages() {
        assert!(PipelineConfig::builder().zoom(0.0).build().is_err());
        assert!(PipelineConfig::builder().zoom(f32::NAN).build().is_err());
        assert!(PipelineConfig::builder()
            .ocr_languages(Vec::<String>::new())
            .build()
            .is_err());
        assert!(PipelineConfig::builder().target_resolution(10).build().is_err());
    }

    #[test]
    fn gs_filter_names() {
        assert_eq!(DownsampleFilter::Bicubic.gs_name(), "Bicubic");
        assert_eq!(DownsampleFilter::Average.gs_name(), "Average");
        assert_eq!(DownsampleFilter::Subsample.gs_name(), "Subsample");
    }
}
