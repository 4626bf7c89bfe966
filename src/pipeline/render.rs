//! Page renderer adapter: open a PDF and rasterise single pages to
//! `DynamicImage`.
//!
//! ## Why a trait?
//!
//! PDFium is a native library that has to be found and bound at runtime. The
//! rest of the pipeline only needs "how many pages, how big, render page i at
//! zoom z", so that is all [`RenderSession`] exposes. Tests inject a renderer
//! that paints solid images without touching pdfium.
//!
//! ## Threading
//!
//! Rendering is CPU-bound and pdfium is not async-aware. Callers run sessions
//! inside `tokio::task::spawn_blocking`. The `thread_safe` feature of
//! `pdfium-render` serialises access to the library itself, and its `sync`
//! feature makes `Pdfium` `Send + Sync` so a [`PdfiumRenderer`] can sit
//! behind the `Arc<dyn PageRenderer>` shared between tasks.

use crate::error::PipelineError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Environment variable naming an explicit pdfium library (file or directory).
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// Opens documents for rendering.
pub trait PageRenderer: Send + Sync {
    /// Open `path` and return a session that renders its pages.
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn RenderSession + 'a>, PipelineError>;
}

/// One open document.
pub trait RenderSession {
    /// Number of pages in the document.
    fn page_count(&self) -> usize;

    /// Page size in points `(width, height)` for the 0-based `index`.
    fn page_size(&self, index: usize) -> Result<(f32, f32), PipelineError>;

    /// Render the 0-based page `index` scaled by `zoom`.
    fn render(&self, index: usize, zoom: f32) -> Result<DynamicImage, PipelineError>;
}

// ── PDFium implementation ────────────────────────────────────────────────

/// [`PageRenderer`] backed by a bound pdfium library.
pub struct PdfiumRenderer {
    pdfium: Pdfium,
}

impl PdfiumRenderer {
    /// Bind pdfium.
    ///
    /// Resolution order: `explicit`, then `$PDFIUM_LIB_PATH`, then the system
    /// library. A path may name the library file or the directory holding it.
    pub fn bind(explicit: Option<&Path>) -> Result<Self, PipelineError> {
        let env_path = std::env::var_os(PDFIUM_LIB_PATH_ENV).map(PathBuf::from);
        let candidate = explicit.map(Path::to_path_buf).or(env_path);

        let bindings = match candidate {
            Some(path) => {
                let lib = if path.is_dir() {
                    Pdfium::pdfium_platform_library_name_at_path(&path)
                } else {
                    path
                };
                info!("Binding pdfium from {}", lib.display());
                Pdfium::bind_to_library(&lib).map_err(|e| {
                    PipelineError::PdfiumBindingFailed(format!("{}: {:?}", lib.display(), e))
                })?
            }
            None => {
                info!("Binding system pdfium library");
                Pdfium::bind_to_system_library()
                    .map_err(|e| PipelineError::PdfiumBindingFailed(format!("{:?}", e)))?
            }
        };

        Ok(Self {
            pdfium: Pdfium::new(bindings),
        })
    }
}

impl PageRenderer for PdfiumRenderer {
    fn open<'a>(&'a self, path: &Path) -> Result<Box<dyn RenderSession + 'a>, PipelineError> {
        let document = self
            .pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| PipelineError::CorruptPdf {
                path: path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
        let page_count = document.pages().len() as usize;
        debug!("pdfium opened {} ({} pages)", path.display(), page_count);
        Ok(Box::new(PdfiumSession {
            document,
            page_count,
        }))
    }
}

struct PdfiumSession<'a> {
    document: PdfDocument<'a>,
    page_count: usize,
}

impl PdfiumSession<'_> {
    fn page(&self, index: usize) -> Result<PdfPage<'_>, PipelineError> {
        if index >= self.page_count {
            return Err(PipelineError::RasterisationFailed {
                page: index + 1,
                detail: format!("page out of range (document has {})", self.page_count),
            });
        }
        self.document
            .pages()
            .get(index as u16)
            .map_err(|e| PipelineError::RasterisationFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            })
    }
}

impl RenderSession for PdfiumSession<'_> {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, index: usize) -> Result<(f32, f32), PipelineError> {
        let page = self.page(index)?;
        Ok((page.width().value, page.height().value))
    }

    fn render(&self, index: usize, zoom: f32) -> Result<DynamicImage, PipelineError> {
        let page = self.page(index)?;
        let render_config = PdfRenderConfig::new().scale_page_by_factor(zoom);
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            PipelineError::RasterisationFailed {
                page: index + 1,
                detail: format!("{:?}", e),
            }
        })?;
        Ok(bitmap.as_image())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_shareable<T: Send + Sync + 'static>() {}

    #[test]
    fn pdfium_renderer_is_shareable_between_tasks() {
        assert_shareable::<PdfiumRenderer>();
        assert_shareable::<std::sync::Arc<dyn PageRenderer>>();
    }
}
