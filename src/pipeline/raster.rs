//! Raster-rebuild: flatten every page to a JPEG, then assemble a fresh PDF
//! with one full-bleed image per page.
//!
//! The rebuilt document carries nothing from the source but the page
//! pictures. Fonts, broken text layers and producer quirks are gone, which is
//! the point: the OCR engine then sees a clean image-only PDF.

use crate::config::RasterOptions;
use crate::error::PipelineError;
use crate::pipeline::encode;
use crate::pipeline::pdf;
use crate::pipeline::render::PageRenderer;
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

// ── Rasterize ────────────────────────────────────────────────────────────

/// Render every page of `pdf` into `out_dir` as `{page_number}.jpeg`.
///
/// Returns the image paths in page order. Any page failure aborts the whole
/// call; images already written stay in `out_dir` for the caller's working
/// directory cleanup.
pub async fn rasterize(
    renderer: Arc<dyn PageRenderer>,
    pdf: &Path,
    out_dir: &Path,
    options: &RasterOptions,
) -> Result<Vec<PathBuf>, PipelineError> {
    let pdf = pdf.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    let options = options.clone();

    tokio::task::spawn_blocking(move || rasterize_blocking(renderer.as_ref(), &pdf, &out_dir, &options))
        .await
        .map_err(|e| PipelineError::Internal(format!("Rasterize task panicked: {}", e)))?
}

/// Blocking implementation of [`rasterize`].
pub fn rasterize_blocking(
    renderer: &dyn PageRenderer,
    pdf: &Path,
    out_dir: &Path,
    options: &RasterOptions,
) -> Result<Vec<PathBuf>, PipelineError> {
    let session = renderer.open(pdf)?;
    let total = session.page_count();
    info!("Rasterizing {} pages of {}", total, pdf.display());

    let mut paths = Vec::with_capacity(total);
    for idx in 0..total {
        let page = idx + 1;

        if let Some(limit) = options.max_render_pixels {
            let (w_pt, h_pt) = session.page_size(idx)?;
            let width = (w_pt * options.zoom).ceil().max(0.0) as u64;
            let height = (h_pt * options.zoom).ceil().max(0.0) as u64;
            if width.saturating_mul(height) > limit {
                return Err(PipelineError::PixelLimitExceeded {
                    page,
                    width,
                    height,
                    limit,
                });
            }
        }

        let rendered = session.render(idx, options.zoom)?;
        let fitted = encode::fit_within(rendered, options.max_dimension);
        let color = encode::page_is_color(&fitted, options.detect_grayscale);
        let quality = if color {
            options.color_quality
        } else {
            options.gray_quality
        };
        let bytes = encode::encode_jpeg(&fitted, quality, color).map_err(|e| {
            PipelineError::RasterisationFailed {
                page,
                detail: format!("JPEG encoding failed: {}", e),
            }
        })?;

        let path = out_dir.join(format!("{}.jpeg", page));
        std::fs::write(&path, &bytes).map_err(|e| PipelineError::io(&path, e))?;
        debug!(
            "Page {} → {} ({}x{}, {})",
            page,
            path.display(),
            fitted.width(),
            fitted.height(),
            if color { "color" } else { "gray" }
        );
        paths.push(path);
    }

    Ok(paths)
}

// ── Rebuild ──────────────────────────────────────────────────────────────

/// Build a PDF at `output` with one page per image, ordered by the numeric
/// prefix of each file stem. Returns the page count.
pub async fn rebuild(images: &[PathBuf], output: &Path) -> Result<usize, PipelineError> {
    let images = images.to_vec();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || rebuild_blocking(&images, &output))
        .await
        .map_err(|e| PipelineError::Internal(format!("Rebuild task panicked: {}", e)))?
}

/// Blocking implementation of [`rebuild`].
pub fn rebuild_blocking(images: &[PathBuf], output: &Path) -> Result<usize, PipelineError> {
    if images.is_empty() {
        return Err(PipelineError::RebuildFailed {
            detail: "no page images to rebuild from".into(),
        });
    }

    let mut ordered = images
        .iter()
        .map(|p| page_number(p).map(|n| (n, p)))
        .collect::<Result<Vec<_>, _>>()?;
    ordered.sort_by_key(|(n, _)| *n);

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let mut kids: Vec<Object> = Vec::with_capacity(ordered.len());

    for (_, path) in &ordered {
        let page_id = add_image_page(&mut doc, pages_id, path)?;
        kids.push(page_id.into());
    }

    let count = kids.len();
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.compress();

    pdf::save(&mut doc, output)?;
    info!("Rebuilt {} pages into {}", count, output.display());
    Ok(count)
}

/// Leading decimal digits of the file stem (`12.jpeg` → 12).
fn page_number(path: &Path) -> Result<u64, PipelineError> {
    let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let digits: String = stem.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().map_err(|_| PipelineError::InvalidImage {
        path: path.to_path_buf(),
        detail: "file name does not start with a page number".into(),
    })
}

/// Add one image XObject, its content stream and page dictionary.
fn add_image_page(doc: &mut Document, pages_id: ObjectId, path: &Path) -> Result<ObjectId, PipelineError> {
    let raw = std::fs::read(path).map_err(|e| PipelineError::io(path, e))?;
    let invalid = |detail: String| PipelineError::InvalidImage {
        path: path.to_path_buf(),
        detail,
    };

    let (bytes, header) = match encode::jpeg_header(&raw) {
        Some(h) if h.components == 1 || h.components == 3 => (raw, h),
        _ => {
            // Not a JPEG we can pass through: normalise to RGB JPEG.
            let img = image::load_from_memory(&raw).map_err(|e| invalid(e.to_string()))?;
            let bytes = encode::encode_jpeg(&img, 100, true).map_err(|e| invalid(e.to_string()))?;
            let header = encode::jpeg_header(&bytes)
                .ok_or_else(|| invalid("re-encoded JPEG has no frame header".into()))?;
            (bytes, header)
        }
    };
    if header.width == 0 || header.height == 0 {
        return Err(invalid("zero-sized image".into()));
    }

    let color_space = if header.components == 1 {
        "DeviceGray"
    } else {
        "DeviceRGB"
    };
    let (w, h) = (header.width as i64, header.height as i64);

    let image = Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => w,
            "Height" => h,
            "ColorSpace" => color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        bytes,
    )
    .with_compression(false);
    let image_id = doc.add_object(image);

    let content = format!("q\n{w} 0 0 {h} 0 0 cm\n/Im0 Do\nQ\n");
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.into_bytes()));

    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), w.into(), h.into()],
        "Resources" => dictionary! {
            "XObject" => dictionary! { "Im0" => image_id },
        },
        "Contents" => content_id,
    });
    debug!("Embedded {} as {}x{} {}", path.display(), w, h, color_space);
    Ok(page_id)
}
