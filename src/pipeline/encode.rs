//! Image encoding: rendered page bitmaps → JPEG bytes.
//!
//! Rendered pages are saved as JPEG because the rebuilt PDF embeds them
//! unchanged with `/DCTDecode`. A page is encoded as RGB when its bitmap has
//! colour channels, and as single-channel grayscale at the gray quality
//! otherwise. [`page_is_color`] decides; content sniffing through
//! [`is_color`] is opt-in.

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView};
use tracing::debug;

/// Largest per-pixel channel spread still treated as gray.
///
/// Anti-aliased black text on white renders with a few levels of colour
/// fringe; anything above this is real colour.
pub const GRAY_TOLERANCE: u8 = 8;

/// True when any pixel's RGB channels differ by more than `tolerance`.
pub fn is_color(img: &DynamicImage, tolerance: u8) -> bool {
    if !img.color().has_color() {
        return false;
    }
    img.to_rgb8().pixels().any(|p| {
        let [r, g, b] = p.0;
        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        max - min > tolerance
    })
}

/// Colour mode of a rendered page.
///
/// By default this follows the bitmap's colour type, so an RGB(A) render is
/// always colour. With `detect_grayscale` an RGB render whose pixels are all
/// within [`GRAY_TOLERANCE`] of gray is treated as gray.
pub fn page_is_color(img: &DynamicImage, detect_grayscale: bool) -> bool {
    if detect_grayscale {
        is_color(img, GRAY_TOLERANCE)
    } else {
        img.color().has_color()
    }
}

/// Downscale `img` so neither side exceeds `max_dimension`, keeping the
/// aspect ratio. Smaller images are returned unchanged.
pub fn fit_within(img: DynamicImage, max_dimension: u32) -> DynamicImage {
    let (w, h) = img.dimensions();
    if w <= max_dimension && h <= max_dimension {
        return img;
    }
    let resized = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    debug!(
        "Downscaled {}x{} → {}x{}",
        w,
        h,
        resized.width(),
        resized.height()
    );
    resized
}

/// Encode a page as JPEG: RGB when `color`, single-channel luma otherwise.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, color: bool) -> Result<Vec<u8>, image::ImageError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100));
    if color {
        encoder.encode_image(&img.to_rgb8())?;
    } else {
        encoder.encode_image(&img.to_luma8())?;
    }
    debug!(
        "Encoded {}x{} {} JPEG q{} → {} bytes",
        img.width(),
        img.height(),
        if color { "RGB" } else { "gray" },
        quality,
        buf.len()
    );
    Ok(buf)
}

/// Frame header of a JPEG stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JpegHeader {
    pub width: u32,
    pub height: u32,
    /// Colour components: 1 gray, 3 YCbCr/RGB, 4 CMYK.
    pub components: u8,
}

/// Read the first SOF frame header from JPEG bytes without decoding pixels.
///
/// Returns `None` for anything that is not a well-formed JPEG header.
pub fn jpeg_header(bytes: &[u8]) -> Option<JpegHeader> {
    if bytes.len() < 4 || bytes[0] != 0xFF || bytes[1] != 0xD8 {
        return None;
    }
    let mut pos = 2;
    while pos + 4 <= bytes.len() {
        if bytes[pos] != 0xFF {
            return None;
        }
        let marker = bytes[pos + 1];
        // Fill bytes between markers.
        if marker == 0xFF {
            pos += 1;
            continue;
        }
        let len = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]) as usize;
        let is_sof = matches!(marker, 0xC0..=0xCF) && !matches!(marker, 0xC4 | 0xC8 | 0xCC);
        if is_sof {
            let seg = bytes.get(pos + 4..pos + 2 + len)?;
            if seg.len() < 6 {
                return None;
            }
            let height = u16::from_be_bytes([seg[1], seg[2]]) as u32;
            let width = u16::from_be_bytes([seg[3], seg[4]]) as u32;
            return Some(JpegHeader {
                width,
                height,
                components: seg[5],
            });
        }
        // Start of scan before any frame header.
        if marker == 0xDA {
            return None;
        }
        pos += 2 + len;
    }
    None
}
