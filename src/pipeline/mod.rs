//! Pipeline stages for batch PDF normalisation.
//!
//! Each submodule implements one transformation step and can be tested on
//! its own. External collaborators (page renderer, recognition engine,
//! compressor) sit behind traits so the orchestrator never builds command
//! lines or touches pdfium directly.
//!
//! ## Data Flow
//!
//! ```text
//!             ┌─ raster-rebuild ─────────────────────────────────────────────┐
//! input ─▶ classify                                                           ├─▶ normalize
//!             │  raster ─▶ rebuild ─▶ split ─▶ ocr×N ─▶ combine ─▶ outline    │
//!             └─ direct ─────────────────▶ ocr ──────────────────────────────┘
//! ```
//!
//! 1. [`input`]     check the file exists and starts with `%PDF`
//! 2. [`classify`]  pick the route from the `/Producer` string and page count
//! 3. [`raster`]    render pages to JPEG via [`render`] and rebuild an
//!    image-only PDF; pixels are encoded by [`encode`]
//! 4. [`chunk`]     split into bounded page ranges and recombine after OCR
//! 5. [`ocr`]       run the recognition engine with the failure policy
//! 6. [`outline`]   copy the source bookmarks onto the rebuilt document
//! 7. [`normalize`] rewrite as PDF 1.4 with downsampled images
//!
//! [`pdf`] holds the lopdf helpers shared by the structural stages and
//! [`command`] runs external tools with a timeout.

pub mod chunk;
pub mod classify;
pub mod command;
pub mod encode;
pub mod input;
pub mod normalize;
pub mod ocr;
pub mod outline;
pub mod pdf;
pub mod raster;
pub mod render;
