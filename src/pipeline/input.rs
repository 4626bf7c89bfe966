//! Input validation: make sure a discovered file is a readable PDF before any
//! stage opens it.
//!
//! Discovery only looks at the extension. Checking the `%PDF` magic bytes here
//! gives the report a meaningful error instead of a parser or pdfium failure
//! deep inside the pipeline.

use crate::error::PipelineError;
use std::io::Read;
use std::path::Path;
use tracing::debug;

/// Validate that `path` exists, is readable and starts with `%PDF`.
pub fn validate_pdf(path: &Path) -> Result<(), PipelineError> {
    if !path.exists() {
        return Err(PipelineError::FileNotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(mut f) => {
            let mut magic = [0u8; 4];
            match f.read_exact(&mut magic) {
                Ok(()) if &magic == b"%PDF" => {}
                // Short files get whatever bytes they had, zero-padded.
                Ok(()) | Err(_) => {
                    return Err(PipelineError::NotAPdf {
                        path: path.to_path_buf(),
                        magic,
                    })
                }
            }
        }
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(PipelineError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(e) => return Err(PipelineError::io(path, e)),
    }

    debug!("Validated PDF input: {}", path.display());
    Ok(())
}

/// True when the file name ends in `.pdf`, ignoring case.
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pdf"))
}
