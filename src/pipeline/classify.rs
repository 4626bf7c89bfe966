//! Producer classifier: decide per file whether the PDF can be OCR'd as-is
//! or must be flattened and rebuilt first.
//!
//! Some generators (TCPDF, ReportLab, various GPL toolchains) emit text layers
//! the recognition engine trips over. Long documents from those producers go
//! through the raster-rebuild path; everything else is OCR'd directly.

use crate::config::ClassifierOptions;
use crate::output::{DocumentMetadata, Route};
use tracing::debug;

/// Choose the processing route for a document.
///
/// `metadata` is `None` when it could not be read; such documents take the
/// direct path. Matching is a case-sensitive substring test on the producer.
pub fn classify(metadata: Option<&DocumentMetadata>, options: &ClassifierOptions) -> Route {
    let Some(meta) = metadata else {
        return Route::Direct;
    };
    let Some(producer) = meta.producer.as_deref() else {
        return Route::Direct;
    };

    let matched = options
        .untrusted_producers
        .iter()
        .find(|p| !p.is_empty() && producer.contains(p.as_str()));

    match matched {
        Some(p) if meta.page_count >= options.min_pages => {
            debug!(
                "Producer '{}' matches '{}' with {} pages → raster-rebuild",
                producer, p, meta.page_count
            );
            Route::RasterRebuild
        }
        Some(p) => {
            debug!(
                "Producer '{}' matches '{}' but only {} pages (< {}) → direct",
                producer, p, meta.page_count, options.min_pages
            );
            Route::Direct
        }
        None => Route::Direct,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(producer: Option<&str>, pages: usize) -> DocumentMetadata {
        DocumentMetadata {
            producer: producer.map(String::from),
            page_count: pages,
            ..DocumentMetadata::default()
        }
    }

    #[test]
    fn untrusted_producer_with_enough_pages_is_rerouted() {
        let opts = ClassifierOptions::default();
        assert_eq!(
            classify(Some(&meta(Some("TCPDF 6.0"), 12)), &opts),
            Route::RasterRebuild
        );
        assert_eq!(
            classify(Some(&meta(Some("ReportLab PDF Library - www.reportlab.com"), 5)), &opts),
            Route::RasterRebuild
        );
        assert_eq!(
            classify(Some(&meta(Some("GPL Ghostscript 9.54"), 40)), &opts),
            Route::RasterRebuild
        );
    }

    #[test]
    fn threshold_is_inclusive() {
        let opts = ClassifierOptions::default();
        assert_eq!(classify(Some(&meta(Some("TCPDF"), 4)), &opts), Route::Direct);
        assert_eq!(classify(Some(&meta(Some("TCPDF"), 5)), &opts), Route::RasterRebuild);
    }

    #[test]
    fn matching_is_case_sensitive() {
        let opts = ClassifierOptions::default();
        assert_eq!(classify(Some(&meta(Some("tcpdf"), 50)), &opts), Route::Direct);
        assert_eq!(classify(Some(&meta(Some("reportlab"), 50)), &opts), Route::Direct);
    }

    #[test]
    fn missing_metadata_or_producer_goes_direct() {
        let opts = ClassifierOptions::default();
        assert_eq!(classify(None, &opts), Route::Direct);
        assert_eq!(classify(Some(&meta(None, 100)), &opts), Route::Direct);
        assert_eq!(classify(Some(&meta(Some("Adobe PDF Library 15.0"), 100)), &opts), Route::Direct);
    }

    #[test]
    fn custom_producer_list() {
        let opts = ClassifierOptions {
            untrusted_producers: vec!["wkhtmltopdf".into(), String::new()],
            min_pages: 1,
        };
        assert_eq!(
            classify(Some(&meta(Some("Qt 4.8.7 wkhtmltopdf"), 1)), &opts),
            Route::RasterRebuild
        );
        // An empty pattern never matches everything.
        assert_eq!(classify(Some(&meta(Some("TCPDF"), 10)), &opts), Route::Direct);
    }
}
