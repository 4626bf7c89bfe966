//! lopdf helpers shared by the structural stages (metadata, split, combine,
//! rebuild, outline).
//!
//! Everything here is blocking; async callers wrap it in `spawn_blocking`.

use crate::error::PipelineError;
use crate::output::DocumentMetadata;
use lopdf::{Dictionary, Document, Object, ObjectId, StringFormat};
use std::path::Path;
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE_PAGE_KEYS: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Load a PDF, mapping parse failures to [`PipelineError::CorruptPdf`].
pub fn load(path: &Path) -> Result<Document, PipelineError> {
    Document::load(path).map_err(|e| PipelineError::pdf(path, e))
}

/// Save a document to `path`.
pub fn save(doc: &mut Document, path: &Path) -> Result<(), PipelineError> {
    doc.save(path).map_err(|e| PipelineError::io(path, e))?;
    Ok(())
}

/// Page object ids in page order.
pub fn page_ids(doc: &Document) -> Vec<ObjectId> {
    doc.get_pages().into_values().collect()
}

/// Number of pages in the PDF at `path`.
pub fn page_count(path: &Path) -> Result<usize, PipelineError> {
    Ok(load(path)?.get_pages().len())
}

/// Read producer, title and page count from a PDF.
pub fn read_metadata(path: &Path) -> Result<DocumentMetadata, PipelineError> {
    let doc = load(path)?;
    let info = doc
        .trailer
        .get(b"Info")
        .ok()
        .and_then(|obj| resolve(&doc, obj).as_dict().ok());

    let text_field = |key: &[u8]| -> Option<String> {
        info.and_then(|d| d.get(key).ok())
            .and_then(|obj| resolve(&doc, obj).as_str().ok())
            .map(decode_text_string)
            .filter(|s| !s.is_empty())
    };

    let metadata = DocumentMetadata {
        producer: text_field(b"Producer"),
        title: text_field(b"Title"),
        page_count: doc.get_pages().len(),
        pdf_version: doc.version.clone(),
    };
    debug!(
        "Metadata for {}: producer={:?}, {} pages",
        path.display(),
        metadata.producer,
        metadata.page_count
    );
    Ok(metadata)
}

/// Follow a single indirect reference, returning the object itself otherwise.
///
/// Broken references resolve to `Object::Null`.
pub fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> &'a Object {
    match obj {
        Object::Reference(id) => doc.get_object(*id).unwrap_or(&Object::Null),
        other => other,
    }
}

/// Look up `key` in `dict`, following an indirect reference.
pub fn get_resolved<'a>(doc: &'a Document, dict: &'a Dictionary, key: &[u8]) -> Option<&'a Object> {
    dict.get(key).ok().map(|obj| resolve(doc, obj))
}

/// Object id of the document catalog.
pub fn catalog_id(doc: &Document) -> Result<ObjectId, lopdf::Error> {
    doc.trailer.get(b"Root")?.as_reference()
}

/// Decode a PDF text string (UTF-16BE or UTF-8 with BOM, else PDFDocEncoding).
///
/// PDFDocEncoding is treated as Latin-1, which matches it for every printable
/// ASCII and Latin-1 code point.
pub fn decode_text_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Some(rest) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        String::from_utf8_lossy(rest).into_owned()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}

/// Encode a text string: ASCII as a literal, anything else as UTF-16BE with BOM.
pub fn encode_text_string(text: &str) -> Object {
    if text.is_ascii() {
        Object::String(text.as_bytes().to_vec(), StringFormat::Literal)
    } else {
        let mut bytes = vec![0xFE, 0xFF];
        for unit in text.encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        Object::String(bytes, StringFormat::Hexadecimal)
    }
}

/// Copy inherited page attributes onto the page dictionary itself, so the
/// page stays complete once detached from its original page tree.
pub fn flatten_inherited_attributes(doc: &mut Document, page_id: ObjectId) -> Result<(), lopdf::Error> {
    let mut inherited: Vec<(&'static [u8], Object)> = Vec::new();
    {
        let page = doc.get_dictionary(page_id)?;
        for key in INHERITABLE_PAGE_KEYS {
            if page.has(key) {
                continue;
            }
            let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
            let mut depth = 0;
            while let Some(parent_id) = parent {
                // Page trees are shallow; a long chain means a reference cycle.
                if depth > 64 {
                    break;
                }
                let Ok(node) = doc.get_dictionary(parent_id) else {
                    break;
                };
                if let Ok(value) = node.get(key) {
                    inherited.push((key, value.clone()));
                    break;
                }
                parent = node.get(b"Parent").and_then(Object::as_reference).ok();
                depth += 1;
            }
        }
    }

    if !inherited.is_empty() {
        let page = doc.get_object_mut(page_id)?.as_dict_mut()?;
        for (key, value) in inherited {
            page.set(key, value);
        }
    }
    Ok(())
}


#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use lopdf::dictionary;
    use tempfile::tempdir;

    #[test]
    fn read_metadata_finds_producer_and_pages() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        write_blank_pdf(&path, 7, Some("TCPDF 6.2.13"));

        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.producer.as_deref(), Some("TCPDF 6.2.13"));
        assert_eq!(meta.page_count, 7);
        assert_eq!(meta.title, None);
    }

    #[test]
    fn read_metadata_without_info_dictionary() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("doc.pdf");
        write_blank_pdf(&path, 2, None);

        let meta = read_metadata(&path).unwrap();
        assert_eq!(meta.producer, None);
        assert_eq!(meta.page_count, 2);
    }

    #[test]
    fn read_metadata_on_garbage_is_corrupt_pdf() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.pdf");
        std::fs::write(&path, b"%PDF-1.4\nthis is not a pdf").unwrap();
        assert!(matches!(
            read_metadata(&path),
            Err(PipelineError::CorruptPdf { .. })
        ));
    }

    #[test]
    fn text_string_round_trips_non_ascii() {
        let obj = encode_text_string("अध्याय 1");
        let Object::String(bytes, _) = obj else {
            panic!("expected string");
        };
        assert_eq!(&bytes[..2], &[0xFE, 0xFF]);
        assert_eq!(decode_text_string(&bytes), "अध्याय 1");
    }

    #[test]
    fn decode_latin1_fallback() {
        assert_eq!(decode_text_string(b"Caf\xe9"), "Café");
        assert_eq!(decode_text_string(b"\xEF\xBB\xBFna\xC3\xAFve"), "naïve");
    }

    #[test]
    fn flatten_copies_mediabox_from_parent() {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![Object::from(page_id)],
                "Count" => 1,
                "MediaBox" => vec![0.into(), 0.into(), 300.into(), 400.into()],
                "Rotate" => 90,
            }),
        );

        flatten_inherited_attributes(&mut doc, page_id).unwrap();
        let page = doc.get_dictionary(page_id).unwrap();
        assert!(page.has(b"MediaBox"));
        assert_eq!(page.get(b"Rotate").unwrap().as_i64().unwrap(), 90);
        assert!(!page.has(b"CropBox"));
    }
}
