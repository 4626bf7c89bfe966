//! Chunking: split a document into bounded page ranges for the recognition
//! engine, then stitch the recognised chunks back together.
//!
//! Chunk indices are 1-based and partition the document exactly. The
//! combiner refuses anything that is not the contiguous sequence `1..=n` and
//! checks page counts at every step, so a dropped or duplicated chunk can
//! never produce a silently shorter document.

use crate::error::PipelineError;
use crate::pipeline::pdf;
use lopdf::{dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::Range;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// A contiguous page range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRange {
    /// 1-based chunk index.
    pub index: usize,
    /// 0-based index of the first page.
    pub first_page: usize,
    pub page_count: usize,
}

impl ChunkRange {
    /// 0-based page indices covered by this chunk.
    pub fn pages(&self) -> Range<usize> {
        self.first_page..self.first_page + self.page_count
    }
}

/// A chunk written to disk by [`split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkFile {
    pub range: ChunkRange,
    pub path: PathBuf,
}

/// A recognised chunk handed to [`combine`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOutput {
    /// 1-based chunk index.
    pub index: usize,
    pub path: PathBuf,
    /// Page count the chunk had before recognition.
    pub expected_pages: usize,
}

/// File name for chunk `index` (`chunk_3.pdf`).
pub fn chunk_file_name(index: usize) -> String {
    format!("chunk_{}.pdf", index)
}

// ── Planning ─────────────────────────────────────────────────────────────

/// Partition `page_count` pages into ranges of at most `chunk_size` pages.
///
/// Only the last range may be shorter. A `chunk_size` of zero is treated as
/// one; config validation rejects it earlier.
pub fn plan_chunks(page_count: usize, chunk_size: usize) -> Vec<ChunkRange> {
    let size = chunk_size.max(1);
    (0..page_count)
        .step_by(size)
        .enumerate()
        .map(|(i, first_page)| ChunkRange {
            index: i + 1,
            first_page,
            page_count: size.min(page_count - first_page),
        })
        .collect()
}

// ── Split ────────────────────────────────────────────────────────────────

/// Split `pdf` into `chunk_{i}.pdf` files under `out_dir`.
pub async fn split(pdf: &Path, chunk_size: usize, out_dir: &Path) -> Result<Vec<ChunkFile>, PipelineError> {
    let pdf = pdf.to_path_buf();
    let out_dir = out_dir.to_path_buf();
    tokio::task::spawn_blocking(move || split_blocking(&pdf, chunk_size, &out_dir))
        .await
        .map_err(|e| PipelineError::Internal(format!("Split task panicked: {}", e)))?
}

/// Blocking implementation of [`split`].
pub fn split_blocking(pdf: &Path, chunk_size: usize, out_dir: &Path) -> Result<Vec<ChunkFile>, PipelineError> {
    let mut source = pdf::load(pdf)?;
    let page_ids = pdf::page_ids(&source);
    for &id in &page_ids {
        pdf::flatten_inherited_attributes(&mut source, id).map_err(|e| PipelineError::pdf(pdf, e))?;
    }
    drop_outline(&mut source);

    let total = page_ids.len();
    let plan = plan_chunks(total, chunk_size);
    info!(
        "Splitting {} ({} pages) into {} chunk(s) of ≤{}",
        pdf.display(),
        total,
        plan.len(),
        chunk_size
    );

    let mut files = Vec::with_capacity(plan.len());
    for range in plan {
        let mut doc = source.clone();
        let keep = range.pages();
        let delete: Vec<u32> = (1..=total as u32)
            .filter(|n| !keep.contains(&(*n as usize - 1)))
            .collect();
        doc.delete_pages(&delete);
        doc.prune_objects();

        let actual = doc.get_pages().len();
        if actual != range.page_count {
            return Err(PipelineError::PageCountMismatch {
                context: format!("chunk {}", range.index),
                expected: range.page_count,
                actual,
            });
        }

        let path = out_dir.join(chunk_file_name(range.index));
        pdf::save(&mut doc, &path)?;
        debug!(
            "Chunk {}: pages {}–{} → {}",
            range.index,
            range.first_page + 1,
            range.first_page + range.page_count,
            path.display()
        );
        files.push(ChunkFile { range, path });
    }
    Ok(files)
}

/// Remove the catalog's outline so chunks carry no dangling bookmarks.
fn drop_outline(doc: &mut Document) {
    let Ok(catalog_id) = pdf::catalog_id(doc) else {
        return;
    };
    if let Ok(catalog) = doc.get_object_mut(catalog_id).and_then(Object::as_dict_mut) {
        catalog.remove(b"Outlines");
    }
}

// ── Combine ──────────────────────────────────────────────────────────────

/// Concatenate recognised chunks in index order into `output`.
///
/// Returns the total page count.
pub async fn combine(chunks: &[ChunkOutput], output: &Path) -> Result<usize, PipelineError> {
    let chunks = chunks.to_vec();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || combine_blocking(&chunks, &output))
        .await
        .map_err(|e| PipelineError::Internal(format!("Combine task panicked: {}", e)))?
}

/// Blocking implementation of [`combine`].
pub fn combine_blocking(chunks: &[ChunkOutput], output: &Path) -> Result<usize, PipelineError> {
    let mut ordered: Vec<&ChunkOutput> = chunks.iter().collect();
    ordered.sort_by_key(|c| c.index);
    if ordered.is_empty() {
        return Err(PipelineError::ChunkSequenceBroken {
            expected: 1,
            found: 0,
        });
    }
    for (i, chunk) in ordered.iter().enumerate() {
        if chunk.index != i + 1 {
            return Err(PipelineError::ChunkSequenceBroken {
                expected: i + 1,
                found: chunk.index,
            });
        }
    }

    let expected_total: usize = ordered.iter().map(|c| c.expected_pages).sum();
    let mut max_id: u32 = 1;
    let mut pages: Vec<(ObjectId, Object)> = Vec::with_capacity(expected_total);
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for chunk in &ordered {
        let mut doc = pdf::load(&chunk.path)?;
        let ids = pdf::page_ids(&doc);
        if ids.len() != chunk.expected_pages {
            return Err(PipelineError::PageCountMismatch {
                context: format!("chunk {}", chunk.index),
                expected: chunk.expected_pages,
                actual: ids.len(),
            });
        }
        for &id in &ids {
            pdf::flatten_inherited_attributes(&mut doc, id).map_err(|e| PipelineError::pdf(&chunk.path, e))?;
        }

        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // Page order comes from the page tree, not object ids.
        for id in pdf::page_ids(&doc) {
            let page = doc
                .get_object(id)
                .map_err(|e| PipelineError::pdf(&chunk.path, e))?
                .clone();
            pages.push((id, page));
        }
        for (id, obj) in doc.objects {
            if !is_document_structure(&obj) {
                objects.insert(id, obj);
            }
        }
        debug!("Merged chunk {} ({} pages)", chunk.index, ids.len());
    }

    let mut merged = Document::with_version("1.5");
    merged.max_id = max_id;
    let pages_id = merged.new_object_id();

    merged.objects.extend(objects);
    let mut kids = Vec::with_capacity(pages.len());
    for (id, page) in pages {
        let mut page = match page {
            Object::Dictionary(d) => d,
            _ => {
                return Err(PipelineError::Internal(format!(
                    "page object {:?} is not a dictionary",
                    id
                )))
            }
        };
        page.set("Parent", pages_id);
        merged.objects.insert(id, Object::Dictionary(page));
        kids.push(Object::Reference(id));
    }

    let count = kids.len();
    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);
    merged.prune_objects();
    merged.renumber_objects();
    merged.compress();

    pdf::save(&mut merged, output)?;

    let actual = pdf::page_count(output)?;
    if actual != expected_total {
        return Err(PipelineError::PageCountMismatch {
            context: "combined document".into(),
            expected: expected_total,
            actual,
        });
    }
    info!(
        "Combined {} chunk(s) into {} ({} pages)",
        ordered.len(),
        output.display(),
        actual
    );
    Ok(actual)
}

/// Catalog, page-tree and outline objects are rebuilt for the merged file.
fn is_document_structure(obj: &Object) -> bool {
    let Ok(dict) = obj.as_dict() else {
        return false;
    };
    matches!(
        dict.get(b"Type").and_then(Object::as_name),
        Ok(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline")
    )
}
