//! Bookmark reconciliation: read the outline of the original document and
//! write it onto the rebuilt one at the same page indices.
//!
//! Rasterising throws the outline away along with everything else, so after
//! OCR the navigation tree is copied back from the untouched source. Page
//! identity survives rasterisation (page *i* of the source is page *i* of the
//! rebuilt file), which makes the mapping a straight index copy.
//!
//! Reading resolves explicit destinations, `GoTo` actions and named
//! destinations (both the PDF 1.1 `/Dests` dictionary and the `/Names` name
//! tree). Entries whose target cannot be resolved to a page in this document
//! keep their place in the tree and are written without a destination.

use crate::error::PipelineError;
use crate::pipeline::pdf;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Title written when the source has no outline at all.
pub const NO_BOOKMARKS_TITLE: &str = "No Bookmarks";

/// Named destinations may point at other named destinations; give up after this.
const MAX_DEST_INDIRECTION: usize = 8;

/// Name trees are shallow in practice; deeper ones are treated as malformed.
const MAX_NAME_TREE_DEPTH: usize = 32;

/// One outline entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineNode {
    pub title: String,
    /// 0-based page index in the source, `None` when the entry has no
    /// in-document target.
    pub page_index: Option<usize>,
    pub children: Vec<OutlineNode>,
    /// Whether viewers show the children expanded. Stored in the PDF as the
    /// sign of the item's `/Count`.
    #[serde(default = "expanded")]
    pub open: bool,
}

fn expanded() -> bool {
    true
}

impl OutlineNode {
    pub fn new(title: impl Into<String>, page_index: Option<usize>) -> Self {
        Self {
            title: title.into(),
            page_index,
            children: Vec::new(),
            open: true,
        }
    }

    pub fn with_children(mut self, children: Vec<OutlineNode>) -> Self {
        self.children = children;
        self
    }

    /// Mark the entry as collapsed.
    pub fn collapsed(mut self) -> Self {
        self.open = false;
        self
    }
}

/// Total number of entries in a forest, children included.
pub fn count_entries(nodes: &[OutlineNode]) -> usize {
    nodes.iter().map(|n| 1 + count_entries(&n.children)).sum()
}

/// Entries shown when every level down to `nodes` is expanded: each node plus
/// the visible descendants of the open ones.
fn visible_entries(nodes: &[OutlineNode]) -> usize {
    nodes
        .iter()
        .map(|n| 1 + if n.open { visible_entries(&n.children) } else { 0 })
        .sum()
}

// ── Reading ──────────────────────────────────────────────────────────────

/// Read the outline of the PDF at `path`.
///
/// Returns `Ok(None)` when the document has no outline or an empty one.
pub fn read_outline(path: &Path) -> Result<Option<Vec<OutlineNode>>, PipelineError> {
    let doc = pdf::load(path)?;
    Ok(read_outline_from(&doc))
}

/// Read the outline of an already loaded document.
pub fn read_outline_from(doc: &Document) -> Option<Vec<OutlineNode>> {
    let catalog = doc.catalog().ok()?;
    let outlines = pdf::get_resolved(doc, catalog, b"Outlines")?.as_dict().ok()?;
    let first = outlines.get(b"First").and_then(Object::as_reference).ok();

    let mut reader = OutlineReader {
        doc,
        pages: doc
            .get_pages()
            .into_iter()
            .map(|(number, id)| (id, number as usize - 1))
            .collect(),
        visited: HashSet::new(),
    };
    let nodes = reader.read_level(first);
    (!nodes.is_empty()).then_some(nodes)
}

struct OutlineReader<'a> {
    doc: &'a Document,
    pages: HashMap<ObjectId, usize>,
    visited: HashSet<ObjectId>,
}

impl<'a> OutlineReader<'a> {
    fn read_level(&mut self, first: Option<ObjectId>) -> Vec<OutlineNode> {
        let doc: &'a Document = self.doc;
        let mut nodes = Vec::new();
        let mut next = first;

        while let Some(id) = next {
            if !self.visited.insert(id) {
                warn!("Outline item {:?} visited twice; cutting loop", id);
                break;
            }
            let Ok(item) = doc.get_dictionary(id) else {
                warn!("Outline item {:?} is not a dictionary", id);
                break;
            };

            let title = pdf::get_resolved(doc, item, b"Title")
                .and_then(|t| t.as_str().ok())
                .map(pdf::decode_text_string)
                .unwrap_or_default();
            let page_index = self.target_of(item);
            if page_index.is_none() {
                debug!("Outline entry '{}' has no in-document target", title);
            }

            let first_child = item.get(b"First").and_then(Object::as_reference).ok();
            next = item.get(b"Next").and_then(Object::as_reference).ok();

            let children = self.read_level(first_child);
            // A negative /Count marks a collapsed entry; leaves have nothing to collapse.
            let collapsed = item.get(b"Count").and_then(Object::as_i64).is_ok_and(|c| c < 0);
            nodes.push(OutlineNode {
                title,
                page_index,
                open: !(collapsed && !children.is_empty()),
                children,
            });
        }
        nodes
    }

    /// Page index targeted by `/Dest` or a `/GoTo` action.
    fn target_of(&self, item: &'a Dictionary) -> Option<usize> {
        if let Ok(dest) = item.get(b"Dest") {
            return self.dest_to_page(dest, 0);
        }
        let action = pdf::get_resolved(self.doc, item, b"A")?.as_dict().ok()?;
        if action.get(b"S").and_then(Object::as_name).ok()? != b"GoTo" {
            return None;
        }
        self.dest_to_page(action.get(b"D").ok()?, 0)
    }

    fn dest_to_page(&self, dest: &'a Object, depth: usize) -> Option<usize> {
        if depth > MAX_DEST_INDIRECTION {
            return None;
        }
        match pdf::resolve(self.doc, dest) {
            Object::Array(items) => match items.first()? {
                Object::Reference(id) => self.pages.get(id).copied(),
                // Some generators write a page number instead of a reference.
                Object::Integer(n) => usize::try_from(*n).ok().filter(|i| *i < self.pages.len()),
                _ => None,
            },
            Object::Dictionary(d) => self.dest_to_page(d.get(b"D").ok()?, depth + 1),
            Object::Name(name) | Object::String(name, _) => {
                let target = self.named_destination(name)?;
                self.dest_to_page(target, depth + 1)
            }
            _ => None,
        }
    }

    fn named_destination(&self, name: &[u8]) -> Option<&'a Object> {
        let doc = self.doc;
        let catalog = doc.catalog().ok()?;

        if let Some(Object::Dictionary(dests)) = pdf::get_resolved(doc, catalog, b"Dests") {
            if let Ok(target) = dests.get(name) {
                return Some(target);
            }
        }

        let names = pdf::get_resolved(doc, catalog, b"Names")?.as_dict().ok()?;
        let tree = pdf::get_resolved(doc, names, b"Dests")?.as_dict().ok()?;
        lookup_name_tree(doc, tree, name, 0)
    }
}

fn lookup_name_tree<'a>(doc: &'a Document, node: &'a Dictionary, name: &[u8], depth: usize) -> Option<&'a Object> {
    if depth > MAX_NAME_TREE_DEPTH {
        return None;
    }
    if let Some(Object::Array(pairs)) = pdf::get_resolved(doc, node, b"Names") {
        for pair in pairs.chunks(2) {
            if let [key, value] = pair {
                if pdf::resolve(doc, key).as_str().ok() == Some(name) {
                    return Some(value);
                }
            }
        }
    }
    if let Some(Object::Array(kids)) = pdf::get_resolved(doc, node, b"Kids") {
        for kid in kids {
            if let Ok(kid) = pdf::resolve(doc, kid).as_dict() {
                if let Some(found) = lookup_name_tree(doc, kid, name, depth + 1) {
                    return Some(found);
                }
            }
        }
    }
    None
}

// ── Writing ──────────────────────────────────────────────────────────────

/// Check every target against `page_count`, depth-first.
pub fn validate_targets(nodes: &[OutlineNode], page_count: usize) -> Result<(), PipelineError> {
    for node in nodes {
        if let Some(page_index) = node.page_index {
            if page_index >= page_count {
                return Err(PipelineError::BookmarkOutOfRange {
                    title: node.title.clone(),
                    page_index,
                    page_count,
                });
            }
        }
        validate_targets(&node.children, page_count)?;
    }
    Ok(())
}

/// Replace the outline of `doc` with `nodes`. Returns the number of entries.
///
/// Targets must already be validated; an index past the last page is written
/// without a destination.
pub fn write_outline(doc: &mut Document, nodes: &[OutlineNode]) -> Result<usize, lopdf::Error> {
    let page_ids = pdf::page_ids(doc);
    let root_id = doc.new_object_id();
    let total = count_entries(nodes);

    let mut root = dictionary! {
        "Type" => "Outlines",
        "Count" => visible_entries(nodes) as i64,
    };
    if let Some((first, last)) = write_level(doc, nodes, root_id, &page_ids) {
        root.set("First", first);
        root.set("Last", last);
    }
    doc.objects.insert(root_id, Object::Dictionary(root));

    let catalog_id = pdf::catalog_id(doc)?;
    doc.get_object_mut(catalog_id)?
        .as_dict_mut()?
        .set("Outlines", root_id);
    Ok(total)
}

fn write_level(
    doc: &mut Document,
    nodes: &[OutlineNode],
    parent: ObjectId,
    page_ids: &[ObjectId],
) -> Option<(ObjectId, ObjectId)> {
    let ids: Vec<ObjectId> = nodes.iter().map(|_| doc.new_object_id()).collect();

    for (i, node) in nodes.iter().enumerate() {
        let mut item = dictionary! {
            "Title" => pdf::encode_text_string(&node.title),
            "Parent" => parent,
        };
        if i > 0 {
            item.set("Prev", ids[i - 1]);
        }
        if let Some(next) = ids.get(i + 1) {
            item.set("Next", *next);
        }
        if let Some(page_id) = node.page_index.and_then(|p| page_ids.get(p)) {
            item.set("Dest", vec![Object::Reference(*page_id), Object::Name(b"Fit".to_vec())]);
        }
        if let Some((first, last)) = write_level(doc, &node.children, ids[i], page_ids) {
            item.set("First", first);
            item.set("Last", last);
            let shown = visible_entries(&node.children) as i64;
            item.set("Count", if node.open { shown } else { -shown });
        }
        doc.objects.insert(ids[i], Object::Dictionary(item));
    }

    Some((*ids.first()?, *ids.last()?))
}

// ── Transfer ─────────────────────────────────────────────────────────────

/// Copy the outline of `source` onto `destination`, writing the result to
/// `output`. Returns the number of outline entries written.
///
/// A source without an outline yields a single [`NO_BOOKMARKS_TITLE`] entry
/// pointing at the first page. Nothing is written when any target is out of
/// range.
pub async fn transfer(source: &Path, destination: &Path, output: &Path) -> Result<usize, PipelineError> {
    let source = source.to_path_buf();
    let destination = destination.to_path_buf();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || transfer_blocking(&source, &destination, &output))
        .await
        .map_err(|e| PipelineError::Internal(format!("Outline task panicked: {}", e)))?
}

/// Blocking implementation of [`transfer`].
pub fn transfer_blocking(source: &Path, destination: &Path, output: &Path) -> Result<usize, PipelineError> {
    let nodes = match read_outline(source)? {
        Some(nodes) => nodes,
        None => {
            info!("{} has no bookmarks; writing placeholder", source.display());
            vec![OutlineNode::new(NO_BOOKMARKS_TITLE, Some(0))]
        }
    };

    let mut doc = pdf::load(destination)?;
    let page_count = doc.get_pages().len();
    validate_targets(&nodes, page_count)?;

    let written = write_outline(&mut doc, &nodes).map_err(|e| PipelineError::pdf(destination, e))?;
    doc.prune_objects();
    pdf::save(&mut doc, output)?;
    info!(
        "Transferred {} bookmark(s) onto {} ({} pages)",
        written,
        output.display(),
        page_count
    );
    Ok(written)
}
