//! services/api/src/adapters/pdf_merge.rs
//!
//! Implements the `PdfMerger` port with `lopdf`. The page trees of all inputs
//! are flattened into a single `Pages` node, in input order.

use async_trait::async_trait;
use lopdf::{dictionary, Dictionary, Document as PdfDocument, Object, ObjectId};
use std::path::{Path, PathBuf};
use studyflow_core::ports::{PdfMerger, PortError, PortResult};
use tracing::debug;

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];
const MAX_TREE_DEPTH: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct LopdfMerger;

impl LopdfMerger {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PdfMerger for LopdfMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> PortResult<usize> {
        if inputs.is_empty() {
            return Err(PortError::Unexpected("No PDFs to merge".to_string()));
        }
        let inputs = inputs.to_vec();
        let output = output.to_path_buf();
        tokio::task::spawn_blocking(move || merge_pdfs(&inputs, &output))
            .await
            .map_err(|e| PortError::Unexpected(format!("PDF merge task failed: {}", e)))?
            .map_err(PortError::Unexpected)
    }
}

fn merge_pdfs(inputs: &[PathBuf], output: &Path) -> Result<usize, String> {
    let mut merged = PdfDocument::with_version("1.5");
    let pages_id = merged.new_object_id();
    let mut kids: Vec<Object> = Vec::new();

    for input in inputs {
        let mut doc =
            PdfDocument::load(input).map_err(|e| format!("{}: {}", input.display(), e))?;
        doc.renumber_objects_with(merged.max_id + 1);
        merged.max_id = doc.max_id;

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(format!("{} has no pages", input.display()));
        }

        for page_id in page_ids {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| format!("{}: {}", input.display(), e))?
                .clone();
            // The old page tree is dropped, so inherited attributes move onto the page.
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(&doc, &page, key) {
                        page.set(key.to_vec(), value);
                    }
                }
            }
            page.set("Parent", pages_id);
            doc.objects.insert(page_id, Object::Dictionary(page));
            kids.push(Object::Reference(page_id));
        }

        for (id, object) in doc.objects {
            if !is_tree_node(&object) {
                merged.objects.insert(id, object);
            }
        }
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
    merged.compress();
    merged
        .save(output)
        .map_err(|e| format!("Failed to write {}: {}", output.display(), e))?;

    debug!("Wrote {} pages to {}", count, output.display());
    Ok(count)
}

fn inherited_attribute(doc: &PdfDocument, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    for _ in 0..MAX_TREE_DEPTH {
        let node = doc.get_dictionary(parent?).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
    }
    None
}

/// Catalogs and intermediate page-tree nodes are rebuilt, not copied.
fn is_tree_node(object: &Object) -> bool {
    object
        .as_dict()
        .and_then(|dict| dict.get(b"Type"))
        .and_then(Object::as_name)
        .map(|name| name == b"Catalog" || name == b"Pages")
        .unwrap_or(false)
}

/// Writes a small PDF with one page per entry of `texts`.
#[cfg(test)]
pub(crate) fn write_test_pdf(path: &Path, texts: &[&str]) {
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    let mut doc = PdfDocument::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Courier",
    });
    let resources_id = doc.add_object(dictionary! {
        "Font" => dictionary! { "F1" => font_id },
    });

    let mut kids: Vec<Object> = Vec::new();
    for text in texts {
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![72.into(), 720.into()]),
                Operation::new("Tj", vec![Object::string_literal(*text)]),
                Operation::new("ET", vec![]),
            ],
        };
        let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        kids.push(page_id.into());
    }

    let count = kids.len() as i64;
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}
