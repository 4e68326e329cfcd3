//! PDF merging: concatenate the pages of several documents into one file.
//!
//! Every input's objects are renumbered into a disjoint id range, its pages
//! are re-parented under a single fresh page tree, and a new catalog points
//! at that tree. Attributes a page inherited from its old tree (resources,
//! media box, rotation) are copied onto the page first, since the old tree
//! is dropped.
//!
//! The output is written to a temp file next to the destination and renamed
//! into place, so a failed merge never leaves a truncated document behind.

use crate::error::InvoiceMergeError;
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Page attributes that may live on an ancestor `Pages` node.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// Guard against cyclic `Parent` chains in malformed files.
const MAX_TREE_DEPTH: usize = 64;

/// Merges documents into one output file.
pub trait Merger: Send + Sync {
    /// Merge `inputs` (in order) into `output`; returns the merged page count.
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<usize, InvoiceMergeError>;
}

/// [`Merger`] backed by lopdf.
#[derive(Debug, Default, Clone, Copy)]
pub struct LopdfMerger;

impl Merger for LopdfMerger {
    fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<usize, InvoiceMergeError> {
        let fail = |detail: String| InvoiceMergeError::MergeFailed {
            path: output.to_path_buf(),
            detail,
        };

        let documents = inputs
            .iter()
            .map(|p| Document::load(p).map_err(|e| fail(format!("{}: {}", p.display(), e))))
            .collect::<Result<Vec<_>, _>>()?;

        let mut merged = merge_documents(documents).map_err(fail)?;
        let page_count = merged.get_pages().len();

        let parent = match output.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let mut tmp = tempfile::NamedTempFile::new_in(&parent)
            .map_err(|e| fail(format!("temp file in {}: {}", parent.display(), e)))?;
        merged
            .save_to(tmp.as_file_mut())
            .map_err(|e| fail(format!("write: {e}")))?;
        tmp.persist(output)
            .map_err(|e| fail(format!("rename into place: {e}")))?;

        info!(
            "Merged {} documents ({} pages) into {}",
            inputs.len(),
            page_count,
            output.display()
        );
        Ok(page_count)
    }
}

/// Concatenate the pages of `documents`, in order, into a new document.
pub fn merge_documents(documents: Vec<Document>) -> Result<Document, String> {
    if documents.is_empty() {
        return Err("no documents to merge".to_string());
    }

    let mut max_id = 1;
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut objects: BTreeMap<ObjectId, Object> = BTreeMap::new();

    for mut doc in documents {
        doc.renumber_objects_with(max_id);
        max_id = doc.max_id + 1;

        // get_pages is keyed by page number, so this walks pages in order.
        for page_id in doc.get_pages().into_values() {
            let mut page = doc
                .get_dictionary(page_id)
                .map_err(|e| format!("page {page_id:?}: {e}"))?
                .clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited(&doc, &page, key) {
                        page.set(key.to_vec(), value);
                    }
                }
            }
            pages.push((page_id, page));
        }
        objects.extend(doc.objects);
    }

    if pages.is_empty() {
        return Err("input documents contain no pages".to_string());
    }

    let mut document = Document::with_version("1.5");
    for (id, object) in objects {
        match type_name(&object) {
            Some(b"Catalog" | b"Pages" | b"Page" | b"Outlines" | b"Outline") => {}
            _ => {
                document.objects.insert(id, object);
            }
        }
    }
    document.max_id = max_id;

    let pages_id = document.new_object_id();
    let mut kids = Vec::with_capacity(pages.len());
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        document.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }
    let count = kids.len() as i64;
    document.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => count,
        }),
    );

    let catalog_id = document.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    document.trailer.set("Root", catalog_id);
    debug!("Merged page tree has {} pages", count);

    Ok(document)
}

fn type_name(object: &Object) -> Option<&[u8]> {
    object.as_dict().ok()?.get(b"Type").ok()?.as_name().ok()
}

/// Look `key` up along the page's ancestor chain.
fn inherited(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
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

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::Stream;

    /// Build a PDF whose pages each draw one of `texts`.
    fn sample_pdf(texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! { "F1" => font_id },
        });

        let mut kids = Vec::new();
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
            kids.push(Object::Reference(page_id));
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
                "Resources" => resources_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    /// Decoded content of every page, in page order.
    fn page_contents(path: &Path) -> Vec<String> {
        let doc = Document::load(path).unwrap();
        doc.get_pages()
            .into_values()
            .map(|id| String::from_utf8_lossy(&doc.get_page_content(id).unwrap()).into_owned())
            .collect()
    }

    fn write(dir: &Path, name: &str, texts: &[&str]) -> PathBuf {
        let p = dir.join(name);
        std::fs::write(&p, sample_pdf(texts)).unwrap();
        p
    }

    #[test]
    fn merges_pages_in_input_order() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.pdf", &["alpha-1", "alpha-2"]);
        let b = write(dir.path(), "b.pdf", &["bravo-1"]);
        let out = dir.path().join("merged.pdf");

        let pages = LopdfMerger.merge(&[a, b], &out).unwrap();
        assert_eq!(pages, 3);

        let contents = page_contents(&out);
        assert_eq!(contents.len(), 3);
        assert!(contents[0].contains("alpha-1"));
        assert!(contents[1].contains("alpha-2"));
        assert!(contents[2].contains("bravo-1"));
    }

    #[test]
    fn inherited_resources_are_copied_to_pages() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.pdf", &["x"]);
        let b = write(dir.path(), "b.pdf", &["y"]);
        let out = dir.path().join("merged.pdf");
        LopdfMerger.merge(&[a, b], &out).unwrap();

        let doc = Document::load(&out).unwrap();
        for id in doc.get_pages().into_values() {
            let page = doc.get_dictionary(id).unwrap();
            assert!(page.has(b"Resources"));
            assert!(page.has(b"MediaBox"));
        }
    }

    #[test]
    fn corrupt_input_fails_and_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let a = write(dir.path(), "a.pdf", &["x"]);
        let bad = dir.path().join("bad.pdf");
        std::fs::write(&bad, b"<html>session expired</html>").unwrap();
        let out = dir.path().join("merged.pdf");

        let err = LopdfMerger.merge(&[a, bad], &out).unwrap_err();
        assert!(matches!(err, InvoiceMergeError::MergeFailed { .. }));
        assert!(!out.exists());
    }

    #[test]
    fn empty_input_is_rejected() {
        assert!(merge_documents(Vec::new()).is_err());
    }
}
