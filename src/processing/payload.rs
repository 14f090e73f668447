//! Values carried between stages: the uploaded file, extracted elements, and chunks.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::PathBuf;

/// Free-form metadata attached to elements and chunks.
pub type Metadata = Map<String, Value>;

/// Metadata key holding the element category (`Title`, `NarrativeText`, ...).
pub const CATEGORY_KEY: &str = "category";
/// Metadata key holding the 1-based page number of an element.
pub const PAGE_NUMBER_KEY: &str = "page_number";

/// Unit of extracted document content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    /// Extracted text.
    pub text: String,
    /// Parser-provided metadata.
    #[serde(default)]
    pub metadata: Metadata,
}

impl Element {
    /// Element with empty metadata.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: Metadata::new(),
        }
    }

    /// Add a metadata entry.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Category assigned by the parser, if any.
    pub fn category(&self) -> Option<&str> {
        self.metadata.get(CATEGORY_KEY).and_then(Value::as_str)
    }

    /// Page the element was found on, if the parser tracks pages.
    pub fn page_number(&self) -> Option<u64> {
        self.metadata.get(PAGE_NUMBER_KEY).and_then(Value::as_u64)
    }
}

/// Bounded slice of document text with its origin offset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Sequential id, `{prefix}_chunk_{n}`.
    pub id: String,
    /// Chunk text.
    pub text: String,
    /// Offset of the first character, counted in chars.
    pub offset: usize,
    /// Inherited metadata plus provenance fields.
    #[serde(default)]
    pub metadata: Metadata,
}

/// Reference to the materialized upload for the current run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputFile {
    /// Location of the temporary copy. Only valid while the run is in progress.
    #[serde(skip)]
    pub path: PathBuf,
    /// Original file name as uploaded.
    pub filename: String,
    /// Size of the upload.
    pub size_bytes: u64,
    /// Content digest identifying the document.
    pub document_id: String,
}

/// Working register of the node executor.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// The uploaded file, before partitioning.
    FileReference(InputFile),
    /// Elements extracted by a partition stage.
    ElementList(Vec<Element>),
    /// Chunks produced by a chunk stage.
    ChunkList(Vec<Chunk>),
}

/// Discriminant of a [`Payload`], used in contracts and error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadTag {
    /// See [`Payload::FileReference`].
    FileReference,
    /// See [`Payload::ElementList`].
    ElementList,
    /// See [`Payload::ChunkList`].
    ChunkList,
}

impl fmt::Display for PayloadTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::FileReference => "file_reference",
            Self::ElementList => "element_list",
            Self::ChunkList => "chunk_list",
        })
    }
}

impl Payload {
    /// Tag of the current variant.
    pub fn tag(&self) -> PayloadTag {
        match self {
            Self::FileReference(_) => PayloadTag::FileReference,
            Self::ElementList(_) => PayloadTag::ElementList,
            Self::ChunkList(_) => PayloadTag::ChunkList,
        }
    }

    /// Short human-readable description for stage traces.
    pub fn describe(&self) -> String {
        match self {
            Self::FileReference(file) => {
                format!("file '{}' ({} bytes)", file.filename, file.size_bytes)
            }
            Self::ElementList(elements) => format!("{} element(s)", elements.len()),
            Self::ChunkList(chunks) => format!("{} chunk(s)", chunks.len()),
        }
    }
}

/// Stable hex digest of document contents, shortened for use as an id prefix.
pub fn document_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(16);
    digest
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn document_digest_is_stable_and_short() {
        let first = document_digest(b"hello world");
        assert_eq!(first, document_digest(b"hello world"));
        assert_ne!(first, document_digest(b"hello world!"));
        assert_eq!(first.len(), 16);
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let payload = Payload::ElementList(vec![
            Element::new("Intro").with_metadata(CATEGORY_KEY, "Title"),
        ]);
        let value = serde_json::to_value(&payload).expect("serialize payload");
        assert_eq!(value["type"], "element_list");
        assert_eq!(value["data"][0]["text"], "Intro");
        assert_eq!(value["data"][0]["metadata"]["category"], "Title");
    }

    #[test]
    fn file_reference_hides_temporary_path() {
        let payload = Payload::FileReference(InputFile {
            path: PathBuf::from("/tmp/docflow-abc.txt"),
            filename: "notes.txt".into(),
            size_bytes: 5,
            document_id: "abc".into(),
        });
        let value = serde_json::to_value(&payload).expect("serialize payload");
        assert_eq!(
            value,
            json!({
                "type": "file_reference",
                "data": {"filename": "notes.txt", "size_bytes": 5, "document_id": "abc"}
            })
        );
        assert_eq!(payload.describe(), "file 'notes.txt' (5 bytes)");
    }

    #[test]
    fn element_accessors_read_metadata() {
        let element = Element::new("x")
            .with_metadata(CATEGORY_KEY, "NarrativeText")
            .with_metadata(PAGE_NUMBER_KEY, 2);
        assert_eq!(element.category(), Some("NarrativeText"));
        assert_eq!(element.page_number(), Some(2));
        assert_eq!(Element::new("y").page_number(), None);
    }
}
