//! Capabilities the executor calls into but does not implement itself.
//!
//! Parsing, whitespace cleaning, and element chunking are injected as trait objects when the
//! [`crate::processing::FlowRunner`] is built. The crate ships plain-text defaults for each; a
//! deployment backed by a real document-parsing engine swaps in its own implementations.

use crate::flow::NodeConfig;

use super::payload::{Chunk, Element, InputFile};
use super::types::{ChunkingError, PartitionError};

/// Options handed to a [`Partitioner`], resolved from a partition node's config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionOptions {
    /// Partitioning strategy (`auto` unless configured).
    pub strategy: String,
    /// OCR languages, if any were requested.
    pub ocr_languages: Option<Vec<String>>,
    /// Infer table structure when the format supports it.
    pub infer_table_structure: bool,
    /// Element types whose image blocks should be extracted.
    pub extract_image_block_types: Vec<String>,
}

impl PartitionOptions {
    /// Apply partition defaults to a node's config.
    pub fn from_config(config: &NodeConfig) -> Self {
        let strategy = config
            .strategy
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .unwrap_or("auto")
            .to_lowercase();
        Self {
            strategy,
            ocr_languages: config.ocr_languages.clone(),
            infer_table_structure: config.pdf_infer_table_structure.unwrap_or(true),
            extract_image_block_types: config.extract_image_block_types.clone().unwrap_or_default(),
        }
    }
}

/// Document-to-text engine.
pub trait Partitioner: Send + Sync {
    /// Extract elements from the referenced file.
    fn partition(
        &self,
        file: &InputFile,
        options: &PartitionOptions,
    ) -> Result<Vec<Element>, PartitionError>;

    /// File extensions (lowercase, without dot) this parser fully supports.
    fn supported_extensions(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Text cleaning applied to each element after partitioning.
pub trait WhitespaceCleaner: Send + Sync {
    /// Return `text` with whitespace normalized.
    fn clean(&self, text: &str) -> String;
}

/// Options handed to an [`ElementChunker`], resolved from a chunk node's config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkOptions {
    /// Hard maximum chunk length in characters.
    pub max_characters: usize,
    /// Soft length after which a new chunk starts.
    pub new_after_n_chars: usize,
    /// Sections shorter than this are merged into the next one.
    pub combine_text_under_n_chars: usize,
    /// Characters shared by consecutive windows.
    pub overlap: usize,
    /// Whether sections may continue across page breaks.
    pub multipage_sections: bool,
    /// Digest of the source document, used as the chunk id prefix.
    pub document_id: String,
    /// Original file name of the source document.
    pub filename: String,
}

/// Strategy turning a list of elements into chunks.
pub trait ElementChunker: Send + Sync {
    /// Chunk `elements`; ids, offsets, and provenance follow the crate-wide conventions.
    fn chunk(
        &self,
        elements: &[Element],
        options: &ChunkOptions,
    ) -> Result<Vec<Chunk>, ChunkingError>;
}
