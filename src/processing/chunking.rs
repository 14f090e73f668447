//! Windowed text chunking and the built-in element chunkers.
//!
//! All lengths and offsets here are counted in chars, never bytes, so a window can not split a
//! UTF-8 code point. Strategies:
//!
//! - `basic`: join element texts with a blank line and cut the result into fixed windows of
//!   `max_characters`, each sharing `overlap` characters with its predecessor.
//! - `by_title`: group elements into sections that start at every `Title` element (and, unless
//!   multipage sections are allowed, at every page change), merge sections shorter than
//!   `combine_text_under_n_chars` into their successor, and window any section that still
//!   exceeds `max_characters`.
//! - `none`: one chunk per element, text untouched.
//!
//! Every chunk id has the form `{prefix}_chunk_{n}` with `n` counting from zero, and every chunk
//! carries its parent element's metadata plus `document_id`, `filename`, `chunk_index`, and
//! `chunk_offset`.

use std::str::FromStr;

use super::collaborators::{ChunkOptions, ElementChunker};
use super::payload::{Chunk, Element, Metadata};
use super::types::ChunkingError;

/// Separator placed between element texts when they are joined into one document.
pub const ELEMENT_SEPARATOR: &str = "\n\n";
// Length of ELEMENT_SEPARATOR in chars.
const SEPARATOR_CHARS: usize = 2;

/// Strategy selected by a chunk node's `chunking_strategy` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkingStrategy {
    /// Title-aware sections.
    ByTitle,
    /// Uniform windows over the whole document.
    Basic,
    /// One chunk per element.
    None,
}

impl ChunkingStrategy {
    /// Resolve the configured name; an absent or blank value means [`ChunkingStrategy::None`].
    pub fn from_config(value: Option<&str>) -> Result<Self, ChunkingError> {
        match value.map(str::trim) {
            None | Some("") => Ok(Self::None),
            Some(name) => name.parse(),
        }
    }

    /// Name as written in node configs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ByTitle => "by_title",
            Self::Basic => "basic",
            Self::None => "none",
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = ChunkingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "by_title" => Ok(Self::ByTitle),
            "basic" => Ok(Self::Basic),
            "none" => Ok(Self::None),
            _ => Err(ChunkingError::UnsupportedChunkingStrategy(s.to_string())),
        }
    }
}

/// Id of the `index`-th chunk produced under `prefix`.
pub fn chunk_id(prefix: &str, index: usize) -> String {
    format!("{prefix}_chunk_{index}")
}

fn check_window(size: usize, overlap: usize) -> Result<(), ChunkingError> {
    if overlap >= size {
        return Err(ChunkingError::InvalidChunkWindow { size, overlap });
    }
    Ok(())
}

/// Split `text` into `(offset, slice)` windows of `size` chars sharing `overlap` chars.
fn window_spans(
    text: &str,
    size: usize,
    overlap: usize,
) -> Result<Vec<(usize, &str)>, ChunkingError> {
    check_window(size, overlap)?;
    if text.is_empty() {
        return Ok(vec![(0, "")]);
    }

    let bounds: Vec<usize> = text
        .char_indices()
        .map(|(idx, _)| idx)
        .chain(std::iter::once(text.len()))
        .collect();
    let len = bounds.len() - 1;
    let step = size - overlap;

    let mut spans = Vec::with_capacity(len / step + 1);
    let mut start = 0;
    loop {
        let end = (start + size).min(len);
        spans.push((start, &text[bounds[start]..bounds[end]]));
        if start + size >= len {
            break;
        }
        start += step;
    }
    Ok(spans)
}

/// Cut `text` into overlapping windows.
///
/// Returns at least one chunk: empty text yields a single empty chunk at offset 0. Fails with
/// [`ChunkingError::InvalidChunkWindow`] when `overlap >= size`. Chunks carry no metadata; the
/// element chunkers add provenance on top.
pub fn window_chunks(
    text: &str,
    size: usize,
    overlap: usize,
    prefix: &str,
) -> Result<Vec<Chunk>, ChunkingError> {
    let spans = window_spans(text, size, overlap)?;
    Ok(spans
        .into_iter()
        .enumerate()
        .map(|(index, (offset, slice))| Chunk {
            id: chunk_id(prefix, index),
            text: slice.to_string(),
            offset,
            metadata: Metadata::new(),
        })
        .collect())
}

/// Parent metadata extended with provenance fields.
fn with_provenance(
    parent: &Metadata,
    options: &ChunkOptions,
    index: usize,
    offset: usize,
) -> Metadata {
    let mut metadata = parent.clone();
    metadata.insert("document_id".into(), options.document_id.clone().into());
    metadata.insert("filename".into(), options.filename.clone().into());
    metadata.insert("chunk_index".into(), index.into());
    metadata.insert("chunk_offset".into(), offset.into());
    metadata
}

fn build_chunk(
    parent: &Metadata,
    options: &ChunkOptions,
    index: usize,
    offset: usize,
    text: String,
) -> Chunk {
    Chunk {
        id: chunk_id(&options.document_id, index),
        text,
        offset,
        metadata: with_provenance(parent, options, index, offset),
    }
}

/// Char offset of each element inside the joined document.
fn element_offsets(elements: &[Element]) -> Vec<usize> {
    let mut offset = 0;
    elements
        .iter()
        .map(|element| {
            let start = offset;
            offset += element.text.chars().count() + SEPARATOR_CHARS;
            start
        })
        .collect()
}

/// Element texts joined with [`ELEMENT_SEPARATOR`].
pub fn join_elements(elements: &[Element]) -> String {
    elements
        .iter()
        .map(|element| element.text.as_str())
        .collect::<Vec<_>>()
        .join(ELEMENT_SEPARATOR)
}

/// One chunk per element, text untouched.
pub fn identity_chunks(elements: &[Element], options: &ChunkOptions) -> Vec<Chunk> {
    elements
        .iter()
        .zip(element_offsets(elements))
        .enumerate()
        .map(|(index, (element, offset))| {
            build_chunk(&element.metadata, options, index, offset, element.text.clone())
        })
        .collect()
}

/// Uniform windows over the concatenated element text.
#[derive(Debug, Default, Clone, Copy)]
pub struct BasicChunker;

impl ElementChunker for BasicChunker {
    fn chunk(
        &self,
        elements: &[Element],
        options: &ChunkOptions,
    ) -> Result<Vec<Chunk>, ChunkingError> {
        let text = join_elements(elements);
        let starts = element_offsets(elements);
        let spans = window_spans(&text, options.max_characters, options.overlap)?;
        let empty = Metadata::new();

        Ok(spans
            .into_iter()
            .enumerate()
            .map(|(index, (offset, slice))| {
                // A window inherits from the element it starts in.
                let owner = starts.partition_point(|start| *start <= offset);
                let parent = owner
                    .checked_sub(1)
                    .and_then(|idx| elements.get(idx))
                    .map(|element| &element.metadata)
                    .unwrap_or(&empty);
                build_chunk(parent, options, index, offset, slice.to_string())
            })
            .collect())
    }
}

struct Section<'a> {
    offset: usize,
    text: String,
    chars: usize,
    page: Option<u64>,
    metadata: &'a Metadata,
}

impl<'a> Section<'a> {
    fn open(element: &'a Element, offset: usize) -> Self {
        Self {
            offset,
            text: element.text.clone(),
            chars: element.text.chars().count(),
            page: element.page_number(),
            metadata: &element.metadata,
        }
    }

    fn push_text(&mut self, text: &str, chars: usize) {
        self.text.push_str(ELEMENT_SEPARATOR);
        self.text.push_str(text);
        self.chars += SEPARATOR_CHARS + chars;
    }

    fn absorb(&mut self, next: Section<'a>) {
        self.push_text(&next.text, next.chars);
    }
}

/// Title-aware grouping of elements into sections.
#[derive(Debug, Default, Clone, Copy)]
pub struct TitleChunker;

impl TitleChunker {
    fn sections<'a>(elements: &'a [Element], options: &ChunkOptions) -> Vec<Section<'a>> {
        let new_after = options.new_after_n_chars.min(options.max_characters);
        let mut sections = Vec::new();
        let mut current: Option<Section<'a>> = None;

        for (element, offset) in elements.iter().zip(element_offsets(elements)) {
            let element_chars = element.text.chars().count();
            match current.as_mut() {
                Some(section)
                    if element.category() != Some("Title")
                        && (options.multipage_sections || element.page_number() == section.page)
                        && section.chars < new_after
                        && section.chars + SEPARATOR_CHARS + element_chars
                            <= options.max_characters =>
                {
                    section.push_text(&element.text, element_chars);
                }
                _ => {
                    sections.extend(current.take());
                    current = Some(Section::open(element, offset));
                }
            }
        }
        sections.extend(current);
        sections
    }

    fn combine_small<'a>(sections: Vec<Section<'a>>, options: &ChunkOptions) -> Vec<Section<'a>> {
        let mut combined = Vec::with_capacity(sections.len());
        let mut pending: Option<Section<'a>> = None;

        for section in sections {
            let section = match pending.take() {
                Some(mut small)
                    if small.chars + SEPARATOR_CHARS + section.chars <= options.max_characters
                        && (options.multipage_sections || small.page == section.page) =>
                {
                    small.absorb(section);
                    small
                }
                Some(small) => {
                    combined.push(small);
                    section
                }
                None => section,
            };

            if section.chars < options.combine_text_under_n_chars {
                pending = Some(section);
            } else {
                combined.push(section);
            }
        }
        combined.extend(pending);
        combined
    }
}

impl ElementChunker for TitleChunker {
    fn chunk(
        &self,
        elements: &[Element],
        options: &ChunkOptions,
    ) -> Result<Vec<Chunk>, ChunkingError> {
        check_window(options.max_characters, options.overlap)?;
        let sections = Self::combine_small(Self::sections(elements, options), options);

        let mut chunks = Vec::with_capacity(sections.len());
        for section in sections {
            if section.chars <= options.max_characters {
                let index = chunks.len();
                chunks.push(build_chunk(
                    section.metadata,
                    options,
                    index,
                    section.offset,
                    section.text,
                ));
                continue;
            }
            for (offset, slice) in
                window_spans(&section.text, options.max_characters, options.overlap)?
            {
                let index = chunks.len();
                chunks.push(build_chunk(
                    section.metadata,
                    options,
                    index,
                    section.offset + offset,
                    slice.to_string(),
                ));
            }
        }
        Ok(chunks)
    }
}
