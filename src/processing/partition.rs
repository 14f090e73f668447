//! Built-in plain-text partitioner and whitespace cleaner.

use sha2::{Digest, Sha256};
use std::path::Path;

use super::collaborators::{PartitionOptions, Partitioner, WhitespaceCleaner};
use super::payload::{CATEGORY_KEY, Element, InputFile, PAGE_NUMBER_KEY};
use super::types::PartitionError;

const TEXT_EXTENSIONS: &[&str] = &["txt", "text", "md", "markdown", "log", "csv"];
const TITLE_MAX_CHARS: usize = 80;
const TITLE_MAX_WORDS: usize = 12;

/// Partitioner for UTF-8 text uploads.
///
/// Pages are separated by form feeds, elements by blank lines. An element is classified as a
/// `Title` when it is a Markdown heading or a single short line without closing punctuation;
/// everything else is `NarrativeText`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextPartitioner;

impl PlainTextPartitioner {
    fn filetype(extension: Option<&str>) -> &'static str {
        match extension {
            Some("md" | "markdown") => "text/markdown",
            Some("csv") => "text/csv",
            _ => "text/plain",
        }
    }
}

impl Partitioner for PlainTextPartitioner {
    fn partition(
        &self,
        file: &InputFile,
        options: &PartitionOptions,
    ) -> Result<Vec<Element>, PartitionError> {
        let extension = Path::new(&file.filename)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_lowercase);
        if let Some(ext) = extension.as_deref() {
            if !TEXT_EXTENSIONS.contains(&ext) {
                return Err(PartitionError::UnsupportedFileType {
                    extension: ext.to_string(),
                });
            }
        }
        if options.strategy != "auto" && options.strategy != "fast" {
            tracing::debug!(
                strategy = %options.strategy,
                "Plain-text partitioning ignores layout strategies"
            );
        }

        let bytes = std::fs::read(&file.path)?;
        let text = String::from_utf8(bytes).map_err(|_| PartitionError::Decode {
            filename: file.filename.clone(),
        })?;
        let filetype = Self::filetype(extension.as_deref());

        let mut elements = Vec::new();
        for (page_idx, page) in text.split('\u{c}').enumerate() {
            for paragraph in paragraphs(page) {
                let (category, body) = classify(&paragraph);
                let index = elements.len();
                let mut element = Element::new(body)
                    .with_metadata("filename", file.filename.clone())
                    .with_metadata("filetype", filetype)
                    .with_metadata(CATEGORY_KEY, category)
                    .with_metadata("element_index", index)
                    .with_metadata(PAGE_NUMBER_KEY, page_idx + 1)
                    .with_metadata("partition_strategy", options.strategy.clone());
                let id = element_id(&file.document_id, index, &element.text);
                element = element.with_metadata("element_id", id);
                if let Some(languages) = &options.ocr_languages {
                    element = element.with_metadata("languages", languages.clone());
                }
                elements.push(element);
            }
        }

        tracing::debug!(
            filename = %file.filename,
            elements = elements.len(),
            "Partitioned plain-text document"
        );
        Ok(elements)
    }

    fn supported_extensions(&self) -> Vec<String> {
        TEXT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
    }
}

/// Group lines into blank-line separated paragraphs, trimming trailing whitespace.
fn paragraphs(page: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in page.lines() {
        if line.trim().is_empty() {
            if !current.is_empty() {
                out.push(current.join("\n"));
                current.clear();
            }
        } else {
            current.push(line.trim_end());
        }
    }
    if !current.is_empty() {
        out.push(current.join("\n"));
    }
    out
}

fn classify(paragraph: &str) -> (&'static str, String) {
    let trimmed = paragraph.trim_start();
    if let Some(heading) = markdown_heading(trimmed) {
        return ("Title", heading.to_string());
    }

    let single_line = !paragraph.contains('\n');
    let short = paragraph.chars().count() <= TITLE_MAX_CHARS
        && paragraph.split_whitespace().count() <= TITLE_MAX_WORDS;
    let unpunctuated = !paragraph
        .trim_end()
        .ends_with(['.', '!', '?', ',', ';', ':']);
    let has_letters = paragraph.chars().any(char::is_alphabetic);

    if single_line && short && unpunctuated && has_letters {
        ("Title", paragraph.to_string())
    } else {
        ("NarrativeText", paragraph.to_string())
    }
}

fn markdown_heading(line: &str) -> Option<&str> {
    if line.contains('\n') {
        return None;
    }
    let hashes = line.chars().take_while(|c| *c == '#').count();
    if !(1..=6).contains(&hashes) {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.starts_with(char::is_whitespace) {
        return None;
    }
    let heading = rest.trim();
    (!heading.is_empty()).then_some(heading)
}

fn element_id(document_id: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    let mut id = hex::encode(hasher.finalize());
    id.truncate(32);
    id
}

/// Collapses every whitespace run (including non-breaking spaces) into a single space and trims
/// the ends.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtraWhitespaceCleaner;

impl WhitespaceCleaner for ExtraWhitespaceCleaner {
    fn clean(&self, text: &str) -> String {
        text.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}
