//! Corpus data model and durable storage
//!
//! Documents enter as extracted text, are chunked into passages, and live in
//! a SQLite store that is the source of truth for every rebuild. Raw document
//! text is kept in a content-addressed blob store so the corpus can be
//! re-chunked from source when the chunking configuration changes.

pub mod blobs;
pub mod store;

pub use blobs::BlobStore;
pub use store::{CorpusStore, DocumentRecord, StoreStats};

use serde::{Deserialize, Serialize};

/// Page separator used in extracted document text
pub const PAGE_SEPARATOR: char = '\x0c';

/// The atomic retrieval unit: a bounded, overlapping substring of a document.
///
/// Ids are ordinals assigned in chunking order across a whole generation and
/// are shared verbatim by the dense and sparse indexes, which join on them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Passage {
    /// Unique within one corpus generation
    pub id: u64,
    /// Source document name
    pub document: String,
    /// 1-based page of the passage's first character, when known
    pub page: Option<u32>,
    /// Ordinal within the source document
    pub position: u32,
    /// Character span within the document text
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Maps character offsets to 1-based page numbers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageMap {
    /// Character offset at which each page after the first begins
    breaks: Vec<usize>,
}

impl PageMap {
    /// Page of the character at `offset` (1-based)
    pub fn page_at(&self, offset: usize) -> u32 {
        let preceding = self.breaks.partition_point(|&b| b <= offset);
        preceding as u32 + 1
    }

    pub fn page_count(&self) -> usize {
        self.breaks.len() + 1
    }
}

/// Extracted document text ready for ingestion.
///
/// Extraction itself (PDF, HTML, ...) is an external collaborator; this type
/// accepts its output. Form feeds mark page boundaries and are replaced with
/// newlines, which keeps character offsets aligned with the page map.
#[derive(Debug, Clone)]
pub struct DocumentText {
    pub name: String,
    pub text: String,
    pub pages: Option<PageMap>,
}

impl DocumentText {
    pub fn from_raw(name: impl Into<String>, raw: &str) -> Self {
        let breaks: Vec<usize> = raw
            .chars()
            .enumerate()
            .filter(|(_, c)| *c == PAGE_SEPARATOR)
            .map(|(i, _)| i + 1)
            .collect();

        let pages = if breaks.is_empty() {
            None
        } else {
            Some(PageMap { breaks })
        };

        Self {
            name: name.into(),
            text: raw.replace(PAGE_SEPARATOR, "\n"),
            pages,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_map_attributes_offsets() {
        let doc = DocumentText::from_raw("a.pdf", "first page\x0csecond\x0cthird");
        let pages = doc.pages.unwrap();

        assert_eq!(pages.page_count(), 3);
        assert_eq!(pages.page_at(0), 1);
        assert_eq!(pages.page_at(9), 1);
        assert_eq!(pages.page_at(11), 2);
        assert_eq!(pages.page_at(20), 3);
    }

    #[test]
    fn separator_replacement_preserves_offsets() {
        let doc = DocumentText::from_raw("a.pdf", "ab\x0ccd");
        assert_eq!(doc.text, "ab\ncd");
        assert_eq!(doc.text.chars().count(), 5);
    }

    #[test]
    fn plain_text_has_no_page_map() {
        let doc = DocumentText::from_raw("notes.txt", "no pages here");
        assert!(doc.pages.is_none());
    }
}
