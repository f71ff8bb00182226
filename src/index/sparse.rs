//! BM25 sparse index
//!
//! Explicit term statistics per passage: per-term document frequencies,
//! per-passage term frequencies, and average passage length, scored with the
//! classic Okapi BM25 formula. Identical corpus and query always produce
//! identical scores.

use crate::corpus::Passage;
use ahash::AHashMap;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum SparseIndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt index file: {0}")]
    Corrupt(String),
}

/// Tokenization rule shared by build and query time.
///
/// Text is Unicode-lowercased, then tokens are maximal runs of letters and
/// digits (`[\p{L}\p{N}]+`). Punctuation and whitespace never appear in
/// tokens. Changing this rule changes every score, so both sides of the
/// index always go through this one type.
pub struct Tokenizer {
    pattern: Regex,
}

impl Tokenizer {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(r"[\p{L}\p{N}]+").expect("token pattern is valid"),
        }
    }

    pub fn tokenize(&self, text: &str) -> Vec<String> {
        let lowered = text.to_lowercase();
        self.pattern
            .find_iter(&lowered)
            .map(|m| m.as_str().to_string())
            .collect()
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::new()
    }
}

/// BM25 sparse index over passage term statistics
#[derive(Debug, Serialize, Deserialize)]
pub struct SparseIndex {
    generation: Uuid,
    k1: f32,
    b: f32,
    avg_doc_len: f32,
    /// Passage token counts, ascending id order
    doc_lens: Vec<(u64, u32)>,
    /// Term -> postings [(id, term frequency)], terms sorted, ids ascending
    postings: Vec<TermPostings>,

    #[serde(skip)]
    term_lookup: AHashMap<String, usize>,
    #[serde(skip)]
    len_lookup: AHashMap<u64, u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TermPostings {
    term: String,
    postings: Vec<(u64, u32)>,
}

impl SparseIndex {
    /// Tokenize every passage and accumulate term statistics
    pub fn build(generation: Uuid, passages: &[Passage], k1: f32, b: f32) -> Self {
        let tokenizer = Tokenizer::new();

        let mut doc_lens: Vec<(u64, u32)> = Vec::with_capacity(passages.len());
        let mut term_postings: AHashMap<String, Vec<(u64, u32)>> = AHashMap::new();

        let mut sorted: Vec<&Passage> = passages.iter().collect();
        sorted.sort_by_key(|p| p.id);

        for passage in sorted {
            let tokens = tokenizer.tokenize(&passage.text);
            doc_lens.push((passage.id, tokens.len() as u32));

            let mut tf: AHashMap<String, u32> = AHashMap::new();
            for token in tokens {
                *tf.entry(token).or_insert(0) += 1;
            }

            for (term, count) in tf {
                term_postings
                    .entry(term)
                    .or_default()
                    .push((passage.id, count));
            }
        }

        let total_len: u64 = doc_lens.iter().map(|(_, len)| *len as u64).sum();
        let avg_doc_len = if doc_lens.is_empty() {
            0.0
        } else {
            total_len as f32 / doc_lens.len() as f32
        };

        let mut postings: Vec<TermPostings> = term_postings
            .into_iter()
            .map(|(term, postings)| TermPostings { term, postings })
            .collect();
        postings.sort_by(|a, b| a.term.cmp(&b.term));

        let mut index = Self {
            generation,
            k1,
            b,
            avg_doc_len,
            doc_lens,
            postings,
            term_lookup: AHashMap::new(),
            len_lookup: AHashMap::new(),
        };
        index.rebuild_lookups();
        index
    }

    fn rebuild_lookups(&mut self) {
        self.term_lookup = self
            .postings
            .iter()
            .enumerate()
            .map(|(i, tp)| (tp.term.clone(), i))
            .collect();
        self.len_lookup = self.doc_lens.iter().copied().collect();
    }

    /// BM25 scores for the given query tokens over the full corpus.
    ///
    /// Only passages sharing at least one query term appear in the result;
    /// every absent passage's score is exactly 0. Repeated query tokens are
    /// scored once per occurrence. Higher is more relevant, unbounded above.
    pub fn score(&self, query_tokens: &[String]) -> AHashMap<u64, f32> {
        let mut scores: AHashMap<u64, f32> = AHashMap::new();
        let doc_count = self.doc_lens.len() as f32;

        for token in query_tokens {
            let Some(&slot) = self.term_lookup.get(token) else {
                continue;
            };
            let postings = &self.postings[slot].postings;

            let df = postings.len() as f32;
            let idf = (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln();

            for &(id, tf) in postings {
                let doc_len = *self.len_lookup.get(&id).unwrap_or(&0) as f32;
                let tf = tf as f32;
                let norm = self.k1 * (1.0 - self.b + self.b * doc_len / self.avg_doc_len.max(f32::MIN_POSITIVE));
                let contribution = idf * (tf * (self.k1 + 1.0)) / (tf + norm);
                *scores.entry(id).or_insert(0.0) += contribution;
            }
        }

        scores
    }

    pub fn generation(&self) -> Uuid {
        self.generation
    }

    pub fn k1(&self) -> f32 {
        self.k1
    }

    pub fn b(&self) -> f32 {
        self.b
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// Write the index to disk as JSON (terms and postings pre-sorted)
    pub fn persist(&self, path: &Path) -> Result<(), SparseIndexError> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer(std::io::BufWriter::new(file), self)?;
        Ok(())
    }

    /// Load a persisted index, verifying internal consistency
    pub fn load(path: &Path) -> Result<Self, SparseIndexError> {
        let file = std::fs::File::open(path)?;
        let mut index: Self = serde_json::from_reader(std::io::BufReader::new(file))?;

        if !index.doc_lens.windows(2).all(|w| w[0].0 < w[1].0) {
            return Err(SparseIndexError::Corrupt(
                "passage lengths are not in ascending id order".to_string(),
            ));
        }
        if !index.postings.windows(2).all(|w| w[0].term < w[1].term) {
            return Err(SparseIndexError::Corrupt(
                "terms are not sorted".to_string(),
            ));
        }

        index.rebuild_lookups();
        Ok(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn passage(id: u64, text: &str) -> Passage {
        Passage {
            id,
            document: "test.txt".to_string(),
            page: None,
            position: id as u32,
            start: 0,
            end: text.chars().count(),
            text: text.to_string(),
        }
    }

    fn tokens(text: &str) -> Vec<String> {
        Tokenizer::new().tokenize(text)
    }

    #[test]
    fn tokenizer_rule() {
        assert_eq!(tokens("The cat, sat!"), vec!["the", "cat", "sat"]);
        assert_eq!(tokens("BM25-style k1=1.5"), vec!["bm25", "style", "k1", "1", "5"]);
        assert_eq!(tokens("Héllo WÖRLD"), vec!["héllo", "wörld"]);
        assert!(tokens("  ...  ").is_empty());
    }

    #[test]
    fn unmatched_passages_score_zero() {
        let index = SparseIndex::build(
            Uuid::new_v4(),
            &[passage(0, "the cat sat"), passage(1, "dogs bark loudly")],
            1.5,
            0.75,
        );

        let scores = index.score(&tokens("cat"));
        assert!(scores[&0] > 0.0);
        // Passage 1 shares no query term: exactly absent, meaning 0
        assert!(!scores.contains_key(&1));
    }

    #[test]
    fn rarer_terms_weigh_more() {
        let index = SparseIndex::build(
            Uuid::new_v4(),
            &[
                passage(0, "kernel panic trace"),
                passage(1, "kernel module list"),
                passage(2, "panic in the kernel"),
                passage(3, "userspace tooling"),
            ],
            1.5,
            0.75,
        );

        // "trace" appears in one passage, "kernel" in three
        let trace = index.score(&tokens("trace"));
        let kernel = index.score(&tokens("kernel"));
        assert!(trace[&0] > kernel[&0]);
    }

    #[test]
    fn repeated_query_tokens_accumulate() {
        let index = SparseIndex::build(Uuid::new_v4(), &[passage(0, "cat cat dog")], 1.5, 0.75);

        let single = index.score(&tokens("cat"));
        let double = index.score(&tokens("cat cat"));
        assert!((double[&0] - 2.0 * single[&0]).abs() < 1e-6);
    }

    #[test]
    fn scores_are_deterministic() {
        let passages = vec![
            passage(0, "alpha beta gamma"),
            passage(1, "beta gamma delta"),
            passage(2, "gamma delta epsilon"),
        ];
        let a = SparseIndex::build(Uuid::new_v4(), &passages, 1.5, 0.75);
        let b = SparseIndex::build(Uuid::new_v4(), &passages, 1.5, 0.75);

        let query = tokens("beta gamma");
        let sa = a.score(&query);
        let sb = b.score(&query);
        assert_eq!(sa.len(), sb.len());
        for (id, score) in sa {
            assert_eq!(score, sb[&id]);
        }
    }

    #[test]
    fn empty_query_scores_nothing() {
        let index = SparseIndex::build(Uuid::new_v4(), &[passage(0, "some text")], 1.5, 0.75);
        assert!(index.score(&[]).is_empty());
    }

    #[test]
    fn persist_load_round_trip_is_identical() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("sparse.json");

        let index = SparseIndex::build(
            Uuid::new_v4(),
            &[
                passage(0, "the cat sat on the mat"),
                passage(1, "dogs bark loudly at night"),
                passage(2, "the mat was red"),
            ],
            1.5,
            0.75,
        );
        index.persist(&path).unwrap();
        let loaded = SparseIndex::load(&path).unwrap();

        assert_eq!(loaded.generation(), index.generation());
        for query in ["cat", "the mat", "dogs bark", "missing"] {
            let before = index.score(&tokens(query));
            let after = loaded.score(&tokens(query));
            assert_eq!(before.len(), after.len(), "query: {query}");
            for (id, score) in before {
                assert_eq!(score, after[&id], "query: {query}");
            }
        }
    }
}
