use std::collections::HashMap;
use crate::analysis::Analyzer;
use crate::core::types::Handle;
use crate::index::inverted::InvertedIndex;
use crate::scoring::scorer::{BM25Scorer, Scorer, TermStats};
use crate::search::results::{ScoredHit, TopKCollector};

/// Ranked text search over the full-text fragments of a collection's objects
pub struct FullTextIndex {
    analyzer: Analyzer,
    index: InvertedIndex,
    scorer: Box<dyn Scorer>,
    proximity_boost: f32,
}

impl FullTextIndex {
    pub fn new() -> Self {
        FullTextIndex {
            analyzer: Analyzer::english(),
            index: InvertedIndex::new(),
            scorer: Box::new(BM25Scorer::default()),
            proximity_boost: 0.5,
        }
    }

    pub fn put<S: AsRef<str>>(&mut self, handle: Handle, texts: &[S]) {
        let tokens = self.analyzer.analyze_all(texts);
        self.index.add_document(handle, &tokens);
    }

    pub fn remove(&mut self, handle: Handle) {
        self.index.remove_document(handle);
    }

    pub fn clear(&mut self) {
        self.index.clear();
    }

    pub fn len(&self) -> usize {
        self.index.doc_count()
    }

    pub fn is_empty(&self) -> bool {
        self.index.doc_count() == 0
    }

    /// Handles of the best `take` matches, most relevant first.
    ///
    /// Objects get the BM25 sum of the query terms they contain, plus a bonus for every pair
    /// of consecutive query terms found next to each other.
    pub fn search(&self, text: &str, take: usize) -> Vec<Handle> {
        self.search_scored(text, take).into_iter().map(|hit| hit.handle).collect()
    }

    pub fn search_scored(&self, text: &str, take: usize) -> Vec<ScoredHit> {
        let mut terms: Vec<String> = Vec::new();
        for token in self.analyzer.analyze(text) {
            if !terms.contains(&token.term) {
                terms.push(token.term);
            }
        }

        let total_docs = self.index.doc_count();
        let avg_doc_length = self.index.avg_doc_length();
        let mut scores: HashMap<Handle, f32> = HashMap::new();

        for term in &terms {
            let Some(list) = self.index.postings(term) else {
                continue;
            };
            for posting in list.iter() {
                let stats = TermStats {
                    doc_freq: list.doc_freq(),
                    total_docs,
                    doc_length: self.index.doc_length(posting.handle),
                    avg_doc_length,
                };
                *scores.entry(posting.handle).or_insert(0.0) += self.scorer.score(posting, &stats);
            }
        }

        for pair in terms.windows(2) {
            let (Some(first), Some(second)) = (self.index.postings(&pair[0]), self.index.postings(&pair[1])) else {
                continue;
            };
            for handle in first.intersect(second) {
                let adjacent = match (first.get(handle), second.get(handle)) {
                    (Some(a), Some(b)) => a.positions.iter().any(|p| b.positions.contains(&(p + 1))),
                    _ => false,
                };
                if adjacent {
                    *scores.entry(handle).or_insert(0.0) += self.proximity_boost;
                }
            }
        }

        let mut collector = TopKCollector::new(take);
        for (handle, score) in scores {
            collector.collect(ScoredHit { handle, score });
        }
        tracing::trace!(query = text, terms = terms.len(), matched = collector.total_collected(), "full-text search");
        collector.into_sorted()
    }
}

impl Default for FullTextIndex {
    fn default() -> Self {
        Self::new()
    }
}
