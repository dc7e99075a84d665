use std::collections::HashMap;
use crate::analysis::tokenizer::Token;
use crate::core::types::Handle;
use crate::index::posting::{Posting, PostingList};

/// Term -> postings map over analyzed object text
#[derive(Default)]
pub struct InvertedIndex {
    postings: HashMap<String, PostingList>,
    doc_terms: HashMap<Handle, Vec<String>>,
    doc_lengths: HashMap<Handle, u32>,
    total_tokens: u64,
}

impl InvertedIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index the tokens of one object, replacing whatever it had before
    pub fn add_document(&mut self, handle: Handle, tokens: &[Token]) {
        self.remove_document(handle);
        if tokens.is_empty() {
            return;
        }

        let mut positions: HashMap<&str, Vec<u32>> = HashMap::new();
        for token in tokens {
            positions.entry(token.term.as_str()).or_default().push(token.position);
        }

        let mut terms = Vec::with_capacity(positions.len());
        for (term, positions) in positions {
            self.postings.entry(term.to_string()).or_default().add(Posting {
                handle,
                term_freq: positions.len() as u32,
                positions,
            });
            terms.push(term.to_string());
        }

        self.doc_terms.insert(handle, terms);
        self.doc_lengths.insert(handle, tokens.len() as u32);
        self.total_tokens += tokens.len() as u64;
    }

    pub fn remove_document(&mut self, handle: Handle) {
        let Some(terms) = self.doc_terms.remove(&handle) else {
            return;
        };
        for term in terms {
            if let Some(list) = self.postings.get_mut(&term) {
                list.remove(handle);
                if list.is_empty() {
                    self.postings.remove(&term);
                }
            }
        }
        if let Some(length) = self.doc_lengths.remove(&handle) {
            self.total_tokens -= length as u64;
        }
    }

    pub fn postings(&self, term: &str) -> Option<&PostingList> {
        self.postings.get(term)
    }

    pub fn doc_count(&self) -> usize {
        self.doc_lengths.len()
    }

    pub fn term_count(&self) -> usize {
        self.postings.len()
    }

    pub fn doc_length(&self, handle: Handle) -> u32 {
        self.doc_lengths.get(&handle).copied().unwrap_or(0)
    }

    pub fn avg_doc_length(&self) -> f32 {
        if self.doc_lengths.is_empty() {
            0.0
        } else {
            self.total_tokens as f32 / self.doc_lengths.len() as f32
        }
    }

    pub fn clear(&mut self) {
        self.postings.clear();
        self.doc_terms.clear();
        self.doc_lengths.clear();
        self.total_tokens = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(terms: &[&str]) -> Vec<Token> {
        terms.iter().zip(0..).map(|(t, p)| Token::new(*t, p)).collect()
    }

    #[test]
    fn term_frequencies_and_lengths() {
        let mut index = InvertedIndex::new();
        index.add_document(1, &tokens(&["metro", "line", "metro"]));
        index.add_document(2, &tokens(&["line"]));

        assert_eq!(index.doc_count(), 2);
        assert_eq!(index.postings("metro").and_then(|l| l.get(1)).map(|p| p.term_freq), Some(2));
        assert_eq!(index.postings("line").map(|l| l.doc_freq()), Some(2));
        assert_eq!(index.avg_doc_length(), 2.0);
    }

    #[test]
    fn reindexing_replaces_previous_terms() {
        let mut index = InvertedIndex::new();
        index.add_document(1, &tokens(&["old"]));
        index.add_document(1, &tokens(&["new", "text"]));

        assert!(index.postings("old").is_none());
        assert_eq!(index.doc_length(1), 2);
        index.remove_document(1);
        assert_eq!(index.term_count(), 0);
        assert_eq!(index.doc_count(), 0);
    }
}
