use crate::core::types::Handle;

#[derive(Debug, Clone, PartialEq)]
pub struct Posting {
    pub handle: Handle,
    pub term_freq: u32,
    pub positions: Vec<u32>,
}

/// Postings of one term, sorted by handle
#[derive(Debug, Clone, Default)]
pub struct PostingList {
    postings: Vec<Posting>,
}

impl PostingList {
    pub fn new() -> Self {
        PostingList { postings: Vec::new() }
    }

    /// Insert, replacing the posting of the same handle
    pub fn add(&mut self, posting: Posting) {
        match self.postings.binary_search_by_key(&posting.handle, |p| p.handle) {
            Ok(pos) => self.postings[pos] = posting,
            Err(pos) => self.postings.insert(pos, posting),
        }
    }

    pub fn remove(&mut self, handle: Handle) -> Option<Posting> {
        self.postings
            .binary_search_by_key(&handle, |p| p.handle)
            .ok()
            .map(|pos| self.postings.remove(pos))
    }

    pub fn get(&self, handle: Handle) -> Option<&Posting> {
        self.postings
            .binary_search_by_key(&handle, |p| p.handle)
            .ok()
            .map(|pos| &self.postings[pos])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Posting> {
        self.postings.iter()
    }

    pub fn doc_freq(&self) -> usize {
        self.postings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }

    /// Handles present in both lists (linear merge)
    pub fn intersect(&self, other: &PostingList) -> Vec<Handle> {
        let mut result = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.postings.len() && j < other.postings.len() {
            let (a, b) = (self.postings[i].handle, other.postings[j].handle);
            if a == b {
                result.push(a);
                i += 1;
                j += 1;
            } else if a < b {
                i += 1;
            } else {
                j += 1;
            }
        }
        result
    }
}
