use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use crate::core::types::Handle;

/// Object handle with its relevance
#[derive(Debug, Clone, Copy)]
pub struct ScoredHit {
    pub handle: Handle,
    pub score: f32,
}

impl PartialEq for ScoredHit {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ScoredHit {}

impl PartialOrd for ScoredHit {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Higher score ranks first; equal scores fall back to the lower handle
impl Ord for ScoredHit {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.handle.cmp(&self.handle))
    }
}

/// Keeps the best `k` hits seen so far
pub struct TopKCollector {
    heap: BinaryHeap<Reverse<ScoredHit>>,
    k: usize,
    total_collected: usize,
}

impl TopKCollector {
    pub fn new(k: usize) -> Self {
        TopKCollector {
            heap: BinaryHeap::with_capacity(k.saturating_add(1).min(1024)),
            k,
            total_collected: 0,
        }
    }

    pub fn collect(&mut self, hit: ScoredHit) {
        self.total_collected += 1;
        if self.k == 0 {
            return;
        }
        if self.heap.len() < self.k {
            self.heap.push(Reverse(hit));
        } else if self.heap.peek().is_some_and(|Reverse(worst)| hit > *worst) {
            self.heap.pop();
            self.heap.push(Reverse(hit));
        }
    }

    pub fn total_collected(&self) -> usize {
        self.total_collected
    }

    /// Best first
    pub fn into_sorted(self) -> Vec<ScoredHit> {
        let mut hits: Vec<ScoredHit> = self.heap.into_iter().map(|Reverse(hit)| hit).collect();
        hits.sort_by(|a, b| b.cmp(a));
        hits
    }
}
