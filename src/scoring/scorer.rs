use crate::index::posting::Posting;

/// Collection-level statistics for one scored term in one object
#[derive(Debug, Clone, Copy)]
pub struct TermStats {
    pub doc_freq: usize,      // objects containing the term
    pub total_docs: usize,    // objects in the full-text index
    pub doc_length: u32,      // tokens in this object
    pub avg_doc_length: f32,
}

pub trait Scorer: Send + Sync {
    fn score(&self, posting: &Posting, stats: &TermStats) -> f32;

    fn name(&self) -> &str;
}

/// Okapi BM25
pub struct BM25Scorer {
    pub k1: f32,  // term frequency saturation
    pub b: f32,   // length normalization strength
}

impl BM25Scorer {
    /// Never negative, even for terms present in most objects
    pub fn idf(doc_freq: usize, total_docs: usize) -> f32 {
        let n = total_docs as f32;
        let df = doc_freq as f32;
        ((n - df + 0.5) / (df + 0.5) + 1.0).ln()
    }
}

impl Default for BM25Scorer {
    fn default() -> Self {
        BM25Scorer { k1: 1.2, b: 0.75 }
    }
}

impl Scorer for BM25Scorer {
    fn score(&self, posting: &Posting, stats: &TermStats) -> f32 {
        let tf = posting.term_freq as f32;
        let length_ratio = if stats.avg_doc_length > 0.0 {
            stats.doc_length as f32 / stats.avg_doc_length
        } else {
            1.0
        };

        let idf = Self::idf(stats.doc_freq, stats.total_docs);
        idf * tf * (self.k1 + 1.0) / (tf + self.k1 * (1.0 - self.b + self.b * length_ratio))
    }

    fn name(&self) -> &str {
        "bm25"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(doc_freq: usize, doc_length: u32) -> TermStats {
        TermStats { doc_freq, total_docs: 100, doc_length, avg_doc_length: 10.0 }
    }

    fn posting(term_freq: u32) -> Posting {
        Posting { handle: 0, term_freq, positions: Vec::new() }
    }

    #[test]
    fn rare_terms_score_higher() {
        let scorer = BM25Scorer::default();
        assert!(scorer.score(&posting(1), &stats(2, 10)) > scorer.score(&posting(1), &stats(50, 10)));
    }

    #[test]
    fn frequency_saturates_and_length_penalizes() {
        let scorer = BM25Scorer::default();
        let one = scorer.score(&posting(1), &stats(5, 10));
        let ten = scorer.score(&posting(10), &stats(5, 10));
        assert!(ten > one && ten < one * 10.0);
        assert!(scorer.score(&posting(1), &stats(5, 40)) < one);
    }

    #[test]
    fn idf_is_positive_for_common_terms() {
        assert!(BM25Scorer::idf(100, 100) > 0.0);
    }
}
