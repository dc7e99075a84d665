pub mod tokenizer;
pub mod filters;

use rust_stemmers::Algorithm;
use filters::{LowercaseFilter, StemmerFilter, StopWordFilter, TokenFilter};
use tokenizer::{Token, Tokenizer, WordTokenizer};

/// Text analysis pipeline: one tokenizer followed by filters applied in order
pub struct Analyzer {
    pub name: String,
    tokenizer: Box<dyn Tokenizer>,
    filters: Vec<Box<dyn TokenFilter>>,
}

impl Analyzer {
    pub fn new(name: &str, tokenizer: Box<dyn Tokenizer>) -> Self {
        Analyzer {
            name: name.to_string(),
            tokenizer,
            filters: Vec::new(),
        }
    }

    pub fn with_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn analyze(&self, text: &str) -> Vec<Token> {
        self.run(self.tokenizer.tokenize(text, 0))
    }

    /// Analyze several fragments as one document, positions running on across fragments
    pub fn analyze_all<S: AsRef<str>>(&self, texts: &[S]) -> Vec<Token> {
        let mut tokens = Vec::new();
        let mut next = 0;
        for text in texts {
            let fragment = self.tokenizer.tokenize(text.as_ref(), next);
            next = fragment.last().map_or(next, |t| t.position + 1);
            tokens.extend(fragment);
        }
        self.run(tokens)
    }

    fn run(&self, tokens: Vec<Token>) -> Vec<Token> {
        self.filters.iter().fold(tokens, |tokens, filter| filter.apply(tokens))
    }

    /// Lowercase, English stop words, English stemming
    pub fn english() -> Self {
        Analyzer::new("english", Box::new(WordTokenizer::default()))
            .with_filter(Box::new(LowercaseFilter))
            .with_filter(Box::new(StopWordFilter::english()))
            .with_filter(Box::new(StemmerFilter::new(Algorithm::English)))
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::english()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn english_pipeline() {
        let terms: Vec<String> = Analyzer::english()
            .analyze("The Stations of PARIS")
            .into_iter()
            .map(|t| t.term)
            .collect();
        assert_eq!(terms, vec!["station", "pari"]);
    }

    #[test]
    fn fragments_share_one_position_space() {
        let tokens = Analyzer::english().analyze_all(&["rue blanche", "metro pigalle"]);
        let positions: Vec<u32> = tokens.iter().map(|t| t.position).collect();
        assert_eq!(positions, vec![0, 1, 2, 3]);
    }
}
