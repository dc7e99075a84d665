use std::collections::HashSet;
use rust_stemmers::{Algorithm, Stemmer};
use crate::analysis::tokenizer::Token;

/// One stage of the analysis pipeline
pub trait TokenFilter: Send + Sync {
    fn name(&self) -> &str;

    fn apply(&self, tokens: Vec<Token>) -> Vec<Token>;
}

pub struct LowercaseFilter;

impl TokenFilter for LowercaseFilter {
    fn name(&self) -> &str {
        "lowercase"
    }

    fn apply(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|mut token| {
                token.term = token.term.to_lowercase();
                token
            })
            .collect()
    }
}

/// Drops common words; expects lowercase input
pub struct StopWordFilter {
    words: HashSet<String>,
}

impl StopWordFilter {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StopWordFilter {
            words: words.into_iter().map(Into::into).collect(),
        }
    }

    pub fn english() -> Self {
        Self::new([
            "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is",
            "it", "its", "of", "on", "or", "that", "the", "to", "was", "were", "with",
        ])
    }
}

impl TokenFilter for StopWordFilter {
    fn name(&self) -> &str {
        "stop_words"
    }

    fn apply(&self, mut tokens: Vec<Token>) -> Vec<Token> {
        tokens.retain(|token| !self.words.contains(&token.term));
        tokens
    }
}

pub struct StemmerFilter {
    stemmer: Stemmer,
}

impl StemmerFilter {
    pub fn new(algorithm: Algorithm) -> Self {
        StemmerFilter {
            stemmer: Stemmer::create(algorithm),
        }
    }
}

impl TokenFilter for StemmerFilter {
    fn name(&self) -> &str {
        "stemmer"
    }

    fn apply(&self, tokens: Vec<Token>) -> Vec<Token> {
        tokens
            .into_iter()
            .map(|token| Token::new(self.stemmer.stem(&token.term), token.position))
            .collect()
    }
}
