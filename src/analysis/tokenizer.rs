use unicode_segmentation::UnicodeSegmentation;

/// One term produced by analysis, with its position in the analyzed text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub term: String,
    pub position: u32,
}

impl Token {
    pub fn new(term: impl Into<String>, position: u32) -> Self {
        Token { term: term.into(), position }
    }
}

pub trait Tokenizer: Send + Sync {
    /// Split `text` into tokens numbered from `first_position`
    fn tokenize(&self, text: &str, first_position: u32) -> Vec<Token>;
}

/// Splits on Unicode word boundaries and drops oversized words
#[derive(Debug, Clone)]
pub struct WordTokenizer {
    pub max_token_length: usize,
}

impl Default for WordTokenizer {
    fn default() -> Self {
        WordTokenizer { max_token_length: 255 }
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str, first_position: u32) -> Vec<Token> {
        text.unicode_words()
            .filter(|word| word.len() <= self.max_token_length)
            .zip(first_position..)
            .map(|(word, position)| Token::new(word, position))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_word_boundaries() {
        let tokens = WordTokenizer::default().tokenize("Gare du Nord, 75010 Paris", 0);
        let terms: Vec<&str> = tokens.iter().map(|t| t.term.as_str()).collect();
        assert_eq!(terms, vec!["Gare", "du", "Nord", "75010", "Paris"]);
        assert_eq!(tokens[4].position, 4);
    }

    #[test]
    fn positions_continue_from_offset() {
        let tokens = WordTokenizer::default().tokenize("hello world", 7);
        assert_eq!(tokens[0].position, 7);
        assert_eq!(tokens[1].position, 8);
    }
}
