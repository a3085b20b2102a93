//! Token filters applied after tokenization.

use std::collections::HashSet;

use crate::analysis::token::TokenStream;
use crate::error::Result;

/// Trait for filters that transform a token stream.
pub trait TokenFilter: Send + Sync + std::fmt::Debug {
    /// Apply this filter to a token stream.
    fn filter(&self, input: TokenStream) -> Result<TokenStream>;

    /// Name of this filter.
    fn name(&self) -> &'static str;
}

/// Lowercases every token.
#[derive(Debug, Default, Clone)]
pub struct LowercaseFilter;

impl LowercaseFilter {
    /// Create a new lowercase filter.
    pub fn new() -> Self {
        LowercaseFilter
    }
}

impl TokenFilter for LowercaseFilter {
    fn filter(&self, input: TokenStream) -> Result<TokenStream> {
        Ok(Box::new(input.map(|mut token| {
            token.text = token.text.to_lowercase();
            token
        })))
    }

    fn name(&self) -> &'static str {
        "lowercase"
    }
}

/// Removes tokens found in a stop-word set.
///
/// Surviving tokens keep their original stream positions, so phrase matching
/// still sees the gaps.
#[derive(Debug, Clone)]
pub struct StopWordFilter {
    stop_words: HashSet<String>,
}

impl StopWordFilter {
    /// Create a filter from an explicit word list.
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        StopWordFilter {
            stop_words: words.into_iter().map(Into::into).collect(),
        }
    }

    /// A small default English stop-word set.
    pub fn english() -> Self {
        StopWordFilter::new([
            "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into",
            "is", "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then",
            "there", "these", "they", "this", "to", "was", "will", "with",
        ])
    }
}

impl TokenFilter for StopWordFilter {
    fn filter(&self, input: TokenStream) -> Result<TokenStream> {
        let stop_words = self.stop_words.clone();
        Ok(Box::new(
            input.filter(move |token| !stop_words.contains(&token.text)),
        ))
    }

    fn name(&self) -> &'static str {
        "stop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::token::Token;

    fn stream(words: &[&str]) -> TokenStream {
        let tokens: Vec<Token> = words
            .iter()
            .enumerate()
            .map(|(i, word)| Token::new(*word, i))
            .collect();
        Box::new(tokens.into_iter())
    }

    #[test]
    fn test_lowercase_filter() {
        let filter = LowercaseFilter::new();
        let tokens: Vec<_> = filter.filter(stream(&["Hello", "WORLD"])).unwrap().collect();

        assert_eq!(tokens[0].text, "hello");
        assert_eq!(tokens[1].text, "world");
    }

    #[test]
    fn test_stop_word_filter_keeps_positions() {
        let filter = StopWordFilter::english();
        let tokens: Vec<_> = filter
            .filter(stream(&["the", "quick", "and", "lazy"]))
            .unwrap()
            .collect();

        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].text, "quick");
        assert_eq!(tokens[0].position, 1);
        assert_eq!(tokens[1].text, "lazy");
        assert_eq!(tokens[1].position, 3);
    }
}
