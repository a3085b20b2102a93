//! Tokenizer implementations.

use crate::analysis::token::{Token, TokenStream};
use crate::error::Result;

/// Trait for tokenizers that convert text into tokens.
pub trait Tokenizer: Send + Sync + std::fmt::Debug {
    /// Tokenize the given text into a stream of tokens.
    fn tokenize(&self, text: &str) -> Result<TokenStream>;

    /// Name of this tokenizer.
    fn name(&self) -> &'static str;
}

/// Splits text on any non-alphanumeric character.
///
/// Runs of letters and digits become tokens; everything else is a separator.
/// Positions count tokens, offsets count characters.
#[derive(Debug, Default, Clone)]
pub struct WordTokenizer;

impl WordTokenizer {
    /// Create a new word tokenizer.
    pub fn new() -> Self {
        WordTokenizer
    }
}

impl Tokenizer for WordTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        let mut tokens = Vec::new();
        let mut current = String::new();
        let mut start = 0;

        for (offset, ch) in text.chars().enumerate() {
            if ch.is_alphanumeric() {
                if current.is_empty() {
                    start = offset;
                }
                current.push(ch);
            } else if !current.is_empty() {
                let position = tokens.len();
                tokens.push(Token::with_offsets(
                    std::mem::take(&mut current),
                    position,
                    start,
                    offset,
                ));
            }
        }
        if !current.is_empty() {
            let position = tokens.len();
            let end = text.chars().count();
            tokens.push(Token::with_offsets(current, position, start, end));
        }

        Ok(Box::new(tokens.into_iter()))
    }

    fn name(&self) -> &'static str {
        "word"
    }
}

/// Treats the entire input as a single token.
#[derive(Debug, Default, Clone)]
pub struct WholeTokenizer;

impl WholeTokenizer {
    /// Create a new whole-input tokenizer.
    pub fn new() -> Self {
        WholeTokenizer
    }
}

impl Tokenizer for WholeTokenizer {
    fn tokenize(&self, text: &str) -> Result<TokenStream> {
        if text.is_empty() {
            return Ok(Box::new(std::iter::empty()));
        }
        let token = Token::with_offsets(text, 0, 0, text.chars().count());
        Ok(Box::new(std::iter::once(token)))
    }

    fn name(&self) -> &'static str {
        "whole"
    }
}
