//! Token types flowing through the analysis pipeline.

/// A single unit of text produced by tokenization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    /// The text content of the token.
    pub text: String,

    /// Position of the token in the token stream (0-based); phrase queries
    /// match against these.
    pub position: usize,

    /// Character offset where the token starts in the original text.
    pub start_offset: usize,

    /// Character offset one past the end of the token.
    pub end_offset: usize,
}

impl Token {
    /// Create a new token with the given text and stream position.
    pub fn new<S: Into<String>>(text: S, position: usize) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset: 0,
            end_offset: 0,
        }
    }

    /// Create a new token with character offsets.
    pub fn with_offsets<S: Into<String>>(
        text: S,
        position: usize,
        start_offset: usize,
        end_offset: usize,
    ) -> Self {
        Token {
            text: text.into(),
            position,
            start_offset,
            end_offset,
        }
    }
}

/// A boxed iterator of tokens.
pub type TokenStream = Box<dyn Iterator<Item = Token>>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_creation() {
        let token = Token::new("hello", 3);
        assert_eq!(token.text, "hello");
        assert_eq!(token.position, 3);

        let token = Token::with_offsets("world", 1, 6, 11);
        assert_eq!(token.start_offset, 6);
        assert_eq!(token.end_offset, 11);
    }
}
