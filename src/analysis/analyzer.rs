//! Analyzers combining a tokenizer with a filter chain.

use crate::analysis::filter::{LowercaseFilter, TokenFilter};
use crate::analysis::token::TokenStream;
use crate::analysis::tokenizer::{Tokenizer, WholeTokenizer, WordTokenizer};
use crate::error::Result;

/// A complete text-analysis pipeline.
pub trait Analyzer: Send + Sync + std::fmt::Debug {
    /// Analyze text into a stream of index terms.
    fn analyze(&self, text: &str) -> Result<TokenStream>;

    /// Name of this analyzer.
    fn name(&self) -> &'static str;

    /// Analyze and collect the term texts, a convenience for callers that
    /// only need the strings.
    fn token_texts(&self, text: &str) -> Result<Vec<String>> {
        Ok(self.analyze(text)?.map(|token| token.text).collect())
    }
}

/// The default pipeline: word tokenization followed by lowercasing.
#[derive(Debug, Default)]
pub struct StandardAnalyzer {
    tokenizer: WordTokenizer,
    filters: Vec<Box<dyn TokenFilter>>,
}

impl StandardAnalyzer {
    /// Create the default analyzer.
    pub fn new() -> Self {
        StandardAnalyzer {
            tokenizer: WordTokenizer::new(),
            filters: vec![Box::new(LowercaseFilter::new())],
        }
    }

    /// Append an extra filter to the pipeline.
    pub fn with_filter(mut self, filter: Box<dyn TokenFilter>) -> Self {
        self.filters.push(filter);
        self
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        let mut stream = self.tokenizer.tokenize(text)?;
        for filter in &self.filters {
            stream = filter.filter(stream)?;
        }
        Ok(stream)
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}

/// Treats the whole input as one untouched token; for identifiers and tags.
#[derive(Debug, Default)]
pub struct KeywordAnalyzer {
    tokenizer: WholeTokenizer,
}

impl KeywordAnalyzer {
    /// Create a keyword analyzer.
    pub fn new() -> Self {
        KeywordAnalyzer {
            tokenizer: WholeTokenizer::new(),
        }
    }
}

impl Analyzer for KeywordAnalyzer {
    fn analyze(&self, text: &str) -> Result<TokenStream> {
        self.tokenizer.tokenize(text)
    }

    fn name(&self) -> &'static str {
        "keyword"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::filter::StopWordFilter;

    #[test]
    fn test_standard_analyzer() {
        let analyzer = StandardAnalyzer::new();
        let texts = analyzer.token_texts("The Quick! Brown-Fox").unwrap();
        assert_eq!(texts, vec!["the", "quick", "brown", "fox"]);
    }

    #[test]
    fn test_standard_analyzer_with_stop_words() {
        let analyzer =
            StandardAnalyzer::new().with_filter(Box::new(StopWordFilter::english()));
        let texts = analyzer.token_texts("The Quick Brown Fox").unwrap();
        assert_eq!(texts, vec!["quick", "brown", "fox"]);
    }

    #[test]
    fn test_keyword_analyzer() {
        let analyzer = KeywordAnalyzer::new();
        let texts = analyzer.token_texts("New York").unwrap();
        assert_eq!(texts, vec!["New York"]);
    }

    #[test]
    fn test_zero_token_input() {
        let analyzer = StandardAnalyzer::new();
        let texts = analyzer.token_texts("--- ...").unwrap();
        assert!(texts.is_empty());
    }
}
