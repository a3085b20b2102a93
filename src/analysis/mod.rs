//! Text analysis: tokenizers, token filters and analyzers.
//!
//! The index core consumes analyzers through the [`Analyzer`] trait only;
//! the implementations here cover the default pipeline (word tokenization
//! plus lowercasing), keyword fields and stop-word removal.

pub mod analyzer;
pub mod filter;
pub mod token;
pub mod tokenizer;

pub use self::analyzer::{Analyzer, KeywordAnalyzer, StandardAnalyzer};
pub use self::filter::{LowercaseFilter, StopWordFilter, TokenFilter};
pub use self::token::{Token, TokenStream};
pub use self::tokenizer::{Tokenizer, WholeTokenizer, WordTokenizer};
