//! Error types for the Lucerna library.
//!
//! All fallible operations return [`Result`], whose error type is the single
//! [`LucernaError`] enum. Callers can match on the variant they care about or
//! treat every error generically through the `std::error::Error` impl.
//!
//! # Examples
//!
//! ```
//! use lucerna::error::{LucernaError, Result};
//!
//! fn check_doc_id(doc_id: u32, doc_count: u32) -> Result<()> {
//!     if doc_id >= doc_count {
//!         return Err(LucernaError::out_of_range(format!(
//!             "document {doc_id} is out of range"
//!         )));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_doc_id(10, 10).is_err());
//! ```

use std::io;

use thiserror::Error;

/// The main error type for Lucerna operations.
#[derive(Error, Debug)]
pub enum LucernaError {
    /// I/O errors bubbling out of the underlying byte streams unchanged.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Malformed input supplied by the caller.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A document id or offset outside the valid range.
    #[error("Out of range: {0}")]
    OutOfRange(String),

    /// Unknown format markers, bad magic bytes, truncated or corrupt entries.
    #[error("Invalid file format: {0}")]
    InvalidFileFormat(String),

    /// Lock contention, missing files, unsupported index configurations.
    #[error("{0}")]
    Runtime(String),

    /// Query syntax errors, carrying the 1-based character position when the
    /// lexer or FSM can attribute one.
    #[error("{message}")]
    QueryParser {
        /// Human-readable message, e.g. `Syntax error at char position 25.`
        message: String,
        /// 1-based character offset of the offending lexeme, if known.
        position: Option<usize>,
    },

    /// A file that exists but cannot be opened for reading.
    ///
    /// Kept distinct from [`LucernaError::Io`] so the generation witness can
    /// fall back to probing older segments files without inspecting message
    /// text.
    #[error("File is not readable: {0}")]
    NotReadable(String),
}

/// Result type alias for operations that may fail with [`LucernaError`].
pub type Result<T> = std::result::Result<T, LucernaError>;

impl LucernaError {
    /// Create a new invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        LucernaError::InvalidArgument(msg.into())
    }

    /// Create a new out-of-range error.
    pub fn out_of_range<S: Into<String>>(msg: S) -> Self {
        LucernaError::OutOfRange(msg.into())
    }

    /// Create a new invalid-file-format error.
    pub fn invalid_format<S: Into<String>>(msg: S) -> Self {
        LucernaError::InvalidFileFormat(msg.into())
    }

    /// Create a new runtime error.
    pub fn runtime<S: Into<String>>(msg: S) -> Self {
        LucernaError::Runtime(msg.into())
    }

    /// Create a new not-readable error for the given file name.
    pub fn not_readable<S: Into<String>>(name: S) -> Self {
        LucernaError::NotReadable(name.into())
    }

    /// Create a query-parser error without position information.
    pub fn query_parser<S: Into<String>>(msg: S) -> Self {
        LucernaError::QueryParser {
            message: msg.into(),
            position: None,
        }
    }

    /// Create a syntax error at the given 1-based character position.
    pub fn syntax_error(position: usize) -> Self {
        LucernaError::QueryParser {
            message: format!("Syntax error at char position {position}."),
            position: Some(position),
        }
    }

    /// Whether this error is a query-parser error (the only kind the parser
    /// swallows in suppress mode).
    pub fn is_query_parser_error(&self) -> bool {
        matches!(self, LucernaError::QueryParser { .. })
    }
}
