//! # Lucerna
//!
//! A full-text search engine whose on-disk index format is compatible with
//! Apache Lucene 2.x (pre-2.1, 2.1 and 2.3 segment formats).
//!
//! ## Features
//!
//! - Segmented inverted-index storage: term dictionary with a skip index,
//!   delta-coded postings with positions, stored fields, norms, deletion
//!   bitvectors, compound-file packing
//! - Generation-tracked commits with a cross-process witness protocol and
//!   read/write locking
//! - A Lucene-dialect query language parsed by a table-driven FSM: boolean
//!   operators, signs, phrases, fuzzy and wildcard terms, ranges, boosts,
//!   subqueries
//! - TF/IDF vector-space ranking
//! - Pluggable directory backends (filesystem and in-memory)
//!
//! ## Example
//!
//! ```
//! use lucerna::document::{Document, Field};
//! use lucerna::index::Index;
//! use lucerna::directory::RamDirectory;
//! use std::sync::Arc;
//!
//! # fn main() -> lucerna::error::Result<()> {
//! let directory = Arc::new(RamDirectory::new());
//! let mut index = Index::create_in(directory, true)?;
//!
//! index.add_document(
//!     Document::new()
//!         .with_field(Field::text("title", "Hello World"))
//!         .with_field(Field::un_stored("contents", "the first indexed document")),
//! )?;
//! index.commit()?;
//!
//! let hits = index.find("contents:indexed")?;
//! assert_eq!(hits.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod analysis;
pub mod config;
pub mod directory;
pub mod document;
pub mod error;
pub mod index;
pub mod query;
pub mod store;
pub mod util;

pub use crate::config::{Operator, SearchConfig, WriterConfig};
pub use crate::document::{Document, Field};
pub use crate::error::{LucernaError, Result};
pub use crate::index::{Index, Term};
pub use crate::query::{Hit, SortField};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
