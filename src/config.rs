//! Configuration objects for the index and the query parser.
//!
//! Both configs are plain values owned by the object they configure: the
//! [`Index`](crate::index::Index) holds a [`SearchConfig`] and hands it to the
//! parser and to rewrite passes, the [`IndexWriter`](crate::index::IndexWriter)
//! holds a [`WriterConfig`]. Nothing here is process-global; tests mutate a
//! config, pass it in, and drop it.

use serde::{Deserialize, Serialize};

/// Default boolean operator applied between query clauses that carry no
/// explicit operator or sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// Clauses are optional; documents matching more of them score higher.
    Or,
    /// Every clause is required.
    And,
}

/// Search-side configuration: parser defaults and result shaping.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Operator used between clauses without an explicit sign or operator.
    pub default_operator: Operator,

    /// When set, query syntax errors are swallowed and the raw input is
    /// re-tokenised into a plain multi-term query.
    pub suppress_query_errors: bool,

    /// Field searched when a term carries no field qualifier. `None` expands
    /// unqualified terms across every indexed field.
    pub default_search_field: Option<String>,

    /// Upper bound on the number of matched documents kept per query.
    /// Zero means unlimited. Applied before sorting.
    pub result_set_limit: usize,

    /// Minimum number of non-wildcard characters required at the head of a
    /// wildcard pattern.
    pub wildcard_min_prefix: usize,

    /// Number of leading characters candidate terms must share with a fuzzy
    /// term.
    pub fuzzy_prefix_length: usize,

    /// Similarity threshold for fuzzy matches when the query gives none.
    pub fuzzy_min_similarity: f32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            default_operator: Operator::Or,
            suppress_query_errors: true,
            default_search_field: None,
            result_set_limit: 0,
            wildcard_min_prefix: 3,
            fuzzy_prefix_length: 3,
            fuzzy_min_similarity: 0.5,
        }
    }
}

impl SearchConfig {
    /// Set the default boolean operator.
    pub fn with_default_operator(mut self, op: Operator) -> Self {
        self.default_operator = op;
        self
    }

    /// Enable or disable query-error suppression.
    pub fn with_suppress_query_errors(mut self, suppress: bool) -> Self {
        self.suppress_query_errors = suppress;
        self
    }

    /// Set the default search field.
    pub fn with_default_search_field<S: Into<String>>(mut self, field: S) -> Self {
        self.default_search_field = Some(field.into());
        self
    }

    /// Cap the number of matched documents per query (0 = unlimited).
    pub fn with_result_set_limit(mut self, limit: usize) -> Self {
        self.result_set_limit = limit;
        self
    }
}

/// Writer-side configuration: buffering and merge policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriterConfig {
    /// Number of buffered documents that triggers a flush into a new segment.
    pub max_buffered_docs: usize,

    /// Segments larger than this many documents are never merge candidates.
    /// `optimize` ignores the cap.
    pub max_merge_docs: usize,

    /// Number of same-tier segments that triggers a merge, and the base of
    /// the tier sizing.
    pub merge_factor: usize,

    /// Pack freshly written segments into a single `.cfs` container.
    pub use_compound_file: bool,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            max_buffered_docs: 10,
            max_merge_docs: usize::MAX,
            merge_factor: 10,
            use_compound_file: true,
        }
    }
}

impl WriterConfig {
    /// Set the buffered-document flush threshold.
    pub fn with_max_buffered_docs(mut self, n: usize) -> Self {
        self.max_buffered_docs = n;
        self
    }

    /// Set the merged-segment size cap.
    pub fn with_max_merge_docs(mut self, n: usize) -> Self {
        self.max_merge_docs = n;
        self
    }

    /// Set the merge factor.
    pub fn with_merge_factor(mut self, n: usize) -> Self {
        self.merge_factor = n;
        self
    }

    /// Enable or disable compound-file packing.
    pub fn with_compound_file(mut self, compound: bool) -> Self {
        self.use_compound_file = compound;
        self
    }
}
