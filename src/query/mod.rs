//! The query subsystem: AST nodes, rewrite/optimize/execute passes, the
//! table-driven parser and the similarity.

pub mod boolean;
pub mod empty;
pub mod fsm;
pub mod fuzzy;
pub mod insignificant;
pub mod lexer;
pub mod multi_term;
pub mod parser;
pub mod phrase;
pub mod preprocessing;
#[allow(clippy::module_inception)]
pub mod query;
pub mod range;
pub mod similarity;
pub mod term;
pub mod wildcard;

pub use self::boolean::BooleanQuery;
pub use self::empty::EmptyResultQuery;
pub use self::fuzzy::FuzzyQuery;
pub use self::insignificant::InsignificantQuery;
pub use self::multi_term::MultiTermQuery;
pub use self::parser::QueryParser;
pub use self::phrase::PhraseQuery;
pub use self::query::{Execution, Query};
pub use self::range::RangeQuery;
pub use self::term::TermQuery;
pub use self::wildcard::WildcardQuery;

/// One ranked search hit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hit {
    /// Global document id, valid within the open index instance.
    pub id: u32,
    /// Relevance score.
    pub score: f32,
}

/// One sort criterion for [`Index::find_sorted`](crate::index::Index::find_sorted).
#[derive(Debug, Clone)]
pub struct SortField {
    /// Stored field to sort on.
    pub field: String,
    /// Sort direction; ties always break by ascending document id.
    pub descending: bool,
}

impl SortField {
    /// Ascending sort on a field.
    pub fn ascending<S: Into<String>>(field: S) -> Self {
        SortField {
            field: field.into(),
            descending: false,
        }
    }

    /// Descending sort on a field.
    pub fn descending<S: Into<String>>(field: S) -> Self {
        SortField {
            field: field.into(),
            descending: true,
        }
    }
}
