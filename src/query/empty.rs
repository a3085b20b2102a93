//! The empty-result query: provably matches nothing.
//!
//! Produced by the optimizer when a branch cannot match any document (a
//! required term absent from the index, an empty range).

use std::any::Any;

use crate::error::Result;
use crate::index::Index;
use crate::query::query::{Execution, Query};

/// A query that cannot match any document.
#[derive(Debug, Clone, Default)]
pub struct EmptyResultQuery;

impl EmptyResultQuery {
    /// Create an empty-result query.
    pub fn new() -> Self {
        EmptyResultQuery
    }
}

impl Query for EmptyResultQuery {
    fn boost(&self) -> f32 {
        1.0
    }

    fn set_boost(&mut self, _boost: f32) {}

    fn rewrite(&self, _index: &Index) -> Result<Box<dyn Query>> {
        Ok(Box::new(self.clone()))
    }

    fn execute(&self, _index: &Index) -> Result<Execution> {
        Ok(Execution::empty())
    }

    fn to_query_string(&self) -> String {
        "<EmptyQuery>".to_string()
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
