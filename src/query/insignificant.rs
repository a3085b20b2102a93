//! The insignificant query: matches nothing, contributes no score and no
//! error.
//!
//! Produced when analysis leaves nothing to search for (stop-word-only
//! terms, empty input) and by the optimizer when removing such branches.

use std::any::Any;

use crate::error::Result;
use crate::index::Index;
use crate::query::query::{Execution, Query};

/// A query carrying no searchable content.
#[derive(Debug, Clone, Default)]
pub struct InsignificantQuery;

impl InsignificantQuery {
    /// Create an insignificant query.
    pub fn new() -> Self {
        InsignificantQuery
    }
}

impl Query for InsignificantQuery {
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
        "<InsignificantQuery>".to_string()
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
