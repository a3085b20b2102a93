//! Exact single-term query.

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::{Index, Term};
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::similarity;

/// A primitive query matching documents that contain one exact term.
///
/// The term is not analyzed; query parsing and rewriting normalise text
/// before a `TermQuery` is built.
#[derive(Debug, Clone)]
pub struct TermQuery {
    term: Term,
    boost: f32,
}

impl TermQuery {
    /// Create a term query.
    pub fn new(term: Term) -> Self {
        TermQuery { term, boost: 1.0 }
    }

    /// Builder-style boost setter.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// The queried term.
    pub fn term(&self) -> &Term {
        &self.term
    }
}

impl Query for TermQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, _index: &Index) -> Result<Box<dyn Query>> {
        Ok(Box::new(self.clone()))
    }

    fn execute(&self, index: &Index) -> Result<Execution> {
        let idf = similarity::idf(index.doc_freq(&self.term)?, index.count());
        let weight = idf * self.boost;

        let mut docs = BTreeMap::new();
        for (doc, freq) in index.term_docs(&self.term)? {
            let norm = index.norm(doc, &self.term.field)?;
            docs.insert(doc, similarity::tf(freq as f32) * idf * weight * norm);
        }

        Ok(Execution {
            docs,
            sum_squared_weights: weight * weight,
        })
    }

    fn to_query_string(&self) -> String {
        let body = if self.term.field.is_empty() {
            self.term.text.clone()
        } else {
            format!("{}:{}", self.term.field, self.term.text)
        };
        format!("{body}{}", boost_suffix(self.boost))
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
