//! Range query over the term dictionary.

use std::any::Any;

use crate::error::{LucernaError, Result};
use crate::index::{Index, Term};
use crate::query::multi_term::MultiTermQuery;
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::EmptyResultQuery;

/// A query matching every term between two boundary terms, inclusively
/// (`[a TO b]`) or exclusively (`{a TO b}`).
///
/// Rewriting scans the term dictionary between the bounds and unions the
/// matches into a multi-term query; a range query itself cannot execute.
#[derive(Debug, Clone)]
pub struct RangeQuery {
    field: Option<String>,
    lower: String,
    upper: String,
    inclusive: bool,
    boost: f32,
}

impl RangeQuery {
    /// Create a range query.
    pub fn new<L: Into<String>, U: Into<String>>(
        field: Option<String>,
        lower: L,
        upper: U,
        inclusive: bool,
    ) -> Self {
        RangeQuery {
            field,
            lower: lower.into(),
            upper: upper.into(),
            inclusive,
            boost: 1.0,
        }
    }

    /// Whether the bounds are inclusive.
    pub fn inclusive(&self) -> bool {
        self.inclusive
    }

    fn boundary_token(&self, index: &Index, raw: &str) -> Result<String> {
        let tokens = index.analyzer().token_texts(raw)?;
        if tokens.len() != 1 {
            return Err(LucernaError::query_parser(
                "Range query boundary terms must be non-multiple word terms",
            ));
        }
        Ok(tokens.into_iter().next().expect("checked length"))
    }
}

impl Query for RangeQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        let lower = self.boundary_token(index, &self.lower)?;
        let upper = self.boundary_token(index, &self.upper)?;

        let fields = match &self.field {
            Some(field) => vec![field.clone()],
            None => match index.search_config().default_search_field.clone() {
                Some(field) => vec![field],
                None => index.field_names(true),
            },
        };

        let mut rewritten = MultiTermQuery::new().with_boost(self.boost);
        for field in fields {
            for text in index.terms_in_range(&field, &lower, &upper, self.inclusive)? {
                rewritten.add_term(Term::new(&field, text), None);
            }
        }

        if rewritten.is_empty() {
            return Ok(Box::new(EmptyResultQuery::new()));
        }
        Ok(Box::new(rewritten))
    }

    fn execute(&self, _index: &Index) -> Result<Execution> {
        Err(LucernaError::runtime(
            "Range query must be rewritten before execution",
        ))
    }

    fn to_query_string(&self) -> String {
        let prefix = match &self.field {
            Some(field) => format!("{field}:"),
            None => String::new(),
        };
        let (open, close) = if self.inclusive { ('[', ']') } else { ('{', '}') };
        format!(
            "{prefix}{open}{} TO {}{close}{}",
            self.lower,
            self.upper,
            boost_suffix(self.boost)
        )
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_query_string() {
        let query = RangeQuery::new(Some("contents".to_string()), "business", "by", true);
        assert_eq!(query.to_query_string(), "contents:[business TO by]");

        let query = RangeQuery::new(None, "a", "b", false);
        assert_eq!(query.to_query_string(), "{a TO b}");
    }
}
