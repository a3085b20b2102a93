//! Wildcard query: `*` matches any run, `?` any single character.

use std::any::Any;

use regex::Regex;

use crate::error::{LucernaError, Result};
use crate::index::{Index, Term};
use crate::query::multi_term::MultiTermQuery;
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::EmptyResultQuery;

/// A query matching every indexed term that fits a wildcard pattern.
///
/// Rewriting scans the dictionary from the pattern's literal prefix and
/// filters the tail with a compiled regex; matches union into a multi-term
/// query.
#[derive(Debug, Clone)]
pub struct WildcardQuery {
    field: Option<String>,
    pattern: String,
    boost: f32,
}

impl WildcardQuery {
    /// Create a wildcard query.
    pub fn new<P: Into<String>>(field: Option<String>, pattern: P) -> Self {
        WildcardQuery {
            field,
            pattern: pattern.into(),
            boost: 1.0,
        }
    }

    /// The literal prefix before the first wildcard character.
    fn prefix(&self) -> String {
        self.pattern
            .chars()
            .take_while(|c| *c != '*' && *c != '?')
            .collect()
    }

    fn pattern_regex(&self) -> Result<Regex> {
        let mut source = String::from("^");
        for ch in self.pattern.chars() {
            match ch {
                '*' => source.push_str(".*"),
                '?' => source.push('.'),
                other => source.push_str(&regex::escape(&other.to_string())),
            }
        }
        source.push('$');
        Regex::new(&source)
            .map_err(|e| LucernaError::invalid_argument(format!("bad wildcard pattern: {e}")))
    }
}

impl Query for WildcardQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        let prefix = self.prefix();
        let min_prefix = index.search_config().wildcard_min_prefix;
        if prefix.chars().count() < min_prefix {
            return Err(LucernaError::query_parser(format!(
                "At least {min_prefix} non-wildcard characters are required at the head of pattern"
            )));
        }
        let regex = self.pattern_regex()?;

        let fields = match &self.field {
            Some(field) => vec![field.clone()],
            None => match index.search_config().default_search_field.clone() {
                Some(field) => vec![field],
                None => index.field_names(true),
            },
        };

        let mut rewritten = MultiTermQuery::new().with_boost(self.boost);
        for field in fields {
            for text in index.terms_with_prefix(&field, &prefix)? {
                if regex.is_match(&text) {
                    rewritten.add_term(Term::new(&field, text), None);
                }
            }
        }

        if rewritten.is_empty() {
            return Ok(Box::new(EmptyResultQuery::new()));
        }
        Ok(Box::new(rewritten))
    }

    fn execute(&self, _index: &Index) -> Result<Execution> {
        Err(LucernaError::runtime(
            "Wildcard query must be rewritten before execution",
        ))
    }

    fn to_query_string(&self) -> String {
        let prefix = match &self.field {
            Some(field) => format!("{field}:"),
            None => String::new(),
        };
        format!("{prefix}{}{}", self.pattern, boost_suffix(self.boost))
    }

    fn clone_box(&self) -> Box<dyn Query> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
