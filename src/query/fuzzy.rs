//! Fuzzy query: terms within a Levenshtein-based similarity threshold.

use std::any::Any;

use crate::error::{LucernaError, Result};
use crate::index::{Index, Term};
use crate::query::multi_term::MultiTermQuery;
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::EmptyResultQuery;
use crate::util::levenshtein::levenshtein;

/// A query matching terms similar to a target term.
///
/// Candidate terms share a configurable prefix with the target; each is
/// scored `1 - distance / min(|term|, |candidate|)` and kept when at or
/// above the minimum similarity, carrying a proportional per-term boost.
#[derive(Debug, Clone)]
pub struct FuzzyQuery {
    field: Option<String>,
    text: String,
    min_similarity: f32,
    boost: f32,
}

impl FuzzyQuery {
    /// Create a fuzzy query. `min_similarity` must be in `[0, 1)`.
    pub fn new<T: Into<String>>(
        field: Option<String>,
        text: T,
        min_similarity: f32,
    ) -> Result<Self> {
        if min_similarity < 0.0 {
            return Err(LucernaError::invalid_argument(
                "Fuzzy search similarity must not be negative",
            ));
        }
        if min_similarity >= 1.0 {
            return Err(LucernaError::invalid_argument(
                "Fuzzy search similarity must be less than 1",
            ));
        }
        Ok(FuzzyQuery {
            field,
            text: text.into(),
            min_similarity,
            boost: 1.0,
        })
    }

    /// The similarity threshold.
    pub fn min_similarity(&self) -> f32 {
        self.min_similarity
    }
}

impl Query for FuzzyQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        let text_len = self.text.chars().count();
        let prefix_len = index.search_config().fuzzy_prefix_length.min(text_len);
        let prefix: String = self.text.chars().take(prefix_len).collect();
        let scale = 1.0 / (1.0 - self.min_similarity);

        let fields = match &self.field {
            Some(field) => vec![field.clone()],
            None => match index.search_config().default_search_field.clone() {
                Some(field) => vec![field],
                None => index.field_names(true),
            },
        };

        let mut rewritten = MultiTermQuery::new().with_boost(self.boost);
        for field in fields {
            for candidate in index.terms_with_prefix(&field, &prefix)? {
                let candidate_len = candidate.chars().count();
                let min_len = text_len.min(candidate_len);
                if min_len == 0 {
                    continue;
                }
                let distance = levenshtein(&self.text, &candidate);
                let similarity = 1.0 - distance as f32 / min_len as f32;
                if similarity >= self.min_similarity {
                    let term_boost = (similarity - self.min_similarity) * scale;
                    rewritten.add_term_with_boost(
                        Term::new(&field, candidate),
                        None,
                        term_boost,
                    );
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
            "Fuzzy query must be rewritten before execution",
        ))
    }

    fn to_query_string(&self) -> String {
        let prefix = match &self.field {
            Some(field) => format!("{field}:"),
            None => String::new(),
        };
        format!(
            "{prefix}{}~{}{}",
            self.text,
            self.min_similarity,
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
    fn test_similarity_bounds() {
        assert!(FuzzyQuery::new(None, "word", 0.5).is_ok());
        assert!(FuzzyQuery::new(None, "word", 0.0).is_ok());
        assert!(FuzzyQuery::new(None, "word", 1.0).is_err());
        assert!(FuzzyQuery::new(None, "word", -0.1).is_err());
    }

    #[test]
    fn test_to_query_string() {
        let query = FuzzyQuery::new(Some("contents".to_string()), "apache", 0.5).unwrap();
        assert_eq!(query.to_query_string(), "contents:apache~0.5");
    }
}
