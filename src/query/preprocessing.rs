//! Preprocessing query nodes produced by the parser.
//!
//! These carry the raw lexeme text; all analyzer work, wildcard detection
//! and field expansion happens in `rewrite`, once the open index is known.
//! Executing a preprocessing node is an error, the orchestrator always
//! rewrites first.

use std::any::Any;

use crate::error::{LucernaError, Result};
use crate::index::{Index, Term};
use crate::query::boolean::BooleanQuery;
use crate::query::fuzzy::FuzzyQuery;
use crate::query::multi_term::MultiTermQuery;
use crate::query::phrase::PhraseQuery;
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::term::TermQuery;
use crate::query::wildcard::WildcardQuery;
use crate::query::InsignificantQuery;

fn field_prefix(field: &Option<String>) -> String {
    match field {
        Some(field) => format!("{field}:"),
        None => String::new(),
    }
}

/// Fields an unqualified clause expands across: the configured default
/// search field, or every indexed field.
fn expansion_fields(index: &Index) -> Vec<String> {
    match index.search_config().default_search_field.clone() {
        Some(field) => vec![field],
        None => index.field_names(true),
    }
}

/// A raw term from the parser, analyzed and classified at rewrite time.
#[derive(Debug, Clone)]
pub struct PreprocessingTerm {
    word: String,
    field: Option<String>,
    boost: f32,
}

impl PreprocessingTerm {
    /// Create a preprocessing term.
    pub fn new<W: Into<String>>(word: W, field: Option<String>) -> Self {
        PreprocessingTerm {
            word: word.into(),
            field,
            boost: 1.0,
        }
    }

    fn rewrite_for_field(&self, index: &Index, field: &str) -> Result<Box<dyn Query>> {
        // Wildcard patterns bypass analysis.
        if self.word.contains('*') || self.word.contains('?') {
            let mut wildcard =
                WildcardQuery::new(Some(field.to_string()), self.word.clone());
            wildcard.set_boost(self.boost);
            return wildcard.rewrite(index);
        }

        // An exact match in an untokenized field is used as-is.
        let keyword = Term::new(field, &self.word);
        if index.has_term(&keyword)? {
            return Ok(Box::new(TermQuery::new(keyword).with_boost(self.boost)));
        }

        let tokens = index.analyzer().token_texts(&self.word)?;
        match tokens.len() {
            0 => Ok(Box::new(InsignificantQuery::new())),
            1 => {
                let term = Term::new(field, tokens.into_iter().next().expect("one token"));
                Ok(Box::new(TermQuery::new(term).with_boost(self.boost)))
            }
            _ => {
                let mut multi = MultiTermQuery::new().with_boost(self.boost);
                for token in tokens {
                    multi.add_term(Term::new(field, token), Some(true));
                }
                Ok(Box::new(multi))
            }
        }
    }
}

impl Query for PreprocessingTerm {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        if let Some(field) = &self.field {
            return self.rewrite_for_field(index, &field.clone());
        }

        // Unqualified terms expand into an optional union across fields.
        let mut union = MultiTermQuery::new().with_boost(self.boost);
        for field in expansion_fields(index) {
            let rewritten = self.rewrite_for_field(index, &field)?;
            if let Some(term_query) = rewritten.as_any().downcast_ref::<TermQuery>() {
                union.add_term(term_query.term().clone(), None);
            } else if let Some(multi) = rewritten.as_any().downcast_ref::<MultiTermQuery>() {
                for term in multi.terms() {
                    union.add_term(term.clone(), None);
                }
            }
        }

        if union.is_empty() {
            return Ok(Box::new(InsignificantQuery::new()));
        }
        Ok(Box::new(union))
    }

    fn execute(&self, _index: &Index) -> Result<Execution> {
        Err(LucernaError::runtime(
            "Preprocessing term must be rewritten before execution",
        ))
    }

    fn to_query_string(&self) -> String {
        format!(
            "{}{}{}",
            field_prefix(&self.field),
            self.word,
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

/// A raw phrase from the parser.
#[derive(Debug, Clone)]
pub struct PreprocessingPhrase {
    text: String,
    slop: u32,
    field: Option<String>,
    boost: f32,
}

impl PreprocessingPhrase {
    /// Create a preprocessing phrase from the quoted text.
    pub fn new<T: Into<String>>(text: T, slop: u32, field: Option<String>) -> Self {
        PreprocessingPhrase {
            text: text.into(),
            slop,
            field,
            boost: 1.0,
        }
    }

    fn rewrite_for_field(&self, index: &Index, field: &str) -> Result<Box<dyn Query>> {
        let tokens: Vec<_> = index.analyzer().analyze(&self.text)?.collect();
        match tokens.len() {
            0 => Ok(Box::new(InsignificantQuery::new())),
            1 => {
                let term = Term::new(field, &tokens[0].text);
                Ok(Box::new(TermQuery::new(term).with_boost(self.boost)))
            }
            _ => {
                let mut phrase = PhraseQuery::new(field)
                    .with_slop(self.slop)
                    .with_boost(self.boost);
                for token in tokens {
                    phrase.add_term_at(token.text, token.position as u32);
                }
                Ok(Box::new(phrase))
            }
        }
    }
}

impl Query for PreprocessingPhrase {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        if let Some(field) = &self.field {
            return self.rewrite_for_field(index, &field.clone());
        }

        // An unqualified phrase becomes a boolean over the indexed fields.
        let mut union = BooleanQuery::new().with_boost(self.boost);
        let mut all_insignificant = true;
        for field in expansion_fields(index) {
            let rewritten = self.rewrite_for_field(index, &field)?;
            if !rewritten.as_any().is::<InsignificantQuery>() {
                all_insignificant = false;
                union.add(rewritten, None);
            }
        }
        if all_insignificant {
            return Ok(Box::new(InsignificantQuery::new()));
        }
        Ok(Box::new(union))
    }

    fn execute(&self, _index: &Index) -> Result<Execution> {
        Err(LucernaError::runtime(
            "Preprocessing phrase must be rewritten before execution",
        ))
    }

    fn to_query_string(&self) -> String {
        let slop = if self.slop != 0 {
            format!("~{}", self.slop)
        } else {
            String::new()
        };
        format!(
            "{}\"{}\"{slop}{}",
            field_prefix(&self.field),
            self.text,
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

/// A raw fuzzy term from the parser.
#[derive(Debug, Clone)]
pub struct PreprocessingFuzzy {
    word: String,
    min_similarity: f32,
    field: Option<String>,
    boost: f32,
}

impl PreprocessingFuzzy {
    /// Create a preprocessing fuzzy term.
    pub fn new<W: Into<String>>(word: W, min_similarity: f32, field: Option<String>) -> Self {
        PreprocessingFuzzy {
            word: word.into(),
            min_similarity,
            field,
            boost: 1.0,
        }
    }

    fn rewrite_for_field(&self, index: &Index, field: &str) -> Result<Box<dyn Query>> {
        let tokens = index.analyzer().token_texts(&self.word)?;
        match tokens.len() {
            0 => Ok(Box::new(InsignificantQuery::new())),
            1 => {
                let mut fuzzy = FuzzyQuery::new(
                    Some(field.to_string()),
                    tokens.into_iter().next().expect("one token"),
                    self.min_similarity,
                )?;
                fuzzy.set_boost(self.boost);
                fuzzy.rewrite(index)
            }
            _ => Err(LucernaError::query_parser(
                "Fuzzy search is supported only for non-multiple word terms",
            )),
        }
    }
}

impl Query for PreprocessingFuzzy {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        if let Some(field) = &self.field {
            return self.rewrite_for_field(index, &field.clone());
        }

        let mut union = BooleanQuery::new().with_boost(self.boost);
        let mut all_insignificant = true;
        for field in expansion_fields(index) {
            let rewritten = self.rewrite_for_field(index, &field)?;
            if !rewritten.as_any().is::<InsignificantQuery>() {
                all_insignificant = false;
                union.add(rewritten, None);
            }
        }
        if all_insignificant {
            return Ok(Box::new(InsignificantQuery::new()));
        }
        Ok(Box::new(union))
    }

    fn execute(&self, _index: &Index) -> Result<Execution> {
        Err(LucernaError::runtime(
            "Preprocessing fuzzy term must be rewritten before execution",
        ))
    }

    fn to_query_string(&self) -> String {
        format!(
            "{}{}~{}{}",
            field_prefix(&self.field),
            self.word,
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
