//! The query parser: lexemes through the FSM into a query AST.
//!
//! The FSM validates lexeme order and names the actions to run; all mutable
//! parse state lives here — a context stack for subqueries, the stashed
//! range boundaries, and the pending `~`/`^` modifier routing.
//!
//! In suppress mode (the default) any query-parser error is swallowed: the
//! raw input is re-tokenised with the analyzer and turned into a flat
//! multi-term query whose sign follows the configured default operator.

use std::sync::Arc;

use crate::analysis::Analyzer;
use crate::config::{Operator, SearchConfig};
use crate::error::{LucernaError, Result};
use crate::index::Term;
use crate::query::boolean::BooleanQuery;
use crate::query::fsm::{Action, Fsm};
use crate::query::lexer::{tokenize, Lexeme, LexemeKind};
use crate::query::multi_term::MultiTermQuery;
use crate::query::preprocessing::{PreprocessingFuzzy, PreprocessingPhrase, PreprocessingTerm};
use crate::query::query::Query;
use crate::query::range::RangeQuery;
use crate::query::InsignificantQuery;

/// Parses query strings against a configuration and analyzer.
#[derive(Debug)]
pub struct QueryParser {
    config: SearchConfig,
    analyzer: Arc<dyn Analyzer>,
}

impl QueryParser {
    /// Create a parser.
    pub fn new(config: SearchConfig, analyzer: Arc<dyn Analyzer>) -> Self {
        QueryParser { config, analyzer }
    }

    /// Parse a query string.
    ///
    /// An empty string yields an insignificant query (no hits, no error).
    pub fn parse(&self, input: &str) -> Result<Box<dyn Query>> {
        match self.parse_strict(input) {
            Ok(query) => Ok(query),
            Err(e) if self.config.suppress_query_errors && e.is_query_parser_error() => {
                self.fallback(input)
            }
            Err(e) => Err(e),
        }
    }

    /// Parse without the suppress-mode safety net.
    pub fn parse_strict(&self, input: &str) -> Result<Box<dyn Query>> {
        if input.trim().is_empty() {
            return Ok(Box::new(InsignificantQuery::new()));
        }

        let lexemes = tokenize(input)?;
        let mut run = ParseRun::new(&self.config);
        let mut fsm = Fsm::new();

        for lexeme in &lexemes {
            for action in fsm.advance(lexeme)? {
                run.dispatch(action, lexeme)?;
            }
        }

        let end = input.chars().count() + 1;
        if run.pending_modifier == Some(PendingModifier::Boost) {
            return Err(LucernaError::query_parser(
                "'^' sign must be followed by a number",
            ));
        }
        if !fsm.is_final() || run.contexts.len() != 1 {
            return Err(LucernaError::syntax_error(end));
        }

        let context = run.contexts.pop().expect("one context remains");
        context.build_query(&self.config)
    }

    /// Suppress-mode fallback: the raw input tokenised into one flat
    /// multi-term query.
    fn fallback(&self, input: &str) -> Result<Box<dyn Query>> {
        let tokens = self.analyzer.token_texts(input)?;
        if tokens.is_empty() {
            return Ok(Box::new(InsignificantQuery::new()));
        }

        let sign = match self.config.default_operator {
            Operator::And => Some(true),
            Operator::Or => None,
        };
        let field = self
            .config
            .default_search_field
            .clone()
            .unwrap_or_default();

        let mut multi = MultiTermQuery::new();
        for token in tokens {
            multi.add_term(Term::new(field.clone(), token), sign);
        }
        Ok(Box::new(multi))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingModifier {
    Fuzzy,
    Boost,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BoolOp {
    And,
    Or,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Undefined,
    Signs,
    Boolean,
}

#[derive(Debug)]
enum EntryKind {
    Term { word: String },
    Phrase { text: String },
    Subquery(Box<dyn Query>),
}

/// One pending clause of a context, accumulating its modifiers.
#[derive(Debug)]
struct QueryEntry {
    kind: EntryKind,
    field: Option<String>,
    sign: Option<bool>,
    boost: f32,
    fuzzy: bool,
    fuzzy_similarity: Option<f32>,
    slop: u32,
}

impl QueryEntry {
    fn into_query(self, config: &SearchConfig) -> Result<Box<dyn Query>> {
        match self.kind {
            EntryKind::Term { word } => {
                if self.fuzzy {
                    let similarity = self
                        .fuzzy_similarity
                        .unwrap_or(config.fuzzy_min_similarity);
                    if similarity >= 1.0 {
                        return Err(LucernaError::query_parser(
                            "Fuzzy search similarity must be less than 1",
                        ));
                    }
                    let mut query = PreprocessingFuzzy::new(word, similarity, self.field);
                    query.set_boost(self.boost);
                    Ok(Box::new(query))
                } else {
                    let mut query = PreprocessingTerm::new(word, self.field);
                    query.set_boost(self.boost);
                    Ok(Box::new(query))
                }
            }
            EntryKind::Phrase { text } => {
                let mut query = PreprocessingPhrase::new(text, self.slop, self.field);
                query.set_boost(self.boost);
                Ok(Box::new(query))
            }
            EntryKind::Subquery(mut query) => {
                let boost = query.boost() * self.boost;
                query.set_boost(boost);
                Ok(query)
            }
        }
    }
}

#[derive(Debug)]
enum ContextItem {
    Entry(QueryEntry),
    Operator(BoolOp),
}

/// Per-subquery parser state: pending entries, field scope and the
/// signs-versus-operators expression style.
#[derive(Debug)]
struct ParserContext {
    default_field: Option<String>,
    next_field: Option<String>,
    next_sign: Option<bool>,
    mode: Mode,
    items: Vec<ContextItem>,
}

impl ParserContext {
    fn new(default_field: Option<String>) -> Self {
        ParserContext {
            default_field,
            next_field: None,
            next_sign: None,
            mode: Mode::Undefined,
            items: Vec::new(),
        }
    }

    fn current_field(&self) -> Option<String> {
        self.next_field.clone().or_else(|| self.default_field.clone())
    }

    fn set_field(&mut self, field: &str) {
        self.next_field = Some(field.to_string());
    }

    fn set_sign(&mut self, required: bool) -> Result<()> {
        if self.mode == Mode::Boolean {
            return Err(LucernaError::query_parser(
                "Mixing of boolean operators and signs is not allowed",
            ));
        }
        self.mode = Mode::Signs;
        self.next_sign = Some(required);
        Ok(())
    }

    fn add_operator(&mut self, op: BoolOp) -> Result<()> {
        if self.mode == Mode::Signs {
            return Err(LucernaError::query_parser(
                "Mixing of boolean operators and signs is not allowed",
            ));
        }
        self.mode = Mode::Boolean;
        self.items.push(ContextItem::Operator(op));
        Ok(())
    }

    fn add_entry(&mut self, kind: EntryKind) {
        let entry = QueryEntry {
            kind,
            field: self.current_field(),
            sign: self.next_sign.take(),
            boost: 1.0,
            fuzzy: false,
            fuzzy_similarity: None,
            slop: 0,
        };
        self.next_field = None;
        self.items.push(ContextItem::Entry(entry));
    }

    fn last_entry_mut(&mut self) -> Option<&mut QueryEntry> {
        match self.items.last_mut() {
            Some(ContextItem::Entry(entry)) => Some(entry),
            _ => None,
        }
    }

    fn build_query(self, config: &SearchConfig) -> Result<Box<dyn Query>> {
        if self.items.is_empty() {
            return Ok(Box::new(InsignificantQuery::new()));
        }
        match self.mode {
            Mode::Boolean => self.boolean_expression(config),
            _ => self.sign_expression(config),
        }
    }

    /// Signs style: every entry carries `+`, `-` or the default sign.
    fn sign_expression(self, config: &SearchConfig) -> Result<Box<dyn Query>> {
        let default_sign = match config.default_operator {
            Operator::And => Some(true),
            Operator::Or => None,
        };

        let mut clauses: Vec<(Box<dyn Query>, Option<bool>)> = Vec::new();
        for item in self.items {
            let ContextItem::Entry(entry) = item else {
                unreachable!("operators force boolean mode");
            };
            let sign = entry.sign.or(default_sign);
            clauses.push((entry.into_query(config)?, sign));
        }

        if clauses.len() == 1 && clauses[0].1 != Some(false) {
            return Ok(clauses.remove(0).0);
        }

        let mut boolean = BooleanQuery::new();
        for (query, sign) in clauses {
            boolean.add(query, sign);
        }
        Ok(Box::new(boolean))
    }

    /// Boolean style: `AND`/`OR` group entries into conjunctions, `NOT`
    /// flips the following entry.
    fn boolean_expression(self, config: &SearchConfig) -> Result<Box<dyn Query>> {
        let mut conjunctions: Vec<Vec<(Box<dyn Query>, bool)>> = Vec::new();
        let mut current: Vec<(Box<dyn Query>, bool)> = Vec::new();
        let mut pending_not = false;
        let mut last_was_entry = false;

        for item in self.items {
            match item {
                ContextItem::Operator(BoolOp::And) => {
                    last_was_entry = false;
                }
                ContextItem::Operator(BoolOp::Or) => {
                    if !current.is_empty() {
                        conjunctions.push(std::mem::take(&mut current));
                    }
                    last_was_entry = false;
                }
                ContextItem::Operator(BoolOp::Not) => {
                    pending_not = true;
                    last_was_entry = false;
                }
                ContextItem::Entry(entry) => {
                    // Bare juxtaposition inside a boolean expression follows
                    // the default operator.
                    if last_was_entry
                        && config.default_operator == Operator::Or
                        && !current.is_empty()
                    {
                        conjunctions.push(std::mem::take(&mut current));
                    }
                    current.push((entry.into_query(config)?, pending_not));
                    pending_not = false;
                    last_was_entry = true;
                }
            }
        }
        if !current.is_empty() {
            conjunctions.push(current);
        }
        if conjunctions.is_empty() {
            return Ok(Box::new(InsignificantQuery::new()));
        }

        if conjunctions.len() == 1 {
            let mut conjunction = conjunctions.remove(0);
            if conjunction.len() == 1 && !conjunction[0].1 {
                return Ok(conjunction.remove(0).0);
            }
            let mut boolean = BooleanQuery::new();
            for (query, not) in conjunction {
                boolean.add(query, Some(!not));
            }
            return Ok(Box::new(boolean));
        }

        let mut outer = BooleanQuery::new();
        for mut conjunction in conjunctions {
            let clause: Box<dyn Query> = if conjunction.len() == 1 && !conjunction[0].1 {
                conjunction.remove(0).0
            } else {
                let mut inner = BooleanQuery::new();
                for (query, not) in conjunction {
                    inner.add(query, Some(!not));
                }
                Box::new(inner)
            };
            outer.add(clause, None);
        }
        Ok(Box::new(outer))
    }
}

/// Transient state of one parse.
#[derive(Debug)]
struct ParseRun<'a> {
    config: &'a SearchConfig,
    contexts: Vec<ParserContext>,
    range_first: Option<String>,
    range_last: Option<String>,
    pending_modifier: Option<PendingModifier>,
}

impl<'a> ParseRun<'a> {
    fn new(config: &'a SearchConfig) -> Self {
        ParseRun {
            config,
            contexts: vec![ParserContext::new(None)],
            range_first: None,
            range_last: None,
            pending_modifier: None,
        }
    }

    fn context(&mut self) -> &mut ParserContext {
        self.contexts.last_mut().expect("context stack is never empty")
    }

    fn dispatch(&mut self, action: Action, lexeme: &Lexeme) -> Result<()> {
        // A `^` must be completed by its number before anything else.
        if self.pending_modifier == Some(PendingModifier::Boost)
            && action != Action::ProcessModifierParameter
        {
            return Err(LucernaError::query_parser(
                "'^' sign must be followed by a number",
            ));
        }

        match action {
            Action::AddTermEntry => {
                self.pending_modifier = None;
                self.context().add_entry(EntryKind::Term {
                    word: lexeme.text.clone(),
                });
            }
            Action::AddPhraseEntry => {
                self.pending_modifier = None;
                self.context().add_entry(EntryKind::Phrase {
                    text: lexeme.text.clone(),
                });
            }
            Action::SetField => {
                self.pending_modifier = None;
                self.context().set_field(&lexeme.text);
            }
            Action::SetSignRequired => self.context().set_sign(true)?,
            Action::SetSignProhibited => self.context().set_sign(false)?,
            Action::ProcessFuzzyProximityModifier => {
                let entry = self.context().last_entry_mut().ok_or_else(|| {
                    LucernaError::query_parser("'~' sign must follow term or phrase")
                })?;
                match entry.kind {
                    EntryKind::Term { .. } => entry.fuzzy = true,
                    EntryKind::Phrase { .. } => {}
                    EntryKind::Subquery(_) => {
                        return Err(LucernaError::query_parser(
                            "'~' sign must follow term or phrase",
                        ));
                    }
                }
                self.pending_modifier = Some(PendingModifier::Fuzzy);
            }
            Action::ProcessBoostingModifier => {
                if self.context().last_entry_mut().is_none() {
                    return Err(LucernaError::query_parser(
                        "'^' sign must follow term, phrase or subquery",
                    ));
                }
                self.pending_modifier = Some(PendingModifier::Boost);
            }
            Action::ProcessModifierParameter => {
                let value: f32 = lexeme.text.parse().map_err(|_| {
                    LucernaError::query_parser(format!(
                        "Bad modifier parameter {}",
                        lexeme.text
                    ))
                })?;
                match self.pending_modifier.take() {
                    Some(PendingModifier::Fuzzy) => {
                        let entry = self
                            .context()
                            .last_entry_mut()
                            .expect("fuzzy modifier had an entry");
                        match entry.kind {
                            EntryKind::Term { .. } => entry.fuzzy_similarity = Some(value),
                            EntryKind::Phrase { .. } => entry.slop = value as u32,
                            EntryKind::Subquery(_) => unreachable!("rejected above"),
                        }
                    }
                    Some(PendingModifier::Boost) => {
                        let entry = self
                            .context()
                            .last_entry_mut()
                            .expect("boost modifier had an entry");
                        entry.boost *= value;
                    }
                    None => return Err(LucernaError::syntax_error(lexeme.position)),
                }
            }
            Action::SubqueryStart => {
                self.pending_modifier = None;
                let field = self.context().current_field();
                self.contexts.push(ParserContext::new(field));
            }
            Action::SubqueryEnd => {
                self.pending_modifier = None;
                if self.contexts.len() == 1 {
                    return Err(LucernaError::syntax_error(lexeme.position));
                }
                let context = self.contexts.pop().expect("checked depth");
                let query = context.build_query(self.config)?;
                self.context().add_entry(EntryKind::Subquery(query));
            }
            Action::LogicalOperator => {
                self.pending_modifier = None;
                let op = match lexeme.kind {
                    LexemeKind::And => BoolOp::And,
                    LexemeKind::Or => BoolOp::Or,
                    LexemeKind::Not => BoolOp::Not,
                    _ => return Err(LucernaError::syntax_error(lexeme.position)),
                };
                self.context().add_operator(op)?;
            }
            Action::RangeFirstTerm => {
                self.range_first = Some(lexeme.text.clone());
            }
            Action::RangeLastTerm => {
                self.range_last = Some(lexeme.text.clone());
            }
            Action::ClosedRangeEnd | Action::OpenedRangeEnd => {
                let lower = self
                    .range_first
                    .take()
                    .ok_or_else(|| LucernaError::syntax_error(lexeme.position))?;
                let upper = self
                    .range_last
                    .take()
                    .ok_or_else(|| LucernaError::syntax_error(lexeme.position))?;
                let inclusive = action == Action::ClosedRangeEnd;
                let field = self.context().current_field();
                let range = RangeQuery::new(field, lower, upper, inclusive);
                self.context().add_entry(EntryKind::Subquery(Box::new(range)));
            }
        }
        Ok(())
    }
}
