//! Boolean query: signed subqueries with coordination scoring.

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::Index;
use crate::query::multi_term::MultiTermQuery;
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::similarity;
use crate::query::term::TermQuery;
use crate::query::{EmptyResultQuery, InsignificantQuery};

/// A boolean combination of subqueries, each required (`Some(true)`),
/// prohibited (`Some(false)`) or optional (`None`).
#[derive(Debug, Clone)]
pub struct BooleanQuery {
    clauses: Vec<(Box<dyn Query>, Option<bool>)>,
    boost: f32,
}

impl Default for BooleanQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl BooleanQuery {
    /// Create an empty boolean query.
    pub fn new() -> Self {
        BooleanQuery {
            clauses: Vec::new(),
            boost: 1.0,
        }
    }

    /// Builder-style boost setter.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Add a signed subquery.
    pub fn add(&mut self, query: Box<dyn Query>, sign: Option<bool>) {
        self.clauses.push((query, sign));
    }

    /// The clauses in insertion order.
    pub fn clauses(&self) -> &[(Box<dyn Query>, Option<bool>)] {
        &self.clauses
    }

    /// Whether the query has no clauses.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    fn all_required(&self) -> bool {
        !self.clauses.is_empty() && self.clauses.iter().all(|(_, sign)| *sign == Some(true))
    }

    /// Try to collapse Term/MultiTerm clauses into one multi-term query.
    /// Returns `None` when the shape does not allow it.
    fn collapse_to_multi_term(&self) -> Option<MultiTermQuery> {
        let mut collapsed = MultiTermQuery::new().with_boost(self.boost);

        for (clause, sign) in &self.clauses {
            if (clause.boost() - 1.0).abs() >= f32::EPSILON {
                return None;
            }
            if let Some(term_query) = clause.as_any().downcast_ref::<TermQuery>() {
                collapsed.add_term(term_query.term().clone(), *sign);
            } else if let Some(multi) = clause.as_any().downcast_ref::<MultiTermQuery>() {
                if multi.has_term_boosts() {
                    return None;
                }
                // An inner multi-term folds in only when its signs agree
                // with the outer sign; prohibited groups re-wrap each term
                // as prohibited.
                let compatible = match sign {
                    Some(true) => multi.all_required(),
                    None => multi.all_optional(),
                    Some(false) => multi.all_optional() || multi.all_required(),
                };
                if !compatible {
                    return None;
                }
                for term in multi.terms() {
                    collapsed.add_term(term.clone(), *sign);
                }
            } else {
                return None;
            }
        }
        Some(collapsed)
    }
}

impl Query for BooleanQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, index: &Index) -> Result<Box<dyn Query>> {
        let mut rewritten = BooleanQuery::new().with_boost(self.boost);
        for (clause, sign) in &self.clauses {
            rewritten.add(clause.rewrite(index)?, *sign);
        }
        Ok(Box::new(rewritten))
    }

    fn optimize(&self, index: &Index) -> Result<Box<dyn Query>> {
        let mut kept = BooleanQuery::new().with_boost(self.boost);
        let mut dropped_empty = false;

        for (clause, sign) in &self.clauses {
            let optimized = clause.optimize(index)?;
            if optimized.as_any().is::<InsignificantQuery>() {
                continue;
            }
            if optimized.as_any().is::<EmptyResultQuery>() {
                if *sign == Some(true) {
                    return Ok(Box::new(EmptyResultQuery::new()));
                }
                dropped_empty = true;
                continue;
            }
            kept.add(optimized, *sign);
        }

        if kept.clauses.is_empty() {
            return Ok(if dropped_empty {
                Box::new(EmptyResultQuery::new())
            } else {
                Box::new(InsignificantQuery::new())
            });
        }

        // A query of nothing but prohibitions can match nothing.
        if kept
            .clauses
            .iter()
            .all(|(_, sign)| *sign == Some(false))
        {
            return Ok(Box::new(EmptyResultQuery::new()));
        }

        // A single positive clause stands on its own, inheriting the boost
        // multiplicatively.
        if kept.clauses.len() == 1 && kept.clauses[0].1 != Some(false) {
            let (mut inner, _) = kept.clauses.remove(0);
            let boost = inner.boost() * self.boost;
            inner.set_boost(boost);
            return Ok(inner);
        }

        if let Some(collapsed) = kept.collapse_to_multi_term() {
            return collapsed.optimize(index);
        }

        Ok(Box::new(kept))
    }

    fn execute(&self, index: &Index) -> Result<Execution> {
        if self.clauses.is_empty() {
            return Ok(Execution::empty());
        }

        let mut executions: Vec<Execution> = Vec::with_capacity(self.clauses.len());
        for (clause, _) in &self.clauses {
            executions.push(clause.execute(index)?);
        }
        let sum_squared_weights = executions
            .iter()
            .map(|e| e.sum_squared_weights)
            .sum::<f32>()
            * self.boost
            * self.boost;

        // Conjunction fast path: every clause required.
        if self.all_required() {
            let mut order: Vec<usize> = (0..executions.len()).collect();
            order.sort_by_key(|&i| executions[i].docs.len());
            let mut candidates: Vec<u32> =
                executions[order[0]].docs.keys().copied().collect();
            for &i in &order[1..] {
                candidates.retain(|doc| executions[i].docs.contains_key(doc));
            }

            let mut docs = BTreeMap::new();
            for doc in candidates {
                let mut sum = 0.0f32;
                let mut all_scored = true;
                for execution in &executions {
                    let s = execution.docs[&doc];
                    if s == 0.0 {
                        all_scored = false;
                        break;
                    }
                    sum += s;
                }
                docs.insert(doc, if all_scored { sum * self.boost } else { 0.0 });
            }
            return Ok(Execution {
                docs,
                sum_squared_weights,
            });
        }

        // General path: intersect required vectors, or union the optional
        // ones when nothing is required. Prohibited clauses never shape the
        // vector.
        let required: Vec<usize> = (0..self.clauses.len())
            .filter(|&i| self.clauses[i].1 == Some(true))
            .collect();
        let candidates: Vec<u32> = if required.is_empty() {
            let mut union: Vec<u32> = Vec::new();
            for (i, execution) in executions.iter().enumerate() {
                if self.clauses[i].1.is_none() {
                    union.extend(execution.docs.keys().copied());
                }
            }
            union.sort_unstable();
            union.dedup();
            union
        } else {
            let mut order = required.clone();
            order.sort_by_key(|&i| executions[i].docs.len());
            let mut set: Vec<u32> = executions[order[0]].docs.keys().copied().collect();
            for &i in &order[1..] {
                set.retain(|doc| executions[i].docs.contains_key(doc));
            }
            set
        };

        let max_coord = self
            .clauses
            .iter()
            .filter(|(_, sign)| *sign != Some(false))
            .count();

        let mut docs = BTreeMap::new();
        for doc in candidates {
            let mut sum = 0.0f32;
            let mut matched = 0usize;
            let mut zeroed = false;

            for (i, execution) in executions.iter().enumerate() {
                let sign = self.clauses[i].1;
                let s = execution.docs.get(&doc).copied().unwrap_or(0.0);
                if sign == Some(false) {
                    // Preserved source behaviour: any prohibited match
                    // zeroes the document.
                    if s != 0.0 {
                        zeroed = true;
                        break;
                    }
                    continue;
                }
                if sign == Some(true) && s == 0.0 {
                    zeroed = true;
                    break;
                }
                if s != 0.0 {
                    matched += 1;
                    sum += s;
                }
            }

            let score = if zeroed {
                0.0
            } else {
                sum * similarity::coord(matched, max_coord) * self.boost
            };
            docs.insert(doc, score);
        }

        Ok(Execution {
            docs,
            sum_squared_weights,
        })
    }

    fn to_query_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.clauses.len());
        for (clause, sign) in &self.clauses {
            let prefix = match sign {
                Some(true) => "+",
                Some(false) => "-",
                None => "",
            };
            parts.push(format!("{prefix}({})", clause.to_query_string()));
        }
        let joined = parts.join(" ");
        if (self.boost - 1.0).abs() < f32::EPSILON {
            joined
        } else {
            format!("({joined}){}", boost_suffix(self.boost))
        }
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
    use crate::index::Term;

    #[test]
    fn test_to_query_string_signs() {
        let mut query = BooleanQuery::new();
        query.add(
            Box::new(TermQuery::new(Term::new("title", "alpha"))),
            Some(true),
        );
        query.add(
            Box::new(TermQuery::new(Term::new("title", "beta"))),
            Some(false),
        );
        query.add(Box::new(TermQuery::new(Term::new("title", "gamma"))), None);

        assert_eq!(
            query.to_query_string(),
            "+(title:alpha) -(title:beta) (title:gamma)"
        );
    }

    #[test]
    fn test_boosted_child_renders_nested_parens() {
        let mut inner = MultiTermQuery::new();
        inner.add_term(Term::new("path", "jakarta"), None);
        inner.add_term(Term::new("contents", "jakarta"), None);
        let inner = inner.with_boost(4.0);

        let mut outer = BooleanQuery::new();
        outer.add(Box::new(inner), None);
        outer.add(Box::new(TermQuery::new(Term::new("path", "apache"))), None);

        assert_eq!(
            outer.to_query_string(),
            "((path:jakarta contents:jakarta)^4) (path:apache)"
        );
    }

    #[test]
    fn test_collapse_shape() {
        let mut query = BooleanQuery::new();
        query.add(
            Box::new(TermQuery::new(Term::new("f", "one"))),
            Some(true),
        );
        let mut inner = MultiTermQuery::new();
        inner.add_term(Term::new("f", "two"), Some(true));
        inner.add_term(Term::new("f", "three"), Some(true));
        query.add(Box::new(inner), Some(true));

        let collapsed = query.collapse_to_multi_term().unwrap();
        assert_eq!(collapsed.terms().len(), 3);
        assert!(collapsed.all_required());

        // A boosted clause blocks the collapse.
        let mut blocked = BooleanQuery::new();
        blocked.add(
            Box::new(TermQuery::new(Term::new("f", "one")).with_boost(2.0)),
            None,
        );
        assert!(blocked.collapse_to_multi_term().is_none());
    }
}
