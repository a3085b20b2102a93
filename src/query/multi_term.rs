//! Multi-term query: a flat set of terms with per-term signs.

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::{Index, Term};
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::similarity;
use crate::query::{EmptyResultQuery, TermQuery};

/// A query over several terms, each required (`+`), prohibited (`-`) or
/// optional.
///
/// Result vectors intersect the required terms and union the optional
/// ones; prohibited terms never shape the vector but zero the score of any
/// document they match.
#[derive(Debug, Clone)]
pub struct MultiTermQuery {
    terms: Vec<Term>,
    signs: Vec<Option<bool>>,
    term_boosts: Vec<f32>,
    boost: f32,
}

impl Default for MultiTermQuery {
    fn default() -> Self {
        Self::new()
    }
}

impl MultiTermQuery {
    /// Create an empty multi-term query.
    pub fn new() -> Self {
        MultiTermQuery {
            terms: Vec::new(),
            signs: Vec::new(),
            term_boosts: Vec::new(),
            boost: 1.0,
        }
    }

    /// Builder-style boost setter.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// Add a term: `Some(true)` required, `Some(false)` prohibited, `None`
    /// optional.
    pub fn add_term(&mut self, term: Term, sign: Option<bool>) {
        self.add_term_with_boost(term, sign, 1.0);
    }

    /// Add a term with an individual boost (fuzzy rewriting uses this).
    pub fn add_term_with_boost(&mut self, term: Term, sign: Option<bool>, boost: f32) {
        self.terms.push(term);
        self.signs.push(sign);
        self.term_boosts.push(boost);
    }

    /// The terms in insertion order.
    pub fn terms(&self) -> &[Term] {
        &self.terms
    }

    /// The per-term signs.
    pub fn signs(&self) -> &[Option<bool>] {
        &self.signs
    }

    /// Per-term boosts, parallel to [`MultiTermQuery::terms`].
    pub fn term_boosts(&self) -> &[f32] {
        &self.term_boosts
    }

    /// Whether the query has no terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Whether every term is required.
    pub fn all_required(&self) -> bool {
        !self.terms.is_empty() && self.signs.iter().all(|sign| *sign == Some(true))
    }

    /// Whether every term is optional.
    pub fn all_optional(&self) -> bool {
        !self.terms.is_empty() && self.signs.iter().all(Option::is_none)
    }

    /// Whether any per-term boost differs from 1.0.
    pub fn has_term_boosts(&self) -> bool {
        self.term_boosts
            .iter()
            .any(|boost| (boost - 1.0).abs() >= f32::EPSILON)
    }
}

impl Query for MultiTermQuery {
    fn boost(&self) -> f32 {
        self.boost
    }

    fn set_boost(&mut self, boost: f32) {
        self.boost = boost;
    }

    fn rewrite(&self, _index: &Index) -> Result<Box<dyn Query>> {
        Ok(Box::new(self.clone()))
    }

    fn optimize(&self, index: &Index) -> Result<Box<dyn Query>> {
        // Terms absent from the index: a required one empties the result, a
        // prohibited or optional one is dropped.
        let mut kept = MultiTermQuery::new().with_boost(self.boost);
        for ((term, sign), term_boost) in self
            .terms
            .iter()
            .zip(&self.signs)
            .zip(&self.term_boosts)
        {
            if index.has_term(term)? {
                kept.add_term_with_boost(term.clone(), *sign, *term_boost);
            } else if *sign == Some(true) {
                return Ok(Box::new(EmptyResultQuery::new()));
            }
        }

        let non_prohibited = kept
            .signs
            .iter()
            .filter(|sign| **sign != Some(false))
            .count();
        if non_prohibited == 0 {
            return Ok(Box::new(EmptyResultQuery::new()));
        }

        if kept.terms.len() == 1 {
            let term_query = TermQuery::new(kept.terms.remove(0))
                .with_boost(self.boost * kept.term_boosts[0]);
            return Ok(Box::new(term_query));
        }

        Ok(Box::new(kept))
    }

    fn execute(&self, index: &Index) -> Result<Execution> {
        let num_docs = index.count();

        // Fetch postings and weights per term.
        let mut term_docs: Vec<BTreeMap<u32, u32>> = Vec::with_capacity(self.terms.len());
        let mut weights: Vec<f32> = Vec::with_capacity(self.terms.len());
        let mut idfs: Vec<f32> = Vec::with_capacity(self.terms.len());
        let mut sum_squared_weights = 0.0f32;

        for (term, term_boost) in self.terms.iter().zip(&self.term_boosts) {
            let idf = similarity::idf(index.doc_freq(term)?, num_docs);
            let weight = idf * self.boost * term_boost;
            sum_squared_weights += weight * weight;
            idfs.push(idf);
            weights.push(weight);
            term_docs.push(index.term_docs(term)?.into_iter().collect());
        }

        // Vector formation: intersect required, union optional; prohibited
        // terms are ignored here.
        let required: Vec<usize> = (0..self.terms.len())
            .filter(|&i| self.signs[i] == Some(true))
            .collect();
        let candidates: Vec<u32> = if required.is_empty() {
            let mut union: Vec<u32> = Vec::new();
            for (i, docs) in term_docs.iter().enumerate() {
                if self.signs[i].is_none() {
                    union.extend(docs.keys().copied());
                }
            }
            union.sort_unstable();
            union.dedup();
            union
        } else {
            // Start from the smallest required posting list.
            let mut order = required.clone();
            order.sort_by_key(|&i| term_docs[i].len());
            let mut set: Vec<u32> = term_docs[order[0]].keys().copied().collect();
            for &i in &order[1..] {
                set.retain(|doc| term_docs[i].contains_key(doc));
            }
            set
        };

        let max_coord = self
            .signs
            .iter()
            .filter(|sign| **sign != Some(false))
            .count();

        let mut docs = BTreeMap::new();
        for doc in candidates {
            let mut sum = 0.0f32;
            let mut matched = 0usize;
            let mut prohibited_hit = false;

            for i in 0..self.terms.len() {
                let Some(&freq) = term_docs[i].get(&doc) else {
                    continue;
                };
                if self.signs[i] == Some(false) {
                    prohibited_hit = true;
                    break;
                }
                matched += 1;
                let norm = index.norm(doc, &self.terms[i].field)?;
                sum += similarity::tf(freq as f32) * idfs[i] * weights[i] * norm;
            }

            let score = if prohibited_hit {
                0.0
            } else {
                sum * similarity::coord(matched, max_coord)
            };
            docs.insert(doc, score);
        }

        Ok(Execution {
            docs,
            sum_squared_weights,
        })
    }

    fn to_query_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.terms.len());
        for ((term, sign), term_boost) in self
            .terms
            .iter()
            .zip(&self.signs)
            .zip(&self.term_boosts)
        {
            let prefix = match sign {
                Some(true) => "+",
                Some(false) => "-",
                None => "",
            };
            let body = if term.field.is_empty() {
                term.text.clone()
            } else {
                format!("{}:{}", term.field, term.text)
            };
            parts.push(format!("{prefix}{body}{}", boost_suffix(*term_boost)));
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
