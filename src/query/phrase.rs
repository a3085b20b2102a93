//! Phrase query: terms at relative positions within one field.

use std::any::Any;
use std::collections::BTreeMap;

use crate::error::Result;
use crate::index::{Index, Term};
use crate::query::query::{boost_suffix, Execution, Query};
use crate::query::similarity;
use crate::query::{EmptyResultQuery, InsignificantQuery, TermQuery};

/// A query matching documents where the given terms occur at their relative
/// positions, exactly (`slop == 0`) or within a positional edit distance.
#[derive(Debug, Clone)]
pub struct PhraseQuery {
    field: String,
    /// `(text, offset)` pairs; offsets come from the analyzer, so stop-word
    /// gaps survive into matching.
    terms: Vec<(String, u32)>,
    slop: u32,
    boost: f32,
}

impl PhraseQuery {
    /// Create an empty phrase on a field.
    pub fn new<F: Into<String>>(field: F) -> Self {
        PhraseQuery {
            field: field.into(),
            terms: Vec::new(),
            slop: 0,
            boost: 1.0,
        }
    }

    /// Append a term at the next position.
    pub fn add_term<T: Into<String>>(&mut self, text: T) {
        let offset = self
            .terms
            .last()
            .map(|(_, offset)| offset + 1)
            .unwrap_or(0);
        self.terms.push((text.into(), offset));
    }

    /// Append a term at an explicit position offset.
    pub fn add_term_at<T: Into<String>>(&mut self, text: T, offset: u32) {
        self.terms.push((text.into(), offset));
    }

    /// Builder-style slop setter.
    pub fn with_slop(mut self, slop: u32) -> Self {
        self.slop = slop;
        self
    }

    /// Builder-style boost setter.
    pub fn with_boost(mut self, boost: f32) -> Self {
        self.boost = boost;
        self
    }

    /// The phrase field.
    pub fn field(&self) -> &str {
        &self.field
    }

    /// The `(text, offset)` pairs.
    pub fn terms(&self) -> &[(String, u32)] {
        &self.terms
    }

    /// The tolerated positional edit distance.
    pub fn slop(&self) -> u32 {
        self.slop
    }

    /// Exact phrase frequency: alignments where every term sits at its
    /// offset.
    fn exact_freq(&self, positions: &[&Vec<u32>]) -> f32 {
        let first_offset = self.terms[0].1;
        let mut freq = 0u32;
        'anchor: for &anchor in positions[0] {
            for (i, (_, offset)) in self.terms.iter().enumerate().skip(1) {
                let expected = anchor as i64 - first_offset as i64 + *offset as i64;
                if expected < 0 || !positions[i].contains(&(expected as u32)) {
                    continue 'anchor;
                }
            }
            freq += 1;
        }
        freq as f32
    }

    /// Sloppy phrase frequency: for each anchor, the minimal total
    /// displacement of the remaining terms; alignments within the slop
    /// contribute `1/(distance+1)`.
    fn sloppy_freq(&self, positions: &[&Vec<u32>]) -> f32 {
        let first_offset = self.terms[0].1;
        let mut freq = 0.0f32;
        'anchor: for &anchor in positions[0] {
            let mut distance = 0u64;
            for (i, (_, offset)) in self.terms.iter().enumerate().skip(1) {
                let expected = anchor as i64 - first_offset as i64 + *offset as i64;
                let best = positions[i]
                    .iter()
                    .map(|&p| (p as i64 - expected).unsigned_abs())
                    .min();
                match best {
                    Some(d) => distance += d,
                    None => continue 'anchor,
                }
            }
            if distance <= self.slop as u64 {
                freq += similarity::sloppy_freq(distance as u32);
            }
        }
        freq
    }
}

impl Query for PhraseQuery {
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
        if self.terms.is_empty() {
            return Ok(Box::new(InsignificantQuery::new()));
        }
        for (text, _) in &self.terms {
            if !index.has_term(&Term::new(&self.field, text))? {
                return Ok(Box::new(EmptyResultQuery::new()));
            }
        }
        if self.terms.len() == 1 {
            let term = Term::new(&self.field, &self.terms[0].0);
            return Ok(Box::new(TermQuery::new(term).with_boost(self.boost)));
        }
        Ok(Box::new(self.clone()))
    }

    fn execute(&self, index: &Index) -> Result<Execution> {
        if self.terms.is_empty() {
            return Ok(Execution::empty());
        }

        let num_docs = index.count();
        let mut idf_total = 0.0f32;
        let mut term_positions: Vec<BTreeMap<u32, Vec<u32>>> =
            Vec::with_capacity(self.terms.len());
        for (text, _) in &self.terms {
            let term = Term::new(&self.field, text);
            idf_total += similarity::idf(index.doc_freq(&term)?, num_docs);
            term_positions.push(index.term_positions(&term)?.into_iter().collect());
        }
        let weight = idf_total * self.boost;

        // Candidate documents contain every phrase term.
        let mut order: Vec<usize> = (0..self.terms.len()).collect();
        order.sort_by_key(|&i| term_positions[i].len());
        let mut candidates: Vec<u32> = term_positions[order[0]].keys().copied().collect();
        for &i in &order[1..] {
            candidates.retain(|doc| term_positions[i].contains_key(doc));
        }

        let mut docs = BTreeMap::new();
        for doc in candidates {
            let positions: Vec<&Vec<u32>> = term_positions
                .iter()
                .map(|map| map.get(&doc).expect("candidate contains every term"))
                .collect();
            let freq = if self.slop == 0 {
                self.exact_freq(&positions)
            } else {
                self.sloppy_freq(&positions)
            };
            if freq > 0.0 {
                let norm = index.norm(doc, &self.field)?;
                docs.insert(doc, similarity::tf(freq) * idf_total * weight * norm);
            }
        }

        Ok(Execution {
            docs,
            sum_squared_weights: weight * weight,
        })
    }

    fn to_query_string(&self) -> String {
        let words: Vec<&str> = self.terms.iter().map(|(text, _)| text.as_str()).collect();
        let prefix = if self.field.is_empty() {
            String::new()
        } else {
            format!("{}:", self.field)
        };
        let slop = if self.slop != 0 {
            format!("~{}", self.slop)
        } else {
            String::new()
        };
        format!(
            "{prefix}\"{}\"{slop}{}",
            words.join(" "),
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
        let mut query = PhraseQuery::new("title");
        query.add_term("the");
        query.add_term("right");
        query.add_term("way");
        assert_eq!(query.to_query_string(), "title:\"the right way\"");

        let query = query.with_slop(2).with_boost(3.0);
        assert_eq!(query.to_query_string(), "title:\"the right way\"~2^3");
    }

    #[test]
    fn test_exact_freq() {
        let mut query = PhraseQuery::new("f");
        query.add_term("a");
        query.add_term("b");

        // "a b ... a b" has two alignments.
        let a_positions = vec![0u32, 5];
        let b_positions = vec![1u32, 6];
        let freq = query.exact_freq(&[&a_positions, &b_positions]);
        assert!((freq - 2.0).abs() < 1e-6);

        // Reversed order does not match.
        let a_positions = vec![3u32];
        let b_positions = vec![2u32];
        let freq = query.exact_freq(&[&a_positions, &b_positions]);
        assert!(freq.abs() < 1e-6);
    }

    #[test]
    fn test_sloppy_freq() {
        let mut query = PhraseQuery::new("f");
        query.add_term("a");
        query.add_term("b");
        let query = query.with_slop(2);

        // "a x b": displacement 1 -> contribution 1/2.
        let a_positions = vec![0u32];
        let b_positions = vec![2u32];
        let freq = query.sloppy_freq(&[&a_positions, &b_positions]);
        assert!((freq - 0.5).abs() < 1e-6);

        // Too far apart for the slop.
        let b_positions = vec![4u32];
        let freq = query.sloppy_freq(&[&a_positions, &b_positions]);
        assert!(freq.abs() < 1e-6);
    }

    #[test]
    fn test_position_gaps_survive() {
        let mut query = PhraseQuery::new("f");
        query.add_term_at("quick", 1);
        query.add_term_at("fox", 3);

        // Positions as if "the quick brown fox": gap of one between the
        // phrase terms.
        let quick = vec![1u32];
        let fox = vec![3u32];
        let freq = query.exact_freq(&[&quick, &fox]);
        assert!((freq - 1.0).abs() < 1e-6);
    }
}
