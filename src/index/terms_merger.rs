//! Priority-queue merger of per-segment term streams.
//!
//! A binary heap keyed by `(field, text)` pops the least cursor; cursors on
//! the same term are drained together so the caller sees each term exactly
//! once with every segment that carries it. Used by whole-index term
//! enumeration, cross-segment posting unions and segment merging.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use crate::error::Result;
use crate::index::term::Term;
use crate::index::term_dictionary::TermsScanner;
use crate::index::term_info::TermInfo;

/// A merged, globally sorted view over several term scanners.
#[derive(Debug)]
pub struct TermsMerger {
    scanners: Vec<TermsScanner>,
    heap: BinaryHeap<Reverse<(Term, usize)>>,
    current: Option<Term>,
}

impl TermsMerger {
    /// Merge freshly reset scanners, advancing each onto its first term.
    pub fn new(scanners: Vec<TermsScanner>) -> Result<Self> {
        Self::build(scanners, false)
    }

    /// Merge scanners that are already positioned on the term they should
    /// emit first (after a `skip_to`).
    pub fn from_positioned(scanners: Vec<TermsScanner>) -> Result<Self> {
        Self::build(scanners, true)
    }

    fn build(mut scanners: Vec<TermsScanner>, positioned: bool) -> Result<Self> {
        let mut heap = BinaryHeap::with_capacity(scanners.len());
        for (i, scanner) in scanners.iter_mut().enumerate() {
            if !positioned {
                scanner.next()?;
            }
            if let Some((term, _)) = scanner.current() {
                heap.push(Reverse((term.clone(), i)));
            }
        }
        Ok(TermsMerger {
            scanners,
            heap,
            current: None,
        })
    }

    /// The term most recently returned by [`TermsMerger::next`].
    pub fn current(&self) -> Option<&Term> {
        self.current.as_ref()
    }

    /// Pop the next term in global `(field, text)` order, together with the
    /// per-source term infos of every scanner positioned on it.
    pub fn next(&mut self) -> Result<Option<(Term, Vec<(usize, TermInfo)>)>> {
        let Some(Reverse((term, first))) = self.heap.pop() else {
            self.current = None;
            return Ok(None);
        };

        let mut sources = Vec::with_capacity(1);
        self.collect(first, &mut sources)?;

        while let Some(Reverse((peeked, _))) = self.heap.peek() {
            if *peeked != term {
                break;
            }
            let Some(Reverse((_, index))) = self.heap.pop() else {
                break;
            };
            self.collect(index, &mut sources)?;
        }

        self.current = Some(term.clone());
        Ok(Some((term, sources)))
    }

    fn collect(&mut self, index: usize, sources: &mut Vec<(usize, TermInfo)>) -> Result<()> {
        let scanner = &mut self.scanners[index];
        if let Some((_, info)) = scanner.current() {
            sources.push((index, *info));
        }
        if let Some((next_term, _)) = scanner.next()? {
            self.heap.push(Reverse((next_term.clone(), index)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, RamDirectory};
    use crate::index::field_infos::FieldInfos;
    use crate::index::term_dictionary::{DictionaryWriter, TermDictionary};
    use std::sync::Arc;

    fn scanner_for(terms: &[(&str, &str, u32)]) -> TermsScanner {
        let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let mut field_infos = FieldInfos::new();
        for (field, _, _) in terms {
            field_infos.add(field, true);
        }
        let field_infos = Arc::new(field_infos);

        let mut writer = DictionaryWriter::new(
            dir.create("_0.tis").unwrap(),
            dir.create("_0.tii").unwrap(),
        )
        .unwrap();
        let mut sorted: Vec<(Term, u32)> = terms
            .iter()
            .map(|(field, text, df)| (Term::new(*field, *text), *df))
            .collect();
        sorted.sort();
        for (term, df) in &sorted {
            let field_num = field_infos.number_of(&term.field).unwrap();
            writer
                .add(term, field_num, TermInfo::new(*df, 0, 0, 0))
                .unwrap();
        }
        writer.close().unwrap();

        let dict = TermDictionary::open(
            dir.open_input("_0.tii", false).unwrap(),
            dir.open_input("_0.tis", false).unwrap(),
            field_infos,
        )
        .unwrap();
        dict.scanner().unwrap()
    }

    #[test]
    fn test_merges_in_global_order() {
        let first = scanner_for(&[("a", "apple", 1), ("a", "cherry", 1), ("b", "apple", 1)]);
        let second = scanner_for(&[("a", "banana", 2), ("b", "apple", 2)]);
        let mut merger = TermsMerger::new(vec![first, second]).unwrap();

        let mut seen = Vec::new();
        while let Some((term, sources)) = merger.next().unwrap() {
            seen.push((term, sources.len()));
        }

        assert_eq!(
            seen,
            vec![
                (Term::new("a", "apple"), 1),
                (Term::new("a", "banana"), 1),
                (Term::new("a", "cherry"), 1),
                (Term::new("b", "apple"), 2),
            ]
        );
    }

    #[test]
    fn test_shared_terms_report_all_sources() {
        let first = scanner_for(&[("f", "shared", 3)]);
        let second = scanner_for(&[("f", "shared", 5)]);
        let third = scanner_for(&[("f", "other", 1)]);
        let mut merger = TermsMerger::new(vec![first, second, third]).unwrap();

        let (term, sources) = merger.next().unwrap().unwrap();
        assert_eq!(term, Term::new("f", "other"));
        assert_eq!(sources, vec![(2, TermInfo::new(1, 0, 0, 0))]);

        let (term, mut sources) = merger.next().unwrap().unwrap();
        assert_eq!(term, Term::new("f", "shared"));
        sources.sort_by_key(|(index, _)| *index);
        assert_eq!(sources.len(), 2);
        assert_eq!(sources[0].0, 0);
        assert_eq!(sources[0].1.doc_freq, 3);
        assert_eq!(sources[1].0, 1);
        assert_eq!(sources[1].1.doc_freq, 5);

        assert!(merger.next().unwrap().is_none());
        assert!(merger.current().is_none());
    }

    #[test]
    fn test_empty_sources() {
        let mut merger = TermsMerger::new(Vec::new()).unwrap();
        assert!(merger.next().unwrap().is_none());
    }
}
