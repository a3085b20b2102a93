//! The index orchestrator.
//!
//! Binds the whole engine together: opens the directory, takes the shared
//! read lock, runs the generation witness, materialises the segment readers
//! in list order, and routes searches and mutations. Global document ids
//! are assigned by segment order: a document's id is the sum of the
//! preceding segments' doc counts plus its local id, stable within one
//! generation.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use crate::analysis::{Analyzer, StandardAnalyzer};
use crate::config::{SearchConfig, WriterConfig};
use crate::directory::{Directory, FsDirectory, ReadLock, WriteLock};
use crate::document::Document;
use crate::error::{LucernaError, Result};
use crate::index::segment_infos::SegmentInfos;
use crate::index::segment_reader::SegmentReader;
use crate::index::term::Term;
use crate::index::terms_merger::TermsMerger;
use crate::index::writer::IndexWriter;
use crate::query::query::Query;
use crate::query::similarity;
use crate::query::{Hit, QueryParser, SortField};

/// An open index: reader set, writer and search entry points.
#[derive(Debug)]
pub struct Index {
    directory: Arc<dyn Directory>,
    owns_directory: bool,
    analyzer: Arc<dyn Analyzer>,
    search_config: SearchConfig,
    infos: SegmentInfos,
    readers: Vec<SegmentReader>,
    writer: IndexWriter,
    _read_lock: ReadLock,
    terms_stream: Option<TermsMerger>,
}

impl Index {
    /// Open an existing index at a filesystem path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let directory: Arc<dyn Directory> = Arc::new(FsDirectory::open(path)?);
        Self::open_directory(directory, true)
    }

    /// Create a new, empty index at a filesystem path.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let directory: Arc<dyn Directory> = Arc::new(FsDirectory::open(path)?);
        Self::create_in(directory, true)
    }

    /// Open an existing index over any directory implementation.
    ///
    /// With `owns_directory` set, closing the index closes the directory.
    pub fn open_directory(directory: Arc<dyn Directory>, owns_directory: bool) -> Result<Self> {
        let read_lock = ReadLock::obtain(directory.clone())?;
        let infos = SegmentInfos::read_current(&directory)?;

        let mut readers = Vec::with_capacity(infos.segments().len());
        for meta in infos.segments() {
            readers.push(SegmentReader::open(directory.clone(), meta.clone())?);
        }

        let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
        let writer = IndexWriter::new(
            directory.clone(),
            analyzer.clone(),
            WriterConfig::default(),
        );

        Ok(Index {
            directory,
            owns_directory,
            analyzer,
            search_config: SearchConfig::default(),
            infos,
            readers,
            writer,
            _read_lock: read_lock,
            terms_stream: None,
        })
    }

    /// Create a new, empty index in any directory implementation.
    ///
    /// Writes an empty first generation immediately, so the index exists on
    /// disk before any document is added.
    pub fn create_in(directory: Arc<dyn Directory>, owns_directory: bool) -> Result<Self> {
        {
            let mut lock = WriteLock::obtain(directory.clone())?;
            let mut infos = SegmentInfos::new();
            infos.write_next(&directory)?;
            lock.release()?;
        }
        Self::open_directory(directory, owns_directory)
    }

    /// Replace the analyzer used for indexing and parsing.
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer.clone();
        self.writer = IndexWriter::new(
            self.directory.clone(),
            analyzer,
            self.writer.config().clone(),
        );
        self
    }

    /// Replace the search configuration.
    pub fn with_search_config(mut self, config: SearchConfig) -> Self {
        self.search_config = config;
        self
    }

    /// Replace the writer configuration.
    pub fn with_writer_config(mut self, config: WriterConfig) -> Self {
        *self.writer.config_mut() = config;
        self
    }

    /// The search configuration.
    pub fn search_config(&self) -> &SearchConfig {
        &self.search_config
    }

    /// Mutable access to the search configuration.
    pub fn search_config_mut(&mut self) -> &mut SearchConfig {
        &mut self.search_config
    }

    /// The analyzer.
    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// The directory this index lives in.
    pub fn directory(&self) -> &Arc<dyn Directory> {
        &self.directory
    }

    /// Current generation of the open segment set.
    pub fn generation(&self) -> i64 {
        self.infos.generation()
    }

    /// Format marker of the segments file (`getFormatVersion`).
    pub fn format_version(&self) -> i32 {
        self.infos.format()
    }

    /// Pin the segments output format; conversion happens at the next
    /// commit (`setFormatVersion`).
    pub fn set_format_version(&mut self, format: i32) -> Result<()> {
        self.infos.set_format(format)
    }

    /// Total number of documents, deleted ones included.
    pub fn count(&self) -> u32 {
        self.readers.iter().map(SegmentReader::doc_count).sum()
    }

    /// One past the largest assignable document id; equals [`Index::count`].
    pub fn max_doc(&self) -> u32 {
        self.count()
    }

    /// Number of live documents.
    pub fn num_docs(&self) -> u32 {
        self.readers.iter().map(SegmentReader::num_docs).sum()
    }

    /// Whether any document is marked deleted.
    pub fn has_deletions(&self) -> bool {
        self.readers.iter().any(SegmentReader::has_deletions)
    }

    /// Resolve a global id to `(reader index, base)`.
    fn locate(&self, doc: u32) -> Result<(usize, u32)> {
        let mut base = 0u32;
        for (i, reader) in self.readers.iter().enumerate() {
            if doc < base + reader.doc_count() {
                return Ok((i, base));
            }
            base += reader.doc_count();
        }
        Err(LucernaError::out_of_range(format!(
            "document {doc} is out of range ({} documents)",
            self.count()
        )))
    }

    /// Whether the given document is deleted.
    pub fn is_deleted(&self, doc: u32) -> Result<bool> {
        let (i, base) = self.locate(doc)?;
        Ok(self.readers[i].is_deleted(doc - base))
    }

    /// Mark a document deleted. Persisted at the next commit.
    pub fn delete(&mut self, doc: u32) -> Result<()> {
        let (i, base) = self.locate(doc)?;
        self.readers[i].delete(doc - base)
    }

    /// Fetch the stored fields of a document.
    pub fn document(&self, doc: u32) -> Result<Document> {
        let (i, base) = self.locate(doc)?;
        self.readers[i].document(doc - base)
    }

    /// Decoded norm of a document for a field.
    pub fn norm(&self, doc: u32, field: &str) -> Result<f32> {
        let (i, base) = self.locate(doc)?;
        Ok(similarity::decode_norm(
            self.readers[i].norm_byte(doc - base, field),
        ))
    }

    /// Whether the index contains the exact term.
    pub fn has_term(&self, term: &Term) -> Result<bool> {
        for reader in &self.readers {
            if reader.term_info(term)?.is_some() {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// Document frequency of a term across segments (deleted documents
    /// included).
    pub fn doc_freq(&self, term: &Term) -> Result<u32> {
        let mut total = 0;
        for reader in &self.readers {
            total += reader.doc_freq(term)?;
        }
        Ok(total)
    }

    /// Postings of a term as `(global id, freq)` in ascending id order,
    /// skipping deleted documents.
    pub fn term_docs(&self, term: &Term) -> Result<Vec<(u32, u32)>> {
        let mut result = Vec::new();
        let mut base = 0u32;
        for reader in &self.readers {
            result.extend(reader.term_docs(term, base)?);
            base += reader.doc_count();
        }
        Ok(result)
    }

    /// Postings of a term as a `global id -> freq` map.
    pub fn term_freqs(&self, term: &Term) -> Result<BTreeMap<u32, u32>> {
        Ok(self.term_docs(term)?.into_iter().collect())
    }

    /// Positions of a term per document, in ascending id order, skipping
    /// deleted documents.
    pub fn term_positions(&self, term: &Term) -> Result<Vec<(u32, Vec<u32>)>> {
        let mut result = Vec::new();
        let mut base = 0u32;
        for reader in &self.readers {
            result.extend(reader.term_positions(term, base)?);
            base += reader.doc_count();
        }
        Ok(result)
    }

    /// Field names across segments, in first-seen order.
    pub fn field_names(&self, indexed_only: bool) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for reader in &self.readers {
            for field in reader.field_infos().iter() {
                if indexed_only && !field.is_indexed {
                    continue;
                }
                if !names.contains(&field.name) {
                    names.push(field.name.clone());
                }
            }
        }
        names
    }

    /// Texts of all terms in `field` starting with `prefix`, merged across
    /// segments, ascending and unique.
    pub fn terms_with_prefix(&self, field: &str, prefix: &str) -> Result<Vec<String>> {
        let mut texts = BTreeSet::new();
        let target = Term::new(field, prefix);
        for reader in &self.readers {
            let mut scanner = reader.terms_scanner()?;
            let mut current = reader.scanner_skip_to(&mut scanner, &target)?;
            while let Some((term, _)) = current {
                if term.field != field || !term.text.starts_with(prefix) {
                    break;
                }
                texts.insert(term.text);
                current = scanner.next()?.cloned();
            }
        }
        Ok(texts.into_iter().collect())
    }

    /// Texts of all terms in `field` between two bounds, merged across
    /// segments, ascending and unique.
    pub fn terms_in_range(
        &self,
        field: &str,
        lower: &str,
        upper: &str,
        inclusive: bool,
    ) -> Result<Vec<String>> {
        let mut texts = BTreeSet::new();
        let target = Term::new(field, lower);
        for reader in &self.readers {
            let mut scanner = reader.terms_scanner()?;
            let mut current = reader.scanner_skip_to(&mut scanner, &target)?;
            while let Some((term, _)) = current {
                if term.field != field {
                    break;
                }
                let past_upper = if inclusive {
                    term.text.as_str() > upper
                } else {
                    term.text.as_str() >= upper
                };
                if past_upper {
                    break;
                }
                if inclusive || term.text.as_str() > lower {
                    texts.insert(term.text);
                }
                current = scanner.next()?.cloned();
            }
        }
        Ok(texts.into_iter().collect())
    }

    // The whole-index term stream.

    /// Open (or rewind) the merged term stream.
    pub fn reset_terms_stream(&mut self) -> Result<()> {
        let mut scanners = Vec::with_capacity(self.readers.len());
        for reader in &self.readers {
            scanners.push(reader.terms_scanner()?);
        }
        self.terms_stream = Some(TermsMerger::new(scanners)?);
        Ok(())
    }

    /// Advance the merged term stream.
    pub fn next_term(&mut self) -> Result<Option<Term>> {
        let merger = self
            .terms_stream
            .as_mut()
            .ok_or_else(|| LucernaError::runtime("Terms stream is not open"))?;
        Ok(merger.next()?.map(|(term, _)| term))
    }

    /// The merged term stream's current term.
    pub fn current_term(&self) -> Option<Term> {
        self.terms_stream
            .as_ref()
            .and_then(|merger| merger.current().cloned())
    }

    /// Position the merged stream on the least term `>= target` and return
    /// it.
    pub fn skip_to(&mut self, target: &Term) -> Result<Option<Term>> {
        let mut scanners = Vec::with_capacity(self.readers.len());
        for reader in &self.readers {
            let mut scanner = reader.terms_scanner()?;
            reader.scanner_skip_to(&mut scanner, target)?;
            scanners.push(scanner);
        }
        let mut merger = TermsMerger::from_positioned(scanners)?;
        let landed = merger.next()?.map(|(term, _)| term);
        self.terms_stream = Some(merger);
        Ok(landed)
    }

    /// Close the merged term stream.
    pub fn close_terms_stream(&mut self) {
        self.terms_stream = None;
    }

    // Mutations.

    /// Buffer a document for indexing; flushed by the writer's policy and
    /// visible to searches after the flush.
    pub fn add_document(&mut self, document: Document) -> Result<()> {
        self.writer
            .add_document(document, &mut self.infos, &mut self.readers)
    }

    /// Commit pending mutations, advancing the generation.
    pub fn commit(&mut self) -> Result<()> {
        self.writer.commit(&mut self.infos, &mut self.readers)
    }

    /// Merge down to one segment and commit.
    pub fn optimize(&mut self) -> Result<()> {
        self.writer.optimize(&mut self.infos, &mut self.readers)
    }

    // Search.

    /// Parse and run a query, ranked by score (descending, ids ascending on
    /// ties).
    pub fn find(&self, query: &str) -> Result<Vec<Hit>> {
        self.find_sorted(query, &[])
    }

    /// Parse and run a query with explicit sort criteria.
    pub fn find_sorted(&self, query: &str, sort: &[SortField]) -> Result<Vec<Hit>> {
        let parser = QueryParser::new(self.search_config.clone(), self.analyzer.clone());
        let parsed = parser.parse(query)?;
        self.find_query(parsed.as_ref(), sort)
    }

    /// Run an already-built query.
    pub fn find_query(&self, query: &dyn Query, sort: &[SortField]) -> Result<Vec<Hit>> {
        let rewritten = query.rewrite(self)?;
        let optimized = rewritten.optimize(self)?;
        let execution = optimized.execute(self)?;

        let query_norm = similarity::query_norm(execution.sum_squared_weights);
        let mut hits: Vec<Hit> = execution
            .docs
            .iter()
            .filter_map(|(&id, &score)| {
                let score = score * query_norm;
                (score > 0.0).then_some(Hit { id, score })
            })
            .collect();

        // The result-set cap truncates in id order, before any sorting.
        let limit = self.search_config.result_set_limit;
        if limit > 0 && hits.len() > limit {
            hits.truncate(limit);
        }

        // Scores above 1 are scaled back so the best hit lands on 1.0.
        if let Some(max) = hits
            .iter()
            .map(|hit| hit.score)
            .max_by(|a, b| a.total_cmp(b))
        {
            if max > 1.0 {
                for hit in &mut hits {
                    hit.score /= max;
                }
            }
        }

        if sort.is_empty() {
            hits.sort_by(|a, b| {
                b.score
                    .total_cmp(&a.score)
                    .then_with(|| a.id.cmp(&b.id))
            });
        } else {
            self.sort_hits(&mut hits, sort)?;
        }
        Ok(hits)
    }

    fn sort_hits(&self, hits: &mut [Hit], sort: &[SortField]) -> Result<()> {
        let known = self.field_names(false);
        for field in sort {
            if !known.contains(&field.field) {
                return Err(LucernaError::runtime("Wrong field name."));
            }
        }

        // Fetch the sort keys once per hit.
        let mut keys: BTreeMap<u32, Vec<String>> = BTreeMap::new();
        for hit in hits.iter() {
            let document = self.document(hit.id)?;
            let values = sort
                .iter()
                .map(|sf| {
                    document
                        .field(&sf.field)
                        .and_then(|f| f.value.as_text())
                        .unwrap_or_default()
                        .to_string()
                })
                .collect();
            keys.insert(hit.id, values);
        }

        hits.sort_by(|a, b| {
            let a_keys = &keys[&a.id];
            let b_keys = &keys[&b.id];
            for (i, sf) in sort.iter().enumerate() {
                let ordering = a_keys[i].cmp(&b_keys[i]);
                let ordering = if sf.descending {
                    ordering.reverse()
                } else {
                    ordering
                };
                if !ordering.is_eq() {
                    return ordering;
                }
            }
            a.id.cmp(&b.id)
        });
        Ok(())
    }

    /// Commit pending changes and close the directory when owned.
    pub fn close(mut self) -> Result<()> {
        self.commit()?;
        if self.owns_directory {
            self.directory.close()?;
        }
        Ok(())
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        if self
            .writer
            .has_pending_changes(&self.readers)
        {
            let _ = self.writer.commit(&mut self.infos, &mut self.readers);
        }
        if self.owns_directory {
            let _ = self.directory.close();
        }
    }
}
