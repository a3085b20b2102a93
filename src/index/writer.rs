//! The index writer: buffering, merge policy and the commit protocol.
//!
//! Documents buffer in memory until `max_buffered_docs` is reached, then
//! flush as a new segment. After every flush the log-size merge policy runs:
//! contiguous segments whose size falls in the same
//! `[mergeFactor^k, mergeFactor^(k+1))` tier are merged once `mergeFactor`
//! of them accumulate, bounded by `max_merge_docs`. `optimize` keeps merging
//! until a single segment remains and ignores the bound.
//!
//! A commit acquires the exclusive write lock, materialises pending
//! deletion bitvectors, writes the next `segments_N`, promotes it in
//! `segments.gen`, deletes superseded files and releases the lock. A failed
//! commit before the promotion leaves the previous generation untouched.

use std::sync::Arc;

use log::{debug, info, warn};

use crate::analysis::Analyzer;
use crate::config::WriterConfig;
use crate::directory::{Directory, WriteLock};
use crate::document::Document;
use crate::error::Result;
use crate::index::segment_infos::SegmentInfos;
use crate::index::segment_merger::merge_segments;
use crate::index::segment_reader::SegmentReader;
use crate::index::segment_writer::write_segment;

/// Buffers documents and maintains the segment set of one open index.
///
/// The writer operates on the segment set and reader list owned by the
/// orchestrator, which passes them into every call.
#[derive(Debug)]
pub struct IndexWriter {
    directory: Arc<dyn Directory>,
    analyzer: Arc<dyn Analyzer>,
    config: WriterConfig,
    buffered: Vec<Document>,
    /// Files superseded by merges, deleted after the next promotion.
    deletable: Vec<String>,
    /// Whether the segment set changed since the last commit.
    dirty: bool,
}

impl IndexWriter {
    /// Create a writer for the given directory.
    pub fn new(
        directory: Arc<dyn Directory>,
        analyzer: Arc<dyn Analyzer>,
        config: WriterConfig,
    ) -> Self {
        IndexWriter {
            directory,
            analyzer,
            config,
            buffered: Vec::new(),
            deletable: Vec::new(),
            dirty: false,
        }
    }

    /// Writer configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Mutable writer configuration.
    pub fn config_mut(&mut self) -> &mut WriterConfig {
        &mut self.config
    }

    /// Number of documents buffered since the last flush.
    pub fn pending_docs(&self) -> usize {
        self.buffered.len()
    }

    /// Buffer one document, flushing when the threshold is reached.
    pub fn add_document(
        &mut self,
        document: Document,
        infos: &mut SegmentInfos,
        readers: &mut Vec<SegmentReader>,
    ) -> Result<()> {
        self.buffered.push(document);
        if self.buffered.len() >= self.config.max_buffered_docs {
            self.flush(infos, readers)?;
        }
        Ok(())
    }

    /// Flush buffered documents as a new segment and run the merge policy.
    pub fn flush(
        &mut self,
        infos: &mut SegmentInfos,
        readers: &mut Vec<SegmentReader>,
    ) -> Result<()> {
        if self.buffered.is_empty() {
            return Ok(());
        }

        let name = infos.next_segment_name();
        let meta = write_segment(
            &self.directory,
            &name,
            &self.buffered,
            &self.analyzer,
            &self.config,
        )?;
        self.buffered.clear();

        readers.push(SegmentReader::open(self.directory.clone(), meta.clone())?);
        infos.segments_mut().push(meta);
        self.dirty = true;

        self.maybe_merge(infos, readers)
    }

    /// Tier index of a segment size: k such that
    /// `mergeFactor^k <= size < mergeFactor^(k+1)`.
    fn tier(&self, size: u32) -> u32 {
        let factor = self.config.merge_factor.max(2) as u64;
        let mut k = 0u32;
        let mut bound = factor;
        while size as u64 >= bound {
            k += 1;
            bound = bound.saturating_mul(factor);
        }
        k
    }

    /// Find the rightmost qualifying merge group: `merge_factor` contiguous
    /// segments in one size tier whose merged size stays within
    /// `max_merge_docs`.
    fn find_merge_group(&self, infos: &SegmentInfos) -> Option<(usize, usize)> {
        let factor = self.config.merge_factor;
        let segments = infos.segments();
        if factor < 2 || segments.len() < factor {
            return None;
        }

        let tiers: Vec<u32> = segments.iter().map(|s| self.tier(s.doc_count)).collect();

        // Walk runs of equal tier from the tail.
        let mut end = segments.len();
        while end > 0 {
            let tier = tiers[end - 1];
            let mut start = end;
            while start > 0 && tiers[start - 1] == tier {
                start -= 1;
            }
            let run_len = end - start;
            if run_len >= factor {
                // The tail-most `factor` members of the run.
                let group_start = end - factor;
                let merged_size: u64 = segments[group_start..end]
                    .iter()
                    .map(|s| s.doc_count as u64)
                    .sum();
                if merged_size <= self.config.max_merge_docs as u64 {
                    return Some((group_start, factor));
                }
            }
            end = start;
        }
        None
    }

    fn maybe_merge(
        &mut self,
        infos: &mut SegmentInfos,
        readers: &mut Vec<SegmentReader>,
    ) -> Result<()> {
        while let Some((start, len)) = self.find_merge_group(infos) {
            self.merge_range(infos, readers, start, len)?;
        }
        Ok(())
    }

    /// Merge `len` segments starting at `start` into one new segment placed
    /// at the group's position.
    fn merge_range(
        &mut self,
        infos: &mut SegmentInfos,
        readers: &mut Vec<SegmentReader>,
        start: usize,
        len: usize,
    ) -> Result<()> {
        let name = infos.next_segment_name();
        let meta = {
            let group: Vec<&SegmentReader> = readers[start..start + len].iter().collect();
            merge_segments(&self.directory, &name, &group, &self.config)?
        };
        info!(
            "merged segments [{start}..{}) into {name} ({} docs)",
            start + len,
            meta.doc_count
        );

        // Everything the old segments owned becomes deletable after the
        // next promotion.
        for old in &infos.segments()[start..start + len] {
            self.deletable.extend(old.file_names(&self.directory)?);
        }

        let new_reader = SegmentReader::open(self.directory.clone(), meta.clone())?;
        infos.segments_mut().splice(start..start + len, [meta]);
        readers.splice(start..start + len, [new_reader]);
        self.dirty = true;
        Ok(())
    }

    /// Force the index down to a single segment, expunging deletions.
    ///
    /// `max_merge_docs` does not cap optimization. Ends with a commit.
    pub fn optimize(
        &mut self,
        infos: &mut SegmentInfos,
        readers: &mut Vec<SegmentReader>,
    ) -> Result<()> {
        self.flush(infos, readers)?;

        let segment_count = infos.segments().len();
        let needs_rewrite = segment_count > 1
            || readers
                .first()
                .is_some_and(|reader| reader.has_deletions());
        if needs_rewrite {
            self.merge_range(infos, readers, 0, segment_count)?;
        }

        self.commit(infos, readers)
    }

    /// Whether a commit would write anything.
    pub fn has_pending_changes(&self, readers: &[SegmentReader]) -> bool {
        self.dirty
            || !self.buffered.is_empty()
            || readers.iter().any(SegmentReader::has_pending_deletions)
    }

    /// Commit all pending mutations, advancing the generation by one.
    ///
    /// A commit with nothing pending is a no-op and leaves the generation
    /// unchanged.
    pub fn commit(
        &mut self,
        infos: &mut SegmentInfos,
        readers: &mut Vec<SegmentReader>,
    ) -> Result<()> {
        if !self.has_pending_changes(readers) {
            return Ok(());
        }

        let mut lock = WriteLock::obtain(self.directory.clone())?;

        self.flush(infos, readers)?;

        // Materialise pending deletion bitvectors.
        for (meta, reader) in infos.segments_mut().iter_mut().zip(readers.iter_mut()) {
            if let Some((del_gen, superseded)) = reader.write_deletions()? {
                meta.del_gen = del_gen;
                self.deletable.extend(superseded);
            }
        }

        let previous = infos.generation();
        infos.write_next(&self.directory)?;

        // The new generation is live; superseded files can go. Failures
        // here are not fatal, the files are merely garbage.
        if previous >= 0 {
            let old_segments = SegmentInfos::segments_file_name(previous);
            self.deletable.push(old_segments);
        }
        for name in self.deletable.drain(..) {
            if self.directory.exists(&name) {
                if let Err(e) = self.directory.delete(&name) {
                    warn!("could not delete superseded file {name}: {e}");
                }
            }
        }

        self.dirty = false;
        debug!("commit complete, generation {}", infos.generation());
        lock.release()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::directory::RamDirectory;
    use crate::document::Field;

    struct Fixture {
        directory: Arc<dyn Directory>,
        writer: IndexWriter,
        infos: SegmentInfos,
        readers: Vec<SegmentReader>,
    }

    fn fixture(config: WriterConfig) -> Fixture {
        let directory: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let writer = IndexWriter::new(
            directory.clone(),
            Arc::new(StandardAnalyzer::new()),
            config,
        );
        Fixture {
            directory,
            writer,
            infos: SegmentInfos::new(),
            readers: Vec::new(),
        }
    }

    fn doc(text: &str) -> Document {
        Document::new().with_field(Field::text("contents", text))
    }

    #[test]
    fn test_flush_on_buffer_threshold() {
        let mut fx = fixture(
            WriterConfig::default()
                .with_max_buffered_docs(2)
                .with_merge_factor(100),
        );

        fx.writer
            .add_document(doc("one"), &mut fx.infos, &mut fx.readers)
            .unwrap();
        assert_eq!(fx.writer.pending_docs(), 1);
        assert!(fx.infos.segments().is_empty());

        fx.writer
            .add_document(doc("two"), &mut fx.infos, &mut fx.readers)
            .unwrap();
        assert_eq!(fx.writer.pending_docs(), 0);
        assert_eq!(fx.infos.segments().len(), 1);
        assert_eq!(fx.infos.segments()[0].doc_count, 2);
        assert_eq!(fx.readers.len(), 1);
    }

    #[test]
    fn test_merge_policy_collapses_same_tier_groups() {
        let mut fx = fixture(
            WriterConfig::default()
                .with_max_buffered_docs(1)
                .with_merge_factor(3),
        );

        // Three 1-doc segments trigger a merge into one 3-doc segment.
        for text in ["a", "b", "c"] {
            fx.writer
                .add_document(doc(text), &mut fx.infos, &mut fx.readers)
                .unwrap();
        }
        assert_eq!(fx.infos.segments().len(), 1);
        assert_eq!(fx.infos.segments()[0].doc_count, 3);

        // Six more: two further tier-0 merges, then a tier-1 cascade into 9.
        for text in ["d", "e", "f", "g", "h", "i"] {
            fx.writer
                .add_document(doc(text), &mut fx.infos, &mut fx.readers)
                .unwrap();
        }
        assert_eq!(fx.infos.segments().len(), 1);
        assert_eq!(fx.infos.segments()[0].doc_count, 9);
        assert_eq!(fx.readers.len(), 1);
        assert_eq!(fx.readers[0].num_docs(), 9);
    }

    #[test]
    fn test_max_merge_docs_blocks_merges() {
        let mut fx = fixture(
            WriterConfig::default()
                .with_max_buffered_docs(1)
                .with_merge_factor(2)
                .with_max_merge_docs(1),
        );

        for text in ["a", "b", "c", "d"] {
            fx.writer
                .add_document(doc(text), &mut fx.infos, &mut fx.readers)
                .unwrap();
        }
        // No group may merge: every pair exceeds max_merge_docs.
        assert_eq!(fx.infos.segments().len(), 4);
    }

    #[test]
    fn test_optimize_reaches_single_segment() {
        let mut fx = fixture(
            WriterConfig::default()
                .with_max_buffered_docs(2)
                .with_merge_factor(100),
        );

        for i in 0..7 {
            fx.writer
                .add_document(doc(&format!("doc {i}")), &mut fx.infos, &mut fx.readers)
                .unwrap();
        }
        assert_eq!(fx.infos.segments().len(), 3);
        assert_eq!(fx.writer.pending_docs(), 1);

        fx.writer
            .optimize(&mut fx.infos, &mut fx.readers)
            .unwrap();

        assert_eq!(fx.infos.segments().len(), 1);
        assert_eq!(fx.infos.segments()[0].doc_count, 7);
        assert_eq!(fx.infos.generation(), 1);

        // Optimizing an already-optimized index only commits when dirty.
        let generation = fx.infos.generation();
        fx.writer
            .optimize(&mut fx.infos, &mut fx.readers)
            .unwrap();
        assert_eq!(fx.infos.generation(), generation);
    }

    #[test]
    fn test_commit_is_noop_without_changes() {
        let mut fx = fixture(WriterConfig::default());

        fx.writer.commit(&mut fx.infos, &mut fx.readers).unwrap();
        assert_eq!(fx.infos.generation(), 0);
        assert!(!fx.directory.exists("segments.gen"));
    }

    #[test]
    fn test_commit_advances_generation_and_cleans_up() {
        let mut fx = fixture(WriterConfig::default().with_max_buffered_docs(100));

        fx.writer
            .add_document(doc("first"), &mut fx.infos, &mut fx.readers)
            .unwrap();
        fx.writer.commit(&mut fx.infos, &mut fx.readers).unwrap();
        assert_eq!(fx.infos.generation(), 1);
        assert!(fx.directory.exists("segments_1"));

        fx.writer
            .add_document(doc("second"), &mut fx.infos, &mut fx.readers)
            .unwrap();
        fx.writer.commit(&mut fx.infos, &mut fx.readers).unwrap();
        assert_eq!(fx.infos.generation(), 2);
        assert!(fx.directory.exists("segments_2"));
        assert!(!fx.directory.exists("segments_1"));

        // The write lock is released.
        assert!(!fx.directory.exists("write.lock"));
    }

    #[test]
    fn test_commit_materialises_deletions() {
        let mut fx = fixture(WriterConfig::default().with_max_buffered_docs(100));

        for i in 0..3 {
            fx.writer
                .add_document(doc(&format!("doc {i}")), &mut fx.infos, &mut fx.readers)
                .unwrap();
        }
        fx.writer.commit(&mut fx.infos, &mut fx.readers).unwrap();

        fx.readers[0].delete(1).unwrap();
        fx.writer.commit(&mut fx.infos, &mut fx.readers).unwrap();

        assert_eq!(fx.infos.segments()[0].del_gen, 1);
        let del_name = fx.infos.segments()[0].del_file_name().unwrap();
        assert!(fx.directory.exists(&del_name));

        // A second round of deletions bumps the deletion generation and
        // removes the superseded bitvector.
        fx.readers[0].delete(2).unwrap();
        fx.writer.commit(&mut fx.infos, &mut fx.readers).unwrap();
        assert_eq!(fx.infos.segments()[0].del_gen, 2);
        assert!(!fx.directory.exists(&del_name));
        assert!(fx
            .directory
            .exists(&fx.infos.segments()[0].del_file_name().unwrap()));
    }
}
