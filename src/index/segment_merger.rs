//! Merging live documents of several segments into one new segment.
//!
//! Deleted documents are dropped and the survivors renumbered; the term
//! dictionaries are merged through the priority-queue term merger, postings
//! rewritten against the new ids, and stored fields and norms copied in
//! document order.

use std::sync::Arc;

use log::debug;

use crate::config::WriterConfig;
use crate::directory::Directory;
use crate::error::Result;
use crate::index::field_infos::FieldInfos;
use crate::index::segment_infos::{CompoundStatus, SegmentMeta};
use crate::index::segment_reader::SegmentReader;
use crate::index::segment_writer::SEGMENT_EXTENSIONS;
use crate::index::stored_fields::FieldsWriter;
use crate::index::term_dictionary::DictionaryWriter;
use crate::index::term_info::TermInfo;
use crate::index::terms_merger::TermsMerger;
use crate::index::postings::PostingsWriter;
use crate::store::compound::CompoundFileWriter;
use crate::store::stream::StreamWriter;

/// Merge the given segments into a new segment `name`.
pub fn merge_segments(
    directory: &Arc<dyn Directory>,
    name: &str,
    readers: &[&SegmentReader],
    config: &WriterConfig,
) -> Result<SegmentMeta> {
    // Union of the field tables, in reader order.
    let mut field_infos = FieldInfos::new();
    for reader in readers {
        for field in reader.field_infos().iter() {
            field_infos.add(&field.name, field.is_indexed);
        }
    }

    // Doc-id remapping: survivors get consecutive new ids.
    let mut doc_maps: Vec<Vec<Option<u32>>> = Vec::with_capacity(readers.len());
    let mut next_id = 0u32;
    for reader in readers {
        let mut map = Vec::with_capacity(reader.doc_count() as usize);
        for local in 0..reader.doc_count() {
            if reader.is_deleted(local) {
                map.push(None);
            } else {
                map.push(Some(next_id));
                next_id += 1;
            }
        }
        doc_maps.push(map);
    }
    let merged_doc_count = next_id;

    // Stored fields, in new-id order.
    let mut fields_writer = FieldsWriter::new(
        directory.create(&format!("{name}.fdx"))?,
        directory.create(&format!("{name}.fdt"))?,
    );
    for (reader, map) in readers.iter().zip(&doc_maps) {
        for local in 0..reader.doc_count() {
            if map[local as usize].is_some() {
                let document = reader.document(local)?;
                fields_writer.add_document(&document, &field_infos)?;
            }
        }
    }
    fields_writer.close()?;

    let mut fnm = StreamWriter::new(directory.create(&format!("{name}.fnm"))?);
    field_infos.write(&mut fnm)?;
    fnm.close()?;

    // Postings, merging per-segment streams term by term.
    let mut postings_writer = PostingsWriter::new(
        directory.create(&format!("{name}.frq"))?,
        directory.create(&format!("{name}.prx"))?,
    );
    let mut dictionary = DictionaryWriter::new(
        directory.create(&format!("{name}.tis"))?,
        directory.create(&format!("{name}.tii"))?,
    )?;

    let mut scanners = Vec::with_capacity(readers.len());
    for reader in readers {
        scanners.push(reader.terms_scanner()?);
    }
    let mut merger = TermsMerger::new(scanners)?;

    let mut term_count = 0u64;
    while let Some((term, mut sources)) = merger.next()? {
        // Reader order keeps remapped ids ascending without a sort.
        sources.sort_by_key(|(index, _)| *index);

        let (freq_pointer, prox_pointer) = postings_writer.start_term();
        for (index, info) in sources {
            let raw = readers[index].raw_positions(&info)?;
            for (posting, positions) in raw {
                if let Some(new_id) = doc_maps[index][posting.doc as usize] {
                    postings_writer.add_doc(new_id, &positions)?;
                }
            }
        }

        if postings_writer.doc_freq() > 0 {
            let info = TermInfo::new(
                postings_writer.doc_freq(),
                freq_pointer,
                prox_pointer,
                0,
            );
            let field_num = field_infos
                .number_of(&term.field)
                .expect("merged fields are interned");
            dictionary.add(&term, field_num, info)?;
            term_count += 1;
        }
    }
    postings_writer.close()?;
    dictionary.close()?;

    // Norms, per merged field in new-id order. Segments that never saw a
    // field contribute zero bytes for their documents.
    let mut nrm = StreamWriter::new(directory.create(&format!("{name}.nrm"))?);
    nrm.write_bytes(b"NRM")?;
    nrm.write_byte(0xFF)?;
    for field in field_infos.indexed_fields() {
        for (reader, map) in readers.iter().zip(&doc_maps) {
            let has_field = reader
                .field_infos()
                .by_name(&field.name)
                .is_some_and(|f| f.is_indexed);
            for local in 0..reader.doc_count() {
                if map[local as usize].is_some() {
                    let byte = if has_field {
                        reader.norm_byte(local, &field.name)
                    } else {
                        0
                    };
                    nrm.write_byte(byte)?;
                }
            }
        }
    }
    nrm.close()?;

    let compound = if config.use_compound_file {
        let mut packer = CompoundFileWriter::new(directory.clone(), &format!("{name}.cfs"));
        for ext in SEGMENT_EXTENSIONS {
            packer.add_file(&format!("{name}.{ext}"))?;
        }
        packer.finish()?;
        for ext in SEGMENT_EXTENSIONS {
            directory.delete(&format!("{name}.{ext}"))?;
        }
        CompoundStatus::Yes
    } else {
        CompoundStatus::No
    };

    debug!(
        "merged {} segment(s) into {name}: {merged_doc_count} document(s), {term_count} term(s)",
        readers.len()
    );
    Ok(SegmentMeta::new(name, merged_doc_count, compound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{Analyzer, StandardAnalyzer};
    use crate::directory::RamDirectory;
    use crate::document::{Document, Field};
    use crate::index::segment_writer::write_segment;
    use crate::index::term::Term;

    fn doc(title: &str, contents: &str) -> Document {
        Document::new()
            .with_field(Field::text("title", title))
            .with_field(Field::un_stored("contents", contents))
    }

    fn setup() -> (Arc<dyn Directory>, SegmentReader, SegmentReader) {
        let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
        let config = WriterConfig::default().with_compound_file(false);

        let first = write_segment(
            &dir,
            "_0",
            &[doc("one", "alpha beta"), doc("two", "beta gamma")],
            &analyzer,
            &config,
        )
        .unwrap();
        let second = write_segment(
            &dir,
            "_1",
            &[doc("three", "gamma delta")],
            &analyzer,
            &config,
        )
        .unwrap();

        (
            dir.clone(),
            SegmentReader::open(dir.clone(), first).unwrap(),
            SegmentReader::open(dir, second).unwrap(),
        )
    }

    #[test]
    fn test_merge_without_deletions() {
        let (dir, first, second) = setup();
        let config = WriterConfig::default().with_compound_file(false);

        let meta = merge_segments(&dir, "_2", &[&first, &second], &config).unwrap();
        assert_eq!(meta.doc_count, 3);

        let merged = SegmentReader::open(dir, meta).unwrap();
        assert_eq!(merged.num_docs(), 3);

        // beta was in docs 0 and 1 of the first segment.
        assert_eq!(
            merged.term_docs(&Term::new("contents", "beta"), 0).unwrap(),
            vec![(0, 1), (1, 1)]
        );
        // gamma spans both source segments.
        assert_eq!(
            merged.term_docs(&Term::new("contents", "gamma"), 0).unwrap(),
            vec![(1, 1), (2, 1)]
        );

        // Stored fields follow the renumbering.
        let fetched = merged.document(2).unwrap();
        assert_eq!(fetched.field("title").unwrap().value.as_text(), Some("three"));
    }

    #[test]
    fn test_merge_drops_deleted_docs_and_renumbers() {
        let (dir, first, second) = setup();
        first.delete(0).unwrap();
        let config = WriterConfig::default().with_compound_file(false);

        let meta = merge_segments(&dir, "_2", &[&first, &second], &config).unwrap();
        assert_eq!(meta.doc_count, 2);

        let merged = SegmentReader::open(dir, meta).unwrap();
        assert!(!merged.has_deletions());

        // alpha only lived in the deleted doc, so the term is gone.
        assert_eq!(merged.doc_freq(&Term::new("contents", "alpha")).unwrap(), 0);

        // Old doc 1 became doc 0; old segment-2 doc became doc 1.
        assert_eq!(
            merged.term_docs(&Term::new("contents", "gamma"), 0).unwrap(),
            vec![(0, 1), (1, 1)]
        );
        let fetched = merged.document(0).unwrap();
        assert_eq!(fetched.field("title").unwrap().value.as_text(), Some("two"));

        // Norms were remapped alongside.
        assert_eq!(merged.norm_byte(0, "title"), first.norm_byte(1, "title"));
    }

    #[test]
    fn test_merge_into_compound_segment() {
        let (dir, first, second) = setup();
        let config = WriterConfig::default();

        let meta = merge_segments(&dir, "_2", &[&first, &second], &config).unwrap();
        assert_eq!(meta.compound, CompoundStatus::Yes);
        assert!(dir.exists("_2.cfs"));

        let merged = SegmentReader::open(dir, meta).unwrap();
        assert_eq!(merged.num_docs(), 3);
        assert_eq!(merged.doc_freq(&Term::new("contents", "beta")).unwrap(), 2);
    }
}
