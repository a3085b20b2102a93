//! Flushing buffered documents into a new segment.
//!
//! Documents are inverted in memory (term → doc → positions), then the
//! segment's files are written in one pass each: stored fields, field
//! table, postings, dictionary, norms, and finally the optional `.cfs`
//! packing.

use std::collections::BTreeMap;
use std::sync::Arc;

use ahash::AHashMap;
use log::debug;

use crate::analysis::{Analyzer, Token};
use crate::config::WriterConfig;
use crate::directory::Directory;
use crate::document::Document;
use crate::error::{LucernaError, Result};
use crate::index::field_infos::FieldInfos;
use crate::index::segment_infos::{CompoundStatus, SegmentMeta};
use crate::index::stored_fields::FieldsWriter;
use crate::index::term::Term;
use crate::index::term_dictionary::DictionaryWriter;
use crate::index::term_info::TermInfo;
use crate::index::postings::PostingsWriter;
use crate::query::similarity;
use crate::store::compound::CompoundFileWriter;
use crate::store::stream::StreamWriter;

/// Extensions of the files a freshly flushed segment consists of, in the
/// order they are packed into a compound container.
pub const SEGMENT_EXTENSIONS: [&str; 8] =
    ["fdt", "fdx", "fnm", "frq", "nrm", "prx", "tii", "tis"];

#[derive(Debug, Default)]
struct FieldState {
    /// Token count, for the length norm.
    length: u32,
    /// Next position offset; consecutive same-name fields continue the
    /// position sequence.
    position: u32,
    /// Product of the field instances' boosts.
    boost: f32,
}

/// Write a batch of documents as the segment `name`.
pub fn write_segment(
    directory: &Arc<dyn Directory>,
    name: &str,
    documents: &[Document],
    analyzer: &Arc<dyn Analyzer>,
    config: &WriterConfig,
) -> Result<SegmentMeta> {
    if documents.is_empty() {
        return Err(LucernaError::invalid_argument(
            "cannot write a segment with no documents",
        ));
    }

    let mut field_infos = FieldInfos::new();
    for document in documents {
        for field in document.fields() {
            if field.is_indexed && field.is_binary() {
                return Err(LucernaError::invalid_argument(format!(
                    "binary field {} cannot be indexed",
                    field.name
                )));
            }
            field_infos.add(&field.name, field.is_indexed);
        }
    }

    // Invert: term -> local doc -> positions, plus per-field norm inputs.
    let mut inverted: BTreeMap<Term, BTreeMap<u32, Vec<u32>>> = BTreeMap::new();
    let mut field_states: AHashMap<(u32, u32), FieldState> = AHashMap::new();

    for (doc_id, document) in documents.iter().enumerate() {
        let doc_id = doc_id as u32;
        for field in document.fields() {
            if !field.is_indexed {
                continue;
            }
            let field_num = field_infos
                .number_of(&field.name)
                .expect("field was interned above");
            let text = field.text_value()?;

            let tokens: Vec<Token> = if field.is_tokenized {
                analyzer.analyze(text)?.collect()
            } else if text.is_empty() {
                Vec::new()
            } else {
                vec![Token::new(text, 0)]
            };

            let state = field_states.entry((doc_id, field_num)).or_insert_with(|| {
                FieldState {
                    boost: 1.0,
                    ..FieldState::default()
                }
            });
            state.boost *= field.boost;

            let base = state.position;
            let mut last_position = 0;
            for token in &tokens {
                let position = base + token.position as u32;
                inverted
                    .entry(Term::new(&field.name, &token.text))
                    .or_default()
                    .entry(doc_id)
                    .or_default()
                    .push(position);
                last_position = position;
            }
            if !tokens.is_empty() {
                state.length += tokens.len() as u32;
                state.position = last_position + 1;
            }
        }
    }

    // Stored fields.
    let mut fields_writer = FieldsWriter::new(
        directory.create(&format!("{name}.fdx"))?,
        directory.create(&format!("{name}.fdt"))?,
    );
    for document in documents {
        fields_writer.add_document(document, &field_infos)?;
    }
    fields_writer.close()?;

    // Field table.
    let mut fnm = StreamWriter::new(directory.create(&format!("{name}.fnm"))?);
    field_infos.write(&mut fnm)?;
    fnm.close()?;

    // Postings and dictionary, in global term order.
    let mut postings_writer = PostingsWriter::new(
        directory.create(&format!("{name}.frq"))?,
        directory.create(&format!("{name}.prx"))?,
    );
    let mut dictionary = DictionaryWriter::new(
        directory.create(&format!("{name}.tis"))?,
        directory.create(&format!("{name}.tii"))?,
    )?;
    for (term, docs) in &inverted {
        let (freq_pointer, prox_pointer) = postings_writer.start_term();
        for (doc, positions) in docs {
            postings_writer.add_doc(*doc, positions)?;
        }
        let info = TermInfo::new(postings_writer.doc_freq(), freq_pointer, prox_pointer, 0);
        let field_num = field_infos
            .number_of(&term.field)
            .expect("term fields are interned");
        dictionary.add(term, field_num, info)?;
    }
    postings_writer.close()?;
    dictionary.close()?;

    // Norms: one byte per document per indexed field, field-number order.
    let mut nrm = StreamWriter::new(directory.create(&format!("{name}.nrm"))?);
    nrm.write_bytes(b"NRM")?;
    nrm.write_byte(0xFF)?;
    for field in field_infos.indexed_fields() {
        for (doc_id, document) in documents.iter().enumerate() {
            let byte = match field_states.get(&(doc_id as u32, field.number)) {
                Some(state) => similarity::encode_norm(
                    similarity::length_norm(state.length) * document.boost() * state.boost,
                ),
                None => 0,
            };
            nrm.write_byte(byte)?;
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
        "flushed segment {name}: {} document(s), {} term(s)",
        documents.len(),
        inverted.len()
    );
    Ok(SegmentMeta::new(name, documents.len() as u32, compound))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::StandardAnalyzer;
    use crate::directory::RamDirectory;
    use crate::document::Field;
    use crate::index::segment_reader::SegmentReader;

    fn analyzer() -> Arc<dyn Analyzer> {
        Arc::new(StandardAnalyzer::new())
    }

    fn sample_documents() -> Vec<Document> {
        vec![
            Document::new()
                .with_field(Field::text("title", "Reporting Bugs"))
                .with_field(Field::un_stored("contents", "please report bugs early")),
            Document::new()
                .with_field(Field::text("title", "Submitting Patches"))
                .with_field(Field::un_stored("contents", "patches welcome, bugs too"))
                .with_field(Field::keyword("path", "/doc/patches")),
        ]
    }

    fn flush(config: &WriterConfig) -> (Arc<dyn Directory>, SegmentMeta) {
        let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let meta =
            write_segment(&dir, "_0", &sample_documents(), &analyzer(), config).unwrap();
        (dir, meta)
    }

    #[test]
    fn test_flush_plain_layout() {
        let config = WriterConfig::default().with_compound_file(false);
        let (dir, meta) = flush(&config);

        assert_eq!(meta.doc_count, 2);
        assert_eq!(meta.compound, CompoundStatus::No);
        for ext in SEGMENT_EXTENSIONS {
            assert!(dir.exists(&format!("_0.{ext}")), "missing _0.{ext}");
        }

        let reader = SegmentReader::open(dir, meta).unwrap();
        assert_eq!(reader.doc_count(), 2);
        assert_eq!(reader.doc_freq(&Term::new("contents", "bugs")).unwrap(), 2);
        assert_eq!(reader.doc_freq(&Term::new("title", "reporting")).unwrap(), 1);
        assert_eq!(reader.doc_freq(&Term::new("contents", "missing")).unwrap(), 0);

        // Keyword fields index their whole value as one term.
        assert_eq!(
            reader.doc_freq(&Term::new("path", "/doc/patches")).unwrap(),
            1
        );

        let docs = reader.term_docs(&Term::new("contents", "bugs"), 0).unwrap();
        assert_eq!(docs, vec![(0, 1), (1, 1)]);

        let positions = reader
            .term_positions(&Term::new("contents", "bugs"), 0)
            .unwrap();
        assert_eq!(positions[0], (0, vec![2]));
        assert_eq!(positions[1], (1, vec![2]));
    }

    #[test]
    fn test_flush_compound_layout() {
        let config = WriterConfig::default();
        let (dir, meta) = flush(&config);

        assert_eq!(meta.compound, CompoundStatus::Yes);
        assert!(dir.exists("_0.cfs"));
        for ext in SEGMENT_EXTENSIONS {
            assert!(!dir.exists(&format!("_0.{ext}")), "_0.{ext} not packed");
        }

        let reader = SegmentReader::open(dir, meta).unwrap();
        assert!(reader.is_compound());
        assert_eq!(reader.num_docs(), 2);

        let doc = reader.document(1).unwrap();
        assert_eq!(
            doc.field("title").unwrap().value.as_text(),
            Some("Submitting Patches")
        );
        assert!(doc.field("contents").is_none());
    }

    #[test]
    fn test_norms_reflect_field_length() {
        let config = WriterConfig::default().with_compound_file(false);
        let (dir, meta) = flush(&config);
        let reader = SegmentReader::open(dir, meta).unwrap();

        // title has 2 tokens in both docs, contents 4 tokens in both docs.
        let title_norm = similarity::decode_norm(reader.norm_byte(0, "title"));
        let contents_norm = similarity::decode_norm(reader.norm_byte(0, "contents"));
        assert!(title_norm > contents_norm);

        // Unindexed (or absent) fields have no norm column.
        assert!(reader.norm_bytes("missing").is_none());

        // Doc 0 has no path field: its norm byte is zero.
        assert_eq!(reader.norm_byte(0, "path"), 0);
        assert!(reader.norm_byte(1, "path") > 0);
    }

    #[test]
    fn test_empty_batch_rejected() {
        let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let result = write_segment(
            &dir,
            "_0",
            &[],
            &analyzer(),
            &WriterConfig::default(),
        );
        assert!(matches!(result, Err(LucernaError::InvalidArgument(_))));
    }

    #[test]
    fn test_multivalued_field_positions_continue() {
        let dir: Arc<dyn Directory> = Arc::new(RamDirectory::new());
        let doc = Document::new()
            .with_field(Field::un_stored("contents", "alpha beta"))
            .with_field(Field::un_stored("contents", "gamma"));
        let meta = write_segment(
            &dir,
            "_0",
            &[doc],
            &analyzer(),
            &WriterConfig::default().with_compound_file(false),
        )
        .unwrap();

        let reader = SegmentReader::open(dir, meta).unwrap();
        let positions = reader
            .term_positions(&Term::new("contents", "gamma"), 0)
            .unwrap();
        assert_eq!(positions, vec![(0, vec![2])]);
    }
}
