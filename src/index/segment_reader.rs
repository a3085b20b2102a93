//! Reader over one immutable segment.
//!
//! Opens the segment's term dictionary, postings, norms, stored fields and
//! deletion bitvector, probing the compound layout when the segments file
//! recorded an unknown status. The only mutable state is deletion marking,
//! which stays in memory until the writer materialises a new `.del<gen>`
//! file at commit.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::directory::{Directory, FileInput};
use crate::document::Document;
use crate::error::{LucernaError, Result};
use crate::index::bit_vector::BitVector;
use crate::index::field_infos::FieldInfos;
use crate::index::segment_infos::{CompoundStatus, SegmentMeta, NO_DOC_STORE};
use crate::index::stored_fields::FieldsReader;
use crate::index::term::Term;
use crate::index::term_dictionary::{TermDictionary, TermsScanner};
use crate::index::term_info::TermInfo;
use crate::index::{postings, postings::Posting};
use crate::store::compound::CompoundFileReader;
use crate::store::stream::StreamReader;
use crate::util::base36::to_base36;

/// Norm byte of a field/document pair no norm was recorded for; decodes to
/// 1.0.
pub const DEFAULT_NORM: u8 = 124;

const NORMS_MAGIC: &[u8; 3] = b"NRM";

#[derive(Debug)]
struct Deletions {
    bits: Option<BitVector>,
    dirty: bool,
}

/// A reader over one segment's files.
#[derive(Debug)]
pub struct SegmentReader {
    meta: SegmentMeta,
    directory: Arc<dyn Directory>,
    field_infos: Arc<FieldInfos>,
    cfs: Option<CompoundFileReader>,
    _doc_store_cfs: Option<CompoundFileReader>,
    dictionary: Mutex<TermDictionary>,
    freq: Mutex<StreamReader<Box<dyn FileInput>>>,
    prox: Mutex<StreamReader<Box<dyn FileInput>>>,
    fields: Mutex<FieldsReader>,
    /// Norm bytes per indexed field name; absent fields decode to 1.0.
    norms: AHashMap<String, Vec<u8>>,
    deletions: Mutex<Deletions>,
    terms_stream: Mutex<Option<TermsScanner>>,
}

impl SegmentReader {
    /// Open a segment described by its segments-file entry.
    pub fn open(directory: Arc<dyn Directory>, meta: SegmentMeta) -> Result<Self> {
        let cfs_name = format!("{}.cfs", meta.name);
        let use_compound = match meta.compound {
            CompoundStatus::Yes => true,
            CompoundStatus::No => false,
            CompoundStatus::Unknown => directory.exists(&cfs_name),
        };
        let cfs = if use_compound {
            Some(CompoundFileReader::open(&directory, &cfs_name)?)
        } else {
            None
        };

        let open_file = |ext: &str| -> Result<Box<dyn FileInput>> {
            let name = format!("{}.{}", meta.name, ext);
            match &cfs {
                Some(container) => container.open_sub_file(&name),
                None => directory.open_input(&name, false),
            }
        };

        let field_infos = Arc::new(FieldInfos::read(&mut StreamReader::new(open_file("fnm")?))?);
        let dictionary =
            TermDictionary::open(open_file("tii")?, open_file("tis")?, field_infos.clone())?;
        let freq = StreamReader::new(open_file("frq")?);
        let prox = StreamReader::new(open_file("prx")?);

        // Stored fields, possibly redirected to a shared doc store.
        let (fields, doc_store_cfs) = if meta.doc_store_offset != NO_DOC_STORE {
            let doc_store_segment = meta.doc_store_segment.as_deref().ok_or_else(|| {
                LucernaError::invalid_format("doc-store offset set without a doc-store segment")
            })?;
            let fdx_name = format!("{doc_store_segment}.fdx");
            let fdt_name = format!("{doc_store_segment}.fdt");
            let (fdx, fdt, container) = if meta.doc_store_is_compound {
                let container =
                    CompoundFileReader::open(&directory, &format!("{doc_store_segment}.cfs"))?;
                (
                    container.open_sub_file(&fdx_name)?,
                    container.open_sub_file(&fdt_name)?,
                    Some(container),
                )
            } else {
                (
                    directory.open_input(&fdx_name, false)?,
                    directory.open_input(&fdt_name, false)?,
                    None,
                )
            };
            (
                FieldsReader::new(
                    fdx,
                    fdt,
                    field_infos.clone(),
                    meta.doc_store_offset as u32,
                    meta.doc_count,
                ),
                container,
            )
        } else {
            (
                FieldsReader::new(
                    open_file("fdx")?,
                    open_file("fdt")?,
                    field_infos.clone(),
                    0,
                    meta.doc_count,
                ),
                None,
            )
        };

        let norms = Self::load_norms(&meta, &field_infos, &open_file)?;

        // Deletion bitvectors live beside the segment, never inside `.cfs`.
        let bits = match meta.del_file_name() {
            Some(name) if directory.exists(&name) => {
                let mut reader = StreamReader::new(directory.open_input(&name, false)?);
                let bits = BitVector::read(&mut reader)?;
                if bits.size() != meta.doc_count {
                    return Err(LucernaError::invalid_format(format!(
                        "deletion bitvector of {} bits for a segment of {} documents",
                        bits.size(),
                        meta.doc_count
                    )));
                }
                Some(bits)
            }
            _ => None,
        };

        Ok(SegmentReader {
            meta,
            directory,
            field_infos,
            cfs,
            _doc_store_cfs: doc_store_cfs,
            dictionary: Mutex::new(dictionary),
            freq: Mutex::new(freq),
            prox: Mutex::new(prox),
            fields: Mutex::new(fields),
            norms,
            deletions: Mutex::new(Deletions { bits, dirty: false }),
            terms_stream: Mutex::new(None),
        })
    }

    fn load_norms(
        meta: &SegmentMeta,
        field_infos: &Arc<FieldInfos>,
        open_file: &dyn Fn(&str) -> Result<Box<dyn FileInput>>,
    ) -> Result<AHashMap<String, Vec<u8>>> {
        let mut norms = AHashMap::new();
        let wanted: Vec<_> = field_infos
            .indexed_fields()
            .filter(|field| !field.omit_norms)
            .collect();
        if wanted.is_empty() {
            return Ok(norms);
        }

        if meta.has_single_norm_file {
            let mut reader = StreamReader::new(open_file("nrm")?);
            let magic = reader.read_bytes(3)?;
            if magic != NORMS_MAGIC {
                return Err(LucernaError::invalid_format("bad norms file magic"));
            }
            let _version = reader.read_byte()?;
            for field in wanted {
                norms.insert(
                    field.name.clone(),
                    reader.read_bytes(meta.doc_count as usize)?,
                );
            }
        } else {
            // Pre-2.1 layout: one `.fN` sub-file per indexed field. A field
            // that never got norms simply has no file.
            for field in wanted {
                match open_file(&format!("f{}", field.number)) {
                    Ok(input) => {
                        let mut reader = StreamReader::new(input);
                        norms.insert(
                            field.name.clone(),
                            reader.read_bytes(meta.doc_count as usize)?,
                        );
                    }
                    Err(LucernaError::NotReadable(_)) => {}
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(norms)
    }

    /// Metadata of this segment.
    pub fn meta(&self) -> &SegmentMeta {
        &self.meta
    }

    /// Segment name.
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Field table of this segment.
    pub fn field_infos(&self) -> &Arc<FieldInfos> {
        &self.field_infos
    }

    /// Whether this segment's files are packed into a `.cfs` container.
    pub fn is_compound(&self) -> bool {
        self.cfs.is_some()
    }

    /// Document count at segment creation, deleted documents included.
    pub fn doc_count(&self) -> u32 {
        self.meta.doc_count
    }

    /// Live document count.
    pub fn num_docs(&self) -> u32 {
        let deletions = self.deletions.lock();
        let deleted = deletions.bits.as_ref().map_or(0, BitVector::count);
        self.meta.doc_count - deleted
    }

    /// Whether any document is marked deleted.
    pub fn has_deletions(&self) -> bool {
        let deletions = self.deletions.lock();
        deletions.bits.as_ref().map_or(0, BitVector::count) > 0
    }

    /// Whether in-memory deletions have not yet been materialised.
    pub fn has_pending_deletions(&self) -> bool {
        self.deletions.lock().dirty
    }

    /// Whether the given local document is deleted.
    pub fn is_deleted(&self, doc: u32) -> bool {
        let deletions = self.deletions.lock();
        deletions.bits.as_ref().is_some_and(|bits| bits.get(doc))
    }

    /// Mark a local document deleted. The change lives in memory until the
    /// writer materialises it at commit.
    pub fn delete(&self, doc: u32) -> Result<()> {
        if doc >= self.meta.doc_count {
            return Err(LucernaError::out_of_range(format!(
                "document {doc} is out of range ({} documents)",
                self.meta.doc_count
            )));
        }
        let mut deletions = self.deletions.lock();
        let bits = deletions
            .bits
            .get_or_insert_with(|| BitVector::new(self.meta.doc_count));
        if !bits.get(doc) {
            bits.set(doc)?;
            deletions.dirty = true;
        }
        Ok(())
    }

    /// Write pending deletions as the next `.del<gen>` file.
    ///
    /// Returns the new deletion generation and the name of the superseded
    /// bitvector file (for the caller's cleanup list), or `None` when
    /// nothing was pending. Must run under the write lock; the caller
    /// records the new generation in its segments file.
    pub fn write_deletions(&mut self) -> Result<Option<(i64, Option<String>)>> {
        let mut deletions = self.deletions.lock();
        if !deletions.dirty {
            return Ok(None);
        }
        let bits = deletions
            .bits
            .as_ref()
            .expect("dirty deletions imply a bitvector");

        let superseded = self.meta.del_file_name();
        let new_gen = self.meta.next_del_gen();
        let name = format!("{}_{}.del", self.meta.name, to_base36(new_gen as u64));
        let mut writer = crate::store::stream::StreamWriter::new(self.directory.create(&name)?);
        bits.write(&mut writer)?;
        writer.close()?;

        deletions.dirty = false;
        drop(deletions);
        self.meta.del_gen = new_gen;
        Ok(Some((new_gen, superseded)))
    }

    /// Norm byte of one document for one field.
    pub fn norm_byte(&self, doc: u32, field: &str) -> u8 {
        match self.norms.get(field) {
            Some(bytes) => bytes.get(doc as usize).copied().unwrap_or(DEFAULT_NORM),
            None => DEFAULT_NORM,
        }
    }

    /// The full norm byte column for one field, if recorded.
    pub fn norm_bytes(&self, field: &str) -> Option<&[u8]> {
        self.norms.get(field).map(Vec::as_slice)
    }

    /// Dictionary lookup; `None` when the segment lacks the term.
    pub fn term_info(&self, term: &Term) -> Result<Option<TermInfo>> {
        self.dictionary.lock().get(term)
    }

    /// Document frequency of a term (deleted documents included).
    pub fn doc_freq(&self, term: &Term) -> Result<u32> {
        Ok(self.term_info(term)?.map_or(0, |info| info.doc_freq))
    }

    /// Postings of a term as `(base + local id, freq)` pairs, skipping
    /// deleted documents.
    pub fn term_docs(&self, term: &Term, base: u32) -> Result<Vec<(u32, u32)>> {
        let Some(info) = self.term_info(term)? else {
            return Ok(Vec::new());
        };
        let raw = postings::read_postings(&mut self.freq.lock(), &info)?;
        Ok(self.filter_postings(raw, base))
    }

    fn filter_postings(&self, raw: Vec<Posting>, base: u32) -> Vec<(u32, u32)> {
        let deletions = self.deletions.lock();
        raw.into_iter()
            .filter(|posting| {
                deletions
                    .bits
                    .as_ref()
                    .is_none_or(|bits| !bits.get(posting.doc))
            })
            .map(|posting| (base + posting.doc, posting.freq))
            .collect()
    }

    /// Postings of a term with positions, as `(base + local id, positions)`,
    /// skipping deleted documents.
    pub fn term_positions(&self, term: &Term, base: u32) -> Result<Vec<(u32, Vec<u32>)>> {
        let Some(info) = self.term_info(term)? else {
            return Ok(Vec::new());
        };
        let raw = postings::read_postings_with_positions(
            &mut self.freq.lock(),
            &mut self.prox.lock(),
            &info,
        )?;
        let deletions = self.deletions.lock();
        Ok(raw
            .into_iter()
            .filter(|(posting, _)| {
                deletions
                    .bits
                    .as_ref()
                    .is_none_or(|bits| !bits.get(posting.doc))
            })
            .map(|(posting, positions)| (base + posting.doc, positions))
            .collect())
    }

    /// Raw postings with positions for one already-resolved term info,
    /// deleted documents included. Used by the segment merger.
    pub fn raw_positions(&self, info: &TermInfo) -> Result<Vec<(Posting, Vec<u32>)>> {
        postings::read_postings_with_positions(&mut self.freq.lock(), &mut self.prox.lock(), info)
    }

    /// Stored fields of one local document.
    pub fn document(&self, doc: u32) -> Result<Document> {
        self.fields.lock().doc(doc)
    }

    /// A fresh term scanner over this segment's dictionary.
    pub fn terms_scanner(&self) -> Result<TermsScanner> {
        self.dictionary.lock().scanner()
    }

    /// Position a scanner on the least term `>= target` using the skip
    /// index.
    pub fn scanner_skip_to(
        &self,
        scanner: &mut TermsScanner,
        target: &Term,
    ) -> Result<Option<(Term, TermInfo)>> {
        Ok(self
            .dictionary
            .lock()
            .skip_to(scanner, target)?
            .cloned())
    }

    // The public per-segment term stream (`resetTermsStream` and friends).

    /// Open (or rewind) the segment's term stream.
    pub fn reset_terms_stream(&self) -> Result<()> {
        let scanner = self.dictionary.lock().scanner()?;
        *self.terms_stream.lock() = Some(scanner);
        Ok(())
    }

    /// Advance the term stream, returning the next term.
    pub fn next_term(&self) -> Result<Option<Term>> {
        let mut stream = self.terms_stream.lock();
        let scanner = stream
            .as_mut()
            .ok_or_else(|| LucernaError::runtime("Terms stream is not open"))?;
        Ok(scanner.next()?.map(|(term, _)| term.clone()))
    }

    /// The term stream's current term.
    pub fn current_term(&self) -> Option<Term> {
        self.terms_stream
            .lock()
            .as_ref()
            .and_then(|scanner| scanner.current().map(|(term, _)| term.clone()))
    }

    /// Skip the term stream to the least term `>= target`.
    pub fn skip_to(&self, target: &Term) -> Result<Option<Term>> {
        let mut stream = self.terms_stream.lock();
        let scanner = stream
            .as_mut()
            .ok_or_else(|| LucernaError::runtime("Terms stream is not open"))?;
        Ok(self
            .dictionary
            .lock()
            .skip_to(scanner, target)?
            .map(|(term, _)| term.clone()))
    }

    /// Close the term stream.
    pub fn close_terms_stream(&self) {
        *self.terms_stream.lock() = None;
    }
}
