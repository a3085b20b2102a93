//! The two-level term dictionary (`.tis` detail file, `.tii` skip index).
//!
//! Both files share one entry layout: terms delta-prefix-encoded against the
//! previous entry (`VInt prefixShared`, `String suffix`, `VInt fieldNum`),
//! followed by `VInt docFreq`, VLong freq/prox pointer deltas and, when
//! `docFreq >= skipInterval`, a `VInt skipOffset`. Index entries additionally
//! carry a VLong delta pointer into `.tis`.
//!
//! Every `indexInterval`-th detail entry is sampled into the index, recorded
//! as the *previous* term together with the file position of the entry that
//! follows it. The first index entry is therefore the empty term pointing at
//! the first detail entry; a seek through the index restores the exact delta
//! base the detail stream expects at that position.
//!
//! Prefix lengths count UTF-16 code units, so suffixes are read and written
//! as raw units and only become text after recombination.

use std::io::SeekFrom;
use std::sync::Arc;

use crate::directory::{FileInput, FileOutput};
use crate::error::{LucernaError, Result};
use crate::index::field_infos::FieldInfos;
use crate::index::term::Term;
use crate::index::term_info::TermInfo;
use crate::store::stream::{StreamReader, StreamWriter};

/// Format marker of pre-2.1 term dictionaries.
pub const TERMS_FORMAT_PRE_21: i32 = -2; // 0xFFFFFFFE
/// Format marker of 2.1+ term dictionaries.
pub const TERMS_FORMAT_21: i32 = -3; // 0xFFFFFFFD

/// Detail-entry sampling rate of the writer.
pub const INDEX_INTERVAL: u32 = 128;
/// Skip interval written by this implementation; high enough that no entry
/// ever records skip data.
const NO_SKIP: u32 = 0x7FFF_FFFF;

/// Field number stored for the leading empty-term index entry.
const NO_FIELD: u32 = u32::MAX;

#[derive(Debug, Clone, Copy)]
struct TermsHeader {
    format: i32,
    size: u64,
    index_interval: u32,
    skip_interval: u32,
    entries_start: u64,
}

fn read_header<R: FileInput>(reader: &mut StreamReader<R>, name: &str) -> Result<TermsHeader> {
    let format = reader.read_int()?;
    if format != TERMS_FORMAT_PRE_21 && format != TERMS_FORMAT_21 {
        return Err(LucernaError::invalid_format(format!(
            "unknown term dictionary format {format} in {name}"
        )));
    }
    let size = reader.read_long()?;
    if size < 0 {
        return Err(LucernaError::invalid_format(format!(
            "negative term count in {name}"
        )));
    }
    let index_interval = reader.read_int()? as u32;
    let skip_interval = reader.read_int()? as u32;
    if format == TERMS_FORMAT_21 {
        let _max_skip_levels = reader.read_int()?;
    }
    Ok(TermsHeader {
        format,
        size: size as u64,
        index_interval,
        skip_interval,
        entries_start: reader.tell(),
    })
}

/// One `.tii` entry: the delta base for a run of detail entries.
#[derive(Debug, Clone)]
struct IndexEntry {
    term: Term,
    info: TermInfo,
    /// Absolute `.tis` position of the entry following `term`.
    pointer: u64,
    /// Detail ordinal of the entry at `pointer`.
    ordinal: u64,
}

/// A resettable forward cursor over the `.tis` detail stream.
#[derive(Debug)]
pub struct TermsScanner {
    reader: StreamReader<Box<dyn FileInput>>,
    field_infos: Arc<FieldInfos>,
    size: u64,
    skip_interval: u32,
    entries_start: u64,
    /// Number of detail entries consumed so far.
    ordinal: u64,
    prev_units: Vec<u16>,
    freq_pointer: u64,
    prox_pointer: u64,
    current: Option<(Term, TermInfo)>,
}

impl TermsScanner {
    fn new(
        input: Box<dyn FileInput>,
        field_infos: Arc<FieldInfos>,
        header: &TermsHeader,
    ) -> Self {
        TermsScanner {
            reader: StreamReader::new(input),
            field_infos,
            size: header.size,
            skip_interval: header.skip_interval,
            entries_start: header.entries_start,
            ordinal: 0,
            prev_units: Vec::new(),
            freq_pointer: 0,
            prox_pointer: 0,
            current: None,
        }
    }

    /// Rewind to just before the first term.
    pub fn reset(&mut self) -> Result<()> {
        self.reader.seek(SeekFrom::Start(self.entries_start))?;
        self.ordinal = 0;
        self.prev_units.clear();
        self.freq_pointer = 0;
        self.prox_pointer = 0;
        self.current = None;
        Ok(())
    }

    fn seek_entry(&mut self, entry: &IndexEntry) -> Result<()> {
        self.reader.seek(SeekFrom::Start(entry.pointer))?;
        self.ordinal = entry.ordinal;
        self.prev_units = entry.term.text.encode_utf16().collect();
        self.freq_pointer = entry.info.freq_pointer;
        self.prox_pointer = entry.info.prox_pointer;
        self.current = Some((entry.term.clone(), entry.info));
        Ok(())
    }

    /// The term the cursor is positioned on, if any.
    pub fn current(&self) -> Option<&(Term, TermInfo)> {
        self.current.as_ref()
    }

    /// Number of terms in the detail file.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Advance to the next term, returning it, or `None` at the end.
    pub fn next(&mut self) -> Result<Option<&(Term, TermInfo)>> {
        if self.ordinal >= self.size {
            self.current = None;
            return Ok(None);
        }

        let prefix = self.reader.read_vint()? as usize;
        let suffix = self.reader.read_string_units()?;
        if prefix > self.prev_units.len() {
            return Err(LucernaError::invalid_format(
                "term prefix is longer than the previous term",
            ));
        }
        self.prev_units.truncate(prefix);
        self.prev_units.extend_from_slice(&suffix);

        let field_num = self.reader.read_vint()?;
        let doc_freq = self.reader.read_vint()?;
        self.freq_pointer += self.reader.read_vlong()?;
        self.prox_pointer += self.reader.read_vlong()?;
        let skip_offset = if doc_freq >= self.skip_interval {
            self.reader.read_vint()?
        } else {
            0
        };

        let field = if field_num == NO_FIELD {
            String::new()
        } else {
            self.field_infos.required_by_number(field_num)?.name.clone()
        };
        let text = String::from_utf16(&self.prev_units)
            .map_err(|_| LucernaError::invalid_format("unpaired surrogate in term text"))?;

        self.ordinal += 1;
        self.current = Some((
            Term::new(field, text),
            TermInfo::new(doc_freq, self.freq_pointer, self.prox_pointer, skip_offset),
        ));
        Ok(self.current.as_ref())
    }

    /// Scan forward until the current term is `>= target`.
    ///
    /// The cursor must already be positioned at or before the target (a
    /// fresh reset or an index seek guarantees that). Returns the landed-on
    /// term, or `None` when the stream is exhausted first.
    pub fn scan_to(&mut self, target: &Term) -> Result<Option<&(Term, TermInfo)>> {
        loop {
            match &self.current {
                Some((term, _)) if *term >= *target => break,
                _ => {
                    if self.ordinal >= self.size {
                        self.current = None;
                        break;
                    }
                    self.next()?;
                }
            }
        }
        Ok(self.current.as_ref())
    }
}

/// The term dictionary of one segment.
#[derive(Debug)]
pub struct TermDictionary {
    field_infos: Arc<FieldInfos>,
    tis_header: TermsHeader,
    index: Vec<IndexEntry>,
    tis: Box<dyn FileInput>,
    /// Cursor used by point lookups; public scanners are created fresh.
    lookup: TermsScanner,
}

impl TermDictionary {
    /// Open a dictionary from its `.tii` and `.tis` streams.
    pub fn open(
        tii: Box<dyn FileInput>,
        tis: Box<dyn FileInput>,
        field_infos: Arc<FieldInfos>,
    ) -> Result<Self> {
        let mut tii_reader = StreamReader::new(tii);
        let tii_header = read_header(&mut tii_reader, ".tii")?;

        let mut index = Vec::with_capacity(tii_header.size as usize);
        let mut prev_units: Vec<u16> = Vec::new();
        let mut freq_pointer = 0u64;
        let mut prox_pointer = 0u64;
        let mut tis_pointer = 0u64;

        for i in 0..tii_header.size {
            let prefix = tii_reader.read_vint()? as usize;
            let suffix = tii_reader.read_string_units()?;
            if prefix > prev_units.len() {
                return Err(LucernaError::invalid_format(
                    "index term prefix is longer than the previous term",
                ));
            }
            prev_units.truncate(prefix);
            prev_units.extend_from_slice(&suffix);

            let field_num = tii_reader.read_vint()?;
            let doc_freq = tii_reader.read_vint()?;
            freq_pointer += tii_reader.read_vlong()?;
            prox_pointer += tii_reader.read_vlong()?;
            let skip_offset = if doc_freq >= tii_header.skip_interval {
                tii_reader.read_vint()?
            } else {
                0
            };
            tis_pointer += tii_reader.read_vlong()?;

            let field = if field_num == NO_FIELD {
                String::new()
            } else {
                field_infos.required_by_number(field_num)?.name.clone()
            };
            let text = String::from_utf16(&prev_units).map_err(|_| {
                LucernaError::invalid_format("unpaired surrogate in index term text")
            })?;

            index.push(IndexEntry {
                term: Term::new(field, text),
                info: TermInfo::new(doc_freq, freq_pointer, prox_pointer, skip_offset),
                pointer: tis_pointer,
                ordinal: i * tii_header.index_interval as u64,
            });
        }

        let mut tis_probe = StreamReader::new(tis);
        let tis_header = read_header(&mut tis_probe, ".tis")?;
        let tis = tis_probe.into_inner();

        let lookup = TermsScanner::new(tis.clone_input()?, field_infos.clone(), &tis_header);

        Ok(TermDictionary {
            field_infos,
            tis_header,
            index,
            tis,
            lookup,
        })
    }

    /// Number of terms in the dictionary.
    pub fn size(&self) -> u64 {
        self.tis_header.size
    }

    /// Index of the greatest index entry whose term is `<= target`.
    fn index_offset(&self, target: &Term) -> Option<usize> {
        let after = self.index.partition_point(|entry| entry.term <= *target);
        after.checked_sub(1)
    }

    /// Look up a term; `None` when the dictionary does not contain it.
    pub fn get(&mut self, target: &Term) -> Result<Option<TermInfo>> {
        let Some(offset) = self.index_offset(target) else {
            return Ok(None);
        };

        let entry = self.index[offset].clone();
        if entry.term == *target {
            return Ok(Some(entry.info));
        }

        self.lookup.seek_entry(&entry)?;
        match self.lookup.scan_to(target)? {
            Some((term, info)) if term == target => Ok(Some(*info)),
            _ => Ok(None),
        }
    }

    /// Create a fresh scanner over the detail stream, positioned before the
    /// first term.
    pub fn scanner(&self) -> Result<TermsScanner> {
        let mut scanner = TermsScanner::new(
            self.tis.clone_input()?,
            self.field_infos.clone(),
            &self.tis_header,
        );
        scanner.reset()?;
        Ok(scanner)
    }

    /// Position a scanner on the least term `>= target`, jumping through the
    /// index instead of scanning from the start.
    pub fn skip_to<'a>(
        &self,
        scanner: &'a mut TermsScanner,
        target: &Term,
    ) -> Result<Option<&'a (Term, TermInfo)>> {
        match self.index_offset(target) {
            Some(offset) => {
                let entry = &self.index[offset];
                // Only rewind through the index when the cursor is past the
                // target or behind the indexed block.
                let needs_seek = match scanner.current() {
                    Some((term, _)) => *term >= *target || scanner.ordinal < entry.ordinal,
                    None => true,
                };
                if needs_seek {
                    scanner.seek_entry(entry)?;
                }
            }
            None => scanner.reset()?,
        }
        scanner.scan_to(target)
    }
}

/// Streaming writer for a segment's `.tis`/`.tii` pair.
///
/// Terms must be added in strictly ascending `(field, text)` order. Headers
/// are written up front with a zero size and patched on close.
pub struct DictionaryWriter {
    tis: StreamWriter<Box<dyn FileOutput>>,
    tii: StreamWriter<Box<dyn FileOutput>>,
    size: u64,
    index_size: u64,
    prev: DeltaState,
    index_prev: DeltaState,
    last_index_pointer: u64,
    last_term: Option<Term>,
}

#[derive(Debug)]
struct DeltaState {
    units: Vec<u16>,
    info: TermInfo,
    field_num: u32,
}

impl Default for DeltaState {
    fn default() -> Self {
        DeltaState {
            units: Vec::new(),
            info: TermInfo::default(),
            field_num: NO_FIELD,
        }
    }
}

fn shared_prefix(a: &[u16], b: &[u16]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

impl DictionaryWriter {
    /// Start a dictionary, writing both headers.
    pub fn new(tis_out: Box<dyn FileOutput>, tii_out: Box<dyn FileOutput>) -> Result<Self> {
        let mut tis = StreamWriter::new(tis_out);
        let mut tii = StreamWriter::new(tii_out);
        for writer in [&mut tis, &mut tii] {
            writer.write_int(TERMS_FORMAT_21)?;
            writer.write_long(0)?; // patched on close
            writer.write_int(INDEX_INTERVAL as i32)?;
            writer.write_int(NO_SKIP as i32)?;
            writer.write_int(0)?; // max skip levels
        }
        Ok(DictionaryWriter {
            tis,
            tii,
            size: 0,
            index_size: 0,
            prev: DeltaState::default(),
            index_prev: DeltaState::default(),
            last_index_pointer: 0,
            last_term: None,
        })
    }

    /// Append one term.
    pub fn add(&mut self, term: &Term, field_num: u32, info: TermInfo) -> Result<()> {
        if let Some(last) = &self.last_term {
            if *term <= *last {
                return Err(LucernaError::invalid_argument(format!(
                    "terms must be added in ascending order ({term} after {last})"
                )));
            }
        }

        if self.size % INDEX_INTERVAL as u64 == 0 {
            self.write_index_entry()?;
        }

        let units: Vec<u16> = term.text.encode_utf16().collect();
        let prefix = shared_prefix(&self.prev.units, &units);
        self.tis.write_vint(prefix as u32)?;
        self.tis.write_string_units(&units[prefix..])?;
        self.tis.write_vint(field_num)?;
        self.tis.write_vint(info.doc_freq)?;
        self.tis
            .write_vlong(info.freq_pointer - self.prev.info.freq_pointer)?;
        self.tis
            .write_vlong(info.prox_pointer - self.prev.info.prox_pointer)?;

        self.prev = DeltaState {
            units,
            info,
            field_num,
        };
        self.last_term = Some(term.clone());
        self.size += 1;
        Ok(())
    }

    /// Sample the previous detail term (or the empty term at the start) into
    /// the index, pointing at the detail entry about to be written.
    fn write_index_entry(&mut self) -> Result<()> {
        let prefix = shared_prefix(&self.index_prev.units, &self.prev.units);
        self.tii.write_vint(prefix as u32)?;
        let suffix: Vec<u16> = self.prev.units[prefix..].to_vec();
        self.tii.write_string_units(&suffix)?;
        self.tii.write_vint(self.prev.field_num)?;
        self.tii.write_vint(self.prev.info.doc_freq)?;
        self.tii
            .write_vlong(self.prev.info.freq_pointer - self.index_prev.info.freq_pointer)?;
        self.tii
            .write_vlong(self.prev.info.prox_pointer - self.index_prev.info.prox_pointer)?;

        let pointer = self.tis.tell();
        self.tii.write_vlong(pointer - self.last_index_pointer)?;
        self.last_index_pointer = pointer;

        self.index_prev = DeltaState {
            units: self.prev.units.clone(),
            info: self.prev.info,
            field_num: self.prev.field_num,
        };
        self.index_size += 1;
        Ok(())
    }

    /// Close both files, patching the entry counts into the headers.
    pub fn close(mut self) -> Result<()> {
        self.tis.seek(SeekFrom::Start(4))?;
        self.tis.write_long(self.size as i64)?;
        self.tis.close()?;

        self.tii.seek(SeekFrom::Start(4))?;
        self.tii.write_long(self.index_size as i64)?;
        self.tii.close()
    }
}
