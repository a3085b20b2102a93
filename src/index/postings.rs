//! Posting-list codecs for the `.frq` and `.prx` files.
//!
//! For each term, `.frq` holds one record per document in ascending doc-id
//! order: `VInt (docDelta << 1 | freqIsOne)`, followed by `VInt freq` when
//! the low bit is clear. `.prx` holds, for the same documents, `freq`
//! delta-encoded positions each.

use std::io::SeekFrom;

use crate::directory::{FileInput, FileOutput};
use crate::error::{LucernaError, Result};
use crate::index::term_info::TermInfo;
use crate::store::stream::{StreamReader, StreamWriter};

/// One posting: a document and the term's frequency within it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Posting {
    /// Segment-local document id.
    pub doc: u32,
    /// Number of occurrences of the term in the document.
    pub freq: u32,
}

/// Decode a term's postings from a `.frq` stream.
pub fn read_postings<R: FileInput>(
    freq: &mut StreamReader<R>,
    info: &TermInfo,
) -> Result<Vec<Posting>> {
    freq.seek(SeekFrom::Start(info.freq_pointer))?;

    let mut postings = Vec::with_capacity(info.doc_freq as usize);
    let mut doc = 0u32;
    for _ in 0..info.doc_freq {
        let code = freq.read_vint()?;
        doc += code >> 1;
        let freq_value = if code & 1 != 0 { 1 } else { freq.read_vint()? };
        if freq_value == 0 {
            return Err(LucernaError::invalid_format("zero term frequency"));
        }
        postings.push(Posting {
            doc,
            freq: freq_value,
        });
    }
    Ok(postings)
}

/// Decode a term's postings together with their positions.
///
/// The `.prx` records parallel the `.frq` records, so the postings are
/// decoded (or re-decoded) here as well.
pub fn read_postings_with_positions<R: FileInput>(
    freq: &mut StreamReader<R>,
    prox: &mut StreamReader<R>,
    info: &TermInfo,
) -> Result<Vec<(Posting, Vec<u32>)>> {
    let postings = read_postings(freq, info)?;
    prox.seek(SeekFrom::Start(info.prox_pointer))?;

    let mut result = Vec::with_capacity(postings.len());
    for posting in postings {
        let mut positions = Vec::with_capacity(posting.freq as usize);
        let mut position = 0u32;
        for _ in 0..posting.freq {
            position += prox.read_vint()?;
            positions.push(position);
        }
        result.push((posting, positions));
    }
    Ok(result)
}

/// Streaming writer for a segment's `.frq`/`.prx` pair.
///
/// Call [`PostingsWriter::start_term`] before the first document of each
/// term, then [`PostingsWriter::add_doc`] in ascending doc-id order; the
/// returned [`TermInfo`] of `start_term` carries the pointers the dictionary
/// entry needs.
pub struct PostingsWriter {
    freq: StreamWriter<Box<dyn FileOutput>>,
    prox: StreamWriter<Box<dyn FileOutput>>,
    last_doc: u32,
    doc_freq: u32,
}

impl PostingsWriter {
    /// Wrap the two output streams.
    pub fn new(freq: Box<dyn FileOutput>, prox: Box<dyn FileOutput>) -> Self {
        PostingsWriter {
            freq: StreamWriter::new(freq),
            prox: StreamWriter::new(prox),
            last_doc: 0,
            doc_freq: 0,
        }
    }

    /// Begin a new term, returning the file pointers recorded so far.
    pub fn start_term(&mut self) -> (u64, u64) {
        self.last_doc = 0;
        self.doc_freq = 0;
        (self.freq.tell(), self.prox.tell())
    }

    /// Number of documents written for the current term.
    pub fn doc_freq(&self) -> u32 {
        self.doc_freq
    }

    /// Append one document's occurrences of the current term.
    pub fn add_doc(&mut self, doc: u32, positions: &[u32]) -> Result<()> {
        if positions.is_empty() {
            return Err(LucernaError::invalid_argument(
                "a posting needs at least one position",
            ));
        }
        if self.doc_freq > 0 && doc <= self.last_doc {
            return Err(LucernaError::invalid_argument(format!(
                "documents must be added in ascending order ({doc} after {})",
                self.last_doc
            )));
        }

        let delta = doc - if self.doc_freq == 0 { 0 } else { self.last_doc };
        let freq = positions.len() as u32;
        if freq == 1 {
            self.freq.write_vint((delta << 1) | 1)?;
        } else {
            self.freq.write_vint(delta << 1)?;
            self.freq.write_vint(freq)?;
        }

        let mut last_position = 0u32;
        for &position in positions {
            self.prox.write_vint(position - last_position)?;
            last_position = position;
        }

        self.last_doc = doc;
        self.doc_freq += 1;
        Ok(())
    }

    /// Flush and close both streams.
    pub fn close(mut self) -> Result<()> {
        self.freq.close()?;
        self.prox.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::{Directory, RamDirectory};

    #[test]
    fn test_postings_round_trip() {
        let dir = RamDirectory::new();
        let mut writer =
            PostingsWriter::new(dir.create("_0.frq").unwrap(), dir.create("_0.prx").unwrap());

        // Term A in docs 0 (twice) and 5 (once).
        let (freq_ptr_a, prox_ptr_a) = writer.start_term();
        writer.add_doc(0, &[1, 4]).unwrap();
        writer.add_doc(5, &[2]).unwrap();
        let info_a = TermInfo::new(writer.doc_freq(), freq_ptr_a, prox_ptr_a, 0);

        // Term B in docs 3 and 4.
        let (freq_ptr_b, prox_ptr_b) = writer.start_term();
        writer.add_doc(3, &[0]).unwrap();
        writer.add_doc(4, &[7, 9, 11]).unwrap();
        let info_b = TermInfo::new(writer.doc_freq(), freq_ptr_b, prox_ptr_b, 0);

        writer.close().unwrap();

        let mut freq = StreamReader::new(dir.open_input("_0.frq", false).unwrap());
        let mut prox = StreamReader::new(dir.open_input("_0.prx", false).unwrap());

        let postings = read_postings(&mut freq, &info_a).unwrap();
        assert_eq!(
            postings,
            vec![Posting { doc: 0, freq: 2 }, Posting { doc: 5, freq: 1 }]
        );

        let with_positions =
            read_postings_with_positions(&mut freq, &mut prox, &info_b).unwrap();
        assert_eq!(with_positions.len(), 2);
        assert_eq!(with_positions[0].0, Posting { doc: 3, freq: 1 });
        assert_eq!(with_positions[0].1, vec![0]);
        assert_eq!(with_positions[1].0, Posting { doc: 4, freq: 3 });
        assert_eq!(with_positions[1].1, vec![7, 9, 11]);

        // Reading term A again after B works because pointers are absolute.
        let with_positions =
            read_postings_with_positions(&mut freq, &mut prox, &info_a).unwrap();
        assert_eq!(with_positions[0].1, vec![1, 4]);
        assert_eq!(with_positions[1].1, vec![2]);
    }

    #[test]
    fn test_freq_one_compact_form() {
        let dir = RamDirectory::new();
        let mut writer =
            PostingsWriter::new(dir.create("f").unwrap(), dir.create("p").unwrap());

        writer.start_term();
        writer.add_doc(2, &[0]).unwrap();
        writer.close().unwrap();

        // docDelta 2 with the freq-is-one bit: (2 << 1) | 1 = 5, one byte.
        assert_eq!(dir.read_all("f").unwrap(), vec![5]);
    }

    #[test]
    fn test_out_of_order_doc_rejected() {
        let dir = RamDirectory::new();
        let mut writer =
            PostingsWriter::new(dir.create("f").unwrap(), dir.create("p").unwrap());

        writer.start_term();
        writer.add_doc(4, &[0]).unwrap();
        assert!(writer.add_doc(4, &[0]).is_err());
        assert!(writer.add_doc(1, &[0]).is_err());
    }

    #[test]
    fn test_empty_positions_rejected() {
        let dir = RamDirectory::new();
        let mut writer =
            PostingsWriter::new(dir.create("f").unwrap(), dir.create("p").unwrap());

        writer.start_term();
        assert!(writer.add_doc(0, &[]).is_err());
    }
}
