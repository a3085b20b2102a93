//! Compound-file container (`.cfs`).
//!
//! A compound file is a virtual filesystem layered onto a single file: a
//! VInt sub-file count, then one `{ i64 dataOffset, String subName }` header
//! record per sub-file in write order, then the concatenated sub-file
//! bodies. Sub-file lengths are implicit: each runs to the next offset, the
//! last to the end of the container.

use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

use crate::directory::{Directory, FileInput};
use crate::error::{LucernaError, Result};
use crate::store::stream::{encoded_string_len, encoded_vint_len, StreamReader, StreamWriter};

/// Reader side of a compound file: name → bounded sub-stream.
#[derive(Debug)]
pub struct CompoundFileReader {
    base: Box<dyn FileInput>,
    entries: Vec<(String, u64, u64)>,
}

impl CompoundFileReader {
    /// Open a compound container and parse its header.
    pub fn open(directory: &Arc<dyn Directory>, name: &str) -> Result<Self> {
        let input = directory.open_input(name, false)?;
        let file_size = input.size()?;
        let mut reader = StreamReader::new(input);

        let count = reader.read_vint()? as usize;
        let mut headers = Vec::with_capacity(count);
        for _ in 0..count {
            let offset = reader.read_long()?;
            if offset < 0 {
                return Err(LucernaError::invalid_format(format!(
                    "negative sub-file offset in {name}"
                )));
            }
            let sub_name = reader.read_string()?;
            headers.push((sub_name, offset as u64));
        }

        // Each sub-file runs to the next recorded offset.
        let mut entries = Vec::with_capacity(count);
        for (i, (sub_name, offset)) in headers.iter().enumerate() {
            let end = match headers.get(i + 1) {
                Some((_, next_offset)) => *next_offset,
                None => file_size,
            };
            if end < *offset {
                return Err(LucernaError::invalid_format(format!(
                    "sub-file offsets out of order in {name}"
                )));
            }
            entries.push((sub_name.clone(), *offset, end - offset));
        }

        Ok(CompoundFileReader {
            base: reader.into_inner(),
            entries,
        })
    }

    /// Names of the contained sub-files, in header order.
    pub fn sub_files(&self) -> Vec<&str> {
        self.entries.iter().map(|(name, _, _)| name.as_str()).collect()
    }

    /// Whether a sub-file with the given name exists.
    pub fn contains(&self, sub_name: &str) -> bool {
        self.entries.iter().any(|(name, _, _)| name == sub_name)
    }

    /// Length of a sub-file in bytes.
    pub fn sub_file_length(&self, sub_name: &str) -> Result<u64> {
        self.entries
            .iter()
            .find(|(name, _, _)| name == sub_name)
            .map(|(_, _, len)| *len)
            .ok_or_else(|| LucernaError::not_readable(sub_name))
    }

    /// Open a new stream bounded to one sub-file's byte range.
    ///
    /// Every call yields an independent cursor, so several sub-files (or the
    /// same one twice) can be decoded concurrently.
    pub fn open_sub_file(&self, sub_name: &str) -> Result<Box<dyn FileInput>> {
        let (_, offset, length) = self
            .entries
            .iter()
            .find(|(name, _, _)| name == sub_name)
            .ok_or_else(|| LucernaError::not_readable(sub_name))?;

        let mut base = self.base.clone_input()?;
        base.seek(SeekFrom::Start(*offset))?;
        Ok(Box::new(BoundedInput {
            base,
            start: *offset,
            length: *length,
            position: 0,
        }))
    }
}

/// A stream restricted to one `(offset, length)` window of a larger stream.
#[derive(Debug)]
struct BoundedInput {
    base: Box<dyn FileInput>,
    start: u64,
    length: u64,
    position: u64,
}

impl Read for BoundedInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.length.saturating_sub(self.position);
        if remaining == 0 {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(remaining) as usize;
        let read = self.base.read(&mut buf[..n])?;
        self.position += read as u64;
        Ok(read)
    }
}

impl Seek for BoundedInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => self.length as i64 + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of sub-file",
            ));
        }
        self.position = new_pos as u64;
        self.base.seek(SeekFrom::Start(self.start + self.position))?;
        Ok(self.position)
    }
}

impl FileInput for BoundedInput {
    fn size(&self) -> Result<u64> {
        Ok(self.length)
    }

    fn clone_input(&self) -> Result<Box<dyn FileInput>> {
        let mut base = self.base.clone_input()?;
        base.seek(SeekFrom::Start(self.start))?;
        Ok(Box::new(BoundedInput {
            base,
            start: self.start,
            length: self.length,
            position: 0,
        }))
    }

    fn close(&mut self) -> Result<()> {
        self.base.close()
    }
}

/// Writer side: packs existing directory files into one `.cfs` container.
#[derive(Debug)]
pub struct CompoundFileWriter {
    directory: Arc<dyn Directory>,
    name: String,
    sub_files: Vec<String>,
}

impl CompoundFileWriter {
    /// Start a compound container with the given file name.
    pub fn new(directory: Arc<dyn Directory>, name: &str) -> Self {
        CompoundFileWriter {
            directory,
            name: name.to_string(),
            sub_files: Vec::new(),
        }
    }

    /// Schedule one directory file for packing.
    pub fn add_file(&mut self, sub_name: &str) -> Result<()> {
        if self.sub_files.iter().any(|name| name == sub_name) {
            return Err(LucernaError::invalid_argument(format!(
                "sub-file {sub_name} added twice"
            )));
        }
        self.sub_files.push(sub_name.to_string());
        Ok(())
    }

    /// Write the container. Sub-file bodies are copied from the directory;
    /// the source files are left in place for the caller to delete.
    pub fn finish(self) -> Result<()> {
        let mut lengths = Vec::with_capacity(self.sub_files.len());
        for sub_name in &self.sub_files {
            lengths.push(self.directory.length(sub_name)?);
        }

        // Header size is knowable up front, which fixes every data offset.
        let mut header_len = encoded_vint_len(self.sub_files.len() as u32);
        for sub_name in &self.sub_files {
            header_len += 8 + encoded_string_len(sub_name);
        }

        let mut writer = StreamWriter::new(self.directory.create(&self.name)?);
        writer.write_vint(self.sub_files.len() as u32)?;

        let mut offset = header_len;
        for (sub_name, length) in self.sub_files.iter().zip(&lengths) {
            writer.write_long(offset as i64)?;
            writer.write_string(sub_name)?;
            offset += length;
        }

        let mut copy_buf = vec![0u8; 65536];
        for sub_name in &self.sub_files {
            let mut input = self.directory.open_input(sub_name, false)?;
            loop {
                let read = input.read(&mut copy_buf)?;
                if read == 0 {
                    break;
                }
                writer.write_bytes(&copy_buf[..read])?;
            }
        }

        writer.close()
    }
}
