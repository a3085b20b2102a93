//! In-memory directory implementation.
//!
//! Every file is an owned byte buffer; streams over it present exactly the
//! same API as filesystem streams, so index files written here are
//! byte-identical to their on-disk counterparts.

use std::io::{self, Read, Seek, SeekFrom, Write};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::directory::{Directory, FileInput, FileOutput};
use crate::error::{LucernaError, Result};

#[derive(Debug, Clone)]
struct RamFile {
    data: Arc<Vec<u8>>,
    mtime: u64,
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A directory holding all of its files in memory.
#[derive(Debug, Default)]
pub struct RamDirectory {
    files: Arc<Mutex<AHashMap<String, RamFile>>>,
}

impl RamDirectory {
    /// Create a new, empty in-memory directory.
    pub fn new() -> Self {
        RamDirectory::default()
    }

    fn file(&self, name: &str) -> Result<RamFile> {
        self.files
            .lock()
            .get(name)
            .cloned()
            .ok_or_else(|| LucernaError::not_readable(name))
    }
}

impl Directory for RamDirectory {
    fn list(&self) -> Result<Vec<String>> {
        let mut names: Vec<String> = self.files.lock().keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.files.lock().contains_key(name)
    }

    fn length(&self, name: &str) -> Result<u64> {
        Ok(self.file(name)?.data.len() as u64)
    }

    fn mtime(&self, name: &str) -> Result<u64> {
        Ok(self.file(name)?.mtime)
    }

    fn touch(&self, name: &str) -> Result<()> {
        let mut files = self.files.lock();
        match files.get_mut(name) {
            Some(file) => {
                file.mtime = now_secs();
                Ok(())
            }
            None => Err(LucernaError::not_readable(name)),
        }
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.files.lock().remove(name);
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        let mut files = self.files.lock();
        match files.remove(from) {
            Some(file) => {
                files.insert(to.to_string(), file);
                Ok(())
            }
            None => Err(LucernaError::not_readable(from)),
        }
    }

    fn create(&self, name: &str) -> Result<Box<dyn FileOutput>> {
        Ok(Box::new(RamOutput::new(
            self.files.clone(),
            name.to_string(),
        )))
    }

    fn create_atomic(&self, name: &str, contents: &[u8]) -> Result<bool> {
        let mut files = self.files.lock();
        if files.contains_key(name) {
            return Ok(false);
        }
        files.insert(
            name.to_string(),
            RamFile {
                data: Arc::new(contents.to_vec()),
                mtime: now_secs(),
            },
        );
        Ok(true)
    }

    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        Ok(self.file(name)?.data.as_ref().clone())
    }

    fn open_input(&self, name: &str, _shared: bool) -> Result<Box<dyn FileInput>> {
        Ok(Box::new(BufferInput::new(self.file(name)?.data)))
    }

    fn purge(&self, _name: &str) {}

    fn close(&self) -> Result<()> {
        Ok(())
    }
}

/// A readable stream over a shared byte buffer.
///
/// Also used by [`FsDirectory`](crate::directory::FsDirectory) to serve
/// shared reads from its handle cache.
#[derive(Debug)]
pub struct BufferInput {
    data: Arc<Vec<u8>>,
    position: u64,
}

impl BufferInput {
    /// Create a stream positioned at the start of the buffer.
    pub fn new(data: Arc<Vec<u8>>) -> Self {
        BufferInput { data, position: 0 }
    }
}

impl Read for BufferInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let pos = self.position.min(self.data.len() as u64) as usize;
        let remaining = &self.data[pos..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n as u64;
        Ok(n)
    }
}

impl Seek for BufferInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.data.len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => len + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of buffer",
            ));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

impl FileInput for BufferInput {
    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn clone_input(&self) -> Result<Box<dyn FileInput>> {
        Ok(Box::new(BufferInput::new(self.data.clone())))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A writable stream building up a buffer, published to the directory map on
/// flush and close.
#[derive(Debug)]
struct RamOutput {
    files: Arc<Mutex<AHashMap<String, RamFile>>>,
    name: String,
    buffer: Vec<u8>,
    position: u64,
}

impl RamOutput {
    fn new(files: Arc<Mutex<AHashMap<String, RamFile>>>, name: String) -> Self {
        RamOutput {
            files,
            name,
            buffer: Vec::new(),
            position: 0,
        }
    }

    fn publish(&self) {
        self.files.lock().insert(
            self.name.clone(),
            RamFile {
                data: Arc::new(self.buffer.clone()),
                mtime: now_secs(),
            },
        );
    }
}

impl Write for RamOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let pos = self.position as usize;
        if pos > self.buffer.len() {
            self.buffer.resize(pos, 0);
        }
        let overlap = (self.buffer.len() - pos).min(buf.len());
        self.buffer[pos..pos + overlap].copy_from_slice(&buf[..overlap]);
        self.buffer.extend_from_slice(&buf[overlap..]);
        self.position += buf.len() as u64;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.publish();
        Ok(())
    }
}

impl Seek for RamOutput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let len = self.buffer.len() as i64;
        let new_pos = match pos {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::Current(offset) => self.position as i64 + offset,
            SeekFrom::End(offset) => len + offset,
        };
        if new_pos < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of buffer",
            ));
        }
        self.position = new_pos as u64;
        Ok(self.position)
    }
}

impl FileOutput for RamOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        self.publish();
        Ok(())
    }
}

impl Drop for RamOutput {
    fn drop(&mut self) {
        self.publish();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_read_file() {
        let dir = RamDirectory::new();

        let mut output = dir.create("test.bin").unwrap();
        output.write_all(b"Hello, World!").unwrap();
        output.close().unwrap();

        let mut input = dir.open_input("test.bin", false).unwrap();
        let mut buffer = Vec::new();
        input.read_to_end(&mut buffer).unwrap();

        assert_eq!(buffer, b"Hello, World!");
        assert_eq!(input.size().unwrap(), 13);
    }

    #[test]
    fn test_file_operations() {
        let dir = RamDirectory::new();

        assert!(!dir.exists("a.bin"));

        let mut output = dir.create("a.bin").unwrap();
        output.write_all(b"content").unwrap();
        output.close().unwrap();

        assert!(dir.exists("a.bin"));
        assert_eq!(dir.length("a.bin").unwrap(), 7);
        assert_eq!(dir.list().unwrap(), vec!["a.bin"]);

        dir.rename("a.bin", "b.bin").unwrap();
        assert!(!dir.exists("a.bin"));
        assert!(dir.exists("b.bin"));

        dir.delete("b.bin").unwrap();
        assert!(!dir.exists("b.bin"));
    }

    #[test]
    fn test_rename_replaces_destination() {
        let dir = RamDirectory::new();

        dir.create("from").unwrap().write_all(b"new").unwrap();
        dir.create("to").unwrap().write_all(b"old").unwrap();

        dir.rename("from", "to").unwrap();
        assert_eq!(dir.read_all("to").unwrap(), b"new");
        assert!(!dir.exists("from"));
    }

    #[test]
    fn test_independent_cursors() {
        let dir = RamDirectory::new();
        dir.create("f").unwrap().write_all(b"abcdef").unwrap();

        let mut first = dir.open_input("f", false).unwrap();
        let mut second = dir.open_input("f", false).unwrap();

        let mut buf = [0u8; 3];
        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");

        second.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");

        first.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"def");
    }

    #[test]
    fn test_create_atomic() {
        let dir = RamDirectory::new();

        assert!(dir.create_atomic("write.lock", b"123").unwrap());
        assert!(!dir.create_atomic("write.lock", b"456").unwrap());
        assert_eq!(dir.read_all("write.lock").unwrap(), b"123");
    }

    #[test]
    fn test_missing_file_is_not_readable() {
        let dir = RamDirectory::new();

        match dir.open_input("missing", false) {
            Err(LucernaError::NotReadable(name)) => assert_eq!(name, "missing"),
            other => panic!("expected NotReadable, got {other:?}"),
        }
    }

    #[test]
    fn test_seek_and_overwrite() {
        let dir = RamDirectory::new();

        let mut output = dir.create("f").unwrap();
        output.write_all(b"aaaaaa").unwrap();
        output.seek(SeekFrom::Start(2)).unwrap();
        output.write_all(b"bb").unwrap();
        output.close().unwrap();

        assert_eq!(dir.read_all("f").unwrap(), b"aabbaa");
    }
}
