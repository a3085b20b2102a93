//! Filesystem directory implementation.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::directory::ram::BufferInput;
use crate::directory::{Directory, FileInput, FileOutput};
use crate::error::{LucernaError, Result};

const BUFFER_SIZE: usize = 65536;

/// A directory rooted at a filesystem path.
///
/// Shared reads are served from a per-name cache of file contents (one cached
/// handle per name); non-shared reads always open a fresh OS-level stream
/// with an independent cursor. The cache is invalidated by `delete`, `rename`
/// and `purge`, which also keeps the process clear of descriptor limits
/// during large merges.
#[derive(Debug)]
pub struct FsDirectory {
    root: PathBuf,
    cache: Mutex<AHashMap<String, Arc<Vec<u8>>>>,
}

impl FsDirectory {
    /// Open (creating if necessary) a directory at the given path.
    pub fn open<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();

        if !root.exists() {
            fs::create_dir_all(&root).map_err(|e| {
                LucernaError::runtime(format!("Failed to create directory: {e}"))
            })?;
        }
        if !root.is_dir() {
            return Err(LucernaError::invalid_argument(format!(
                "Path is not a directory: {}",
                root.display()
            )));
        }

        Ok(FsDirectory {
            root,
            cache: Mutex::new(AHashMap::new()),
        })
    }

    /// Filesystem path of this directory.
    pub fn path(&self) -> &Path {
        &self.root
    }

    fn file_path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn invalidate(&self, name: &str) {
        self.cache.lock().remove(name);
    }
}

impl Directory for FsDirectory {
    fn list(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root)? {
            let entry = entry?;
            if entry.path().is_file() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }

    fn exists(&self, name: &str) -> bool {
        self.file_path(name).is_file()
    }

    fn length(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|_| LucernaError::not_readable(name))?;
        Ok(metadata.len())
    }

    fn mtime(&self, name: &str) -> Result<u64> {
        let metadata = self
            .file_path(name)
            .metadata()
            .map_err(|_| LucernaError::not_readable(name))?;
        let modified = metadata
            .modified()
            .unwrap_or(UNIX_EPOCH)
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        Ok(modified)
    }

    fn touch(&self, name: &str) -> Result<()> {
        let file = OpenOptions::new()
            .append(true)
            .open(self.file_path(name))
            .map_err(|_| LucernaError::not_readable(name))?;
        file.set_modified(SystemTime::now())?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.invalidate(name);
        let path = self.file_path(name);
        if path.exists() {
            fs::remove_file(&path)
                .map_err(|e| LucernaError::runtime(format!("Failed to delete {name}: {e}")))?;
        }
        Ok(())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.invalidate(from);
        self.invalidate(to);
        fs::rename(self.file_path(from), self.file_path(to))
            .map_err(|e| LucernaError::runtime(format!("Failed to rename {from}: {e}")))?;
        Ok(())
    }

    fn create(&self, name: &str) -> Result<Box<dyn FileOutput>> {
        self.invalidate(name);
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(self.file_path(name))?;
        Ok(Box::new(FsOutput::new(file)))
    }

    fn create_atomic(&self, name: &str, contents: &[u8]) -> Result<bool> {
        match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(self.file_path(name))
        {
            Ok(mut file) => {
                file.write_all(contents)?;
                file.sync_all()?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_all(&self, name: &str) -> Result<Vec<u8>> {
        fs::read(self.file_path(name)).map_err(|_| LucernaError::not_readable(name))
    }

    fn open_input(&self, name: &str, shared: bool) -> Result<Box<dyn FileInput>> {
        if shared {
            let mut cache = self.cache.lock();
            if let Some(data) = cache.get(name) {
                return Ok(Box::new(BufferInput::new(data.clone())));
            }
            let data = Arc::new(
                fs::read(self.file_path(name)).map_err(|_| LucernaError::not_readable(name))?,
            );
            cache.insert(name.to_string(), data.clone());
            return Ok(Box::new(BufferInput::new(data)));
        }

        let file =
            File::open(self.file_path(name)).map_err(|_| LucernaError::not_readable(name))?;
        Ok(Box::new(FsInput::new(self.file_path(name), file)?))
    }

    fn purge(&self, name: &str) {
        self.invalidate(name);
    }

    fn close(&self) -> Result<()> {
        self.cache.lock().clear();
        Ok(())
    }
}

/// A buffered reader over one file, reopenable for independent cursors.
#[derive(Debug)]
pub struct FsInput {
    path: PathBuf,
    reader: BufReader<File>,
    size: u64,
}

impl FsInput {
    fn new(path: PathBuf, file: File) -> Result<Self> {
        let size = file.metadata()?.len();
        Ok(FsInput {
            path,
            reader: BufReader::with_capacity(BUFFER_SIZE, file),
            size,
        })
    }
}

impl Read for FsInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.reader.read(buf)
    }
}

impl Seek for FsInput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        self.reader.seek(pos)
    }
}

impl FileInput for FsInput {
    fn size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn clone_input(&self) -> Result<Box<dyn FileInput>> {
        let file = File::open(&self.path)
            .map_err(|_| LucernaError::not_readable(self.path.display().to_string()))?;
        Ok(Box::new(FsInput::new(self.path.clone(), file)?))
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// A buffered writer over one file.
#[derive(Debug)]
pub struct FsOutput {
    writer: BufWriter<File>,
    position: u64,
}

impl FsOutput {
    fn new(file: File) -> Self {
        FsOutput {
            writer: BufWriter::with_capacity(BUFFER_SIZE, file),
            position: 0,
        }
    }
}

impl Write for FsOutput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.writer.write(buf)?;
        self.position += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

impl Seek for FsOutput {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let new_pos = self.writer.seek(pos)?;
        self.position = new_pos;
        Ok(new_pos)
    }
}

impl FileOutput for FsOutput {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn position(&self) -> Result<u64> {
        Ok(self.position)
    }

    fn close(&mut self) -> Result<()> {
        self.flush_and_sync()
    }
}
