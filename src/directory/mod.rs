//! Directory abstraction over a flat namespace of named byte files.
//!
//! A [`Directory`] hands out readable and writable streams for the files that
//! make up an index. Two implementations are provided: [`FsDirectory`] over a
//! filesystem directory and [`RamDirectory`] over owned in-memory buffers.
//! Both produce streams with identical behaviour, which keeps every index
//! file byte-identical regardless of backend.

pub mod fs;
pub mod lock;
pub mod ram;

pub use self::fs::FsDirectory;
pub use self::lock::{ReadLock, WriteLock, WRITE_LOCK_NAME};
pub use self::ram::RamDirectory;

use std::fmt::Debug;
use std::io::{Read, Seek, Write};

use crate::error::Result;

/// A readable byte stream for one index file.
///
/// Streams obtained through [`Directory::open_input`] with `shared = false`
/// always carry an independent cursor; positional decoding opens several
/// cursors into the same file concurrently.
pub trait FileInput: Read + Seek + Send + Debug {
    /// Total size of the stream in bytes.
    fn size(&self) -> Result<u64>;

    /// Open another independent cursor over the same bytes.
    fn clone_input(&self) -> Result<Box<dyn FileInput>>;

    /// Close the stream.
    fn close(&mut self) -> Result<()>;
}

/// A writable byte stream for one index file.
pub trait FileOutput: Write + Seek + Send + Debug {
    /// Flush buffered bytes and sync them to the backing store.
    fn flush_and_sync(&mut self) -> Result<()>;

    /// Current position in the output stream.
    fn position(&self) -> Result<u64>;

    /// Flush, sync and close the stream.
    fn close(&mut self) -> Result<()>;
}

impl FileInput for Box<dyn FileInput> {
    fn size(&self) -> Result<u64> {
        self.as_ref().size()
    }

    fn clone_input(&self) -> Result<Box<dyn FileInput>> {
        self.as_ref().clone_input()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

impl FileOutput for Box<dyn FileOutput> {
    fn flush_and_sync(&mut self) -> Result<()> {
        self.as_mut().flush_and_sync()
    }

    fn position(&self) -> Result<u64> {
        self.as_ref().position()
    }

    fn close(&mut self) -> Result<()> {
        self.as_mut().close()
    }
}

/// A flat, case-sensitive namespace of named byte files.
pub trait Directory: Send + Sync + Debug {
    /// List every file name in the directory, sorted.
    fn list(&self) -> Result<Vec<String>>;

    /// Whether a file with the given name exists.
    fn exists(&self, name: &str) -> bool;

    /// Size of the named file in bytes.
    fn length(&self, name: &str) -> Result<u64>;

    /// Last-modified time of the named file, seconds since the epoch.
    fn mtime(&self, name: &str) -> Result<u64>;

    /// Update the named file's modification time to now.
    fn touch(&self, name: &str) -> Result<()>;

    /// Delete the named file. Deleting a missing file is not an error.
    /// Invalidates any cached shared handle for the name.
    fn delete(&self, name: &str) -> Result<()>;

    /// Rename a file, atomically replacing any existing destination.
    /// Invalidates cached shared handles for both names.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Create (or truncate) the named file and return a writer for it.
    fn create(&self, name: &str) -> Result<Box<dyn FileOutput>>;

    /// Atomically create the named file with the given contents.
    ///
    /// Returns `false` without touching the file if it already exists. This
    /// is the primitive the lock manager builds on.
    fn create_atomic(&self, name: &str, contents: &[u8]) -> Result<bool>;

    /// Read the full contents of the named file.
    fn read_all(&self, name: &str) -> Result<Vec<u8>>;

    /// Open the named file for reading.
    ///
    /// With `shared = true` the read may be served from a per-name cached
    /// handle (one per directory instance); with `shared = false` a fresh
    /// stream with an independent cursor is always returned. A missing or
    /// unopenable file yields [`LucernaError::NotReadable`](crate::error::LucernaError::NotReadable).
    fn open_input(&self, name: &str, shared: bool) -> Result<Box<dyn FileInput>>;

    /// Drop the cached shared handle for one name, if any.
    fn purge(&self, name: &str);

    /// Flush and drop every cached handle.
    fn close(&self) -> Result<()>;
}
