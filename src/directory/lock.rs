//! Cross-process read/write lock coordination over a directory.
//!
//! Two logical locks protect an index directory: a shared, reference-counted
//! read lock held for the lifetime of every open index, and an exclusive
//! write lock held by the writer across any mutation of the segments file or
//! segment-file deletions. Both are realised as marker files carrying the
//! owner PID, so a crashed process leaves a lock that the next acquisition
//! can detect as stale and break.

use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::directory::Directory;
use crate::error::{LucernaError, Result};

/// Name of the exclusive write-lock file.
pub const WRITE_LOCK_NAME: &str = "write.lock";

/// Distinguishes the read-lock markers of several indexes opened by one
/// process on the same directory.
static READ_LOCK_SEQ: AtomicU64 = AtomicU64::new(0);

fn read_lock_name(pid: u32, seq: u64) -> String {
    format!("read-{pid}-{seq}.lock")
}

/// Whether the process that wrote the given lock contents is still alive.
///
/// Lock files store the owner PID in decimal. Unparseable contents are
/// treated as live so a half-written lock is never broken by mistake.
fn owner_alive(contents: &[u8]) -> bool {
    let text = match std::str::from_utf8(contents) {
        Ok(text) => text.trim(),
        Err(_) => return true,
    };
    let pid: u32 = match text.parse() {
        Ok(pid) => pid,
        Err(_) => return true,
    };
    if pid == process::id() {
        return true;
    }
    #[cfg(target_os = "linux")]
    {
        std::path::Path::new(&format!("/proc/{pid}")).exists()
    }
    #[cfg(not(target_os = "linux"))]
    {
        true
    }
}

/// The exclusive write lock for one index directory.
///
/// Released on [`WriteLock::release`] or on drop.
#[derive(Debug)]
pub struct WriteLock {
    directory: Arc<dyn Directory>,
    released: bool,
}

impl WriteLock {
    /// Try to obtain the exclusive write lock.
    ///
    /// A lock file whose owner process no longer exists is broken and
    /// reacquired. Contention yields
    /// `Runtime("Can't obtain exclusive index lock")`.
    pub fn obtain(directory: Arc<dyn Directory>) -> Result<Self> {
        let pid = process::id().to_string();

        if directory.create_atomic(WRITE_LOCK_NAME, pid.as_bytes())? {
            return Ok(WriteLock {
                directory,
                released: false,
            });
        }

        // Stale-lock recovery: break locks left behind by dead processes.
        if let Ok(contents) = directory.read_all(WRITE_LOCK_NAME) {
            if !owner_alive(&contents) {
                directory.delete(WRITE_LOCK_NAME)?;
                if directory.create_atomic(WRITE_LOCK_NAME, pid.as_bytes())? {
                    return Ok(WriteLock {
                        directory,
                        released: false,
                    });
                }
            }
        }

        Err(LucernaError::runtime("Can't obtain exclusive index lock"))
    }

    /// Release the lock, deleting its marker file.
    pub fn release(&mut self) -> Result<()> {
        if !self.released {
            self.directory.delete(WRITE_LOCK_NAME)?;
            self.released = true;
        }
        Ok(())
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        let _ = self.release();
    }
}

#[derive(Debug)]
struct ReadLockInner {
    directory: Arc<dyn Directory>,
    name: String,
}

impl Drop for ReadLockInner {
    fn drop(&mut self) {
        let _ = self.directory.delete(&self.name);
    }
}

/// The shared read lock for one index directory.
///
/// Every obtain creates its own marker file, so several open indexes (and
/// several processes) coexist; cloning shares one marker, reference-counted,
/// removed when the last clone drops.
#[derive(Debug, Clone)]
pub struct ReadLock {
    inner: Arc<ReadLockInner>,
}

impl ReadLock {
    /// Obtain a shared read lock.
    pub fn obtain(directory: Arc<dyn Directory>) -> Result<Self> {
        let seq = READ_LOCK_SEQ.fetch_add(1, Ordering::Relaxed);
        let name = read_lock_name(process::id(), seq);
        directory.create_atomic(&name, process::id().to_string().as_bytes())?;
        Ok(ReadLock {
            inner: Arc::new(ReadLockInner { directory, name }),
        })
    }

    /// Name of this lock's marker file.
    pub fn name(&self) -> &str {
        &self.inner.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::RamDirectory;

    fn ram() -> Arc<dyn Directory> {
        Arc::new(RamDirectory::new())
    }

    #[test]
    fn test_write_lock_exclusive() {
        let dir = ram();

        let lock = WriteLock::obtain(dir.clone()).unwrap();
        let err = WriteLock::obtain(dir.clone()).unwrap_err();
        assert_eq!(err.to_string(), "Can't obtain exclusive index lock");

        drop(lock);
        let _relock = WriteLock::obtain(dir).unwrap();
    }

    #[test]
    fn test_write_lock_release_is_idempotent() {
        let dir = ram();

        let mut lock = WriteLock::obtain(dir.clone()).unwrap();
        lock.release().unwrap();
        lock.release().unwrap();
        assert!(!dir.exists(WRITE_LOCK_NAME));
    }

    #[test]
    fn test_stale_lock_is_broken() {
        let dir = ram();

        // A lock owned by a PID that cannot exist on this system.
        dir.create_atomic(WRITE_LOCK_NAME, b"4194304999").unwrap();

        #[cfg(target_os = "linux")]
        {
            let _lock = WriteLock::obtain(dir.clone()).unwrap();
            assert!(dir.exists(WRITE_LOCK_NAME));
        }
    }

    #[test]
    fn test_read_lock_refcounted() {
        let dir = ram();

        let first = ReadLock::obtain(dir.clone()).unwrap();
        let name = first.name().to_string();
        let second = first.clone();
        assert!(dir.exists(&name));

        drop(first);
        assert!(dir.exists(&name));

        drop(second);
        assert!(!dir.exists(&name));
    }

    #[test]
    fn test_independent_read_locks() {
        let dir = ram();

        let first = ReadLock::obtain(dir.clone()).unwrap();
        let second = ReadLock::obtain(dir.clone()).unwrap();
        assert_ne!(first.name(), second.name());

        drop(first);
        assert!(dir.exists(second.name()));
    }
}
