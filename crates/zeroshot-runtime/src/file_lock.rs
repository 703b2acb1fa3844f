//! Advisory file locking for the cluster registry.
//!
//! The registry file is shared between the orchestrator process and any
//! observers (TUI, CLI listings). Writers take an exclusive `flock` on a
//! `.lock` sibling; readers take a shared one. Locking the sibling instead
//! of the registry file itself keeps truncation/rename replacement safe.
//!
//! Locks are RAII guards released on drop. On non-Unix targets locking is a
//! no-op; single-process use is still correct there.

use std::fs::{File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// A lock for coordinating access to one shared file.
#[derive(Debug)]
pub struct FileLock {
    lock_path: PathBuf,
}

impl FileLock {
    /// Create a lock for the given target file.
    ///
    /// The lock file lives at `{path}.lock`; parent directories are created
    /// as needed.
    pub fn new(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref();
        let mut name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        name.push_str(".lock");
        let lock_path = path.with_file_name(name);

        if let Some(parent) = lock_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { lock_path })
    }

    /// Acquire a shared (read) lock, blocking until available.
    pub fn shared(&self) -> io::Result<LockGuard> {
        self.acquire(LockKind::Shared)
    }

    /// Acquire an exclusive (write) lock, blocking until available.
    pub fn exclusive(&self) -> io::Result<LockGuard> {
        self.acquire(LockKind::Exclusive)
    }

    /// Acquire an exclusive lock with bounded retry.
    ///
    /// Tries up to `attempts` times with `delay` between tries; the final
    /// attempt blocks. Writers under contention get a fair shot without
    /// spinning forever.
    pub fn exclusive_with_retry(&self, attempts: u32, delay: Duration) -> io::Result<LockGuard> {
        for _ in 1..attempts {
            match self.try_acquire(LockKind::Exclusive)? {
                Some(guard) => return Ok(guard),
                None => std::thread::sleep(delay),
            }
        }
        self.acquire(LockKind::Exclusive)
    }

    fn open_lock_file(&self) -> io::Result<File> {
        OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&self.lock_path)
    }

    #[cfg(unix)]
    fn acquire(&self, kind: LockKind) -> io::Result<LockGuard> {
        use nix::fcntl::{Flock, FlockArg};

        let file = self.open_lock_file()?;
        let arg = match kind {
            LockKind::Shared => FlockArg::LockShared,
            LockKind::Exclusive => FlockArg::LockExclusive,
        };
        match Flock::lock(file, arg) {
            Ok(flock) => Ok(LockGuard {
                _flock: Some(flock),
            }),
            Err((_, errno)) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("flock failed: {errno}"),
            )),
        }
    }

    #[cfg(unix)]
    fn try_acquire(&self, kind: LockKind) -> io::Result<Option<LockGuard>> {
        use nix::errno::Errno;
        use nix::fcntl::{Flock, FlockArg};

        let file = self.open_lock_file()?;
        let arg = match kind {
            LockKind::Shared => FlockArg::LockSharedNonblock,
            LockKind::Exclusive => FlockArg::LockExclusiveNonblock,
        };
        match Flock::lock(file, arg) {
            Ok(flock) => Ok(Some(LockGuard {
                _flock: Some(flock),
            })),
            Err((_, Errno::EWOULDBLOCK)) => Ok(None),
            Err((_, errno)) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("flock failed: {errno}"),
            )),
        }
    }

    #[cfg(not(unix))]
    fn acquire(&self, _kind: LockKind) -> io::Result<LockGuard> {
        let _ = self.open_lock_file()?;
        Ok(LockGuard {})
    }

    #[cfg(not(unix))]
    fn try_acquire(&self, kind: LockKind) -> io::Result<Option<LockGuard>> {
        self.acquire(kind).map(Some)
    }
}

#[derive(Clone, Copy, Debug)]
enum LockKind {
    Shared,
    Exclusive,
}

/// Held lock; released on drop.
#[derive(Debug)]
pub struct LockGuard {
    #[cfg(unix)]
    _flock: Option<nix::fcntl::Flock<File>>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
