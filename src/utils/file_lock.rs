use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, warn};

use crate::{LibraryError, Result};

const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Inter-process exclusive lock: an OS advisory lock on a lock file.
///
/// The file itself stays on disk. The operating system releases the lock when
/// the holder exits, so a crashed process never leaves the library locked.
#[derive(Debug)]
pub struct FileLock {
    path: PathBuf,
    file: File,
}

impl FileLock {
    /// Lock `path`, retrying until `timeout` elapses.
    pub fn acquire(path: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        let deadline = Instant::now() + timeout;
        let mut waited = false;
        loop {
            match file.try_lock() {
                Ok(()) => {
                    debug!("Acquired lock {}", path.display());
                    return Ok(Self { path, file });
                }
                Err(TryLockError::WouldBlock) => {
                    if Instant::now() >= deadline {
                        return Err(LibraryError::LockContention(path));
                    }
                    if !waited {
                        warn!("Waiting for lock {}", path.display());
                        waited = true;
                    }
                    thread::sleep(POLL_INTERVAL);
                }
                Err(TryLockError::Error(e)) => return Err(e.into()),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(e) = self.file.unlock() {
            warn!("Failed to release lock {}: {}", self.path.display(), e);
        }
    }
}
