use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Advisory lock serializing writes to the snapshot files of one workspace.
///
/// Held for the duration of a single store write; two `ot` processes editing
/// the same org/ directory take turns. The lock file itself is never removed:
/// every writer must lock the same inode.
pub struct StoreLock {
    _file: File,
}

/// Error type for lock operations
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error("could not create lock file at {path}: {source}")]
    CreateError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("timed out waiting for {path}: another orgtree process may be writing")]
    Timeout { path: PathBuf },
}

/// Path of the lock file inside an org/ directory
pub fn lock_path(org_dir: &Path) -> PathBuf {
    org_dir.join(".lock")
}

impl StoreLock {
    /// Wait up to `timeout` for the workspace lock.
    pub fn acquire(org_dir: &Path, timeout: Duration) -> Result<Self, LockError> {
        let path = lock_path(org_dir);
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| LockError::CreateError {
                path: path.clone(),
                source: e,
            })?;

        let start = Instant::now();
        while try_lock(&file).is_err() {
            if start.elapsed() >= timeout {
                return Err(LockError::Timeout { path });
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        Ok(StoreLock { _file: file })
    }
}

#[cfg(unix)]
fn try_lock(file: &File) -> Result<(), std::io::Error> {
    use std::os::unix::io::AsRawFd;
    let result = unsafe { libc::flock(file.as_raw_fd(), libc::LOCK_EX | libc::LOCK_NB) };
    if result == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}

#[cfg(not(unix))]
fn try_lock(_file: &File) -> Result<(), std::io::Error> {
    Ok(())
}
