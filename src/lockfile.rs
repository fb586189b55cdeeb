//! Output-directory lock file.
//!
//! Two engine runs writing the same output directory would interleave
//! checkpoint writes, so the directory is claimed with a lock file holding
//! the process identity and start time. A lock whose process is no longer
//! alive is treated as stale and removed.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

/// Lock acquisition errors.
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    #[error(
        "another engine run (PID {pid}, started {started_at}) owns {path}; \
         stop it or remove the lock file"
    )]
    AlreadyLocked {
        pid: u32,
        started_at: String,
        path: PathBuf,
    },
    #[error("lock file i/o at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Exclusive claim on an output directory.
///
/// The lock file contains one line: `<pid> <start time, RFC 3339>`.
/// Released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    lock_path: PathBuf,
    owned: bool,
}

impl ProcessLock {
    pub const LOCK_FILE_NAME: &'static str = ".orthotune.lock";

    /// Acquire the lock for an output directory, creating the directory
    /// if needed. Fails if a live engine process already holds it.
    pub fn acquire(output_dir: &Path) -> Result<Self, LockError> {
        fs::create_dir_all(output_dir).map_err(|source| LockError::Io {
            path: output_dir.to_path_buf(),
            source,
        })?;

        let lock_path = output_dir.join(Self::LOCK_FILE_NAME);

        if lock_path.exists() {
            match Self::read_live_owner(&lock_path) {
                Ok(Some((pid, started_at))) => {
                    return Err(LockError::AlreadyLocked {
                        pid,
                        started_at,
                        path: lock_path,
                    });
                }
                Ok(None) => {
                    info!(path = %lock_path.display(), "removing stale lock from previous run");
                    fs::remove_file(&lock_path).map_err(|source| LockError::Io {
                        path: lock_path.clone(),
                        source,
                    })?;
                }
                Err(e) => {
                    warn!(error = %e, "unreadable lock file, replacing it");
                    let _ = fs::remove_file(&lock_path);
                }
            }
        }

        let pid = std::process::id();
        let started_at = chrono::Utc::now().to_rfc3339();
        let mut file = File::create(&lock_path).map_err(|source| LockError::Io {
            path: lock_path.clone(),
            source,
        })?;
        writeln!(file, "{pid} {started_at}").map_err(|source| LockError::Io {
            path: lock_path.clone(),
            source,
        })?;

        debug!(pid, path = %lock_path.display(), "acquired output directory lock");
        Ok(Self {
            lock_path,
            owned: true,
        })
    }

    /// Parse an existing lock and check whether its owner is still alive.
    /// `Ok(None)` means the lock is stale.
    fn read_live_owner(lock_path: &Path) -> Result<Option<(u32, String)>, std::io::Error> {
        let contents = fs::read_to_string(lock_path)?;
        let mut parts = contents.split_whitespace();
        let pid: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::InvalidData, "no PID"))?;
        let started_at = parts.next().unwrap_or("unknown").to_string();

        if Self::is_process_running(pid) {
            Ok(Some((pid, started_at)))
        } else {
            Ok(None)
        }
    }

    #[cfg(unix)]
    fn is_process_running(pid: u32) -> bool {
        // /proc tells us both liveness and whether the PID was recycled
        // by an unrelated program.
        let proc_path = format!("/proc/{pid}/cmdline");
        match fs::read_to_string(&proc_path) {
            Ok(cmdline) => cmdline.contains("orthotune"),
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    fn is_process_running(_pid: u32) -> bool {
        // Without /proc, assume the owner may still be alive.
        true
    }

    /// Release the lock (also called on drop).
    pub fn release(&mut self) {
        if self.owned {
            if let Err(e) = fs::remove_file(&self.lock_path) {
                warn!(error = %e, "failed to remove lock file");
            } else {
                debug!(path = %self.lock_path.display(), "released output directory lock");
            }
            self.owned = false;
        }
    }

    pub fn path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        self.release();
    }
}
