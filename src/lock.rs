//! Exclusive project-root lock.
//!
//! The on-disk state under a project root is a single-writer resource: an
//! advisory lock file at a well-known path, with stale-lock recovery past
//! a threshold, acquired at startup and removed on `Drop`.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Error;

/// A lock is considered abandoned (and silently reclaimed) once it is
/// older than this.
const STALE_LOCK_THRESHOLD: Duration = Duration::from_secs(3600);

/// RAII guard for `.state/.lock`. Held for the lifetime of a `Core`
/// instance; the lock file is removed on `Drop`.
pub struct ProjectLock {
    path: PathBuf,
}

impl ProjectLock {
    /// Acquire the lock at `<project_root>/.state/.lock`, reclaiming a
    /// stale one if it is older than an hour.
    pub fn acquire(state_dir: &Path) -> Result<Self, Error> {
        fs::create_dir_all(state_dir)?;
        let path = state_dir.join(".lock");

        if path.exists() {
            if let Ok(metadata) = fs::metadata(&path) {
                if let Ok(modified) = metadata.modified() {
                    if let Ok(elapsed) = modified.elapsed() {
                        if elapsed > STALE_LOCK_THRESHOLD {
                            tracing::warn!("removing stale project lock at {:?}", path);
                            let _ = fs::remove_file(&path);
                        } else {
                            return Err(Error::Locked(path.display().to_string()));
                        }
                    }
                }
            } else {
                return Err(Error::Locked(path.display().to_string()));
            }
        }

        File::create(&path)?;
        Ok(Self { path })
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        if self.path.exists() {
            if let Err(e) = fs::remove_file(&self.path) {
                tracing::warn!("failed to remove project lock {:?}: {e}", self.path);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_then_drop_removes_the_lock_file() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join(".lock");
        {
            let _guard = ProjectLock::acquire(dir.path()).unwrap();
            assert!(lock_path.exists());
        }
        assert!(!lock_path.exists());
    }

    #[test]
    fn second_acquire_while_held_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let _first = ProjectLock::acquire(dir.path()).unwrap();
        let second = ProjectLock::acquire(dir.path());
        assert!(matches!(second, Err(Error::Locked(_))));
    }
}
