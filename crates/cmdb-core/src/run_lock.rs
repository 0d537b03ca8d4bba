//! At-most-one reconciliation per account and target

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::template::sanitize_identifier;
use crate::{Error, Result};

/// Exclusive advisory lock held for the duration of one pass
///
/// Released when dropped.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    /// Take the lock without blocking
    ///
    /// Returns [`Error::RunInProgress`] when another run holds it.
    pub fn acquire(state_dir: &Path, account: &str, target: &str) -> Result<Self> {
        let dir = state_dir.join("locks");
        fs::create_dir_all(&dir)?;
        let path = dir.join(format!(
            "{}-{}.lock",
            sanitize_identifier(account),
            sanitize_identifier(target)
        ));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        if let Err(e) = FileExt::try_lock_exclusive(&file) {
            if e.kind() == ErrorKind::WouldBlock
                || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
            {
                return Err(Error::RunInProgress {
                    account: account.to_string(),
                    target: target.to_string(),
                });
            }
            return Err(e.into());
        }

        tracing::debug!(path = %path.display(), "Run lock acquired");
        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to release run lock");
        }
    }
}
