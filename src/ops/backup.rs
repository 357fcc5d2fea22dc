use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};

/// `.bak` copy of a file that is about to be rewritten.
///
/// Restored over the original when dropped, unless [`commit`](Self::commit)
/// was called.
pub struct BackupGuard {
    original: PathBuf,
    backup: PathBuf,
    armed: bool,
}

impl BackupGuard {
    /// `archive.ipf` -> `archive.ipf.bak`
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = path.file_name().map(OsString::from).unwrap_or_default();
        name.push(".bak");
        path.with_file_name(name)
    }

    pub fn create(path: &Path) -> io::Result<Self> {
        let backup = Self::backup_path(path);
        std::fs::copy(path, &backup)?;
        debug!(backup = %backup.display(), "backup created");
        Ok(Self {
            original: path.to_path_buf(),
            backup,
            armed: true,
        })
    }

    pub fn path(&self) -> &Path {
        &self.backup
    }

    /// The rewrite succeeded: drop the backup.
    pub fn commit(mut self) -> io::Result<()> {
        self.armed = false;
        std::fs::remove_file(&self.backup)
    }
}

impl Drop for BackupGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        warn!(original = %self.original.display(), "restoring backup");
        if let Err(e) = std::fs::rename(&self.backup, &self.original) {
            error!(error = %e, backup = %self.backup.display(), "could not restore backup");
        }
    }
}
