//! Rewriting an archive without superseded entries.
//!
//! The optimized archive keeps the newest copy of every file, in ascending
//! index order, with payload bytes copied verbatim from the source.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, warn};

use super::backup::BackupGuard;
use super::load_entries;
use crate::config::{MAX_WORKERS, Password};
use crate::error::IpfError;
use crate::ipf::{ArchiveEntry, IpfReader, WriteOptions, dedupe, write_archive};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OptimizeReport {
    pub total_files: usize,
    pub unique_files: usize,
    pub removed_duplicates: usize,
    /// Entries dropped because their local header was unreadable.
    pub skipped_invalid: usize,
    pub original_size: u64,
    pub optimized_size: u64,
}

impl OptimizeReport {
    pub fn saved_bytes(&self) -> u64 {
        self.original_size.saturating_sub(self.optimized_size)
    }
}

/// Write the optimized form of `input` to `output`, leaving `input` untouched.
pub async fn optimize_to(input: &Path, output: &Path, password: &Password) -> Result<OptimizeReport> {
    let reader = IpfReader::open(input).with_context(|| format!("cannot open {}", input.display()))?;
    let original_size = reader.size();
    let (entries, _) = load_entries(&reader, password, MAX_WORKERS).await?;
    drop(reader);

    let (valid, invalid): (Vec<ArchiveEntry>, Vec<ArchiveEntry>) =
        entries.into_iter().partition(ArchiveEntry::is_valid);
    if !invalid.is_empty() {
        warn!(skipped = invalid.len(), "dropping entries with unreadable local headers");
    }
    if valid.is_empty() {
        bail!(IpfError::NoEntries);
    }

    let outcome = dedupe(&valid);
    let retained = outcome.retained;
    let source_path = input.to_path_buf();
    let output_path = output.to_path_buf();
    let summary = tokio::task::spawn_blocking(move || {
        let mut source = BufReader::new(File::open(&source_path)?);
        write_archive(&retained, &mut source, &output_path, &WriteOptions::optimized())
    })
    .await??;

    let report = OptimizeReport {
        total_files: outcome.total_files,
        unique_files: outcome.unique_files,
        removed_duplicates: outcome.removed_duplicates,
        skipped_invalid: invalid.len(),
        original_size,
        optimized_size: summary.total_size,
    };
    info!(
        unique = report.unique_files,
        removed = report.removed_duplicates,
        saved = report.saved_bytes(),
        "archive optimized"
    );
    Ok(report)
}

/// Optimize `input` in place.
///
/// The new archive is built in a temporary file next to `input` and moved
/// over it only once complete. With `make_backup`, a `.bak` copy exists for
/// the duration of the rewrite and is restored if anything fails.
pub async fn optimize(input: &Path, make_backup: bool, password: &Password) -> Result<OptimizeReport> {
    let backup = if make_backup {
        Some(BackupGuard::create(input).with_context(|| format!("cannot back up {}", input.display()))?)
    } else {
        None
    };

    let dir = match input.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temp = tempfile::Builder::new()
        .prefix(".ripf-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .with_context(|| format!("cannot create a temporary file in {}", dir.display()))?;

    let report = optimize_to(input, temp.path(), password).await?;
    temp.persist(input).map_err(|e| e.error)?;

    if let Some(backup) = backup {
        discard_backup(backup);
    }
    Ok(report)
}

/// The new archive is already in place; a leftover `.bak` is not a failure.
fn discard_backup(backup: BackupGuard) {
    let path = backup.path().to_path_buf();
    if let Err(e) = backup.commit() {
        warn!(error = %e, backup = %path.display(), "could not remove backup");
    }
}
