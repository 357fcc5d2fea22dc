//! Archive-level operations: the library surface the CLI drives.
//!
//! Each operation starts from a path and ends with files on disk or a
//! rewritten archive. Per-entry failures are reported as data; anything
//! that invalidates the whole archive is returned as an error.

pub mod backup;
pub mod create;
pub mod extract;
pub mod list;
pub mod optimize;

use anyhow::Result;
use tracing::info;

use crate::config::{Password, effective_workers};
use crate::io::ReadAt;
use crate::ipf::{ArchiveEntry, IpfReader, ScanTally, decrypt_filenames};

/// Scan an archive, read its local headers and decrypt every name.
pub async fn load_entries<R: ReadAt + 'static>(
    reader: &IpfReader<R>,
    password: &Password,
    workers: usize,
) -> Result<(Vec<ArchiveEntry>, ScanTally)> {
    let mut entries = reader.scan_structure().await?;
    let tally = reader.read_filenames(&mut entries).await;

    let password = *password;
    let workers = effective_workers(workers);
    let (entries, stats) = tokio::task::spawn_blocking(move || {
        let stats = decrypt_filenames(&mut entries, &password, workers);
        (entries, stats)
    })
    .await?;

    info!(
        entries = entries.len(),
        decoded = stats.decoded,
        fallback = stats.fallback,
        "archive loaded"
    );
    Ok((entries, tally))
}
