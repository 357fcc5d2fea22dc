use std::path::Path;

use anyhow::{Context, Result};

use super::load_entries;
use crate::config::Password;
use crate::ipf::{ArchiveEntry, IpfReader};

/// All entries of an archive with decoded names, in central directory order.
pub async fn list(input: &Path, password: &Password) -> Result<Vec<ArchiveEntry>> {
    let reader = IpfReader::open(input).with_context(|| format!("cannot open {}", input.display()))?;
    let (entries, _) = load_entries(&reader, password, 1).await?;
    Ok(entries)
}
