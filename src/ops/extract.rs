use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::info;

use super::load_entries;
use crate::config::Password;
use crate::ipf::{ExtractOptions, ExtractionReport, Extractor, IpfReader, dedupe};

/// Extract every current file of `input` into `output_dir`.
///
/// Superseded copies are skipped so that no two workers ever write the same
/// path; the surviving copy is the one a sequential overwrite would leave.
pub async fn extract(
    input: &Path,
    output_dir: &Path,
    password: &Password,
    options: ExtractOptions,
) -> Result<ExtractionReport> {
    let reader = IpfReader::open(input).with_context(|| format!("cannot open {}", input.display()))?;
    let (entries, tally) = load_entries(&reader, password, options.workers).await?;
    if tally.failed > 0 {
        info!(failed = tally.failed, "entries with damaged local headers will be reported as failures");
    }

    let outcome = dedupe(&entries);
    if outcome.has_duplicates() {
        info!(superseded = outcome.removed_duplicates, "skipping superseded entries");
    }

    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("cannot create {}", output_dir.display()))?;

    let extractor = Extractor::new(Arc::clone(reader.reader()), *password, options);
    Ok(extractor.extract_all(&outcome.retained, output_dir).await)
}
