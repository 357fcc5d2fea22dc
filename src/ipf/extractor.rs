//! Parallel extraction of IPF payloads.
//!
//! Every entry is an independent task: positioned read of its local header
//! and payload, cipher verification, decryption, inflate, CRC check, write.
//! Tasks share nothing but the read-only source and the results vector, in
//! which each task owns exactly one slot. Work is dispatched in batches;
//! a [`CancellationToken`] stops dispatch between entries while in-flight
//! tasks run to completion.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use flate2::read::DeflateDecoder;
use tokio::fs;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_WORKERS, Password, effective_workers};
use crate::error::{EntryError, IpfError};
use crate::io::ReadAt;

use super::cipher::{ENCRYPTION_HEADER_SIZE, ZipCipher};
use super::entry::ArchiveEntry;
use super::structures::{CompressionMethod, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED, LocalFileHeader};

/// Success rate at or above which a run counts as complete.
const COMPLETE_THRESHOLD: f64 = 95.0;
/// Success rate at or above which a run completed with issues.
const DEGRADED_THRESHOLD: f64 = 80.0;

/// Cooperative cancellation flag shared with the caller.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop dispatching new entries.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }
}

/// Extraction tuning.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    /// Requested concurrency; clamped by [`effective_workers`].
    pub workers: usize,
    /// Entries dispatched before progress is reported.
    pub batch_size: usize,
    /// Fail entries whose verification header does not match.
    pub strict_verification: bool,
    pub cancel: CancellationToken,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            batch_size: DEFAULT_BATCH_SIZE,
            strict_verification: false,
            cancel: CancellationToken::new(),
        }
    }
}

/// Outcome of one entry.
#[derive(Debug)]
pub struct ExtractionResult {
    pub index: usize,
    pub name: String,
    pub bytes_written: u64,
    pub elapsed: Duration,
    pub error: Option<EntryError>,
}

impl ExtractionResult {
    pub fn success(&self) -> bool {
        self.error.is_none()
    }

    fn failed(entry: &ArchiveEntry, error: EntryError) -> Self {
        Self {
            index: entry.index,
            name: entry.safe_filename.clone(),
            bytes_written: 0,
            elapsed: Duration::ZERO,
            error: Some(error),
        }
    }
}

/// Advisory classification of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionOutcome {
    Complete,
    CompletedWithIssues,
    ManyFailures,
}

impl fmt::Display for ExtractionOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Complete => "complete",
            Self::CompletedWithIssues => "completed with issues",
            Self::ManyFailures => "many failures",
        })
    }
}

/// Results of a whole run, in input order.
#[derive(Debug)]
pub struct ExtractionReport {
    pub results: Vec<ExtractionResult>,
    pub elapsed: Duration,
}

impl ExtractionReport {
    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success()).count()
    }

    pub fn failed(&self) -> usize {
        self.total() - self.succeeded()
    }

    /// Percentage of entries extracted; 100 for an empty run.
    pub fn success_rate(&self) -> f64 {
        if self.results.is_empty() {
            return 100.0;
        }
        self.succeeded() as f64 * 100.0 / self.total() as f64
    }

    pub fn total_bytes(&self) -> u64 {
        self.results.iter().map(|r| r.bytes_written).sum()
    }

    /// Average throughput over the wall-clock duration of the run.
    pub fn throughput_mb_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs == 0.0 {
            return 0.0;
        }
        self.total_bytes() as f64 / (1024.0 * 1024.0) / secs
    }

    pub fn outcome(&self) -> ExtractionOutcome {
        let rate = self.success_rate();
        if rate >= COMPLETE_THRESHOLD {
            ExtractionOutcome::Complete
        } else if rate >= DEGRADED_THRESHOLD {
            ExtractionOutcome::CompletedWithIssues
        } else {
            ExtractionOutcome::ManyFailures
        }
    }

    /// Failed entries in input order.
    pub fn errors(&self) -> impl Iterator<Item = &ExtractionResult> {
        self.results.iter().filter(|r| !r.success())
    }
}

/// Parallel payload extractor over a shared positioned reader.
pub struct Extractor<R: ReadAt> {
    reader: Arc<R>,
    password: Password,
    options: ExtractOptions,
}

impl<R: ReadAt + 'static> Extractor<R> {
    pub fn new(reader: Arc<R>, password: Password, options: ExtractOptions) -> Self {
        Self {
            reader,
            password,
            options,
        }
    }

    /// Extract `entries` below `output_dir`.
    ///
    /// Never fails as a whole: every entry yields a result, at the same
    /// position as the entry in `entries`.
    pub async fn extract_all(&self, entries: &[ArchiveEntry], output_dir: &Path) -> ExtractionReport {
        let started = Instant::now();
        let workers = effective_workers(self.options.workers);
        let batch_size = self.options.batch_size.max(1);
        let semaphore = Arc::new(Semaphore::new(workers));
        let cancel = &self.options.cancel;

        let mut slots: Vec<Option<ExtractionResult>> = entries.iter().map(|_| None).collect();
        let batches = entries.len().div_ceil(batch_size);
        debug!(entries = entries.len(), workers, batch_size, "starting extraction");

        for (batch_no, batch) in entries.chunks(batch_size).enumerate() {
            if cancel.is_cancelled() {
                break;
            }

            let mut tasks = JoinSet::new();
            for (offset, entry) in batch.iter().enumerate() {
                if cancel.is_cancelled() {
                    break;
                }
                let slot = batch_no * batch_size + offset;
                let job = EntryJob {
                    reader: Arc::clone(&self.reader),
                    entry: entry.clone(),
                    password: self.password,
                    output: output_dir.join(&entry.safe_filename),
                    strict: self.options.strict_verification,
                };
                let semaphore = Arc::clone(&semaphore);
                let cancel = cancel.clone();

                tasks.spawn(async move {
                    let Ok(_permit) = semaphore.acquire_owned().await else {
                        return (slot, ExtractionResult::failed(&job.entry, EntryError::Cancelled));
                    };
                    // Queued entries must not start once cancellation was requested
                    if cancel.is_cancelled() {
                        return (slot, ExtractionResult::failed(&job.entry, EntryError::Cancelled));
                    }
                    (slot, job.run().await)
                });
            }

            while let Some(joined) = tasks.join_next().await {
                match joined {
                    Ok((slot, result)) => {
                        if let Some(error) = &result.error {
                            debug!(index = result.index, name = %result.name, %error, "entry failed");
                        }
                        slots[slot] = Some(result);
                    }
                    Err(e) => warn!(error = %e, "extraction task aborted"),
                }
            }

            debug!(batch = batch_no + 1, batches, "batch finished");
        }

        let cancelled = cancel.is_cancelled();
        let results: Vec<ExtractionResult> = slots
            .into_iter()
            .zip(entries)
            .map(|(slot, entry)| {
                slot.unwrap_or_else(|| {
                    let error = if cancelled {
                        EntryError::Cancelled
                    } else {
                        EntryError::TaskFailed("worker did not report".to_string())
                    };
                    ExtractionResult::failed(entry, error)
                })
            })
            .collect();

        let report = ExtractionReport {
            results,
            elapsed: started.elapsed(),
        };
        info!(
            extracted = report.succeeded(),
            failed = report.failed(),
            bytes = report.total_bytes(),
            mb_per_s = report.throughput_mb_s(),
            "extraction finished"
        );
        report
    }
}

/// Everything one task needs; owned so the task is `'static`.
struct EntryJob<R: ReadAt> {
    reader: Arc<R>,
    entry: ArchiveEntry,
    password: Password,
    output: PathBuf,
    strict: bool,
}

impl<R: ReadAt + 'static> EntryJob<R> {
    async fn run(self) -> ExtractionResult {
        let started = Instant::now();
        let outcome = self.extract().await;
        let (bytes_written, error) = match outcome {
            Ok(n) => (n, None),
            Err(e) => (0, Some(e)),
        };
        ExtractionResult {
            index: self.entry.index,
            name: self.entry.safe_filename.clone(),
            bytes_written,
            elapsed: started.elapsed(),
            error,
        }
    }

    async fn extract(&self) -> Result<u64, EntryError> {
        let offset = self.entry.local_header_offset;
        let archive_size = self.reader.size();

        let mut header = [0u8; LocalFileHeader::SIZE];
        self.reader.read_exact_at(offset, &mut header).await?;
        let lfh = LocalFileHeader::from_bytes(&header)?;

        // Bit 3 archives may leave the local sizes zeroed; the directory copy is authoritative then
        let compressed_size = if lfh.compressed_size == 0 && lfh.flags & FLAG_DATA_DESCRIPTOR != 0 {
            self.entry.compressed_size
        } else {
            lfh.compressed_size
        };
        let data_offset = offset + lfh.total_size();
        if data_offset + u64::from(compressed_size) > archive_size {
            return Err(EntryError::PayloadOutOfBounds {
                offset: data_offset,
                size: u64::from(compressed_size),
                archive_size,
            });
        }

        let mut payload = vec![0u8; compressed_size as usize];
        self.reader.read_exact_at(data_offset, &mut payload).await?;

        let entry = self.entry.clone();
        let password = self.password;
        let strict = self.strict;
        let data = tokio::task::spawn_blocking(move || decode_payload(payload, &lfh, &entry, &password, strict))
            .await
            .map_err(|e| EntryError::TaskFailed(e.to_string()))??;

        if let Some(parent) = self.output.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }
        fs::write(&self.output, &data).await?;

        Ok(data.len() as u64)
    }
}

/// Decrypt, inflate and verify one payload.
pub fn decode_payload(
    mut payload: Vec<u8>,
    lfh: &LocalFileHeader,
    entry: &ArchiveEntry,
    password: &Password,
    strict: bool,
) -> Result<Vec<u8>, EntryError> {
    let body = if lfh.flags & FLAG_ENCRYPTED != 0 {
        if payload.len() < ENCRYPTION_HEADER_SIZE {
            return Err(IpfError::Truncated("encryption header").into());
        }
        let mut cipher = ZipCipher::new(password.as_bytes());
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        header.copy_from_slice(&payload[..ENCRYPTION_HEADER_SIZE]);
        let check = cipher.decrypt_header(&header);

        // The check byte is always the high byte of the modification time
        let expected = (lfh.mod_time >> 8) as u8;
        if check != expected {
            if strict {
                return Err(EntryError::VerificationFailed {
                    expected,
                    actual: check,
                });
            }
            warn!(index = entry.index, expected, actual = check, "verification byte mismatch");
        }

        let mut body = payload.split_off(ENCRYPTION_HEADER_SIZE);
        cipher.decrypt(&mut body);
        body
    } else {
        payload
    };

    let data = match CompressionMethod::from_u16(lfh.compression_method) {
        CompressionMethod::Stored => body,
        CompressionMethod::Deflate => {
            let mut out = Vec::with_capacity(entry.uncompressed_size as usize);
            DeflateDecoder::new(body.as_slice())
                .read_to_end(&mut out)
                .map_err(EntryError::Decompression)?;
            out
        }
        CompressionMethod::Unknown(method) => return Err(EntryError::UnsupportedCompression(method)),
    };

    if data.len() as u64 != u64::from(entry.uncompressed_size) {
        return Err(EntryError::SizeMismatch {
            expected: u64::from(entry.uncompressed_size),
            actual: data.len() as u64,
        });
    }
    let actual = crc32fast::hash(&data);
    if actual != entry.crc32 {
        return Err(EntryError::CrcMismatch {
            expected: entry.crc32,
            actual,
        });
    }

    Ok(data)
}
