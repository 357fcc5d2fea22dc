//! IPF archive structure discovery.
//!
//! This module handles the binary parsing of IPF file structures,
//! reading from any source that implements the [`ReadAt`] trait.
//!
//! ## Parsing Strategy
//!
//! 1. Find the End of Central Directory (EOCD) at the file's end
//! 2. Read the Central Directory to enumerate entries and their local header offsets
//! 3. Visit every local header in ascending offset order to pick up the
//!    name and extra field exactly as stored next to the payload
//!
//! Names stay encrypted here; [`names`](super::names) decrypts them in a
//! separate pass.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::{IpfError, Result};
use crate::io::{LocalFileReader, ReadAt};

use super::entry::ArchiveEntry;
use super::structures::{CentralDirectoryHeader, EndOfCentralDirectory, LocalFileHeader};

/// Maximum ZIP comment size allowed by the format (65535 bytes).
///
/// This limits the search area when looking for EOCD with a comment.
const MAX_COMMENT_SIZE: u64 = 65535;

/// Names longer than this are treated as a damaged header.
pub const MAX_FILENAME_LEN: u16 = 4096;

/// Outcome of the local header pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanTally {
    pub succeeded: usize,
    pub failed: usize,
}

/// Reads the layout of an IPF archive.
///
/// Owns the shared source for the duration of one archive operation.
pub struct IpfReader<R: ReadAt> {
    /// The underlying data source
    reader: Arc<R>,
    /// Total size of the archive in bytes
    size: u64,
}

impl IpfReader<LocalFileReader> {
    /// Open an archive on disk.
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(Arc::new(LocalFileReader::new(path)?)))
    }
}

impl<R: ReadAt> IpfReader<R> {
    pub fn new(reader: Arc<R>) -> Self {
        let size = reader.size();
        Self { reader, size }
    }

    /// Find and parse the End of Central Directory record.
    ///
    /// Returns the record and its offset in the file.
    pub async fn find_eocd(&self) -> Result<(EndOfCentralDirectory, u64)> {
        let record_size = EndOfCentralDirectory::SIZE as u64;
        if self.size < record_size {
            return Err(IpfError::EocdNotFound);
        }

        // Archives written by the game tools carry no comment
        let offset = self.size - record_size;
        let mut buf = vec![0u8; EndOfCentralDirectory::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;
        if let Ok(eocd) = EndOfCentralDirectory::from_bytes(&buf) {
            if eocd.comment_len == 0 {
                return Ok((eocd, offset));
            }
        }

        // Fall back to a backwards search through a possible comment
        let search_size = (MAX_COMMENT_SIZE + record_size).min(self.size);
        let search_start = self.size - search_size;
        let mut buf = vec![0u8; search_size as usize];
        self.reader.read_exact_at(search_start, &mut buf).await?;

        let signature = EndOfCentralDirectory::SIGNATURE.to_le_bytes();
        for i in (0..=buf.len() - EndOfCentralDirectory::SIZE).rev() {
            if buf[i..i + 4] != signature {
                continue;
            }
            let comment_len = u16::from_le_bytes([buf[i + 20], buf[i + 21]]) as usize;
            if comment_len == buf.len() - i - EndOfCentralDirectory::SIZE {
                let eocd = EndOfCentralDirectory::from_bytes(&buf[i..])?;
                return Ok((eocd, search_start + i as u64));
            }
        }

        Err(IpfError::EocdNotFound)
    }

    /// Enumerate every central directory record.
    ///
    /// Entries whose local header offset lies outside the file are skipped.
    /// A record with a broken signature ends the scan, since the records after
    /// it can no longer be located.
    pub async fn scan_structure(&self) -> Result<Vec<ArchiveEntry>> {
        let (eocd, eocd_offset) = self.find_eocd().await?;
        let cd_offset = u64::from(eocd.cd_offset);
        let cd_size = u64::from(eocd.cd_size);

        if cd_offset + cd_size > eocd_offset {
            return Err(IpfError::CentralDirectoryOutOfBounds {
                offset: cd_offset,
                size: cd_size,
                archive_size: self.size,
            });
        }

        let mut cd_data = vec![0u8; cd_size as usize];
        self.reader.read_exact_at(cd_offset, &mut cd_data).await?;

        let total = usize::from(eocd.total_entries);
        let mut entries = Vec::with_capacity(total);
        let mut pos = 0usize;
        let mut skipped = 0usize;

        for index in 0..total {
            let cdh = match CentralDirectoryHeader::from_bytes(&cd_data[pos..]) {
                Ok(cdh) => cdh,
                Err(e) => {
                    warn!(index, error = %e, "central directory ends early");
                    break;
                }
            };
            let record_end = pos + cdh.total_size();
            if record_end > cd_data.len() {
                warn!(index, "central directory record runs past the directory");
                break;
            }

            let name_start = pos + CentralDirectoryHeader::SIZE;
            let extra_start = name_start + usize::from(cdh.file_name_length);
            let extra_end = extra_start + usize::from(cdh.extra_field_length);
            let name = cd_data[name_start..extra_start].to_vec();
            let extra = cd_data[extra_start..extra_end].to_vec();
            pos = record_end;

            let lfh_end = u64::from(cdh.local_header_offset) + LocalFileHeader::SIZE as u64;
            if lfh_end > cd_offset || cdh.file_name_length == 0 {
                debug!(index, offset = cdh.local_header_offset, "skipping entry with impossible header");
                skipped += 1;
                continue;
            }

            entries.push(ArchiveEntry::from_central(index, &cdh, name, extra));
        }

        if skipped > 0 {
            warn!(skipped, "entries skipped during central directory scan");
        }
        if entries.is_empty() {
            return Err(IpfError::NoEntries);
        }

        debug!(entries = entries.len(), declared = total, "central directory scanned");
        Ok(entries)
    }

    /// Read and validate one local header.
    pub async fn read_local_header(&self, offset: u64) -> Result<LocalFileHeader> {
        if offset + LocalFileHeader::SIZE as u64 > self.size {
            return Err(IpfError::InvalidLocalHeader {
                offset,
                reason: "header extends past end of archive".to_string(),
            });
        }
        let mut buf = [0u8; LocalFileHeader::SIZE];
        self.reader.read_exact_at(offset, &mut buf).await?;
        let lfh = LocalFileHeader::from_bytes(&buf)?;

        if lfh.file_name_length == 0 || lfh.file_name_length > MAX_FILENAME_LEN {
            return Err(IpfError::InvalidLocalHeader {
                offset,
                reason: format!("implausible filename length {}", lfh.file_name_length),
            });
        }
        if offset + lfh.total_size() > self.size {
            return Err(IpfError::InvalidLocalHeader {
                offset,
                reason: "name and extra field extend past end of archive".to_string(),
            });
        }
        Ok(lfh)
    }

    /// Pick up each entry's stored name and extra field from its local header.
    ///
    /// Headers are visited in ascending offset order. Entries whose header is
    /// damaged keep the central directory copy of their name, stay without a
    /// `header_size` and are counted as failures.
    pub async fn read_filenames(&self, entries: &mut [ArchiveEntry]) -> ScanTally {
        let mut order: Vec<usize> = (0..entries.len()).collect();
        order.sort_by_key(|&i| entries[i].local_header_offset);

        let mut tally = ScanTally::default();
        for i in order {
            let entry = &mut entries[i];
            match self.read_name_and_extra(entry.local_header_offset).await {
                Ok((lfh, name, extra)) => {
                    entry.encrypted_filename = name;
                    entry.extra_field = extra;
                    entry.header_size = Some(lfh.total_size());
                    tally.succeeded += 1;
                }
                Err(e) => {
                    debug!(index = entry.index, error = %e, "local header rejected");
                    tally.failed += 1;
                }
            }
        }

        info!(
            succeeded = tally.succeeded,
            failed = tally.failed,
            "local headers read"
        );
        tally
    }

    async fn read_name_and_extra(&self, offset: u64) -> Result<(LocalFileHeader, Vec<u8>, Vec<u8>)> {
        let lfh = self.read_local_header(offset).await?;
        let name_len = usize::from(lfh.file_name_length);
        let mut tail = vec![0u8; name_len + usize::from(lfh.extra_field_length)];
        self.reader
            .read_exact_at(offset + LocalFileHeader::SIZE as u64, &mut tail)
            .await?;
        let extra = tail.split_off(name_len);
        Ok((lfh, tail, extra))
    }

    /// Get a reference to the underlying reader.
    pub fn reader(&self) -> &Arc<R> {
        &self.reader
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryReader;
    use crate::ipf::structures::CompressionMethod;
    use crate::ipf::writer::{EntryMeta, IpfWriter, WriteOptions};

    fn archive(names: &[&str]) -> Vec<u8> {
        let mut writer = IpfWriter::new(Vec::new(), WriteOptions::default());
        for name in names {
            let meta = EntryMeta {
                name: name.as_bytes().to_vec(),
                extra: vec![0xAA, 0xBB],
                version_needed: 20,
                flags: 0,
                compression_method: CompressionMethod::Stored,
                mod_time: 0,
                mod_date: 0,
                crc32: crc32fast::hash(name.as_bytes()),
                compressed_size: name.len() as u32,
                uncompressed_size: name.len() as u32,
            };
            writer.add_entry(&meta, name.as_bytes()).unwrap();
        }
        writer.finish().unwrap().0
    }

    #[tokio::test]
    async fn scan_finds_every_entry() {
        let data = archive(&["a.txt", "b/c.txt", "d.bin"]);
        let reader = IpfReader::new(Arc::new(MemoryReader::new(data)));

        let mut entries = reader.scan_structure().await.unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[1].encrypted_filename, b"b/c.txt");
        assert_eq!(entries[0].local_header_offset, 0);

        let tally = reader.read_filenames(&mut entries).await;
        assert_eq!(tally, ScanTally { succeeded: 3, failed: 0 });
        assert!(entries.iter().all(ArchiveEntry::is_valid));
        assert_eq!(entries[0].extra_field, vec![0xAA, 0xBB]);
        assert_eq!(entries[0].header_size, Some(30 + 5 + 2));
    }

    #[tokio::test]
    async fn broken_local_header_is_tallied() {
        let mut data = archive(&["a.txt", "b.txt"]);
        // second local header starts after the first (30 + 5 + 2 + 5 bytes)
        data[42] = 0;
        let reader = IpfReader::new(Arc::new(MemoryReader::new(data)));

        let mut entries = reader.scan_structure().await.unwrap();
        let tally = reader.read_filenames(&mut entries).await;
        assert_eq!(tally, ScanTally { succeeded: 1, failed: 1 });
        assert!(entries[0].is_valid());
        assert!(!entries[1].is_valid());
        assert_eq!(entries[1].encrypted_filename, b"b.txt");
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let reader = IpfReader::new(Arc::new(MemoryReader::new(vec![0u8; 100])));
        assert!(matches!(reader.scan_structure().await, Err(IpfError::EocdNotFound)));

        let reader = IpfReader::new(Arc::new(MemoryReader::new(vec![1, 2, 3])));
        assert!(matches!(reader.find_eocd().await, Err(IpfError::EocdNotFound)));
    }

    #[tokio::test]
    async fn empty_archive_has_no_entries() {
        let data = IpfWriter::new(Vec::new(), WriteOptions::default()).finish().unwrap().0;
        let reader = IpfReader::new(Arc::new(MemoryReader::new(data)));
        assert!(matches!(reader.scan_structure().await, Err(IpfError::NoEntries)));
    }
}
