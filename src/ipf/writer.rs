//! IPF archive serialization.
//!
//! Entries are streamed in caller order: local header, name, extra field,
//! payload. The central directory and end record follow once every entry is
//! written, so this is a strictly sequential, two-phase process.
//!
//! Optimized archives must match the reference tools field for field: every
//! entry carries flags `0x0009` (encrypted + data descriptor) and "version
//! made by" `0x0014`, whatever the source archive said. By default the 16-byte
//! data descriptor itself is not written; see [`DataDescriptorPolicy`].

use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::debug;

use crate::error::{IpfError, Result};

use super::entry::ArchiveEntry;
use super::structures::{
    CentralDirectoryHeader, CompressionMethod, DataDescriptor, EndOfCentralDirectory,
    FLAG_DATA_DESCRIPTOR, LocalFileHeader, OPTIMIZED_FLAGS, VERSION_MADE_BY_ZIP20,
};

/// What to do about data descriptors on entries flagged with bit 3.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DataDescriptorPolicy {
    /// Set the flag only; sizes and CRC live in the headers.
    #[default]
    FlagOnly,
    /// Also append the 16-byte descriptor after each flagged payload.
    Emit,
}

/// Field policy applied to every written entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// Replaces each entry's general purpose flags when set.
    pub flags_override: Option<u16>,
    pub version_made_by: u16,
    pub data_descriptor: DataDescriptorPolicy,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            flags_override: None,
            version_made_by: VERSION_MADE_BY_ZIP20,
            data_descriptor: DataDescriptorPolicy::FlagOnly,
        }
    }
}

impl WriteOptions {
    /// The layout the reference optimizer produces.
    pub fn optimized() -> Self {
        Self {
            flags_override: Some(OPTIMIZED_FLAGS),
            ..Self::default()
        }
    }
}

/// Header fields of one entry about to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryMeta {
    /// Stored (possibly encrypted) name bytes.
    pub name: Vec<u8>,
    pub extra: Vec<u8>,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
}

impl EntryMeta {
    /// Re-package an existing entry unchanged.
    pub fn from_entry(entry: &ArchiveEntry) -> Self {
        Self {
            name: entry.encrypted_filename.clone(),
            extra: entry.extra_field.clone(),
            version_needed: entry.version_needed,
            flags: entry.flags,
            compression_method: entry.compression_method,
            mod_time: entry.mod_time,
            mod_date: entry.mod_date,
            crc32: entry.crc32,
            compressed_size: entry.compressed_size,
            uncompressed_size: entry.uncompressed_size,
        }
    }
}

/// Where the written pieces ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSummary {
    pub entries: usize,
    pub central_directory_offset: u64,
    pub central_directory_size: u64,
    pub total_size: u64,
}

struct CentralRecord {
    header: CentralDirectoryHeader,
    name: Vec<u8>,
    extra: Vec<u8>,
}

/// Streaming archive writer.
pub struct IpfWriter<W: Write> {
    writer: W,
    position: u64,
    central: Vec<CentralRecord>,
    options: WriteOptions,
}

fn to_u32(value: u64) -> Result<u32> {
    u32::try_from(value).map_err(|_| IpfError::ArchiveTooLarge(value))
}

impl<W: Write> IpfWriter<W> {
    pub fn new(writer: W, options: WriteOptions) -> Self {
        Self {
            writer,
            position: 0,
            central: Vec::new(),
            options,
        }
    }

    /// Bytes written so far.
    pub fn position(&self) -> u64 {
        self.position
    }

    fn begin_entry(&mut self, meta: &EntryMeta) -> Result<(u32, u16)> {
        if self.central.len() >= usize::from(u16::MAX) {
            return Err(IpfError::TooManyEntries(self.central.len() + 1));
        }
        let offset = to_u32(self.position)?;
        let invalid = |reason: &str| IpfError::InvalidLocalHeader {
            offset: u64::from(offset),
            reason: reason.to_string(),
        };
        let file_name_length = u16::try_from(meta.name.len()).map_err(|_| invalid("name too long"))?;
        let extra_field_length =
            u16::try_from(meta.extra.len()).map_err(|_| invalid("extra field too long"))?;
        let flags = self.options.flags_override.unwrap_or(meta.flags);

        let lfh = LocalFileHeader {
            version_needed: meta.version_needed,
            flags,
            compression_method: meta.compression_method.as_u16(),
            mod_time: meta.mod_time,
            mod_date: meta.mod_date,
            crc32: meta.crc32,
            compressed_size: meta.compressed_size,
            uncompressed_size: meta.uncompressed_size,
            file_name_length,
            extra_field_length,
        };
        lfh.write_to(&mut self.writer)?;
        self.writer.write_all(&meta.name)?;
        self.writer.write_all(&meta.extra)?;
        self.position += lfh.total_size();

        Ok((offset, flags))
    }

    fn end_entry(&mut self, meta: &EntryMeta, offset: u32, flags: u16) -> Result<()> {
        if self.options.data_descriptor == DataDescriptorPolicy::Emit && flags & FLAG_DATA_DESCRIPTOR != 0 {
            DataDescriptor {
                crc32: meta.crc32,
                compressed_size: meta.compressed_size,
                uncompressed_size: meta.uncompressed_size,
            }
            .write_to(&mut self.writer)?;
            self.position += DataDescriptor::SIZE as u64;
        }

        self.central.push(CentralRecord {
            header: CentralDirectoryHeader {
                version_made_by: self.options.version_made_by,
                version_needed: meta.version_needed,
                flags,
                compression_method: meta.compression_method.as_u16(),
                mod_time: meta.mod_time,
                mod_date: meta.mod_date,
                crc32: meta.crc32,
                compressed_size: meta.compressed_size,
                uncompressed_size: meta.uncompressed_size,
                file_name_length: meta.name.len() as u16,
                extra_field_length: meta.extra.len() as u16,
                comment_length: 0,
                disk_number_start: 0,
                internal_attrs: 0,
                external_attrs: 0,
                local_header_offset: offset,
            },
            name: meta.name.clone(),
            extra: meta.extra.clone(),
        });
        Ok(())
    }

    /// Write an entry whose payload is already in memory.
    ///
    /// Returns the local header offset.
    pub fn add_entry(&mut self, meta: &EntryMeta, payload: &[u8]) -> Result<u64> {
        if payload.len() as u64 != u64::from(meta.compressed_size) {
            return Err(IpfError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "payload is {} bytes but header declares {}",
                    payload.len(),
                    meta.compressed_size
                ),
            )));
        }
        let (offset, flags) = self.begin_entry(meta)?;
        self.writer.write_all(payload)?;
        self.position += payload.len() as u64;
        self.end_entry(meta, offset, flags)?;
        Ok(u64::from(offset))
    }

    /// Write an entry, copying exactly `compressed_size` payload bytes from `payload`.
    pub fn copy_entry<S: Read>(&mut self, meta: &EntryMeta, payload: &mut S) -> Result<u64> {
        let (offset, flags) = self.begin_entry(meta)?;
        let expected = u64::from(meta.compressed_size);
        let copied = io::copy(&mut payload.take(expected), &mut self.writer)?;
        if copied != expected {
            return Err(IpfError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("payload truncated: copied {copied} of {expected} bytes"),
            )));
        }
        self.position += copied;
        self.end_entry(meta, offset, flags)?;
        Ok(u64::from(offset))
    }

    /// Write the central directory and end record, returning the sink.
    pub fn finish(mut self) -> Result<(W, WriteSummary)> {
        let cd_offset = self.position;
        for record in &self.central {
            record.header.write_to(&mut self.writer)?;
            self.writer.write_all(&record.name)?;
            self.writer.write_all(&record.extra)?;
            self.position += record.header.total_size() as u64;
        }
        let cd_size = self.position - cd_offset;
        let entries = u16::try_from(self.central.len())
            .map_err(|_| IpfError::TooManyEntries(self.central.len()))?;

        EndOfCentralDirectory::new(entries, to_u32(cd_size)?, to_u32(cd_offset)?)
            .write_to(&mut self.writer)?;
        self.position += EndOfCentralDirectory::SIZE as u64;
        self.writer.flush()?;

        let summary = WriteSummary {
            entries: self.central.len(),
            central_directory_offset: cd_offset,
            central_directory_size: cd_size,
            total_size: self.position,
        };
        Ok((self.writer, summary))
    }
}

/// Rebuild an archive from `entries`, copying each payload verbatim from `source`.
///
/// Entries are written in the given order; every one of them must have a
/// validated local header.
pub fn write_archive<S: Read + Seek>(
    entries: &[ArchiveEntry],
    source: &mut S,
    output: &Path,
    options: &WriteOptions,
) -> Result<WriteSummary> {
    let file = File::create(output)?;
    let mut writer = IpfWriter::new(BufWriter::new(file), options.clone());

    for entry in entries {
        let data_offset = entry.data_offset().ok_or_else(|| IpfError::InvalidLocalHeader {
            offset: entry.local_header_offset,
            reason: "entry was not validated".to_string(),
        })?;
        source.seek(SeekFrom::Start(data_offset))?;
        writer.copy_entry(&EntryMeta::from_entry(entry), source)?;
    }

    let (buf, summary) = writer.finish()?;
    buf.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()?;
    debug!(
        entries = summary.entries,
        size = summary.total_size,
        path = %output.display(),
        "archive written"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn meta(name: &str, payload: &[u8]) -> EntryMeta {
        EntryMeta {
            name: name.as_bytes().to_vec(),
            extra: Vec::new(),
            version_needed: 20,
            flags: 0,
            compression_method: CompressionMethod::Stored,
            mod_time: 0x1234,
            mod_date: 0x5678,
            crc32: crc32fast::hash(payload),
            compressed_size: payload.len() as u32,
            uncompressed_size: payload.len() as u32,
        }
    }

    #[test]
    fn optimized_policy_forces_quirk_fields() {
        let mut writer = IpfWriter::new(Vec::new(), WriteOptions::optimized());
        writer.add_entry(&meta("a", b"hello"), b"hello").unwrap();
        let (data, summary) = writer.finish().unwrap();

        let lfh = LocalFileHeader::from_bytes(&data).unwrap();
        assert_eq!(lfh.flags, 0x0009);

        let cd = &data[summary.central_directory_offset as usize..];
        let cdh = CentralDirectoryHeader::from_bytes(cd).unwrap();
        assert_eq!(cdh.flags, 0x0009);
        assert_eq!(cdh.version_made_by, 0x0014);
        assert_eq!(cdh.local_header_offset, 0);

        // flag only: payload is immediately followed by the central directory
        assert_eq!(summary.central_directory_offset, 30 + 1 + 5);
    }

    #[test]
    fn emit_policy_appends_descriptor() {
        let options = WriteOptions {
            data_descriptor: DataDescriptorPolicy::Emit,
            ..WriteOptions::optimized()
        };
        let mut writer = IpfWriter::new(Vec::new(), options);
        writer.add_entry(&meta("a", b"hello"), b"hello").unwrap();
        let second = writer.add_entry(&meta("b", b"x"), b"x").unwrap();
        let (data, _) = writer.finish().unwrap();

        assert_eq!(second, 36 + 16);
        assert_eq!(&data[36..40], b"PK\x07\x08");
    }

    #[test]
    fn end_record_matches_entries() {
        let mut writer = IpfWriter::new(Vec::new(), WriteOptions::default());
        for i in 0..5 {
            let body = format!("payload {i}");
            writer.add_entry(&meta(&format!("f{i}"), body.as_bytes()), body.as_bytes()).unwrap();
        }
        let (data, summary) = writer.finish().unwrap();
        assert_eq!(summary.total_size, data.len() as u64);

        let eocd = EndOfCentralDirectory::from_bytes(&data[data.len() - 22..]).unwrap();
        assert_eq!(eocd.total_entries, 5);
        assert_eq!(eocd.disk_entries, 5);
        assert_eq!(u64::from(eocd.cd_offset), summary.central_directory_offset);
        assert_eq!(u64::from(eocd.cd_size), summary.central_directory_size);
    }

    #[test]
    fn copy_entry_rejects_short_source() {
        let mut writer = IpfWriter::new(Vec::new(), WriteOptions::default());
        let err = writer
            .copy_entry(&meta("a", b"hello"), &mut Cursor::new(b"hel".to_vec()))
            .unwrap_err();
        assert!(matches!(err, IpfError::Io(e) if e.kind() == io::ErrorKind::UnexpectedEof));
    }

    #[test]
    fn add_entry_checks_declared_size() {
        let mut writer = IpfWriter::new(Vec::new(), WriteOptions::default());
        assert!(writer.add_entry(&meta("a", b"hello"), b"hi").is_err());
    }
}
