//! Packing a folder into a new IPF archive.
//!
//! Files are listed by a [`SourceListing`], sorted by archive name, then
//! compressed, encrypted and streamed through [`IpfWriter`] one at a time.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Local};
use flate2::Compression;
use flate2::write::DeflateEncoder;
use rand::Rng;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::Password;
use crate::error::IpfError;
use crate::ipf::cipher::{ENCRYPTION_HEADER_SIZE, ZipCipher};
use crate::ipf::structures::{CompressionMethod, OPTIMIZED_FLAGS, VERSION_NEEDED_DEFAULT, dos_datetime};
use crate::ipf::writer::{EntryMeta, IpfWriter, WriteOptions};

/// One file to be packed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceFile {
    pub path: PathBuf,
    /// Name inside the archive, `/`-separated.
    pub name: String,
    pub modified: SystemTime,
}

/// Anything that can enumerate files to pack.
pub trait SourceListing {
    fn list(&self) -> Result<Vec<SourceFile>>;
}

/// Every regular file below a directory, named relative to it.
pub struct FolderListing {
    root: PathBuf,
}

impl FolderListing {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl SourceListing for FolderListing {
    fn list(&self) -> Result<Vec<SourceFile>> {
        let mut files = Vec::new();
        for item in WalkDir::new(&self.root).follow_links(false) {
            let item = item.with_context(|| format!("cannot walk {}", self.root.display()))?;
            if !item.file_type().is_file() {
                continue;
            }
            let relative = item.path().strip_prefix(&self.root)?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let modified = item.metadata()?.modified()?;
            files.push(SourceFile {
                path: item.into_path(),
                name,
                modified,
            });
        }
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }
}

#[derive(Debug, Clone)]
pub struct CreateOptions {
    pub encrypt: bool,
    /// Deflate level 1-9; 0 stores entries uncompressed.
    pub compression_level: u32,
    pub password: Password,
}

impl Default for CreateOptions {
    fn default() -> Self {
        Self {
            encrypt: true,
            compression_level: 6,
            password: Password::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateReport {
    pub files: usize,
    pub uncompressed_bytes: u64,
    pub archive_size: u64,
}

fn size_u32(len: usize) -> Result<u32, IpfError> {
    u32::try_from(len).map_err(|_| IpfError::ArchiveTooLarge(len as u64))
}

fn compress(data: &[u8], level: u32) -> io::Result<(CompressionMethod, Vec<u8>)> {
    if level == 0 {
        return Ok((CompressionMethod::Stored, data.to_vec()));
    }
    let mut encoder = DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok((CompressionMethod::Deflate, encoder.finish()?))
}

/// Build the header fields and stored payload for one file.
///
/// Encrypted entries get a random verification header whose check byte is
/// the high byte of `mod_time`, and their name is encrypted with a cipher
/// session of its own.
pub fn encode_entry(
    name: &str,
    data: &[u8],
    (mod_time, mod_date): (u16, u16),
    options: &CreateOptions,
) -> Result<(EntryMeta, Vec<u8>), IpfError> {
    let crc32 = crc32fast::hash(data);
    let (compression_method, mut compressed) = compress(data, options.compression_level)?;
    let compressed_len = compressed.len();

    let (flags, stored_name, payload) = if options.encrypt {
        let mut salt = [0u8; ENCRYPTION_HEADER_SIZE - 1];
        rand::thread_rng().fill(&mut salt);

        let mut cipher = ZipCipher::new(options.password.as_bytes());
        let header = cipher.encrypt_header(&salt, (mod_time >> 8) as u8);
        cipher.encrypt(&mut compressed);

        let mut payload = Vec::with_capacity(ENCRYPTION_HEADER_SIZE + compressed_len);
        payload.extend_from_slice(&header);
        payload.extend_from_slice(&compressed);

        let mut stored_name = name.as_bytes().to_vec();
        ZipCipher::new(options.password.as_bytes()).encrypt(&mut stored_name);
        (OPTIMIZED_FLAGS, stored_name, payload)
    } else {
        (0, name.as_bytes().to_vec(), compressed)
    };

    let meta = EntryMeta {
        name: stored_name,
        extra: Vec::new(),
        version_needed: VERSION_NEEDED_DEFAULT,
        flags,
        compression_method,
        mod_time,
        mod_date,
        crc32,
        compressed_size: size_u32(payload.len())?,
        uncompressed_size: size_u32(data.len())?,
    };
    Ok((meta, payload))
}

/// Write `files` to `output` in the given order. Blocking.
pub fn build_archive(files: &[SourceFile], output: &Path, options: &CreateOptions) -> Result<CreateReport> {
    let file = File::create(output).with_context(|| format!("cannot create {}", output.display()))?;
    let mut writer = IpfWriter::new(BufWriter::new(file), WriteOptions::default());
    let mut uncompressed_bytes = 0u64;

    for source in files {
        let data = std::fs::read(&source.path).with_context(|| format!("cannot read {}", source.path.display()))?;
        let stamp = dos_datetime(DateTime::<Local>::from(source.modified).naive_local());
        let (meta, payload) = encode_entry(&source.name, &data, stamp, options)?;
        writer.add_entry(&meta, &payload)?;
        uncompressed_bytes += data.len() as u64;
        debug!(name = %source.name, size = data.len(), stored = payload.len(), "packed");
    }

    let (buf, summary) = writer.finish()?;
    buf.into_inner().map_err(io::IntoInnerError::into_error)?.sync_all()?;

    Ok(CreateReport {
        files: summary.entries,
        uncompressed_bytes,
        archive_size: summary.total_size,
    })
}

/// Pack whatever `listing` yields into `output`.
pub async fn create_from_listing<L: SourceListing>(
    listing: &L,
    output: &Path,
    options: &CreateOptions,
) -> Result<CreateReport> {
    let files = listing.list()?;
    if files.is_empty() {
        bail!(IpfError::NoEntries);
    }

    let output = output.to_path_buf();
    let options = options.clone();
    let report = tokio::task::spawn_blocking(move || build_archive(&files, &output, &options)).await??;
    info!(files = report.files, size = report.archive_size, "archive created");
    Ok(report)
}

/// Pack every file below `source_folder` into `output`.
pub async fn create(source_folder: &Path, output: &Path, options: &CreateOptions) -> Result<CreateReport> {
    if !source_folder.is_dir() {
        bail!("{} is not a directory", source_folder.display());
    }
    create_from_listing(&FolderListing::new(source_folder), output, options).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypted_entry_layout() {
        let options = CreateOptions::default();
        let data = b"<root><item id=\"1\"/></root>".repeat(20);
        let (meta, payload) = encode_entry("xml/item.xml", &data, (0xAB12, 0x5A21), &options).unwrap();

        assert_eq!(meta.flags, OPTIMIZED_FLAGS);
        assert_eq!(meta.compression_method, CompressionMethod::Deflate);
        assert_eq!(meta.compressed_size as usize, payload.len());
        assert_eq!(meta.uncompressed_size as usize, data.len());
        assert_eq!(meta.crc32, crc32fast::hash(&data));
        assert_ne!(meta.name, b"xml/item.xml");

        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        header.copy_from_slice(&payload[..ENCRYPTION_HEADER_SIZE]);
        let check = ZipCipher::new(options.password.as_bytes()).decrypt_header(&header);
        assert_eq!(check, 0xAB);
    }

    #[test]
    fn plain_stored_entry() {
        let options = CreateOptions {
            encrypt: false,
            compression_level: 0,
            ..CreateOptions::default()
        };
        let (meta, payload) = encode_entry("a.txt", b"hello", (0, 0), &options).unwrap();
        assert_eq!(meta.flags, 0);
        assert_eq!(meta.compression_method, CompressionMethod::Stored);
        assert_eq!(meta.name, b"a.txt");
        assert_eq!(payload, b"hello");
    }

    #[test]
    fn folder_listing_is_sorted_and_relative() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("b/nested")).unwrap();
        std::fs::write(dir.path().join("b/nested/z.txt"), b"z").unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join("b/c.txt"), b"c").unwrap();

        let names: Vec<_> = FolderListing::new(dir.path())
            .list()
            .unwrap()
            .into_iter()
            .map(|f| f.name)
            .collect();
        assert_eq!(names, vec!["a.txt", "b/c.txt", "b/nested/z.txt"]);
    }
}
