#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ripf::io::MemoryReader;
use ripf::ipf::structures::{CentralDirectoryHeader, EndOfCentralDirectory};
use ripf::ipf::{ArchiveEntry, IpfReader, IpfWriter, WriteOptions};
use ripf::ops::create::{CreateOptions, encode_entry};
use ripf::ops::load_entries;
use ripf::{LocalFileReader, Password};

/// Fixed DOS timestamp used for every generated entry.
pub const STAMP: (u16, u16) = (0x6B2C, 0x5A21);

/// Deterministic, mildly compressible content.
pub fn sample_data(seed: usize) -> Vec<u8> {
    let len = 64 + (seed * 37) % 2048;
    (0..len)
        .map(|i| ((i / 7) as u8).wrapping_mul(31).wrapping_add(seed as u8))
        .collect()
}

/// Serialize `files` as an archive with the default create options.
pub fn build_archive(files: &[(String, Vec<u8>)]) -> Vec<u8> {
    build_archive_with(files, &CreateOptions::default())
}

pub fn build_archive_with(files: &[(String, Vec<u8>)], options: &CreateOptions) -> Vec<u8> {
    let mut writer = IpfWriter::new(Vec::new(), WriteOptions::default());
    for (name, data) in files {
        let (meta, payload) = encode_entry(name, data, STAMP, options).unwrap();
        writer.add_entry(&meta, &payload).unwrap();
    }
    writer.finish().unwrap().0
}

/// Encrypted archive whose entries carry `flags` instead of the usual ones.
pub fn build_archive_with_flags(files: &[(String, Vec<u8>)], flags: u16) -> Vec<u8> {
    let mut writer = IpfWriter::new(Vec::new(), WriteOptions::default());
    for (name, data) in files {
        let (mut meta, payload) = encode_entry(name, data, STAMP, &CreateOptions::default()).unwrap();
        meta.flags = flags;
        writer.add_entry(&meta, &payload).unwrap();
    }
    writer.finish().unwrap().0
}

pub fn write_file(dir: &Path, name: &str, bytes: &[u8]) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, bytes).unwrap();
    path
}

/// Entries with names decoded under the default password.
pub async fn entries_of(path: &Path) -> Vec<ArchiveEntry> {
    let reader = IpfReader::new(Arc::new(LocalFileReader::new(path).unwrap()));
    load_entries(&reader, &Password::default(), 4).await.unwrap().0
}

/// `(decoded name, stored payload bytes)` for every entry, in archive order.
pub async fn stored_payloads(path: &Path) -> Vec<(String, Vec<u8>)> {
    let bytes = std::fs::read(path).unwrap();
    entries_of(path)
        .await
        .into_iter()
        .map(|e| {
            let start = e.data_offset().unwrap() as usize;
            let end = start + e.compressed_size as usize;
            (e.display_name().to_string(), bytes[start..end].to_vec())
        })
        .collect()
}

/// Every central directory header of an archive held in memory.
pub async fn central_headers(bytes: Vec<u8>) -> (EndOfCentralDirectory, Vec<CentralDirectoryHeader>) {
    let reader = IpfReader::new(Arc::new(MemoryReader::new(bytes.clone())));
    let (eocd, _) = reader.find_eocd().await.unwrap();

    let mut headers = Vec::new();
    let mut pos = eocd.cd_offset as usize;
    for _ in 0..eocd.total_entries {
        let cdh = CentralDirectoryHeader::from_bytes(&bytes[pos..]).unwrap();
        pos += cdh.total_size();
        headers.push(cdh);
    }
    (eocd, headers)
}
