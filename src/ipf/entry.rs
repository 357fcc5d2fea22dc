use super::structures::{
    CentralDirectoryHeader, CompressionMethod, FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED,
    dos_date_parts, dos_time_parts,
};

/// One file stored in an IPF archive.
///
/// Built by the reader from the central directory and refined from the local
/// header. Only the name fields change afterwards, once, during the name
/// decryption pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    /// Position in central directory order.
    pub index: usize,
    pub local_header_offset: u64,
    /// Name bytes exactly as stored.
    pub encrypted_filename: Vec<u8>,
    /// Name as decoded by the name pass, when decoding succeeded.
    pub decrypted_filename: Option<String>,
    /// Path-safe name used for output files and deduplication.
    pub safe_filename: String,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: CompressionMethod,
    pub mod_time: u16,
    pub mod_date: u16,
    pub crc32: u32,
    pub compressed_size: u32,
    pub uncompressed_size: u32,
    /// Opaque, copied verbatim.
    pub extra_field: Vec<u8>,
    /// Local header + name + extra length, known once the local header was validated.
    pub header_size: Option<u64>,
}

impl ArchiveEntry {
    pub(crate) fn from_central(index: usize, cdh: &CentralDirectoryHeader, name: Vec<u8>, extra: Vec<u8>) -> Self {
        Self {
            index,
            local_header_offset: u64::from(cdh.local_header_offset),
            encrypted_filename: name,
            decrypted_filename: None,
            safe_filename: synthetic_name(index),
            version_needed: cdh.version_needed,
            flags: cdh.flags,
            compression_method: CompressionMethod::from_u16(cdh.compression_method),
            mod_time: cdh.mod_time,
            mod_date: cdh.mod_date,
            crc32: cdh.crc32,
            compressed_size: cdh.compressed_size,
            uncompressed_size: cdh.uncompressed_size,
            extra_field: extra,
            header_size: None,
        }
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn has_data_descriptor(&self) -> bool {
        self.flags & FLAG_DATA_DESCRIPTOR != 0
    }

    /// Whether the local header was found and validated.
    pub fn is_valid(&self) -> bool {
        self.header_size.is_some()
    }

    /// Absolute offset of the (possibly encrypted) payload.
    pub fn data_offset(&self) -> Option<u64> {
        self.header_size.map(|h| self.local_header_offset + h)
    }

    /// Display name: the decoded name when available.
    pub fn display_name(&self) -> &str {
        self.decrypted_filename.as_deref().unwrap_or(&self.safe_filename)
    }

    pub fn is_directory(&self) -> bool {
        self.display_name().ends_with('/')
    }

    /// Parse modification date to (year, month, day)
    pub fn mod_date(&self) -> (u16, u8, u8) {
        dos_date_parts(self.mod_date)
    }

    /// Parse modification time to (hour, minute, second)
    pub fn mod_time(&self) -> (u8, u8, u8) {
        dos_time_parts(self.mod_time)
    }
}

/// Name used when an entry's name cannot be decoded.
pub fn synthetic_name(index: usize) -> String {
    format!("unknown_{index:06}.bin")
}
