//! Error types for IPF archive handling.
//!
//! [`IpfError`] describes problems with the archive as a whole or with one of
//! its on-disk structures. [`EntryError`] is the per-entry taxonomy reported
//! by the extraction engine; it is carried as data inside results instead of
//! being propagated.

use std::io;
use thiserror::Error;

/// Archive-level and structural errors.
#[derive(Error, Debug)]
pub enum IpfError {
    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// No End of Central Directory record could be located.
    #[error("end of central directory record not found")]
    EocdNotFound,

    /// A structure did not start with its mandatory signature.
    #[error("invalid {structure} signature: expected {expected:#010x}, got {actual:#010x}")]
    BadSignature {
        structure: &'static str,
        expected: u32,
        actual: u32,
    },

    /// A structure ended before its fixed or variable part was complete.
    #[error("truncated {0}")]
    Truncated(&'static str),

    /// The central directory does not fit inside the archive.
    #[error("central directory out of bounds: offset {offset}, size {size}, archive size {archive_size}")]
    CentralDirectoryOutOfBounds {
        offset: u64,
        size: u64,
        archive_size: u64,
    },

    /// A local header points outside of the archive or declares absurd lengths.
    #[error("local header at offset {offset} is invalid: {reason}")]
    InvalidLocalHeader { offset: u64, reason: String },

    /// The scan finished without a single usable entry.
    #[error("archive contains no valid entries")]
    NoEntries,

    /// The end record can only count 65535 entries.
    #[error("too many entries for an IPF archive: {0}")]
    TooManyEntries(usize),

    /// Offsets and sizes are 32 bits wide.
    #[error("archive exceeds the 4 GiB limit of 32-bit offsets ({0} bytes)")]
    ArchiveTooLarge(u64),

    /// Password material could not be parsed.
    #[error("invalid password: {0}")]
    InvalidPassword(String),
}

/// Result alias for archive-level operations.
pub type Result<T> = std::result::Result<T, IpfError>;

/// Why a single entry could not be extracted.
#[derive(Error, Debug)]
pub enum EntryError {
    /// Reading the archive or writing the output failed.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// The entry's local header is damaged.
    #[error("structural error: {0}")]
    Structure(#[from] IpfError),

    /// The payload extends past the end of the archive.
    #[error("payload out of bounds: offset {offset}, size {size}, archive size {archive_size}")]
    PayloadOutOfBounds {
        offset: u64,
        size: u64,
        archive_size: u64,
    },

    /// The decrypted verification header did not carry the expected check byte.
    #[error("verification header mismatch: expected {expected:#04x}, got {actual:#04x}")]
    VerificationFailed { expected: u8, actual: u8 },

    /// Only store (0) and deflate (8) are understood.
    #[error("unsupported compression method: {0}")]
    UnsupportedCompression(u16),

    /// The deflate stream is corrupt.
    #[error("decompression failed: {0}")]
    Decompression(#[source] io::Error),

    /// The decompressed length differs from the recorded one.
    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    /// The decompressed content does not match the recorded checksum.
    #[error("CRC32 mismatch: expected {expected:08x}, got {actual:08x}")]
    CrcMismatch { expected: u32, actual: u32 },

    /// The batch was cancelled before this entry was dispatched.
    #[error("cancelled before dispatch")]
    Cancelled,

    /// The worker running this entry panicked or was aborted.
    #[error("worker task failed: {0}")]
    TaskFailed(String),
}
