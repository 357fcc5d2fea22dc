//! The IPF container format.
//!
//! IPF is a ZIP layout with traditional PKZIP encryption applied to both the
//! payloads and the stored filenames, all under one fixed 48-byte password.

pub mod cipher;
pub mod dedup;
pub mod entry;
pub mod extractor;
pub mod names;
pub mod reader;
pub mod structures;
pub mod writer;

pub use cipher::ZipCipher;
pub use dedup::{DeduplicationOutcome, dedupe};
pub use entry::ArchiveEntry;
pub use extractor::{
    CancellationToken, ExtractOptions, ExtractionOutcome, ExtractionReport, ExtractionResult, Extractor,
};
pub use names::{NameStats, decrypt_filenames};
pub use reader::{IpfReader, ScanTally};
pub use writer::{DataDescriptorPolicy, EntryMeta, IpfWriter, WriteOptions, WriteSummary, write_archive};
