//! # ripf
//!
//! Reading, extracting, optimizing and creating IPF archives: ZIP containers
//! whose payloads and filenames are encrypted with the traditional PKZIP
//! stream cipher under a fixed 48-byte password.
//!
//! ## Features
//!
//! - Parallel extraction with per-entry error isolation and cancellation
//! - Filename decoding across UTF-8, Windows-1252, EUC-KR, GBK and Shift-JIS
//! - Optimization: drop superseded copies of a file, copying payloads verbatim
//! - Creation of new encrypted archives from a folder
//!
//! ## Example
//!
//! ```no_run
//! use std::path::Path;
//! use ripf::{ExtractOptions, Password, ops};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let report = ops::extract::extract(
//!         Path::new("ui.ipf"),
//!         Path::new("ui"),
//!         &Password::default(),
//!         ExtractOptions::default(),
//!     )
//!     .await?;
//!     println!("{} of {} files extracted", report.succeeded(), report.total());
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod io;
pub mod ipf;
pub mod ops;

pub use cli::Cli;
pub use config::Password;
pub use error::{EntryError, IpfError};
pub use io::{LocalFileReader, MemoryReader, ReadAt};
pub use ipf::{
    ArchiveEntry, CancellationToken, ExtractOptions, ExtractionOutcome, ExtractionReport, IpfReader, IpfWriter,
    WriteOptions,
};
