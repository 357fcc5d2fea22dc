use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use crate::config::{DEFAULT_BATCH_SIZE, DEFAULT_WORKERS, Password};
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "ripf")]
#[command(version)]
#[command(about = "Extract, optimize and create encrypted IPF archives", long_about = None)]
#[command(after_help = "Examples:\n  \
  ripf extract data.ipf -d out        extract data.ipf into out/\n  \
  ripf list -l data.ipf               show sizes and dates of every entry\n  \
  ripf optimize data.ipf              drop superseded entries in place\n  \
  ripf create folder/ new.ipf         pack folder/ into new.ipf")]
pub struct Cli {
    /// 48-byte archive password as hex, replacing the built-in one
    #[arg(long, global = true, env = "RIPF_PASSWORD_HEX", hide_env_values = true, value_name = "HEX")]
    pub password_hex: Option<String>,

    /// More log output (-vv for trace)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (-qq => errors only)
    #[arg(short = 'q', long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Extract every file of an archive
    Extract {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Output directory (default: archive name without extension)
        #[arg(short = 'd', long, value_name = "DIR")]
        output: Option<PathBuf>,

        /// Concurrent extraction tasks
        #[arg(short = 'j', long, default_value_t = DEFAULT_WORKERS)]
        workers: usize,

        /// Entries dispatched per batch
        #[arg(long, default_value_t = DEFAULT_BATCH_SIZE)]
        batch_size: usize,

        /// Fail entries whose encryption header does not verify
        #[arg(long)]
        strict: bool,
    },

    /// List archive entries
    List {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Table with sizes, ratio and timestamps
        #[arg(short = 'l', long)]
        long: bool,
    },

    /// Remove superseded entries, keeping the newest copy of each file
    Optimize {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Write the result here instead of replacing ARCHIVE
        #[arg(short = 'o', long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Do not keep a .bak copy while rewriting in place
        #[arg(long)]
        no_backup: bool,
    },

    /// Pack a folder into a new archive
    Create {
        #[arg(value_name = "FOLDER")]
        source: PathBuf,

        #[arg(value_name = "ARCHIVE")]
        output: PathBuf,

        /// Store names and payloads unencrypted
        #[arg(long)]
        no_encrypt: bool,

        /// Deflate level, 0 stores uncompressed
        #[arg(short = 'c', long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },
}

impl Cli {
    pub fn password(&self) -> Result<Password> {
        match &self.password_hex {
            Some(text) => Password::from_hex(text),
            None => Ok(Password::default()),
        }
    }

    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    /// Default `tracing` filter for the chosen verbosity.
    pub fn log_filter(&self) -> &'static str {
        match (self.quiet, self.verbose) {
            (q, _) if q > 1 => "error",
            (1, _) => "warn",
            (_, 0) => "ripf=info",
            (_, 1) => "ripf=debug",
            _ => "ripf=trace",
        }
    }
}

/// `data/patch.ipf` -> `data/patch`
pub fn default_output_dir(archive: &Path) -> PathBuf {
    match archive.file_stem() {
        Some(stem) if archive.extension().is_some() => archive.with_file_name(stem),
        _ => archive.with_extension("out"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extract() {
        let cli = Cli::parse_from(["ripf", "extract", "a.ipf", "-j", "8", "--strict"]);
        match cli.command {
            Command::Extract { archive, workers, strict, output, .. } => {
                assert_eq!(archive, PathBuf::from("a.ipf"));
                assert_eq!(workers, 8);
                assert!(strict);
                assert!(output.is_none());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn rejects_bad_level() {
        assert!(Cli::try_parse_from(["ripf", "create", "src", "out.ipf", "-c", "12"]).is_err());
    }

    #[test]
    fn password_override() {
        let hex = "00".repeat(48);
        let cli = Cli::parse_from(["ripf", "--password-hex", &hex, "list", "a.ipf"]);
        assert_eq!(cli.password().unwrap(), Password::new([0; 48]));

        let cli = Cli::parse_from(["ripf", "--password-hex", "abcd", "list", "a.ipf"]);
        assert!(cli.password().is_err());
    }

    #[test]
    fn output_dir_defaults_to_stem() {
        assert_eq!(default_output_dir(Path::new("data/patch.ipf")), PathBuf::from("data/patch"));
        assert_eq!(default_output_dir(Path::new("patch")), PathBuf::from("patch.out"));
    }
}
