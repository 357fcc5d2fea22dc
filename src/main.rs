//! Main entry point for the ripf CLI application.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use ripf::cli::{Command, default_output_dir};
use ripf::ops::create::CreateOptions;
use ripf::ops::{create, extract, list, optimize};
use ripf::{ArchiveEntry, CancellationToken, Cli, ExtractOptions, ExtractionOutcome, ExtractionReport};

/// Failed entries printed after an extraction before the rest are summarized.
const MAX_LISTED_ERRORS: usize = 10;

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(cli.log_filter()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let password = cli.password()?;

    match &cli.command {
        Command::Extract {
            archive,
            output,
            workers,
            batch_size,
            strict,
        } => {
            let cancel = CancellationToken::new();
            spawn_ctrl_c_handler(cancel.clone());

            let options = ExtractOptions {
                workers: *workers,
                batch_size: *batch_size,
                strict_verification: *strict,
                cancel,
            };
            let output = output.clone().unwrap_or_else(|| default_output_dir(archive));
            let report = extract::extract(archive, &output, &password, options).await?;
            print_extraction(&report, cli.is_quiet());
            if report.outcome() == ExtractionOutcome::ManyFailures {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List { archive, long } => {
            let entries = list::list(archive, &password).await?;
            print_listing(&entries, *long);
        }
        Command::Optimize {
            archive,
            output,
            no_backup,
        } => {
            let report = match output {
                Some(output) => optimize::optimize_to(archive, output, &password).await?,
                None => optimize::optimize(archive, !no_backup, &password).await?,
            };
            if !cli.is_quiet() {
                println!(
                    "{} files, {} unique, {} duplicates removed, {} skipped",
                    report.total_files, report.unique_files, report.removed_duplicates, report.skipped_invalid
                );
                println!(
                    "{} -> {} (saved {})",
                    format_size(report.original_size),
                    format_size(report.optimized_size),
                    format_size(report.saved_bytes())
                );
            }
        }
        Command::Create {
            source,
            output,
            no_encrypt,
            level,
        } => {
            let options = CreateOptions {
                encrypt: !no_encrypt,
                compression_level: *level,
                password,
            };
            let report = create::create(source, output, &options).await?;
            if !cli.is_quiet() {
                println!(
                    "{} files, {} -> {}",
                    report.files,
                    format_size(report.uncompressed_bytes),
                    format_size(report.archive_size)
                );
            }
        }
    }

    Ok(ExitCode::SUCCESS)
}

/// Stop dispatching new entries on the first Ctrl-C.
fn spawn_ctrl_c_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, finishing in-flight entries");
            cancel.cancel();
        }
    });
}

fn print_extraction(report: &ExtractionReport, quiet: bool) {
    if quiet && report.failed() == 0 {
        return;
    }

    for failure in report.errors().take(MAX_LISTED_ERRORS) {
        if let Some(error) = &failure.error {
            eprintln!("  failed: {} ({})", failure.name, error);
        }
    }
    if report.failed() > MAX_LISTED_ERRORS {
        eprintln!("  ... and {} more", report.failed() - MAX_LISTED_ERRORS);
    }

    println!(
        "{}: {}/{} files ({:.1}%), {} in {:.2}s ({:.1} MB/s)",
        report.outcome(),
        report.succeeded(),
        report.total(),
        report.success_rate(),
        format_size(report.total_bytes()),
        report.elapsed.as_secs_f64(),
        report.throughput_mb_s()
    );
}

/// Names only, or a table with sizes, ratio and timestamps.
fn print_listing(entries: &[ArchiveEntry], long: bool) {
    if long {
        println!(
            "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
            "Length", "Size", "Cmpr", "Date", "Time"
        );
        println!("{}", "-".repeat(70));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in entries {
        if !long {
            println!("{}", entry.display_name());
            continue;
        }

        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        let uncompressed = u64::from(entry.uncompressed_size);
        let compressed = u64::from(entry.compressed_size);
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            uncompressed,
            compressed,
            ratio(compressed, uncompressed),
            year,
            month,
            day,
            hour,
            minute,
            entry.display_name()
        );

        if !entry.is_directory() {
            total_uncompressed += uncompressed;
            total_compressed += compressed;
            file_count += 1;
        }
    }

    if long {
        println!("{}", "-".repeat(70));
        println!(
            "{:>10}  {:>10}  {}  {:>21}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            "",
            file_count
        );
    }
}

/// Space saved as a percentage column.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed == 0 || compressed >= uncompressed {
        return "  0%".to_string();
    }
    format!("{:>4}%", 100 - compressed * 100 / uncompressed)
}

/// Format a byte size into a human-readable string.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}
