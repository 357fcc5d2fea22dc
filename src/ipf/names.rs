//! Filename decryption and decoding.
//!
//! Names are stored encrypted with their own cipher session (no verification
//! header). Once decrypted they are raw bytes in whatever code page the
//! packing tool used, so several decodings are tried in turn and the first
//! one that looks like a filename wins.

use encoding_rs::{EUC_KR, Encoding, GBK, SHIFT_JIS, WINDOWS_1252};
use tracing::{debug, warn};

use super::cipher::ZipCipher;
use super::entry::{ArchiveEntry, synthetic_name};
use crate::config::Password;

/// Minimum share of filename-like characters for a decoding to be accepted.
const MIN_PRINTABLE_RATIO: f64 = 0.8;

/// Single-byte and CJK fallbacks tried after strict UTF-8.
const FALLBACK_ENCODINGS: [&Encoding; 4] = [WINDOWS_1252, EUC_KR, GBK, SHIFT_JIS];

/// Counts from one name pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NameStats {
    pub decoded: usize,
    pub fallback: usize,
}

/// Decrypt raw name bytes with a fresh cipher session.
pub fn decrypt_name(raw: &[u8], password: &Password) -> Vec<u8> {
    ZipCipher::new(password.as_bytes()).decrypt_to_vec(raw)
}

fn is_filename_char(c: char) -> bool {
    c.is_ascii_graphic() || c == ' ' || (!c.is_ascii() && c.is_alphabetic())
}

/// C1 controls and Latin-1 punctuation or symbols, where CJK byte pairs land
/// when read as Windows-1252.
fn is_legacy_noise(c: char) -> bool {
    ('\u{80}'..='\u{BF}').contains(&c)
}

fn looks_like_filename(text: &str) -> bool {
    let total = text.chars().count();
    if total == 0 {
        return false;
    }
    let good = text.chars().filter(|&c| is_filename_char(c)).count();
    good as f64 / total as f64 >= MIN_PRINTABLE_RATIO
}

/// Decode name bytes: strict UTF-8 first, then each fallback code page.
pub fn decode_name(bytes: &[u8]) -> Option<String> {
    if let Ok(text) = std::str::from_utf8(bytes) {
        if looks_like_filename(text) {
            return Some(text.to_string());
        }
    }

    FALLBACK_ENCODINGS.iter().find_map(|encoding| {
        encoding
            .decode_without_bom_handling_and_without_replacement(bytes)
            .filter(|text| !text.chars().any(is_legacy_noise) && looks_like_filename(text))
            .map(|text| text.into_owned())
    })
}

/// Turn an archive name into a relative path that cannot escape the output directory.
///
/// Backslashes become separators, `.`/`..`/empty components are dropped and
/// characters that are control codes or reserved on common filesystems are
/// replaced with `_`.
pub fn sanitize_name(name: &str) -> Option<String> {
    let parts: Vec<String> = name
        .split(['/', '\\'])
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .map(|part| {
            part.chars()
                .map(|c| {
                    if c.is_control() || matches!(c, '<' | '>' | ':' | '"' | '|' | '?' | '*') {
                        '_'
                    } else {
                        c
                    }
                })
                .collect()
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Fill in the name fields of one entry.
pub fn resolve_name(entry: &mut ArchiveEntry, password: &Password) -> bool {
    let plain = if entry.is_encrypted() {
        decrypt_name(&entry.encrypted_filename, password)
    } else {
        entry.encrypted_filename.clone()
    };

    let decoded = decode_name(&plain);
    let safe = decoded.as_deref().and_then(sanitize_name);
    match (decoded, safe) {
        (Some(name), Some(safe)) => {
            entry.decrypted_filename = Some(name);
            entry.safe_filename = safe;
            true
        }
        (decoded, _) => {
            debug!(index = entry.index, "name could not be decoded, using synthetic name");
            entry.decrypted_filename = decoded;
            entry.safe_filename = synthetic_name(entry.index);
            false
        }
    }
}

/// Decrypt every entry name, spreading the work over `workers` threads.
///
/// Each thread owns a disjoint slice of entries and builds its own cipher
/// sessions.
pub fn decrypt_filenames(entries: &mut [ArchiveEntry], password: &Password, workers: usize) -> NameStats {
    if entries.is_empty() {
        return NameStats::default();
    }
    let chunk = entries.len().div_ceil(workers.max(1));

    let decoded: usize = std::thread::scope(|scope| {
        let handles: Vec<_> = entries
            .chunks_mut(chunk)
            .map(|slice| {
                scope.spawn(move || {
                    slice
                        .iter_mut()
                        .map(|entry| resolve_name(entry, password))
                        .filter(|&decoded| decoded)
                        .count()
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap_or(0))
            .sum()
    });

    let stats = NameStats {
        decoded,
        fallback: entries.len() - decoded,
    };
    if stats.fallback > 0 {
        warn!(fallback = stats.fallback, "some filenames fell back to synthetic names");
    }
    stats
}
