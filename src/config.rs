//! Runtime configuration shared by every operation.

use std::fmt;

use crate::error::{IpfError, Result};

/// Length of the password every IPF archive is keyed with.
pub const PASSWORD_LEN: usize = 48;

/// Password embedded in the game client; identical for every archive.
const EMBEDDED_PASSWORD: [u8; PASSWORD_LEN] = [
    0x6F, 0x66, 0x4F, 0x31, 0x61, 0x30, 0x75, 0x65, 0x58, 0x41, 0x3F, 0x20, 0x5B, 0xFF, 0x73, 0x20,
    0x68, 0x20, 0x25, 0x3F, 0x4B, 0x2A, 0x71, 0x1E, 0x7D, 0x52, 0x33, 0x6C, 0x09, 0xB4, 0x57, 0x29,
    0x3C, 0x8E, 0x64, 0x2F, 0x55, 0x70, 0x1A, 0x4E, 0xC3, 0x38, 0x5D, 0x7A, 0x22, 0x91, 0x6B, 0x47,
];

/// Extraction workers used when none are requested.
pub const DEFAULT_WORKERS: usize = 4;

/// Hard ceiling on extraction workers.
pub const MAX_WORKERS: usize = 32;

/// Entries dispatched per extraction batch.
pub const DEFAULT_BATCH_SIZE: usize = 256;

/// Cipher key material.
///
/// A plain value: each cipher session copies it and derives its own state.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Password([u8; PASSWORD_LEN]);

impl Password {
    pub const fn new(bytes: [u8; PASSWORD_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 96-character hex string.
    pub fn from_hex(text: &str) -> Result<Self> {
        let bytes = hex::decode(text.trim())
            .map_err(|e| IpfError::InvalidPassword(format!("not valid hex: {e}")))?;
        let bytes: [u8; PASSWORD_LEN] = bytes.try_into().map_err(|v: Vec<u8>| {
            IpfError::InvalidPassword(format!(
                "expected {PASSWORD_LEN} bytes, got {}",
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; PASSWORD_LEN] {
        &self.0
    }
}

impl Default for Password {
    fn default() -> Self {
        Self(EMBEDDED_PASSWORD)
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Password(..)")
    }
}

/// Clamp a requested worker count to `[1, min(cpus, MAX_WORKERS)]`.
pub fn effective_workers(requested: usize) -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    requested.min(cpus).min(MAX_WORKERS).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_password_roundtrip() {
        let text = hex::encode(Password::default().as_bytes());
        assert_eq!(Password::from_hex(&text).unwrap(), Password::default());
    }

    #[test]
    fn hex_password_wrong_length() {
        let err = Password::from_hex("00ff").unwrap_err();
        assert!(matches!(err, IpfError::InvalidPassword(_)));
        assert!(Password::from_hex("zz").is_err());
    }

    #[test]
    fn worker_clamp() {
        assert_eq!(effective_workers(0), 1);
        assert!(effective_workers(1000) <= MAX_WORKERS);
        assert_eq!(effective_workers(1), 1);
    }

    #[test]
    fn debug_hides_key() {
        assert_eq!(format!("{:?}", Password::default()), "Password(..)");
    }
}
