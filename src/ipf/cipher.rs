//! PKZIP traditional stream cipher.
//!
//! Three 32-bit keys are seeded with fixed constants and stirred once per
//! password byte. Each processed byte is XORed with a keystream byte derived
//! from the third key, after which all keys advance using the *plaintext*
//! byte. Decryption of a stream is therefore strictly sequential.
//!
//! A cipher is a small stack value: every entry (and every filename)
//! starts from a fresh state built from the password. Reusing a state across
//! entries silently produces garbage.

/// Size of the verification header prepended to encrypted payloads.
pub const ENCRYPTION_HEADER_SIZE: usize = 12;

const INITIAL_KEYS: [u32; 3] = [0x12345678, 0x23456789, 0x34567890];

/// CRC-32 lookup table (reflected polynomial 0xEDB88320).
const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB88320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[inline]
fn crc32_step(crc: u32, b: u8) -> u32 {
    CRC32_TABLE[((crc ^ u32::from(b)) & 0xFF) as usize] ^ (crc >> 8)
}

/// Key state of one encryption or decryption session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipCipher {
    keys: [u32; 3],
}

impl ZipCipher {
    /// Derive a fresh state from `password`.
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self { keys: INITIAL_KEYS };
        for &b in password {
            cipher.advance(b);
        }
        cipher
    }

    pub fn keys(&self) -> [u32; 3] {
        self.keys
    }

    /// Keystream byte for the current state.
    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.keys[2] | 2) & 0xFFFF;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Decrypt one byte without touching the state.
    #[inline]
    pub fn decrypt_byte(&self, b: u8) -> u8 {
        b ^ self.stream_byte()
    }

    /// Stir the keys with a plaintext byte.
    #[inline]
    pub fn advance(&mut self, plain: u8) {
        self.keys[0] = crc32_step(self.keys[0], plain);
        self.keys[1] = self.keys[1]
            .wrapping_add(self.keys[0] & 0xFF)
            .wrapping_mul(134775813)
            .wrapping_add(1);
        self.keys[2] = crc32_step(self.keys[2], (self.keys[1] >> 24) as u8);
    }

    /// Encrypt one byte and advance with the plaintext.
    #[inline]
    pub fn encrypt_byte(&mut self, plain: u8) -> u8 {
        let out = plain ^ self.stream_byte();
        self.advance(plain);
        out
    }

    /// Decrypt `buf` in place, byte by byte.
    pub fn decrypt(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            let plain = self.decrypt_byte(*b);
            self.advance(plain);
            *b = plain;
        }
    }

    /// Encrypt `buf` in place.
    pub fn encrypt(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            *b = self.encrypt_byte(*b);
        }
    }

    /// Decrypt a copy of `data`.
    pub fn decrypt_to_vec(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.decrypt(&mut out);
        out
    }

    /// Consume the 12-byte verification header and return its check byte.
    pub fn decrypt_header(&mut self, header: &[u8; ENCRYPTION_HEADER_SIZE]) -> u8 {
        let mut plain = *header;
        self.decrypt(&mut plain);
        plain[ENCRYPTION_HEADER_SIZE - 1]
    }

    /// Produce the encrypted verification header from 11 salt bytes and a check byte.
    pub fn encrypt_header(
        &mut self,
        salt: &[u8; ENCRYPTION_HEADER_SIZE - 1],
        check: u8,
    ) -> [u8; ENCRYPTION_HEADER_SIZE] {
        let mut header = [0u8; ENCRYPTION_HEADER_SIZE];
        header[..ENCRYPTION_HEADER_SIZE - 1].copy_from_slice(salt);
        header[ENCRYPTION_HEADER_SIZE - 1] = check;
        self.encrypt(&mut header);
        header
    }
}
