// spdl-core - Playable content resolution and decryption streaming
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Content decryption keys
//!
//! # Lifetime
//! A key is obtained per file, moved into the decrypt step of the stream that
//! requested it and dropped with that stream. It is never cached or shared
//! between files.
//!
//! # Logging
//! `Debug` is redacted. Never format the raw bytes anywhere else either.

use crate::error::{Result, SpdlError};
use std::fmt;

/// Length of an AES-128 content key
pub const KEY_LENGTH: usize = 16;

/// Raw 128-bit content key
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionKey([u8; KEY_LENGTH]);

impl DecryptionKey {
    pub fn new(bytes: [u8; KEY_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Build a key from bytes returned by an external capability
    ///
    /// # Errors
    /// `InvalidKey` when the slice is not exactly 16 bytes
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let key: [u8; KEY_LENGTH] = bytes.try_into().map_err(|_| SpdlError::InvalidKey {
            expected: KEY_LENGTH,
            actual: bytes.len(),
        })?;
        Ok(Self(key))
    }

    /// Parse a 32-character hex key
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        Self::from_slice(&hex::decode(hex_key.trim())?)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LENGTH] {
        &self.0
    }
}

impl fmt::Debug for DecryptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DecryptionKey(<redacted>)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_length_enforced() {
        assert!(DecryptionKey::from_slice(&[0u8; 16]).is_ok());
        match DecryptionKey::from_slice(&[0u8; 20]) {
            Err(SpdlError::InvalidKey { expected, actual }) => {
                assert_eq!(expected, 16);
                assert_eq!(actual, 20);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_key_from_hex() {
        let key = DecryptionKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(key.as_bytes()[15], 0x0f);
        assert!(DecryptionKey::from_hex("0001").is_err());
    }

    #[test]
    fn test_debug_is_redacted() {
        let key = DecryptionKey::new([0x42; 16]);
        let printed = format!("{:?}", key);
        assert!(!printed.contains("42"));
        assert!(printed.contains("redacted"));
    }
}
