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


//! Widevine license capability (MP4/AAC)
//!
//! The CDM itself (device keys, license challenge signing, content key
//! unwrapping, sample decryption) is an external collaborator behind the
//! [`WidevineCdm`] trait. This module only prepares its input: the
//! Protection System Specific Header taken from the file's seek table.
//!
//! # PSSH box layout (version 0)
//! ```text
//! u32  size            (big endian, whole box)
//! [4]  "pssh"
//! u8   version = 0
//! [3]  flags = 0
//! [16] system id       (Widevine: edef8ba9-79d6-4ace-a3c8-27dcd51d21ed)
//! u32  data size
//! [..] init data
//! ```
//!
//! Seek tables carry either the whole box or only the init data; the latter
//! is wrapped before being handed to the CDM.

use crate::crypto::key::DecryptionKey;
use crate::error::{Result, SpdlError};
use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

/// Widevine DRM system id
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21, 0xed,
];

const PSSH_BOX_TYPE: &[u8; 4] = b"pssh";

/// Header bytes preceding the init data in a version-0 box
const PSSH_V0_HEADER_LEN: usize = 4 + 4 + 4 + 16 + 4;

/// External Widevine content decryption module
#[async_trait]
pub trait WidevineCdm: Send + Sync {
    /// Run a license exchange for `pssh` and return the raw content key
    async fn license(&self, pssh: &[u8]) -> Result<Vec<u8>>;

    /// Decrypt a complete, reassembled ciphertext
    async fn decrypt(&self, key: &DecryptionKey, ciphertext: Bytes) -> Result<Bytes>;
}

/// Whether `data` already is a complete `pssh` box
pub fn is_pssh_box(data: &[u8]) -> bool {
    data.len() >= PSSH_V0_HEADER_LEN
        && &data[4..8] == PSSH_BOX_TYPE
        && u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize == data.len()
}

/// Return a `pssh` box for `data`, wrapping bare Widevine init data
///
/// # Errors
/// `InvalidSeekTable` for empty input
pub fn pssh_box(data: &[u8]) -> Result<Vec<u8>> {
    if data.is_empty() {
        return Err(SpdlError::InvalidSeekTable("empty pssh".to_string()));
    }
    if is_pssh_box(data) {
        return Ok(data.to_vec());
    }

    let total = PSSH_V0_HEADER_LEN + data.len();
    let mut pssh = Vec::with_capacity(total);
    pssh.extend_from_slice(&(total as u32).to_be_bytes());
    pssh.extend_from_slice(PSSH_BOX_TYPE);
    pssh.extend_from_slice(&[0, 0, 0, 0]);
    pssh.extend_from_slice(&WIDEVINE_SYSTEM_ID);
    pssh.extend_from_slice(&(data.len() as u32).to_be_bytes());
    pssh.extend_from_slice(data);
    Ok(pssh)
}

/// Obtain the content key for a seek table's PSSH
///
/// # Errors
/// `Drm` when the CDM answers without a key, `InvalidKey` when the key has
/// the wrong length, or whatever the CDM itself reports
pub async fn acquire_key(cdm: &dyn WidevineCdm, pssh: &[u8]) -> Result<DecryptionKey> {
    debug!(pssh_len = pssh.len(), "Requesting Widevine license");
    let raw = cdm.license(pssh).await?;
    if raw.is_empty() {
        return Err(SpdlError::drm("widevine license", "CDM returned no content key"));
    }
    DecryptionKey::from_slice(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedCdm(Vec<u8>);

    #[async_trait]
    impl WidevineCdm for FixedCdm {
        async fn license(&self, _pssh: &[u8]) -> Result<Vec<u8>> {
            Ok(self.0.clone())
        }

        async fn decrypt(&self, _key: &DecryptionKey, ciphertext: Bytes) -> Result<Bytes> {
            Ok(ciphertext)
        }
    }

    #[test]
    fn test_wraps_bare_init_data() {
        let init = [0x08, 0x01, 0x12, 0x10];
        let pssh = pssh_box(&init).unwrap();

        assert_eq!(pssh.len(), PSSH_V0_HEADER_LEN + init.len());
        assert_eq!(&pssh[0..4], &(pssh.len() as u32).to_be_bytes());
        assert_eq!(&pssh[4..8], b"pssh");
        assert_eq!(&pssh[12..28], &WIDEVINE_SYSTEM_ID);
        assert_eq!(&pssh[28..32], &4u32.to_be_bytes());
        assert_eq!(&pssh[32..], &init);
        assert!(is_pssh_box(&pssh));
    }

    #[test]
    fn test_full_box_passes_through() {
        let pssh = pssh_box(b"init-data").unwrap();
        assert_eq!(pssh_box(&pssh).unwrap(), pssh);
    }

    #[test]
    fn test_empty_pssh_rejected() {
        assert!(matches!(pssh_box(&[]), Err(SpdlError::InvalidSeekTable(_))));
    }

    #[tokio::test]
    async fn test_acquire_key_checks_length() {
        let key = acquire_key(&FixedCdm(vec![7; 16]), b"pssh").await.unwrap();
        assert_eq!(key.as_bytes(), &[7u8; 16]);

        let result = acquire_key(&FixedCdm(vec![7; 8]), b"pssh").await;
        assert!(matches!(result, Err(SpdlError::InvalidKey { actual: 8, .. })));
    }

    #[tokio::test]
    async fn test_missing_key_is_drm_error() {
        let err = acquire_key(&FixedCdm(Vec::new()), b"pssh").await.unwrap_err();
        assert!(matches!(err, SpdlError::Drm { ref operation, .. } if operation == "widevine license"));
        assert!(err.is_drm_error());
        assert!(!err.requires_remediation());
    }
}
