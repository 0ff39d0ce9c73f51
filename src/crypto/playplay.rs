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


//! PlayPlay stream decryption (OGG/Vorbis)
//!
//! # Format Details
//! - Cipher: AES-128 in CTR mode, big-endian 128-bit counter
//! - IV: one fixed constant for every file; only the key is per file
//! - The first 167 (0xa7) decrypted bytes are an opaque header and are dropped
//! - The container proper starts at the first `OggS` page marker after that
//!
//! # Decryption Process
//! 1. Obtain the obfuscated key through the license exchange
//!    (`api::license`)
//! 2. Hand it to the external [`KeyDeobfuscator`] to get the raw key
//! 3. Feed CDN chunks through [`OggDecryptor::update`] in network order
//! 4. Call [`OggDecryptor::finish`] at end of stream; it fails if the marker
//!    was never seen, which is how a wrong key shows up
//!
//! Cipher state carries across chunks, so chunk boundaries may fall anywhere,
//! including inside the skipped header or inside the marker itself.

use crate::content::file::FileId;
use crate::crypto::key::DecryptionKey;
use crate::error::{Result, SpdlError};
use aes::cipher::{KeyIvInit, StreamCipher};
use async_trait::async_trait;
use bytes::{Buf, Bytes, BytesMut};

type Aes128Ctr = ctr::Ctr128BE<aes::Aes128>;

/// Fixed CTR initial counter block
pub const AUDIO_AES_IV: [u8; 16] = [
    0x72, 0xe0, 0x67, 0xfb, 0xdd, 0xcb, 0xcf, 0x77, 0xeb, 0xe8, 0xbc, 0x64, 0x3f, 0x63, 0x0d, 0x93,
];

/// Decrypted header bytes discarded before the container
pub const HEADER_SKIP: usize = 0xa7;

/// First bytes of every Ogg page
pub const OGG_MARKER: &[u8; 4] = b"OggS";

/// External capability that turns an obfuscated license key into a raw key
#[async_trait]
pub trait KeyDeobfuscator: Send + Sync {
    /// Client identity token sent in every license request
    fn token(&self) -> Bytes;

    /// Recover the raw key for `file_id`; should return 16 bytes
    async fn deobfuscate(&self, file_id: &FileId, obfuscated_key: &[u8]) -> Result<Vec<u8>>;
}

enum State {
    /// Marker not seen yet; holds up to three trailing bytes that may start it
    Searching(BytesMut),
    Emitting,
}

/// Incremental AES-CTR decryptor with header skip and marker resync
pub struct OggDecryptor {
    cipher: Aes128Ctr,
    skipped: usize,
    state: State,
}

impl OggDecryptor {
    pub fn new(key: &DecryptionKey) -> Self {
        Self {
            cipher: Aes128Ctr::new(key.as_bytes().into(), (&AUDIO_AES_IV).into()),
            skipped: 0,
            state: State::Searching(BytesMut::new()),
        }
    }

    /// Decrypt the next ciphertext chunk
    ///
    /// Returns the plaintext that may be forwarded, or `None` while still
    /// inside the header or before the marker.
    pub fn update(&mut self, chunk: &[u8]) -> Option<Bytes> {
        let mut buf = BytesMut::from(chunk);
        self.cipher.apply_keystream(&mut buf);

        if self.skipped < HEADER_SKIP {
            let n = (HEADER_SKIP - self.skipped).min(buf.len());
            self.skipped += n;
            buf.advance(n);
        }
        if buf.is_empty() {
            return None;
        }

        match &mut self.state {
            State::Emitting => Some(buf.freeze()),
            State::Searching(tail) => {
                tail.extend_from_slice(&buf);
                match find_marker(tail) {
                    Some(pos) => {
                        tail.advance(pos);
                        let out = std::mem::take(tail).freeze();
                        self.state = State::Emitting;
                        Some(out)
                    }
                    None => {
                        let keep = tail.len().min(OGG_MARKER.len() - 1);
                        let drop = tail.len() - keep;
                        tail.advance(drop);
                        None
                    }
                }
            }
        }
    }

    /// Whether the container marker has been found
    pub fn is_synced(&self) -> bool {
        matches!(self.state, State::Emitting)
    }

    /// Check the stream ended with a valid container
    ///
    /// # Errors
    /// `InvalidDecryptedContainer` if the marker never appeared
    pub fn finish(self) -> Result<()> {
        if self.is_synced() {
            Ok(())
        } else {
            Err(SpdlError::InvalidDecryptedContainer)
        }
    }
}

fn find_marker(haystack: &[u8]) -> Option<usize> {
    haystack
        .windows(OGG_MARKER.len())
        .position(|window| window == OGG_MARKER)
}
