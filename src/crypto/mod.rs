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


//! Content keys and DRM
//!
//! # DRM Formats
//! - **PlayPlay** (OGG/Vorbis): AES-128-CTR with a fixed IV, key from the
//!   PlayPlay license plus an external deobfuscator
//! - **Widevine** (MP4/AAC): key and sample decryption by an external CDM,
//!   driven by the PSSH in the file's seek table
//! - **Unencrypted**: MP3 and previews

pub mod key;
pub mod playplay;
pub mod widevine;

pub use key::DecryptionKey;
pub use playplay::{KeyDeobfuscator, OggDecryptor};
pub use widevine::WidevineCdm;
