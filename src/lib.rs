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


//! spdl-core
//!
//! Resolves playable audio content to CDN storage, negotiates decryption keys
//! through the PlayPlay and Widevine license exchanges, and streams decrypted,
//! container-valid audio to the caller.
//!
//! # Modules
//! - `api` - HTTP transport, session headers, storage-resolve, PlayPlay license, seek tables
//! - `content` - file ids, playable entities, format catalog
//! - `crypto` - content keys, the OGG stream decryptor, Widevine capability
//! - `download` - output sink, segmented fetch, passthrough, decrypt paths, streamer
//!
//! The key deobfuscator, the Widevine CDM and the session provider are
//! supplied by the embedding application through the [`KeyDeobfuscator`],
//! [`WidevineCdm`] and [`SessionProvider`] traits.

pub mod api;
pub mod config;
pub mod content;
pub mod crypto;
pub mod download;
pub mod error;

pub use api::client::{HttpTransport, ReqwestTransport};
pub use api::session::{SessionHeaders, SessionProvider, StaticSession};
pub use config::{Endpoints, StreamerConfig};
pub use content::file::{ContentKind, FileId, PlayableEntity, PlayableFile};
pub use crypto::key::DecryptionKey;
pub use crypto::playplay::KeyDeobfuscator;
pub use crypto::widevine::WidevineCdm;
pub use download::sink::{AudioSink, AudioStream};
pub use download::streamer::ContentStreamer;
pub use error::{Result, SpdlError};
