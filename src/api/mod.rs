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


//! Service protocol clients
//!
//! Everything that talks to the network: the transport abstraction, session
//! header snapshots, storage-resolve, the PlayPlay license exchange and seek
//! tables.

pub mod client;
pub mod license;
pub mod proto;
pub mod seektable;
pub mod session;
pub mod storage;

// Re-export commonly used types
pub use client::{HttpRequest, HttpResponse, HttpTransport, ReqwestTransport};
pub use license::PlayPlayLicenser;
pub use seektable::{SeekTable, SeekTableClient};
pub use session::{SessionHeaders, SessionProvider, StaticSession};
pub use storage::{CdnUrls, StorageResolution, StorageResolver, StorageTarget};
