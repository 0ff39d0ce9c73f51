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


//! Decrypt paths, one per wire-format family
//!
//! | Family      | Path                | Key source           | Fetch              |
//! |-------------|---------------------|----------------------|--------------------|
//! | OGG/Vorbis  | [`PlayPlayPath`]    | PlayPlay + deobfuscator | one CDN GET, streamed |
//! | MP4/AAC     | [`WidevinePath`]    | seek table PSSH + CDM | ranged segments   |
//! | MP3         | [`PassthroughPath`] | none                 | CDN GET, preview fallback |
//!
//! The streamer resolves storage before calling a path, so every path
//! receives its [`StorageTarget`] in the [`PathJob`].

use crate::api::client::{BodyStream, HttpRequest, HttpTransport};
use crate::api::license::PlayPlayLicenser;
use crate::api::seektable::SeekTableClient;
use crate::api::session::SessionHeaders;
use crate::api::storage::StorageTarget;
use crate::config::Endpoints;
use crate::content::file::{ContentKind, PlayableFile};
use crate::content::format::PathKind;
use crate::crypto::playplay::OggDecryptor;
use crate::crypto::widevine::{acquire_key, WidevineCdm};
use crate::download::passthrough;
use crate::download::segments::SegmentFetcher;
use crate::download::sink::AudioSink;
use crate::error::{Result, SpdlError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::sync::Arc;
use tracing::{debug, info};

/// Everything a path needs to produce one file
#[derive(Debug)]
pub struct PathJob<'a> {
    pub file: &'a PlayableFile,
    pub content_kind: ContentKind,
    pub target: StorageTarget,
    pub session: &'a SessionHeaders,
}

/// One way of turning a resolved file into plaintext audio
#[async_trait]
pub trait DecryptPath: Send + Sync {
    fn kind(&self) -> PathKind;

    /// Write the plaintext of `job` into `sink`
    async fn run(&self, job: PathJob<'_>, sink: &mut AudioSink) -> Result<()>;
}

// ============================================================================
// PLAYPLAY (OGG)
// ============================================================================

pub struct PlayPlayPath {
    transport: Arc<dyn HttpTransport>,
    licenser: PlayPlayLicenser,
}

impl PlayPlayPath {
    pub fn new(transport: Arc<dyn HttpTransport>, licenser: PlayPlayLicenser) -> Self {
        Self { transport, licenser }
    }

    async fn open(&self, target: StorageTarget) -> Result<BodyStream> {
        let urls = match target {
            StorageTarget::Inline(bytes) => {
                return Ok(stream::once(async move { Ok(bytes) }).boxed());
            }
            StorageTarget::Cdn(urls) => urls,
        };

        let url = urls.pick().to_string();
        debug!(url = %url, "Opening encrypted stream");
        let response = self
            .transport
            .send(HttpRequest::get(url.clone()))
            .await
            .map_err(|e| SpdlError::ContentUnavailable(format!("{}: {}", url, e)))?;

        if !response.is_success() {
            return Err(SpdlError::ContentUnavailable(format!(
                "{} returned status {}",
                url, response.status
            )));
        }
        Ok(response.into_body())
    }
}

#[async_trait]
impl DecryptPath for PlayPlayPath {
    fn kind(&self) -> PathKind {
        PathKind::PlayPlay
    }

    async fn run(&self, job: PathJob<'_>, sink: &mut AudioSink) -> Result<()> {
        let file_id = job.file.id;
        let key = self
            .licenser
            .get_key(&file_id, job.content_kind.license_content_type(), job.session)
            .await?;

        let mut body = self.open(job.target).await?;
        let mut decryptor = OggDecryptor::new(&key);

        while let Some(chunk) = body.next().await {
            let chunk = chunk
                .map_err(|e| SpdlError::ContentUnavailable(format!("stream interrupted: {}", e)))?;
            if let Some(plain) = decryptor.update(&chunk) {
                sink.write(plain).await?;
            }
        }

        decryptor.finish()?;
        info!(file_id = %file_id, bytes = sink.bytes_written(), "OGG stream decrypted");
        Ok(())
    }
}

// ============================================================================
// WIDEVINE (MP4)
// ============================================================================

pub struct WidevinePath {
    seektables: SeekTableClient,
    fetcher: SegmentFetcher,
    cdm: Arc<dyn WidevineCdm>,
    write_chunk_size: usize,
}

impl WidevinePath {
    pub fn new(
        seektables: SeekTableClient,
        fetcher: SegmentFetcher,
        cdm: Arc<dyn WidevineCdm>,
        write_chunk_size: usize,
    ) -> Self {
        Self {
            seektables,
            fetcher,
            cdm,
            write_chunk_size: write_chunk_size.max(1),
        }
    }
}

#[async_trait]
impl DecryptPath for WidevinePath {
    fn kind(&self) -> PathKind {
        PathKind::Widevine
    }

    async fn run(&self, job: PathJob<'_>, sink: &mut AudioSink) -> Result<()> {
        let file_id = job.file.id;
        let urls = match job.target {
            StorageTarget::Cdn(urls) => urls,
            StorageTarget::Inline(_) => {
                return Err(SpdlError::storage_unavailable(
                    file_id.to_hex(),
                    "segmented content requires CDN hosts",
                ))
            }
        };

        let table = self.seektables.fetch(&file_id).await?;
        let key = acquire_key(self.cdm.as_ref(), &table.pssh).await?;
        let ciphertext = self.fetcher.fetch(&table, &urls, sink).await?;
        let plaintext = self.cdm.decrypt(&key, ciphertext).await?;

        write_chunked(sink, plaintext, self.write_chunk_size).await?;
        info!(file_id = %file_id, bytes = sink.bytes_written(), "MP4 content decrypted");
        Ok(())
    }
}

/// Forward a complete buffer in slices so backpressure still applies
async fn write_chunked(sink: &mut AudioSink, mut data: Bytes, chunk_size: usize) -> Result<()> {
    while !data.is_empty() {
        let chunk = data.split_to(chunk_size.min(data.len()));
        sink.write(chunk).await?;
    }
    Ok(())
}

// ============================================================================
// PASSTHROUGH (MP3)
// ============================================================================

pub struct PassthroughPath {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
}

impl PassthroughPath {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: Endpoints) -> Self {
        Self { transport, endpoints }
    }
}

#[async_trait]
impl DecryptPath for PassthroughPath {
    fn kind(&self) -> PathKind {
        PathKind::Passthrough
    }

    async fn run(&self, job: PathJob<'_>, sink: &mut AudioSink) -> Result<()> {
        let file_id = job.file.id;
        match job.target {
            StorageTarget::Inline(bytes) => sink.write(bytes).await?,
            StorageTarget::Cdn(urls) => {
                let fallback = self.endpoints.preview_url(&file_id);
                passthrough::copy(self.transport.as_ref(), urls.pick(), &fallback, sink).await?;
            }
        }
        info!(file_id = %file_id, bytes = sink.bytes_written(), "Passthrough finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::sink::channel;

    #[tokio::test]
    async fn test_write_chunked_slices() {
        let (mut sink, mut stream) = channel(8);
        write_chunked(&mut sink, Bytes::from_static(b"abcdefg"), 3).await.unwrap();
        drop(sink);

        let mut sizes = Vec::new();
        while let Some(chunk) = stream.next().await {
            sizes.push(chunk.unwrap().len());
        }
        assert_eq!(sizes, vec![3, 3, 1]);
    }
}
