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


//! Streamer configuration
//!
//! `StreamerConfig` can be built in code through [`StreamerConfig::builder`] or
//! deserialized from JSON; every field has a default so partial documents work:
//!
//! ```json
//! { "cdn_denylist": ["audio-gm-fb"], "segment_concurrency": 4 }
//! ```

use crate::content::file::FileId;
use crate::error::{Result, SpdlError};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default deadline for control requests in seconds
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default idle time allowed between two body reads in seconds
const DEFAULT_READ_TIMEOUT_SECS: u64 = 30;

/// Default connect timeout in seconds
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Chunks buffered between the pipeline task and the consumer
const DEFAULT_CHANNEL_CAPACITY: usize = 16;

/// Slice size used when forwarding a fully decrypted buffer
const DEFAULT_WRITE_CHUNK_SIZE: usize = 64 * 1024;

/// CDN hosts known to serve broken content
pub const DEFAULT_CDN_DENYLIST: &[&str] = &["audio4-gm-fb", "audio-gm-fb"];

/// Service endpoints
///
/// Each value is a prefix; the hex file id (and a suffix, where needed) is
/// appended when building the request URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Endpoints {
    pub storage_resolve_interactive: String,
    pub storage_resolve_interactive_prefetch: String,
    pub playplay_license: String,
    pub seektable: String,
    pub preview: String,
}

impl Default for Endpoints {
    fn default() -> Self {
        Self {
            storage_resolve_interactive:
                "https://spclient.wg.spotify.com/storage-resolve/files/audio/interactive/".to_string(),
            storage_resolve_interactive_prefetch:
                "https://spclient.wg.spotify.com/storage-resolve/files/audio/interactive_prefetch/"
                    .to_string(),
            playplay_license: "https://spclient.wg.spotify.com/playplay/v1/key/".to_string(),
            seektable: "https://seektables.scdn.co/seektable/".to_string(),
            preview: "https://p.scdn.co/mp3-preview/".to_string(),
        }
    }
}

impl Endpoints {
    /// Point every endpoint at one base URL (used against local fixtures)
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            storage_resolve_interactive: format!("{base}/storage-resolve/files/audio/interactive/"),
            storage_resolve_interactive_prefetch: format!(
                "{base}/storage-resolve/files/audio/interactive_prefetch/"
            ),
            playplay_license: format!("{base}/playplay/v1/key/"),
            seektable: format!("{base}/seektable/"),
            preview: format!("{base}/mp3-preview/"),
        }
    }

    /// Storage-resolve URL; `preload` selects the prefetch variant
    pub fn storage_resolve_url(&self, file_id: &FileId, preload: bool) -> String {
        let prefix = if preload {
            &self.storage_resolve_interactive_prefetch
        } else {
            &self.storage_resolve_interactive
        };
        format!("{}{}", prefix, file_id.to_hex())
    }

    pub fn playplay_url(&self, file_id: &FileId) -> String {
        format!("{}{}", self.playplay_license, file_id.to_hex())
    }

    pub fn seektable_url(&self, file_id: &FileId) -> String {
        format!("{}{}.json", self.seektable, file_id.to_hex())
    }

    pub fn preview_url(&self, file_id: &FileId) -> String {
        format!("{}{}", self.preview, file_id.to_hex())
    }
}

/// Configuration for the content streamer and its HTTP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamerConfig {
    pub endpoints: Endpoints,
    /// Hostname substrings that are never contacted
    pub cdn_denylist: Vec<String>,
    /// Total deadline of storage-resolve, license and seek-table requests
    pub timeout_secs: u64,
    /// Longest pause between reads of any response body, CDN downloads included
    pub read_timeout_secs: u64,
    pub connect_timeout_secs: u64,
    pub user_agent: String,
    /// Backpressure window between pipeline and consumer, in chunks
    pub channel_capacity: usize,
    /// Segments fetched ahead of the one being written (1 = strictly sequential)
    pub segment_concurrency: usize,
    pub write_chunk_size: usize,
}

impl Default for StreamerConfig {
    fn default() -> Self {
        Self {
            endpoints: Endpoints::default(),
            cdn_denylist: DEFAULT_CDN_DENYLIST.iter().map(|s| s.to_string()).collect(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            read_timeout_secs: DEFAULT_READ_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
            user_agent: format!("spdl-core/{}", env!("CARGO_PKG_VERSION")),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            segment_concurrency: 1,
            write_chunk_size: DEFAULT_WRITE_CHUNK_SIZE,
        }
    }
}

impl StreamerConfig {
    pub fn builder() -> StreamerConfigBuilder {
        StreamerConfigBuilder::new()
    }

    /// Parse a JSON document, falling back to defaults for missing fields
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| SpdlError::invalid_input(format!("Invalid streamer config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    /// Reject window sizes that would stall the pipeline
    pub fn validate(&self) -> Result<()> {
        if self.channel_capacity == 0 {
            return Err(SpdlError::invalid_input("channel_capacity must be greater than 0"));
        }
        if self.segment_concurrency == 0 {
            return Err(SpdlError::invalid_input("segment_concurrency must be greater than 0"));
        }
        if self.write_chunk_size == 0 {
            return Err(SpdlError::invalid_input("write_chunk_size must be greater than 0"));
        }
        Ok(())
    }
}

/// Builder for StreamerConfig
#[derive(Debug)]
pub struct StreamerConfigBuilder {
    config: StreamerConfig,
}

impl StreamerConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: StreamerConfig::default(),
        }
    }

    pub fn endpoints(mut self, endpoints: Endpoints) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    pub fn cdn_denylist<I, S>(mut self, hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.cdn_denylist = hosts.into_iter().map(Into::into).collect();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout_secs = timeout.as_secs();
        self
    }

    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout_secs = timeout.as_secs();
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout_secs = timeout.as_secs();
        self
    }

    pub fn user_agent<S: Into<String>>(mut self, user_agent: S) -> Self {
        self.config.user_agent = user_agent.into();
        self
    }

    pub fn channel_capacity(mut self, capacity: usize) -> Self {
        self.config.channel_capacity = capacity;
        self
    }

    pub fn segment_concurrency(mut self, concurrency: usize) -> Self {
        self.config.segment_concurrency = concurrency;
        self
    }

    pub fn write_chunk_size(mut self, size: usize) -> Self {
        self.config.write_chunk_size = size;
        self
    }

    pub fn build(self) -> StreamerConfig {
        self.config
    }
}

impl Default for StreamerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
