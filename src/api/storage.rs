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


//! Storage resolution
//!
//! Maps a file id to the place its bytes live. The storage-resolve endpoint
//! answers with a protobuf [`StorageResolveResponse`] whose result tag selects
//! one of:
//!
//! - `CDN` - a list of candidate URLs
//! - `STORAGE` - the payload inline, carried in the `fileid` bytes field
//! - `RESTRICTED` - the file may not be played by this account
//!
//! # CDN host denylist
//!
//! Some CDN hosts serve truncated or stale objects. Every URL whose host
//! contains a denylisted substring is dropped before any selection happens,
//! so no later step can ever contact it. If nothing survives the filter the
//! file is `StorageUnavailable`.
//!
//! # Selection
//!
//! Single-URL paths pick uniformly at random among the survivors
//! ([`CdnUrls::pick`]). The segmented path uses all of them, cycling by
//! segment index ([`CdnUrls::for_segment`]).

use crate::api::client::{HttpRequest, HttpTransport};
use crate::api::proto::{StorageResolveResponse, StorageResult};
use crate::api::session::SessionHeaders;
use crate::config::{Endpoints, StreamerConfig};
use crate::content::file::FileId;
use crate::error::{Result, SpdlError};
use bytes::Bytes;
use prost::Message;
use rand::seq::SliceRandom;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Decoded storage-resolve answer, denylist already applied
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageResolution {
    Cdn { urls: Vec<String> },
    Inline { bytes: Bytes },
    Restricted,
    Unrecognized(i32),
}

/// Where a stream can read its bytes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageTarget {
    Cdn(CdnUrls),
    Inline(Bytes),
}

/// Non-empty list of usable CDN URLs, in response order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CdnUrls(Vec<String>);

impl CdnUrls {
    /// `None` when the list is empty
    pub fn new(urls: Vec<String>) -> Option<Self> {
        if urls.is_empty() {
            None
        } else {
            Some(Self(urls))
        }
    }

    /// Random candidate, for paths that need one URL
    pub fn pick(&self) -> &str {
        self.0
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
            .unwrap_or_else(|| self.0[0].as_str())
    }

    /// Round-robin candidate for a segment index
    pub fn for_segment(&self, index: usize) -> &str {
        &self.0[index % self.0.len()]
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Whether a URL's host contains any denylisted substring
///
/// Strings that do not parse as URLs are matched as a whole.
pub fn is_denylisted(url: &str, denylist: &[String]) -> bool {
    let parsed = url::Url::parse(url).ok();
    let host = parsed
        .as_ref()
        .and_then(|u| u.host_str())
        .unwrap_or(url);
    denylist.iter().any(|bad| !bad.is_empty() && host.contains(bad.as_str()))
}

/// Decode a storage-resolve body and apply the denylist
pub fn parse_response(body: &[u8], denylist: &[String]) -> Result<StorageResolution> {
    let response = StorageResolveResponse::decode(body)
        .map_err(|e| SpdlError::internal(format!("storage-resolve decode: {}", e)))?;

    let resolution = match response.result_tag() {
        Some(StorageResult::Cdn) => {
            let total = response.cdnurl.len();
            let urls: Vec<String> = response
                .cdnurl
                .into_iter()
                .filter(|url| !is_denylisted(url, denylist))
                .collect();
            if urls.len() < total {
                warn!(dropped = total - urls.len(), kept = urls.len(), "Dropped denylisted CDN hosts");
            }
            StorageResolution::Cdn { urls }
        }
        Some(StorageResult::Storage) => StorageResolution::Inline {
            bytes: Bytes::from(response.fileid),
        },
        Some(StorageResult::Restricted) => StorageResolution::Restricted,
        None => StorageResolution::Unrecognized(response.result),
    };
    Ok(resolution)
}

impl StorageResolution {
    /// Turn the decoded answer into something a stream can read from
    pub fn into_target(self, file_id: &FileId) -> Result<StorageTarget> {
        match self {
            StorageResolution::Cdn { urls } => CdnUrls::new(urls)
                .map(StorageTarget::Cdn)
                .ok_or_else(|| SpdlError::storage_unavailable(file_id.to_hex(), "no usable CDN host")),
            StorageResolution::Inline { bytes } => Ok(StorageTarget::Inline(bytes)),
            StorageResolution::Restricted => Err(SpdlError::Restricted(file_id.to_hex())),
            StorageResolution::Unrecognized(tag) => Err(SpdlError::storage_unavailable(
                file_id.to_hex(),
                format!("unrecognized storage result {}", tag),
            )),
        }
    }
}

/// Client for the storage-resolve endpoint
#[derive(Clone)]
pub struct StorageResolver {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
    denylist: Arc<[String]>,
    timeout: Duration,
}

impl StorageResolver {
    pub fn new(transport: Arc<dyn HttpTransport>, config: &StreamerConfig) -> Self {
        Self {
            transport,
            endpoints: config.endpoints.clone(),
            denylist: config.cdn_denylist.clone().into(),
            timeout: config.timeout(),
        }
    }

    /// Resolve a file id
    ///
    /// `preload` selects the interactive-prefetch endpoint variant.
    ///
    /// # Errors
    /// - `StorageUnavailable` if the endpoint is unreachable, answers with a
    ///   non-success status, the body does not decode, or no CDN host survives
    ///   the denylist
    /// - `Restricted` when the response says so
    pub async fn resolve(
        &self,
        file_id: &FileId,
        preload: bool,
        session: &SessionHeaders,
    ) -> Result<StorageTarget> {
        let url = self.endpoints.storage_resolve_url(file_id, preload);
        debug!(file_id = %file_id, preload, "Resolving storage");

        let request = HttpRequest::get(url)
            .with_headers(session.api_headers()?)
            .with_timeout(self.timeout);
        let unavailable = |reason: String| SpdlError::storage_unavailable(file_id.to_hex(), reason);

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| unavailable(e.to_string()))?;

        if !response.is_success() {
            return Err(unavailable(format!("storage-resolve returned status {}", response.status)));
        }

        let body = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;
        let resolution =
            parse_response(&body, &self.denylist).map_err(|e| unavailable(e.to_string()))?;

        let target = resolution.into_target(file_id)?;
        if let StorageTarget::Cdn(urls) = &target {
            debug!(file_id = %file_id, candidates = urls.len(), "Storage resolved to CDN");
        }
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::mock::MockTransport;

    fn denylist() -> Vec<String> {
        vec!["audio4-gm-fb".to_string(), "audio-gm-fb".to_string()]
    }

    fn file_id() -> FileId {
        FileId::from_bytes([0xAB; 20])
    }

    fn cdn_body(urls: &[&str]) -> Vec<u8> {
        StorageResolveResponse {
            result: StorageResult::Cdn as i32,
            cdnurl: urls.iter().map(|s| s.to_string()).collect(),
            fileid: vec![],
        }
        .encode_to_vec()
    }

    #[test]
    fn test_denylist_matches_host_substring() {
        let list = denylist();
        assert!(is_denylisted("https://audio4-gm-fb.scdn.co/audio/abc?token=1", &list));
        assert!(is_denylisted("https://audio-gm-fb.spotifycdn.com/x", &list));
        assert!(!is_denylisted("https://audio-ak.spotifycdn.com/audio-gm-fb", &list));
        assert!(is_denylisted("not a url audio-gm-fb", &list));
    }

    #[test]
    fn test_parse_filters_denylisted_hosts() {
        let body = cdn_body(&[
            "https://audio4-gm-fb.scdn.co/a",
            "https://audio-fa.scdn.co/a",
            "https://audio-gm-fb.scdn.co/a",
        ]);
        let resolution = parse_response(&body, &denylist()).unwrap();
        assert_eq!(
            resolution,
            StorageResolution::Cdn {
                urls: vec!["https://audio-fa.scdn.co/a".to_string()]
            }
        );
    }

    #[test]
    fn test_all_denylisted_is_unavailable() {
        let body = cdn_body(&["https://audio4-gm-fb.scdn.co/a"]);
        let result = parse_response(&body, &denylist()).unwrap().into_target(&file_id());
        assert!(matches!(result, Err(SpdlError::StorageUnavailable { .. })));
    }

    #[test]
    fn test_restricted_and_unknown_tags() {
        let restricted = StorageResolveResponse {
            result: StorageResult::Restricted as i32,
            cdnurl: vec![],
            fileid: vec![],
        };
        let resolution = parse_response(&restricted.encode_to_vec(), &denylist()).unwrap();
        assert!(matches!(resolution.into_target(&file_id()), Err(SpdlError::Restricted(_))));

        let unknown = StorageResolveResponse {
            result: 42,
            cdnurl: vec![],
            fileid: vec![],
        };
        let resolution = parse_response(&unknown.encode_to_vec(), &denylist()).unwrap();
        assert_eq!(resolution, StorageResolution::Unrecognized(42));
    }

    #[test]
    fn test_inline_payload() {
        let inline = StorageResolveResponse {
            result: StorageResult::Storage as i32,
            cdnurl: vec![],
            fileid: b"payload".to_vec(),
        };
        let target = parse_response(&inline.encode_to_vec(), &denylist())
            .unwrap()
            .into_target(&file_id())
            .unwrap();
        assert_eq!(target, StorageTarget::Inline(Bytes::from_static(b"payload")));
    }

    #[test]
    fn test_round_robin_and_pick() {
        let urls = CdnUrls::new(vec!["a".to_string(), "b".to_string()]).unwrap();
        let picked: Vec<&str> = (0..3).map(|i| urls.for_segment(i)).collect();
        assert_eq!(picked, vec!["a", "b", "a"]);
        assert!(["a", "b"].contains(&urls.pick()));
        assert!(CdnUrls::new(vec![]).is_none());
    }

    #[tokio::test]
    async fn test_resolve_uses_prefetch_endpoint_and_api_headers() {
        let config = StreamerConfig::builder()
            .endpoints(Endpoints::with_base("http://local"))
            .build();
        let transport = Arc::new(MockTransport::new());
        let prefetch_url = config.endpoints.storage_resolve_url(&file_id(), true);
        transport.on(&prefetch_url, 200, cdn_body(&["https://audio-fa.scdn.co/a"]));

        let resolver = StorageResolver::new(transport.clone(), &config);
        let session = SessionHeaders::new("tok").unwrap();
        let target = resolver.resolve(&file_id(), true, &session).await.unwrap();

        assert!(matches!(target, StorageTarget::Cdn(ref urls) if urls.len() == 1));
        let requests = transport.requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].url, prefetch_url);
        assert_eq!(requests[0].headers["app-platform"], "WebPlayer");
        assert_eq!(requests[0].timeout, Some(config.timeout()));
    }

    #[tokio::test]
    async fn test_resolve_failures_are_storage_unavailable() {
        let config = StreamerConfig::builder()
            .endpoints(Endpoints::with_base("http://local"))
            .build();
        let transport = Arc::new(MockTransport::new());
        let url = config.endpoints.storage_resolve_url(&file_id(), false);
        let resolver = StorageResolver::new(transport.clone(), &config);
        let session = SessionHeaders::new("tok").unwrap();

        transport.on(&url, 500, Bytes::new());
        let result = resolver.resolve(&file_id(), false, &session).await;
        assert!(matches!(result, Err(SpdlError::StorageUnavailable { .. })));

        let other = FileId::from_bytes([0x01; 20]);
        transport.fail(&config.endpoints.storage_resolve_url(&other, false));
        let result = resolver.resolve(&other, false, &session).await;
        assert!(matches!(result, Err(SpdlError::StorageUnavailable { .. })));

        let garbage = FileId::from_bytes([0x02; 20]);
        transport.on(&config.endpoints.storage_resolve_url(&garbage, false), 200, vec![0xFFu8, 0xFF, 0xFF]);
        let result = resolver.resolve(&garbage, false, &session).await;
        assert!(matches!(result, Err(SpdlError::StorageUnavailable { .. })));
    }
}
