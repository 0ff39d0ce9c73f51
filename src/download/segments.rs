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


//! Segmented ranged fetch
//!
//! Downloads every byte range of a [`SeekTable`] and concatenates the bodies
//! in table order. Range `i` goes to CDN URL `i % urls.len()`.
//!
//! With `concurrency > 1` up to that many ranges are in flight at once;
//! `buffered` still yields them in index order, so out-of-order completions
//! wait in memory until their predecessors are done.
//!
//! Nothing is forwarded until every range has arrived. The first failing
//! range aborts the fetch with `SegmentFetchFailed { index }` and drops the
//! partial buffer along with any prefetches still in flight.

use crate::api::client::{HttpRequest, HttpTransport};
use crate::api::seektable::{ByteRange, SeekTable};
use crate::api::storage::CdnUrls;
use crate::download::sink::AudioSink;
use crate::error::{Result, SpdlError};
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use std::sync::Arc;
use tracing::{debug, trace};

/// Upper bound on the up-front reassembly allocation
const PREALLOCATE_LIMIT: u64 = 64 * 1024 * 1024;

/// Fetches seek-table segments from a set of CDN hosts
#[derive(Clone)]
pub struct SegmentFetcher {
    transport: Arc<dyn HttpTransport>,
    concurrency: usize,
}

impl SegmentFetcher {
    pub fn new(transport: Arc<dyn HttpTransport>, concurrency: usize) -> Self {
        Self {
            transport,
            concurrency: concurrency.max(1),
        }
    }

    /// Fetch the whole ciphertext described by `table`
    ///
    /// `sink` is only consulted for cancellation: once its consumer is gone no
    /// further range is requested.
    pub async fn fetch(&self, table: &SeekTable, urls: &CdnUrls, sink: &AudioSink) -> Result<Bytes> {
        let ranges = table.byte_ranges();
        debug!(
            segments = ranges.len(),
            hosts = urls.len(),
            concurrency = self.concurrency,
            "Fetching segments"
        );

        let fetches = ranges.into_iter().enumerate().map(|(index, range)| {
            let url = urls.for_segment(index).to_string();
            let cancelled = sink.is_closed();
            async move {
                if cancelled {
                    return Err(SpdlError::Cancelled);
                }
                self.fetch_range(index, url, range).await
            }
        });

        // Grows with the bodies actually received; the table's total is only a hint
        let capacity = usize::try_from(table.total_len().min(PREALLOCATE_LIMIT)).unwrap_or(0);
        let buffer = stream::iter(fetches)
            .buffered(self.concurrency)
            .try_fold(BytesMut::with_capacity(capacity), |mut acc, body| async move {
                acc.extend_from_slice(&body);
                Ok(acc)
            })
            .await?;

        debug!(bytes = buffer.len(), "All segments fetched");
        Ok(buffer.freeze())
    }

    async fn fetch_range(&self, index: usize, url: String, range: ByteRange) -> Result<Bytes> {
        trace!(segment = index, url = %url, start = range.start, end = range.end, "Fetching segment");

        let response = self
            .transport
            .send(HttpRequest::get(url).with_range(range.start, range.end))
            .await
            .map_err(|e| SpdlError::segment_failed(index, e.to_string()))?;

        if !matches!(response.status, 200 | 206) {
            return Err(SpdlError::segment_failed(index, format!("status {}", response.status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SpdlError::segment_failed(index, e.to_string()))?;

        if body.len() as u64 != range.size() {
            return Err(SpdlError::segment_failed(
                index,
                format!("expected {} bytes, got {}", range.size(), body.len()),
            ));
        }
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::mock::MockTransport;
    use crate::download::sink::channel;

    fn urls(list: &[&str]) -> CdnUrls {
        CdnUrls::new(list.iter().map(|s| s.to_string()).collect()).unwrap()
    }

    #[tokio::test]
    async fn test_ranges_round_robin_and_reassembly() {
        let table = SeekTable::new(b"pssh".to_vec(), 100, vec![50, 50]).unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.on("http://a/f", 206, vec![1u8; 100]);
        transport.on("http://a/f", 206, vec![3u8; 50]);
        transport.on("http://b/f", 206, vec![2u8; 50]);

        let (sink, _stream) = channel(1);
        let fetcher = SegmentFetcher::new(transport.clone(), 1);
        let data = fetcher.fetch(&table, &urls(&["http://a/f", "http://b/f"]), &sink).await.unwrap();

        assert_eq!(data.len(), 200);
        assert_eq!(&data[..100], &[1u8; 100][..]);
        assert_eq!(&data[100..150], &[2u8; 50][..]);
        assert_eq!(&data[150..], &[3u8; 50][..]);

        let requests = transport.requests();
        // CDN bodies are only bounded by the transport's read timeout
        assert!(requests.iter().all(|r| r.timeout.is_none()));
        let seen: Vec<(String, Option<String>)> =
            requests.iter().map(|r| (r.url.clone(), r.range_header())).collect();
        assert_eq!(
            seen,
            vec![
                ("http://a/f".to_string(), Some("bytes=0-99".to_string())),
                ("http://b/f".to_string(), Some("bytes=100-149".to_string())),
                ("http://a/f".to_string(), Some("bytes=150-199".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_failed_segment_reports_index() {
        let table = SeekTable::new(b"pssh".to_vec(), 0, vec![10, 10, 10]).unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.on("http://a/f", 206, vec![0u8; 10]);
        transport.on("http://b/f", 503, Bytes::new());

        let (sink, _stream) = channel(1);
        let fetcher = SegmentFetcher::new(transport.clone(), 1);
        let result = fetcher.fetch(&table, &urls(&["http://a/f", "http://b/f"]), &sink).await;

        assert!(matches!(result, Err(SpdlError::SegmentFetchFailed { index: 1, .. })));
        // Strict order: nothing after the failing segment is requested
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test]
    async fn test_short_body_is_failure() {
        let table = SeekTable::new(b"pssh".to_vec(), 0, vec![10]).unwrap();
        let transport = Arc::new(MockTransport::new());
        transport.on("http://a/f", 200, vec![0u8; 4]);

        let (sink, _stream) = channel(1);
        let result = SegmentFetcher::new(transport, 1)
            .fetch(&table, &urls(&["http://a/f"]), &sink)
            .await;
        assert!(matches!(result, Err(SpdlError::SegmentFetchFailed { index: 0, .. })));
    }

    #[tokio::test]
    async fn test_concurrent_fetch_keeps_order() {
        let table = SeekTable::new(b"pssh".to_vec(), 0, vec![2, 2, 2, 2]).unwrap();
        let transport = Arc::new(MockTransport::new());
        for (i, url) in ["http://a/f", "http://b/f", "http://c/f", "http://d/f"].iter().enumerate() {
            transport.on(url, 206, vec![i as u8; 2]);
        }

        let (sink, _stream) = channel(1);
        let data = SegmentFetcher::new(transport, 3)
            .fetch(
                &table,
                &urls(&["http://a/f", "http://b/f", "http://c/f", "http://d/f"]),
                &sink,
            )
            .await
            .unwrap();
        assert_eq!(&data[..], &[0u8, 0, 1, 1, 2, 2, 3, 3][..]);
    }

    #[tokio::test]
    async fn test_closed_sink_stops_fetching() {
        let table = SeekTable::new(b"pssh".to_vec(), 0, vec![1, 1]).unwrap();
        let transport = Arc::new(MockTransport::new());
        let (sink, stream) = channel(1);
        drop(stream);

        let result = SegmentFetcher::new(transport.clone(), 1)
            .fetch(&table, &urls(&["http://a/f"]), &sink)
            .await;
        assert!(matches!(result, Err(SpdlError::Cancelled)));
        assert!(transport.requests().is_empty());
    }
}
