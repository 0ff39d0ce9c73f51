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


//! Seek tables for segmented MP4 content
//!
//! A seek table is a small JSON document published per file:
//!
//! ```json
//! {
//!   "pssh": "AAAAU3Bzc2gAAAAA7e+LqXnWSs6jyCfc1R0h7QAAADM...",
//!   "offset": 1146,
//!   "segments": [[39744, 441344], [39680, 441344]],
//!   "timescale": 44100
//! }
//! ```
//!
//! `offset` is the size of the initialization data at the start of the file
//! and each segment entry starts with its byte size (later elements are
//! durations and are ignored; bare integers are accepted too). Ranges are laid
//! out back to back with no gaps:
//!
//! ```text
//! [0, offset-1] [offset, offset+s0-1] [offset+s0, offset+s0+s1-1] ...
//! ```

use crate::api::client::{HttpRequest, HttpTransport};
use crate::config::Endpoints;
use crate::content::file::FileId;
use crate::crypto::widevine::pssh_box;
use crate::error::{Result, SpdlError};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Largest ciphertext a seek table may describe (4 GiB)
pub const MAX_CONTENT_LEN: u64 = 4 << 30;

#[derive(Debug, Deserialize)]
struct RawSeekTable {
    pssh: String,
    #[serde(default)]
    offset: u64,
    segments: Vec<RawSegment>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawSegment {
    Size(u64),
    Entry(Vec<serde_json::Value>),
}

impl RawSegment {
    fn size(&self) -> Option<u64> {
        match self {
            RawSegment::Size(size) => Some(*size),
            RawSegment::Entry(values) => values.first().and_then(serde_json::Value::as_u64),
        }
    }
}

/// Inclusive byte range of one ranged GET
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Number of bytes in the range
    pub fn size(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// Parsed seek table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekTable {
    /// Complete `pssh` box
    pub pssh: Vec<u8>,
    pub initial_offset: u64,
    /// Segment sizes in file order
    pub segments: Vec<u64>,
}

impl SeekTable {
    /// Parse the published JSON document
    ///
    /// # Errors
    /// `InvalidSeekTable` for malformed JSON, bad base64, zero-sized or missing
    /// segments, or sizes that overflow
    pub fn from_json(json: &[u8]) -> Result<Self> {
        let raw: RawSeekTable = serde_json::from_slice(json)
            .map_err(|e| SpdlError::InvalidSeekTable(e.to_string()))?;

        let decoded = BASE64
            .decode(raw.pssh.trim())
            .map_err(|e| SpdlError::InvalidSeekTable(format!("pssh is not base64: {}", e)))?;

        let segments = raw
            .segments
            .iter()
            .enumerate()
            .map(|(index, segment)| match segment.size() {
                Some(size) if size > 0 => Ok(size),
                _ => Err(SpdlError::InvalidSeekTable(format!("segment {} has no size", index))),
            })
            .collect::<Result<Vec<u64>>>()?;

        Self::new(pssh_box(&decoded)?, raw.offset, segments)
    }

    /// Build a seek table from its parts, checking the layout
    ///
    /// # Errors
    /// `InvalidSeekTable` when there are no segments, a segment is empty, or
    /// the described content exceeds [`MAX_CONTENT_LEN`]
    pub fn new(pssh: Vec<u8>, initial_offset: u64, segments: Vec<u64>) -> Result<Self> {
        if segments.is_empty() {
            return Err(SpdlError::InvalidSeekTable("no segments".to_string()));
        }
        if segments.contains(&0) {
            return Err(SpdlError::InvalidSeekTable("zero-sized segment".to_string()));
        }
        let total = segments
            .iter()
            .try_fold(initial_offset, |acc, size| acc.checked_add(*size))
            .ok_or_else(|| SpdlError::InvalidSeekTable("segment sizes overflow".to_string()))?;
        if total > MAX_CONTENT_LEN {
            return Err(SpdlError::InvalidSeekTable(format!(
                "content length {} exceeds {} bytes",
                total, MAX_CONTENT_LEN
            )));
        }

        Ok(Self {
            pssh,
            initial_offset,
            segments,
        })
    }

    /// Byte ranges to fetch, in order
    ///
    /// The header range is present only when `initial_offset > 0`.
    pub fn byte_ranges(&self) -> Vec<ByteRange> {
        let mut ranges = Vec::with_capacity(self.segments.len() + 1);
        if self.initial_offset > 0 {
            ranges.push(ByteRange {
                start: 0,
                end: self.initial_offset - 1,
            });
        }

        let mut start = self.initial_offset;
        for size in &self.segments {
            ranges.push(ByteRange {
                start,
                end: start + size - 1,
            });
            start += size;
        }
        ranges
    }

    /// Total ciphertext length covered by the table
    pub fn total_len(&self) -> u64 {
        self.initial_offset + self.segments.iter().sum::<u64>()
    }
}

/// Fetches seek tables from the seek-table host
#[derive(Clone)]
pub struct SeekTableClient {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
    timeout: Option<Duration>,
}

impl SeekTableClient {
    pub fn new(transport: Arc<dyn HttpTransport>, endpoints: Endpoints) -> Self {
        Self {
            transport,
            endpoints,
            timeout: None,
        }
    }

    /// Bound each seek-table request by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Download and parse the seek table of a file
    ///
    /// # Errors
    /// `SeekTableUnavailable` for transport failures and non-success statuses,
    /// `InvalidSeekTable` for unusable content
    pub async fn fetch(&self, file_id: &FileId) -> Result<SeekTable> {
        let url = self.endpoints.seektable_url(file_id);
        debug!(file_id = %file_id, url = %url, "Fetching seek table");

        let mut request = HttpRequest::get(url);
        if let Some(timeout) = self.timeout {
            request = request.with_timeout(timeout);
        }

        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| SpdlError::seek_table_unavailable(file_id.to_hex(), e.to_string()))?;

        if !response.is_success() {
            return Err(SpdlError::seek_table_unavailable(
                file_id.to_hex(),
                format!("status {}", response.status),
            ));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| SpdlError::seek_table_unavailable(file_id.to_hex(), e.to_string()))?;

        let table = SeekTable::from_json(&body)?;
        debug!(
            file_id = %file_id,
            segments = table.segments.len(),
            total = table.total_len(),
            "Seek table parsed"
        );
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::mock::MockTransport;

    fn table(offset: u64, segments: Vec<u64>) -> SeekTable {
        SeekTable::new(b"pssh".to_vec(), offset, segments).unwrap()
    }

    #[test]
    fn test_byte_ranges_with_offset() {
        let ranges = table(100, vec![50, 50]).byte_ranges();
        assert_eq!(
            ranges,
            vec![
                ByteRange { start: 0, end: 99 },
                ByteRange { start: 100, end: 149 },
                ByteRange { start: 150, end: 199 },
            ]
        );
        assert_eq!(ranges.iter().map(ByteRange::size).sum::<u64>(), 200);
        assert_eq!(table(100, vec![50, 50]).total_len(), 200);
    }

    #[test]
    fn test_byte_ranges_without_offset() {
        let ranges = table(0, vec![10, 20]).byte_ranges();
        assert_eq!(
            ranges,
            vec![ByteRange { start: 0, end: 9 }, ByteRange { start: 10, end: 29 }]
        );
    }

    #[test]
    fn test_parse_json_document() {
        let init = BASE64.encode(b"widevine-init");
        let json = format!(
            r#"{{"pssh":"{}","offset":100,"segments":[[50,441344],[50,441344]],"timescale":44100}}"#,
            init
        );
        let table = SeekTable::from_json(json.as_bytes()).unwrap();
        assert_eq!(table.initial_offset, 100);
        assert_eq!(table.segments, vec![50, 50]);
        assert!(table.pssh.ends_with(b"widevine-init"));
        assert_eq!(&table.pssh[4..8], b"pssh");
    }

    #[test]
    fn test_parse_bare_sizes() {
        let json = format!(r#"{{"pssh":"{}","offset":0,"segments":[5,6]}}"#, BASE64.encode(b"x"));
        let table = SeekTable::from_json(json.as_bytes()).unwrap();
        assert_eq!(table.segments, vec![5, 6]);
    }

    #[test]
    fn test_invalid_tables() {
        let pssh = BASE64.encode(b"x");
        let cases = [
            "not json".to_string(),
            r#"{"pssh":"%%%","offset":0,"segments":[1]}"#.to_string(),
            format!(r#"{{"pssh":"{}","offset":0,"segments":[]}}"#, pssh),
            format!(r#"{{"pssh":"{}","offset":0,"segments":[[0,1]]}}"#, pssh),
            format!(r#"{{"pssh":"{}","offset":0,"segments":[[]]}}"#, pssh),
        ];
        for json in cases {
            let result = SeekTable::from_json(json.as_bytes());
            assert!(matches!(result, Err(SpdlError::InvalidSeekTable(_))), "{}", json);
        }
    }

    #[test]
    fn test_oversized_tables_rejected() {
        let result = SeekTable::new(b"pssh".to_vec(), u64::MAX - 10, vec![1]);
        assert!(matches!(result, Err(SpdlError::InvalidSeekTable(_))));

        let result = SeekTable::new(b"pssh".to_vec(), u64::MAX, vec![1]);
        assert!(matches!(result, Err(SpdlError::InvalidSeekTable(_))));

        let result = SeekTable::new(b"pssh".to_vec(), MAX_CONTENT_LEN - 1, vec![1]);
        assert_eq!(result.unwrap().total_len(), MAX_CONTENT_LEN);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_unavailable() {
        let endpoints = Endpoints::with_base("http://local");
        let transport = Arc::new(MockTransport::new());
        let client = SeekTableClient::new(transport.clone(), endpoints.clone())
            .with_timeout(Duration::from_secs(5));
        let file_id = FileId::from_bytes([3; 20]);

        let result = client.fetch(&file_id).await;
        assert!(matches!(result, Err(SpdlError::SeekTableUnavailable { .. })));
        assert_eq!(transport.urls(), vec![endpoints.seektable_url(&file_id)]);
        assert_eq!(transport.requests()[0].timeout, Some(Duration::from_secs(5)));
    }
}
