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


//! Unencrypted copy with a single fallback
//!
//! MP3 files and previews are served in the clear. The primary URL is tried
//! once; a transport failure or non-success status switches to the fallback
//! (the static preview endpoint for the file) exactly once. Bodies are
//! forwarded chunk by chunk without transformation.

use crate::api::client::{BodyStream, HttpRequest, HttpTransport};
use crate::download::sink::AudioSink;
use crate::error::{Result, SpdlError};
use futures_util::StreamExt;
use tracing::{debug, warn};

/// Open `url`, or `fallback_url` if the first attempt fails
async fn open(transport: &dyn HttpTransport, url: &str, fallback_url: &str) -> Result<BodyStream> {
    let reason = match transport.send(HttpRequest::get(url)).await {
        Ok(response) if response.is_success() => return Ok(response.into_body()),
        Ok(response) => format!("status {}", response.status),
        Err(e) => e.to_string(),
    };
    warn!(url = %url, reason = %reason, "Primary download failed, trying fallback");

    match transport.send(HttpRequest::get(fallback_url)).await {
        Ok(response) if response.is_success() => Ok(response.into_body()),
        Ok(response) => Err(SpdlError::ContentUnavailable(format!(
            "primary failed ({}), fallback returned status {}",
            reason, response.status
        ))),
        Err(e) => Err(SpdlError::ContentUnavailable(format!(
            "primary failed ({}), fallback failed ({})",
            reason, e
        ))),
    }
}

/// Copy `url` (or its fallback) into the sink
///
/// Returns the number of bytes forwarded.
///
/// # Errors
/// `ContentUnavailable` if both attempts fail or the body breaks off midway,
/// `Cancelled` if the consumer goes away
pub async fn copy(
    transport: &dyn HttpTransport,
    url: &str,
    fallback_url: &str,
    sink: &mut AudioSink,
) -> Result<u64> {
    let mut body = open(transport, url, fallback_url).await?;

    let mut copied = 0u64;
    while let Some(chunk) = body.next().await {
        let chunk = chunk.map_err(|e| SpdlError::ContentUnavailable(format!("body interrupted: {}", e)))?;
        copied += chunk.len() as u64;
        sink.write(chunk).await?;
    }

    debug!(bytes = copied, "Passthrough copy finished");
    Ok(copied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::client::mock::MockTransport;
    use crate::download::sink::channel;

    #[tokio::test]
    async fn test_primary_success_skips_fallback() {
        let transport = MockTransport::new();
        transport.on("http://cdn/a", 200, "mp3 data");

        let (mut sink, stream) = channel(4);
        let copied = copy(&transport, "http://cdn/a", "http://preview/a", &mut sink).await.unwrap();
        drop(sink);

        assert_eq!(copied, 8);
        assert_eq!(stream.collect_bytes().await.unwrap(), "mp3 data");
        assert_eq!(transport.urls(), vec!["http://cdn/a"]);
    }

    #[tokio::test]
    async fn test_non_success_uses_fallback_once() {
        let transport = MockTransport::new();
        transport.on("http://cdn/a", 404, "");
        transport.on("http://preview/a", 200, "preview");

        let (mut sink, stream) = channel(4);
        copy(&transport, "http://cdn/a", "http://preview/a", &mut sink).await.unwrap();
        drop(sink);

        assert_eq!(stream.collect_bytes().await.unwrap(), "preview");
        assert_eq!(transport.urls(), vec!["http://cdn/a", "http://preview/a"]);
    }

    #[tokio::test]
    async fn test_both_failing_is_content_unavailable() {
        let transport = MockTransport::new();
        transport.fail("http://cdn/a");
        transport.on("http://preview/a", 500, "");

        let (mut sink, _stream) = channel(4);
        let result = copy(&transport, "http://cdn/a", "http://preview/a", &mut sink).await;

        assert!(matches!(result, Err(SpdlError::ContentUnavailable(_))));
        assert_eq!(transport.urls().len(), 2);
    }
}
