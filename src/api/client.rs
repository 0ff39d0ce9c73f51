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


//! HTTP transport
//!
//! Every network call in the pipeline goes through the [`HttpTransport`]
//! trait: storage-resolve, the PlayPlay license POST, seek tables, ranged
//! segment GETs and plain CDN downloads. The trait deals in whole requests and
//! streaming bodies only; it knows nothing about status semantics, so each
//! protocol step decides what a non-success status means for it.
//!
//! # Architecture
//!
//! - [`HttpRequest`] carries method, URL, headers, optional body and an
//!   optional inclusive byte range (sent as `Range: bytes=start-end`).
//! - [`HttpResponse`] carries the status code and a boxed body stream so
//!   large CDN objects are never buffered by the transport.
//! - [`ReqwestTransport`] is the production implementation, configured from
//!   [`StreamerConfig`] (timeouts, user agent, connection pooling).
//!
//! # Timeouts
//!
//! The shared client only bounds connecting and the pause between two body
//! reads, so a CDN download may take as long as it needs while bytes keep
//! flowing. Small control requests (storage-resolve, license, seek table)
//! carry their own total deadline through [`HttpRequest::with_timeout`].
//!
//! The transport never retries. Timeouts and connection resets come back as
//! [`TransportError`] and are mapped by the caller onto the error of the
//! protocol step that issued the request.

use crate::config::StreamerConfig;
use crate::error::{Result, SpdlError, TransportError};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::{self, BoxStream};
use futures_util::StreamExt;
use reqwest::header::{HeaderMap, HeaderValue, RANGE, USER_AGENT};
use reqwest::{Client, Method};
use std::fmt;
use std::time::Duration;

/// Idle connections kept per CDN host
const POOL_MAX_IDLE_PER_HOST: usize = 8;

/// How long an idle pooled connection is kept
const POOL_IDLE_TIMEOUT_SECS: u64 = 90;

/// Streaming response body
pub type BodyStream = BoxStream<'static, std::result::Result<Bytes, TransportError>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

/// A single outgoing request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HeaderMap,
    pub body: Option<Bytes>,
    /// Inclusive byte range `[start, end]`
    pub range: Option<(u64, u64)>,
    /// Deadline for the whole exchange, body included
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn get<S: Into<String>>(url: S) -> Self {
        Self {
            method: HttpMethod::Get,
            url: url.into(),
            headers: HeaderMap::new(),
            body: None,
            range: None,
            timeout: None,
        }
    }

    pub fn post<S: Into<String>>(url: S, body: Bytes) -> Self {
        Self {
            method: HttpMethod::Post,
            url: url.into(),
            headers: HeaderMap::new(),
            body: Some(body),
            range: None,
            timeout: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_range(mut self, start: u64, end: u64) -> Self {
        self.range = Some((start, end));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Value of the `Range` header this request carries, if any
    pub fn range_header(&self) -> Option<String> {
        self.range.map(|(start, end)| format!("bytes={}-{}", start, end))
    }
}

/// Response with a status code and a streaming body
pub struct HttpResponse {
    pub status: u16,
    body: BodyStream,
}

impl HttpResponse {
    pub fn new(status: u16, body: BodyStream) -> Self {
        Self { status, body }
    }

    /// Response whose body is already in memory
    pub fn from_bytes<B: Into<Bytes>>(status: u16, body: B) -> Self {
        let body: Bytes = body.into();
        let stream = if body.is_empty() {
            stream::empty().boxed()
        } else {
            stream::once(async move { Ok(body) }).boxed()
        };
        Self::new(status, stream)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_body(self) -> BodyStream {
        self.body
    }

    /// Collect the full body
    pub async fn bytes(self) -> std::result::Result<Bytes, TransportError> {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(chunk) = body.next().await {
            buffer.extend_from_slice(&chunk?);
        }
        Ok(buffer.freeze())
    }

    /// Collect the body as text for error reporting; read failures yield what was read
    pub async fn text_lossy(self) -> String {
        let mut buffer = BytesMut::new();
        let mut body = self.body;
        while let Some(Ok(chunk)) = body.next().await {
            buffer.extend_from_slice(&chunk);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

impl fmt::Debug for HttpResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpResponse")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

/// Asynchronous HTTP capability used by every protocol step
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// [`HttpTransport`] backed by a pooled `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Build a transport from streamer configuration
    ///
    /// # Errors
    /// `InvalidInput` if the configured user agent is not a valid header value,
    /// `Internal` if the TLS backend cannot be initialized.
    pub fn new(config: &StreamerConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent)
                .map_err(|e| SpdlError::invalid_input(format!("Invalid user agent: {}", e)))?,
        );

        let client = Client::builder()
            .read_timeout(config.read_timeout())
            .connect_timeout(config.connect_timeout())
            .default_headers(headers)
            .pool_max_idle_per_host(POOL_MAX_IDLE_PER_HOST)
            .pool_idle_timeout(Duration::from_secs(POOL_IDLE_TIMEOUT_SECS))
            .build()
            .map_err(|e| SpdlError::internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Wrap an existing client (shared pools, custom TLS roots)
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        let method = match request.method {
            HttpMethod::Get => Method::GET,
            HttpMethod::Post => Method::POST,
        };

        let mut builder = self.client.request(method, &request.url).headers(request.headers.clone());
        if let Some(range) = request.range_header() {
            builder = builder.header(RANGE, range);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(HttpResponse::new(status, body))
    }
}
