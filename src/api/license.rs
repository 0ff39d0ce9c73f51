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


//! PlayPlay license exchange
//!
//! # License Request Flow
//!
//! 1. Build a [`PlayPlayLicenseRequest`]: version 2, the deobfuscator's
//!    token, interactivity `INTERACTIVE`, the content type of the entity and
//!    the current epoch time in seconds
//! 2. POST it (protobuf, no JSON framing) to `playplay/v1/key/{file_id}` with
//!    the proto header set
//! 3. Decode [`PlayPlayLicenseResponse`] and take `obfuscated_key`
//! 4. Hand file id and obfuscated key to the external [`KeyDeobfuscator`]
//!
//! # Status Handling
//!
//! | Response                      | Result                         |
//! |-------------------------------|--------------------------------|
//! | 200 with key                  | key                            |
//! | 200 without key               | `NoLicenseIssued`              |
//! | 403, account not premium      | `DrmDenied`                    |
//! | 403, premium (or check fails) | `LicenseRequestFailed{403, ..}`|
//! | anything else                 | `LicenseRequestFailed{status}` |
//!
//! `DrmDenied` means the deobfuscation material has gone stale and has to be
//! updated; retrying will not help. The exchange itself never retries.

use crate::api::client::{HttpRequest, HttpTransport};
use crate::api::proto::{ContentType, Interactivity, PlayPlayLicenseRequest, PlayPlayLicenseResponse};
use crate::api::session::{SessionHeaders, SessionProvider};
use crate::config::Endpoints;
use crate::content::file::FileId;
use crate::crypto::key::DecryptionKey;
use crate::crypto::playplay::KeyDeobfuscator;
use crate::error::{Result, SpdlError};
use bytes::Bytes;
use chrono::Utc;
use prost::Message;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// License request protocol version
pub const PLAYPLAY_VERSION: i32 = 2;

/// HTTP status the license endpoint uses for denied requests
const STATUS_FORBIDDEN: u16 = 403;

/// Build the license request message
pub fn build_request(token: &[u8], content_type: ContentType, timestamp: i64) -> PlayPlayLicenseRequest {
    PlayPlayLicenseRequest {
        version: PLAYPLAY_VERSION,
        token: token.to_vec(),
        cache_id: None,
        interactivity: Interactivity::Interactive as i32,
        content_type: content_type as i32,
        timestamp,
    }
}

/// Client for the PlayPlay license endpoint
#[derive(Clone)]
pub struct PlayPlayLicenser {
    transport: Arc<dyn HttpTransport>,
    endpoints: Endpoints,
    session: Arc<dyn SessionProvider>,
    deobfuscator: Arc<dyn KeyDeobfuscator>,
    timeout: Option<Duration>,
}

impl PlayPlayLicenser {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        endpoints: Endpoints,
        session: Arc<dyn SessionProvider>,
        deobfuscator: Arc<dyn KeyDeobfuscator>,
    ) -> Self {
        Self {
            transport,
            endpoints,
            session,
            deobfuscator,
            timeout: None,
        }
    }

    /// Bound each license exchange by `timeout`
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Obtain the raw decryption key for one file
    ///
    /// # Errors
    /// See the status table in the module docs. Transport failures surface as
    /// `LicenseRequestFailed` with status 0.
    pub async fn get_key(
        &self,
        file_id: &FileId,
        content_type: ContentType,
        headers: &SessionHeaders,
    ) -> Result<DecryptionKey> {
        let request = build_request(&self.deobfuscator.token(), content_type, Utc::now().timestamp());
        let url = self.endpoints.playplay_url(file_id);
        debug!(file_id = %file_id, content_type = ?content_type, "Requesting PlayPlay license");

        let mut http = HttpRequest::post(url, Bytes::from(request.encode_to_vec()))
            .with_headers(headers.proto_headers()?);
        if let Some(timeout) = self.timeout {
            http = http.with_timeout(timeout);
        }

        let response = self
            .transport
            .send(http)
            .await
            .map_err(|e| SpdlError::LicenseRequestFailed {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status;
        if status == STATUS_FORBIDDEN {
            let body = response.text_lossy().await;
            return Err(self.forbidden(file_id, body).await);
        }
        if status != 200 {
            let body = response.text_lossy().await;
            warn!(file_id = %file_id, status, "License request failed");
            return Err(SpdlError::LicenseRequestFailed { status, body });
        }

        let body = response.bytes().await.map_err(|e| SpdlError::LicenseRequestFailed {
            status,
            body: e.to_string(),
        })?;
        let license = PlayPlayLicenseResponse::decode(body.as_ref()).map_err(|e| {
            SpdlError::LicenseRequestFailed {
                status,
                body: format!("undecodable license response: {}", e),
            }
        })?;

        let obfuscated = match license.obfuscated_key {
            Some(key) if !key.is_empty() => key,
            _ => return Err(SpdlError::NoLicenseIssued(file_id.to_hex())),
        };

        let raw = self.deobfuscator.deobfuscate(file_id, &obfuscated).await?;
        let key = DecryptionKey::from_slice(&raw)?;
        debug!(file_id = %file_id, "PlayPlay key obtained");
        Ok(key)
    }

    /// Classify a 403 by re-checking account entitlement
    async fn forbidden(&self, file_id: &FileId, body: String) -> SpdlError {
        match self.session.is_premium().await {
            Ok(false) => {
                warn!(file_id = %file_id, "License denied for non-premium account");
                SpdlError::DrmDenied(file_id.to_hex())
            }
            Ok(true) => SpdlError::LicenseRequestFailed {
                status: STATUS_FORBIDDEN,
                body,
            },
            Err(e) => {
                warn!(file_id = %file_id, error = %e, "Entitlement check failed after 403");
                SpdlError::LicenseRequestFailed {
                    status: STATUS_FORBIDDEN,
                    body,
                }
            }
        }
    }
}
