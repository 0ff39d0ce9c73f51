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


//! Session headers and entitlement
//!
//! Token refresh lives outside this crate. The pipeline asks a
//! [`SessionProvider`] for a snapshot once per stream and passes that
//! [`SessionHeaders`] value explicitly to each protocol step.

use crate::error::{Result, SpdlError};
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT, ACCEPT_LANGUAGE, AUTHORIZATION};
use std::fmt;

/// Read-only snapshot of the credentials valid for one stream
#[derive(Clone)]
pub struct SessionHeaders {
    access_token: String,
}

impl SessionHeaders {
    /// # Errors
    /// `AuthRequired` when the token is empty
    pub fn new<S: Into<String>>(access_token: S) -> Result<Self> {
        let access_token = access_token.into();
        if access_token.trim().is_empty() {
            return Err(SpdlError::AuthRequired("no access token available".to_string()));
        }
        Ok(Self { access_token })
    }

    fn bearer(&self) -> Result<HeaderValue> {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", self.access_token))
            .map_err(|_| SpdlError::AuthRequired("access token is not a valid header value".to_string()))?;
        value.set_sensitive(true);
        Ok(value)
    }

    /// Headers for JSON and storage-resolve requests
    pub fn api_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.bearer()?);
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(ACCEPT_LANGUAGE, HeaderValue::from_static("*"));
        headers.insert(
            HeaderName::from_static("app-platform"),
            HeaderValue::from_static("WebPlayer"),
        );
        Ok(headers)
    }

    /// Headers for protobuf exchanges (no JSON framing)
    pub fn proto_headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, self.bearer()?);
        headers.insert(ACCEPT, HeaderValue::from_static("*"));
        Ok(headers)
    }
}

impl fmt::Debug for SessionHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionHeaders")
            .field("access_token", &"<redacted>")
            .finish()
    }
}

/// Source of session credentials and account entitlement
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current valid headers; the provider refreshes lazily before answering
    async fn current_headers(&self) -> Result<SessionHeaders>;

    /// Whether the account has premium entitlement
    async fn is_premium(&self) -> Result<bool>;
}

/// Fixed token and entitlement, for tools and tests
#[derive(Debug, Clone)]
pub struct StaticSession {
    token: String,
    premium: bool,
}

impl StaticSession {
    pub fn new<S: Into<String>>(token: S, premium: bool) -> Self {
        Self {
            token: token.into(),
            premium,
        }
    }
}

#[async_trait]
impl SessionProvider for StaticSession {
    async fn current_headers(&self) -> Result<SessionHeaders> {
        SessionHeaders::new(self.token.clone())
    }

    async fn is_premium(&self) -> Result<bool> {
        Ok(self.premium)
    }
}
