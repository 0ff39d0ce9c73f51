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


//! Error types for spdl-core
//!
//! This module defines error types using thiserror for ergonomic error handling.
//! Every variant is terminal for the stream that produced it: the pipeline never
//! retries internally, it surfaces exactly one typed error to the consumer and
//! closes the output stream.
//!
//! ## Categories
//!
//! ### Session
//! - `AuthRequired` - the session provider had no usable bearer token
//!
//! ### Resolution
//! - `FormatUnavailable` - no file of the content matches the requested format
//! - `StorageUnavailable` - storage-resolve unreachable, unparsable, or no usable CDN host
//! - `Restricted` - storage-resolve answered with the RESTRICTED tag
//!
//! ### DRM
//! - `LicenseRequestFailed` - the PlayPlay endpoint answered with a non-200 status
//! - `NoLicenseIssued` - 200 response without an obfuscated key
//! - `DrmDenied` - 403 on a non-premium account; the external key material is stale
//! - `InvalidKey` / `Drm` - an external DRM capability misbehaved
//!
//! ### Content
//! - `SegmentFetchFailed` - a ranged GET of the segmented path failed
//! - `SeekTableUnavailable` / `InvalidSeekTable` - seek table could not be used
//! - `InvalidDecryptedContainer` - the "OggS" marker never appeared (wrong key)
//! - `ContentUnavailable` - CDN and fallback both failed

use thiserror::Error;

/// Result type alias using our SpdlError type
pub type Result<T> = std::result::Result<T, SpdlError>;

/// Main error type for spdl-core
#[derive(Error, Debug)]
pub enum SpdlError {
    // ===== Session Errors =====

    /// No bearer token is available for the current session
    #[error("Authentication required: {0}")]
    AuthRequired(String),

    // ===== Resolution Errors =====

    /// Requested format is not offered by the content, or has no decrypt path
    #[error("Format '{requested}' is not available for this content")]
    FormatUnavailable {
        requested: String,
        /// Wire formats the content does offer
        available: Vec<String>,
    },

    /// Storage-resolve failed or produced no usable CDN target
    #[error("Storage unavailable for file {file_id}: {reason}")]
    StorageUnavailable {
        file_id: String,
        reason: String,
    },

    /// Storage-resolve reported the file as restricted
    #[error("File {0} is restricted")]
    Restricted(String),

    // ===== DRM Errors =====

    /// PlayPlay license endpoint answered with a non-success status
    #[error("License request failed with status {status}: {body}")]
    LicenseRequestFailed {
        status: u16,
        body: String,
    },

    /// License response carried no obfuscated key
    #[error("No license was issued for file {0}")]
    NoLicenseIssued(String),

    /// License denied on a non-premium account (stale or revoked key material)
    #[error("DRM license denied for file {0}; the key deobfuscation material must be updated")]
    DrmDenied(String),

    /// A DRM capability returned a key of unexpected length
    #[error("Invalid decryption key: expected {expected} bytes, got {actual}")]
    InvalidKey {
        expected: usize,
        actual: usize,
    },

    /// An external DRM capability failed on its own terms
    #[error("DRM capability error during {operation}: {message}")]
    Drm {
        operation: String,
        message: String,
    },

    // ===== Content Errors =====

    /// A ranged segment GET did not succeed
    #[error("Segment {index} fetch failed: {reason}")]
    SegmentFetchFailed {
        index: usize,
        reason: String,
    },

    /// Seek table could not be fetched
    #[error("Seek table unavailable for file {file_id}: {reason}")]
    SeekTableUnavailable {
        file_id: String,
        reason: String,
    },

    /// Seek table content is unusable
    #[error("Invalid seek table: {0}")]
    InvalidSeekTable(String),

    /// Decrypted stream ended without ever containing the container marker
    #[error("Decrypted content is not a valid container (no OggS marker found)")]
    InvalidDecryptedContainer,

    /// Neither the CDN nor the fallback URL delivered content
    #[error("Content unavailable: {0}")]
    ContentUnavailable(String),

    // ===== General Errors =====

    /// The consumer dropped the output stream
    #[error("Operation cancelled")]
    Cancelled,

    /// Writing to a caller-supplied destination failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic input validation error
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure of the HTTP transport itself (no response was obtained)
///
/// Protocol steps map this onto their own error variant, so a timeout while
/// resolving storage surfaces as `StorageUnavailable` and a connection reset on
/// a segment as `SegmentFetchFailed`.
#[derive(Error, Debug)]
pub enum TransportError {
    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// Transport failure reported by a non-reqwest transport
    #[error("Connection failed: {0}")]
    Connection(String),
}

impl From<hex::FromHexError> for SpdlError {
    fn from(err: hex::FromHexError) -> Self {
        SpdlError::InvalidInput(format!("Invalid hex: {}", err))
    }
}

// Helper methods for creating common errors
impl SpdlError {
    /// Create a StorageUnavailable error
    pub fn storage_unavailable<F: Into<String>, S: Into<String>>(file_id: F, reason: S) -> Self {
        SpdlError::StorageUnavailable {
            file_id: file_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a SeekTableUnavailable error
    pub fn seek_table_unavailable<F: Into<String>, S: Into<String>>(file_id: F, reason: S) -> Self {
        SpdlError::SeekTableUnavailable {
            file_id: file_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a SegmentFetchFailed error
    pub fn segment_failed<S: Into<String>>(index: usize, reason: S) -> Self {
        SpdlError::SegmentFetchFailed {
            index,
            reason: reason.into(),
        }
    }

    /// Create a Drm error for a failing external capability
    pub fn drm<O: Into<String>, S: Into<String>>(operation: O, message: S) -> Self {
        SpdlError::Drm {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create an InvalidInput error with a message
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        SpdlError::InvalidInput(message.into())
    }

    /// Create an Internal error with a message
    pub fn internal<S: Into<String>>(message: S) -> Self {
        SpdlError::Internal(message.into())
    }

    /// Check if error is related to DRM/licensing
    pub fn is_drm_error(&self) -> bool {
        matches!(
            self,
            SpdlError::LicenseRequestFailed { .. }
                | SpdlError::NoLicenseIssued(_)
                | SpdlError::DrmDenied(_)
                | SpdlError::InvalidKey { .. }
                | SpdlError::Drm { .. }
                | SpdlError::InvalidDecryptedContainer
        )
    }

    /// Check if error needs out-of-band remediation rather than a retry
    ///
    /// Only `DrmDenied` qualifies: the deobfuscation capability has to be
    /// updated before the same request can succeed.
    pub fn requires_remediation(&self) -> bool {
        matches!(self, SpdlError::DrmDenied(_))
    }

    /// Check if the consumer cancelled the stream
    pub fn is_cancelled(&self) -> bool {
        matches!(self, SpdlError::Cancelled)
    }
}
