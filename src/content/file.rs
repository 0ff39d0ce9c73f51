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


//! Playable content as handed over by the metadata catalog
//!
//! The catalog client is not part of this crate; it parses track and episode
//! metadata and produces a [`PlayableEntity`] listing one [`PlayableFile`] per
//! quality/codec. Those values are immutable from here on.

use crate::api::proto::ContentType;
use crate::error::{Result, SpdlError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Length of a file id in bytes
pub const FILE_ID_LENGTH: usize = 20;

/// Opaque audio file identifier (20 bytes, hex encoded on the wire)
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileId([u8; FILE_ID_LENGTH]);

impl FileId {
    pub fn from_bytes(bytes: [u8; FILE_ID_LENGTH]) -> Self {
        Self(bytes)
    }

    /// Parse a 40-character hex file id
    pub fn from_hex(hex_id: &str) -> Result<Self> {
        let bytes = hex::decode(hex_id.trim())?;
        let bytes: [u8; FILE_ID_LENGTH] = bytes.try_into().map_err(|v: Vec<u8>| {
            SpdlError::invalid_input(format!(
                "file id must be {} bytes, got {}",
                FILE_ID_LENGTH,
                v.len()
            ))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FileId({})", self.to_hex())
    }
}

impl std::str::FromStr for FileId {
    type Err = SpdlError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_hex(s)
    }
}

impl Serialize for FileId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for FileId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// One encoded rendition of a piece of content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableFile {
    pub id: FileId,
    /// Wire format name as advertised by metadata, e.g. `OGG_VORBIS_320`
    pub wire_format: String,
}

impl PlayableFile {
    pub fn new<S: Into<String>>(id: FileId, wire_format: S) -> Self {
        Self {
            id,
            wire_format: wire_format.into(),
        }
    }
}

/// Kind of playable content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentKind {
    Track,
    Episode,
}

impl ContentKind {
    /// License content type announced to the PlayPlay endpoint
    pub fn license_content_type(self) -> ContentType {
        match self {
            ContentKind::Track => ContentType::AudioTrack,
            ContentKind::Episode => ContentType::AudioEpisode,
        }
    }
}

/// A track or episode together with the files the catalog exposes for it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayableEntity {
    /// Catalog id (base62 or hex; opaque to this crate)
    pub id: String,
    pub kind: ContentKind,
    #[serde(default)]
    pub files: Vec<PlayableFile>,
}

impl PlayableEntity {
    pub fn track<S: Into<String>>(id: S, files: Vec<PlayableFile>) -> Self {
        Self {
            id: id.into(),
            kind: ContentKind::Track,
            files,
        }
    }

    pub fn episode<S: Into<String>>(id: S, files: Vec<PlayableFile>) -> Self {
        Self {
            id: id.into(),
            kind: ContentKind::Episode,
            files,
        }
    }

    /// Wire formats offered, in catalog order
    pub fn wire_formats(&self) -> Vec<String> {
        self.files.iter().map(|f| f.wire_format.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_id_hex_roundtrip() {
        let hex_id = "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334";
        let id = FileId::from_hex(hex_id).unwrap();
        assert_eq!(id.to_hex(), hex_id);
        assert_eq!(id.as_bytes().len(), FILE_ID_LENGTH);
    }

    #[test]
    fn test_file_id_rejects_wrong_length() {
        let result = FileId::from_hex("a1b2c3");
        assert!(matches!(result, Err(SpdlError::InvalidInput(_))));
        assert!(FileId::from_hex("not hex at all").is_err());
    }

    #[test]
    fn test_entity_deserializes_from_catalog_json() {
        let json = r#"{
            "id": "4uLU6hMCjMI75M1A2tKUQC",
            "kind": "track",
            "files": [
                { "id": "a1b2c3d4e5f60718293a4b5c6d7e8f9001122334", "wire_format": "OGG_VORBIS_160" }
            ]
        }"#;
        let entity: PlayableEntity = serde_json::from_str(json).unwrap();
        assert_eq!(entity.kind, ContentKind::Track);
        assert_eq!(entity.wire_formats(), vec!["OGG_VORBIS_160".to_string()]);
    }

    #[test]
    fn test_content_type_mapping() {
        assert_eq!(ContentKind::Track.license_content_type(), ContentType::AudioTrack);
        assert_eq!(ContentKind::Episode.license_content_type(), ContentType::AudioEpisode);
    }
}
