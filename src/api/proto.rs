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


//! Binary wire messages
//!
//! Hand-written prost messages for the two protobuf exchanges this crate
//! speaks. The schemas are small and stable, so there is no build script.
//!
//! ```text
//! message StorageResolveResponse {
//!   enum Result { CDN = 0; STORAGE = 1; RESTRICTED = 3; }
//!   Result result = 1;
//!   repeated string cdnurl = 2;
//!   bytes fileid = 4;
//! }
//!
//! message PlayPlayLicenseRequest {
//!   int32 version = 1;
//!   bytes token = 2;
//!   bytes cache_id = 3;
//!   Interactivity interactivity = 4;
//!   ContentType content_type = 5;
//!   int64 timestamp = 6;
//! }
//!
//! message PlayPlayLicenseResponse {
//!   bytes obfuscated_key = 1;
//! }
//! ```

/// Result tag of a storage-resolve response
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum StorageResult {
    Cdn = 0,
    Storage = 1,
    Restricted = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct StorageResolveResponse {
    #[prost(enumeration = "StorageResult", tag = "1")]
    pub result: i32,
    #[prost(string, repeated, tag = "2")]
    pub cdnurl: Vec<String>,
    #[prost(bytes = "vec", tag = "4")]
    pub fileid: Vec<u8>,
}

impl StorageResolveResponse {
    /// Result tag, or `None` for values this client does not know
    pub fn result_tag(&self) -> Option<StorageResult> {
        StorageResult::try_from(self.result).ok()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum Interactivity {
    Unknown = 0,
    Interactive = 1,
    Download = 2,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, prost::Enumeration)]
#[repr(i32)]
pub enum ContentType {
    Unknown = 0,
    AudioTrack = 1,
    AudioEpisode = 2,
    AudioAdvertisement = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PlayPlayLicenseRequest {
    #[prost(int32, tag = "1")]
    pub version: i32,
    #[prost(bytes = "vec", tag = "2")]
    pub token: Vec<u8>,
    #[prost(bytes = "vec", optional, tag = "3")]
    pub cache_id: Option<Vec<u8>>,
    #[prost(enumeration = "Interactivity", tag = "4")]
    pub interactivity: i32,
    #[prost(enumeration = "ContentType", tag = "5")]
    pub content_type: i32,
    #[prost(int64, tag = "6")]
    pub timestamp: i64,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct PlayPlayLicenseResponse {
    #[prost(bytes = "vec", optional, tag = "1")]
    pub obfuscated_key: Option<Vec<u8>>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_storage_response_decodes_unknown_tag() {
        let response = StorageResolveResponse {
            result: 7,
            cdnurl: vec![],
            fileid: vec![],
        };
        let decoded = StorageResolveResponse::decode(response.encode_to_vec().as_slice()).unwrap();
        assert_eq!(decoded.result, 7);
        assert_eq!(decoded.result_tag(), None);
    }

    #[test]
    fn test_license_request_field_layout() {
        let request = PlayPlayLicenseRequest {
            version: 2,
            token: vec![0xAA],
            cache_id: None,
            interactivity: Interactivity::Interactive as i32,
            content_type: ContentType::AudioTrack as i32,
            timestamp: 1,
        };
        // version=2, token=[aa], interactivity=1, content_type=1, timestamp=1
        assert_eq!(
            request.encode_to_vec(),
            vec![0x08, 0x02, 0x12, 0x01, 0xAA, 0x20, 0x01, 0x28, 0x01, 0x30, 0x01]
        );
    }

    #[test]
    fn test_license_response_without_key() {
        let decoded = PlayPlayLicenseResponse::decode(&[][..]).unwrap();
        assert!(decoded.obfuscated_key.is_none());
    }
}
