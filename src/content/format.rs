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


//! Format catalog
//!
//! Maps a requested format onto one of the files advertised by metadata and
//! decides which decrypt path can handle a wire format.
//!
//! # Matching
//!
//! Wire formats encode bitrate variants under one family (`OGG_VORBIS_96`,
//! `OGG_VORBIS_160`, `OGG_VORBIS_320`), so files are looked up by
//! case-insensitive prefix, never by string equality:
//!
//! | Request         | Wire prefix       |
//! |-----------------|-------------------|
//! | `vorbis_low`    | `OGG_VORBIS_96`   |
//! | `vorbis_medium` | `OGG_VORBIS_160`  |
//! | `vorbis_high`   | `OGG_VORBIS_320`  |
//! | `vorbis`, `ogg` | `OGG_VORBIS`      |
//! | `mp3`           | `MP3`             |
//! | `aac`, `mp4`, `m4a` | `MP4`         |
//! | anything else   | used verbatim     |
//!
//! When a family matches several files the highest bitrate wins.
//!
//! Premium-only formats are not checked here; entitlement belongs to the
//! session layer. This module never touches the network.

use crate::content::file::PlayableFile;
use crate::error::{Result, SpdlError};

/// Decrypt path family selected by wire-format prefix
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathKind {
    /// AES-CTR stream with PlayPlay license (OGG/Vorbis)
    PlayPlay,
    /// Segmented fetch with Widevine license (MP4/AAC)
    Widevine,
    /// Unencrypted copy (MP3)
    Passthrough,
}

/// Logical aliases accepted in addition to raw wire prefixes
const FORMAT_ALIASES: &[(&str, &str)] = &[
    ("vorbis_low", "OGG_VORBIS_96"),
    ("vorbis_medium", "OGG_VORBIS_160"),
    ("vorbis_high", "OGG_VORBIS_320"),
    ("vorbis", "OGG_VORBIS"),
    ("ogg", "OGG_VORBIS"),
    ("mp3", "MP3"),
    ("aac", "MP4"),
    ("mp4", "MP4"),
    ("m4a", "MP4"),
];

/// Wire prefix → decrypt path. First match wins.
const DISPATCH_TABLE: &[(&str, PathKind)] = &[
    ("OGG", PathKind::PlayPlay),
    ("VORBIS", PathKind::PlayPlay),
    ("MP4", PathKind::Widevine),
    ("MP3", PathKind::Passthrough),
];

/// Resolve a requested format to the wire prefix it stands for
pub fn wire_prefix(requested: &str) -> String {
    let requested = requested.trim();
    FORMAT_ALIASES
        .iter()
        .find(|(alias, _)| alias.eq_ignore_ascii_case(requested))
        .map(|(_, prefix)| prefix.to_string())
        .unwrap_or_else(|| requested.to_ascii_uppercase())
}

/// Decrypt path able to handle a wire format, if any
pub fn path_for(wire_format: &str) -> Option<PathKind> {
    let upper = wire_format.to_ascii_uppercase();
    DISPATCH_TABLE
        .iter()
        .find(|(prefix, _)| upper.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

/// Bitrate encoded in the first numeric component of a wire format
///
/// `OGG_VORBIS_320` → 320, `MP4_128_DUAL` → 128, `FLAC_FLAC` → 0.
fn bitrate(wire_format: &str) -> u32 {
    wire_format
        .split('_')
        .find_map(|part| part.parse::<u32>().ok())
        .unwrap_or(0)
}

/// Pick the file matching `requested`
///
/// # Errors
/// `FormatUnavailable` when no file's wire format starts with the requested
/// prefix, or when the only matches have no decrypt path.
pub fn select_file<'a>(files: &'a [PlayableFile], requested: &str) -> Result<&'a PlayableFile> {
    let prefix = wire_prefix(requested);

    let mut best: Option<&PlayableFile> = None;
    for file in files {
        let wire = file.wire_format.to_ascii_uppercase();
        if prefix.is_empty() || !wire.starts_with(&prefix) || path_for(&wire).is_none() {
            continue;
        }
        // Keep the first file among equal bitrates
        if best.map_or(true, |b| bitrate(&file.wire_format) > bitrate(&b.wire_format)) {
            best = Some(file);
        }
    }

    best.ok_or_else(|| SpdlError::FormatUnavailable {
        requested: requested.to_string(),
        available: files.iter().map(|f| f.wire_format.clone()).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content::file::FileId;

    fn file(n: u8, wire: &str) -> PlayableFile {
        PlayableFile::new(FileId::from_bytes([n; 20]), wire)
    }

    fn catalog() -> Vec<PlayableFile> {
        vec![
            file(1, "OGG_VORBIS_96"),
            file(2, "OGG_VORBIS_320"),
            file(3, "OGG_VORBIS_160"),
            file(4, "MP4_128"),
            file(5, "MP3_96"),
            file(6, "AAC_24"),
        ]
    }

    #[test]
    fn test_family_request_picks_highest_bitrate() {
        let files = catalog();
        let selected = select_file(&files, "OGG").unwrap();
        assert_eq!(selected.wire_format, "OGG_VORBIS_320");

        let selected = select_file(&files, "vorbis").unwrap();
        assert_eq!(selected.wire_format, "OGG_VORBIS_320");
    }

    #[test]
    fn test_exact_variant_request() {
        let files = catalog();
        assert_eq!(select_file(&files, "OGG_VORBIS_160").unwrap().wire_format, "OGG_VORBIS_160");
        assert_eq!(select_file(&files, "vorbis_medium").unwrap().wire_format, "OGG_VORBIS_160");
        assert_eq!(select_file(&files, "ogg_vorbis_96").unwrap().wire_format, "OGG_VORBIS_96");
    }

    #[test]
    fn test_aliases_for_other_families() {
        let files = catalog();
        assert_eq!(select_file(&files, "aac").unwrap().wire_format, "MP4_128");
        assert_eq!(select_file(&files, "mp3").unwrap().wire_format, "MP3_96");
    }

    #[test]
    fn test_missing_format_is_unavailable() {
        let files = catalog();
        for requested in ["FLAC", "MP4_256", "opus", ""] {
            let err = select_file(&files, requested).unwrap_err();
            match err {
                SpdlError::FormatUnavailable { requested: r, available } => {
                    assert_eq!(r, requested);
                    assert_eq!(available.len(), files.len());
                }
                other => panic!("unexpected error: {other:?}"),
            }
        }
    }

    #[test]
    fn test_format_without_decrypt_path_is_unavailable() {
        let files = catalog();
        assert!(matches!(
            select_file(&files, "AAC_24"),
            Err(SpdlError::FormatUnavailable { .. })
        ));
    }

    #[test]
    fn test_dispatch_by_prefix() {
        assert_eq!(path_for("OGG_VORBIS_320"), Some(PathKind::PlayPlay));
        assert_eq!(path_for("vorbis_160"), Some(PathKind::PlayPlay));
        assert_eq!(path_for("MP4_256_DUAL"), Some(PathKind::Widevine));
        assert_eq!(path_for("MP3_160_ENC"), Some(PathKind::Passthrough));
        assert_eq!(path_for("FLAC_FLAC"), None);
    }

    #[test]
    fn test_bitrate_parsing() {
        assert_eq!(bitrate("OGG_VORBIS_320"), 320);
        assert_eq!(bitrate("MP4_128_DUAL"), 128);
        assert_eq!(bitrate("FLAC_FLAC"), 0);
    }
}
