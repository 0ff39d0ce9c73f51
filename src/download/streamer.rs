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


//! Content streamer
//!
//! Entry point of the pipeline. For one entity and requested format:
//!
//! 1. Select the file (format catalog; no network)
//! 2. Choose the decrypt path from the file's wire format
//! 3. Take a session header snapshot
//! 4. Resolve storage
//! 5. Run the path into the output sink
//!
//! Any failure terminates the sink with the error that caused it. Bytes
//! already written stay written. A panic anywhere in the pipeline is reported
//! as `Internal`.
//!
//! # Example
//! ```no_run
//! # use spdl_core::{ContentStreamer, StreamerConfig, StaticSession, PlayableEntity};
//! # use spdl_core::{KeyDeobfuscator, WidevineCdm};
//! # use std::sync::Arc;
//! # async fn example(
//! #     entity: PlayableEntity,
//! #     deobfuscator: Arc<dyn KeyDeobfuscator>,
//! #     cdm: Arc<dyn WidevineCdm>,
//! # ) -> spdl_core::Result<()> {
//! let session = Arc::new(StaticSession::new("access-token", true));
//! let streamer = ContentStreamer::with_reqwest(StreamerConfig::default(), session, deobfuscator, cdm)?;
//!
//! let stream = streamer.stream(&entity, "vorbis_high", false)?;
//! let mut file = tokio::fs::File::create("track.ogg").await?;
//! stream.write_to(&mut file).await?;
//! # Ok(())
//! # }
//! ```

use crate::api::client::{HttpTransport, ReqwestTransport};
use crate::api::license::PlayPlayLicenser;
use crate::api::seektable::SeekTableClient;
use crate::api::session::SessionProvider;
use crate::api::storage::StorageResolver;
use crate::config::StreamerConfig;
use crate::content::file::{ContentKind, PlayableEntity, PlayableFile};
use crate::content::format::{path_for, select_file, PathKind};
use crate::crypto::playplay::KeyDeobfuscator;
use crate::crypto::widevine::WidevineCdm;
use crate::download::paths::{DecryptPath, PassthroughPath, PathJob, PlayPlayPath, WidevinePath};
use crate::download::segments::SegmentFetcher;
use crate::download::sink::{channel, AudioSink, AudioStream};
use crate::error::{Result, SpdlError};
use futures_util::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Orchestrates resolution, licensing and decryption for playable content
///
/// Cheap to clone; clones share transport, session and DRM capabilities.
#[derive(Clone)]
pub struct ContentStreamer {
    config: Arc<StreamerConfig>,
    session: Arc<dyn SessionProvider>,
    resolver: StorageResolver,
    playplay: Arc<PlayPlayPath>,
    widevine: Arc<WidevinePath>,
    passthrough: Arc<PassthroughPath>,
}

impl ContentStreamer {
    /// Build a streamer over an arbitrary transport
    ///
    /// # Errors
    /// `InvalidInput` if the configuration fails validation
    pub fn new(
        config: StreamerConfig,
        transport: Arc<dyn HttpTransport>,
        session: Arc<dyn SessionProvider>,
        deobfuscator: Arc<dyn KeyDeobfuscator>,
        cdm: Arc<dyn WidevineCdm>,
    ) -> Result<Self> {
        config.validate()?;

        let resolver = StorageResolver::new(transport.clone(), &config);
        let licenser = PlayPlayLicenser::new(
            transport.clone(),
            config.endpoints.clone(),
            session.clone(),
            deobfuscator,
        )
        .with_timeout(config.timeout());
        let playplay = PlayPlayPath::new(transport.clone(), licenser);
        let widevine = WidevinePath::new(
            SeekTableClient::new(transport.clone(), config.endpoints.clone())
                .with_timeout(config.timeout()),
            SegmentFetcher::new(transport.clone(), config.segment_concurrency),
            cdm,
            config.write_chunk_size,
        );
        let passthrough = PassthroughPath::new(transport, config.endpoints.clone());

        Ok(Self {
            config: Arc::new(config),
            session,
            resolver,
            playplay: Arc::new(playplay),
            widevine: Arc::new(widevine),
            passthrough: Arc::new(passthrough),
        })
    }

    /// Build a streamer with a [`ReqwestTransport`] configured from `config`
    pub fn with_reqwest(
        config: StreamerConfig,
        session: Arc<dyn SessionProvider>,
        deobfuscator: Arc<dyn KeyDeobfuscator>,
        cdm: Arc<dyn WidevineCdm>,
    ) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Self::new(config, transport, session, deobfuscator, cdm)
    }

    pub fn config(&self) -> &StreamerConfig {
        &self.config
    }

    fn path(&self, kind: PathKind) -> &dyn DecryptPath {
        match kind {
            PathKind::PlayPlay => self.playplay.as_ref(),
            PathKind::Widevine => self.widevine.as_ref(),
            PathKind::Passthrough => self.passthrough.as_ref(),
        }
    }

    /// Start streaming `entity` in `requested_format`
    ///
    /// File selection happens before anything is spawned, so an unavailable
    /// format fails here without touching the network. The pipeline then runs
    /// on its own task; dropping the returned stream cancels it.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn stream(
        &self,
        entity: &PlayableEntity,
        requested_format: &str,
        preload: bool,
    ) -> Result<AudioStream> {
        let (file, kind) = select(entity, requested_format)?;
        let (sink, mut stream) = channel(self.config.channel_capacity);

        let this = self.clone();
        let content_kind = entity.kind;
        let handle = tokio::spawn(async move {
            this.drive(file, content_kind, kind, preload, sink).await;
        });
        stream.attach(handle);
        Ok(stream)
    }

    /// Run the pipeline on the current task, writing into `sink`
    ///
    /// The outcome is reported only through the sink: it ends cleanly on
    /// success or with one error on failure.
    pub async fn stream_into(
        &self,
        entity: &PlayableEntity,
        requested_format: &str,
        preload: bool,
        sink: AudioSink,
    ) {
        match select(entity, requested_format) {
            Ok((file, kind)) => self.drive(file, entity.kind, kind, preload, sink).await,
            Err(e) => sink.fail(e).await,
        }
    }

    async fn drive(
        &self,
        file: PlayableFile,
        content_kind: ContentKind,
        kind: PathKind,
        preload: bool,
        mut sink: AudioSink,
    ) {
        info!(file_id = %file.id, format = %file.wire_format, path = ?kind, "Starting stream");

        // A panic must still reach the consumer as an error, never as a clean end
        let outcome = AssertUnwindSafe(self.run(&file, content_kind, kind, preload, &mut sink))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(SpdlError::internal(format!(
                    "pipeline panicked: {}",
                    panic_message(&*panic)
                )))
            });

        match outcome {
            Ok(()) => {
                info!(file_id = %file.id, bytes = sink.bytes_written(), "Stream complete");
            }
            Err(e) if e.is_cancelled() => {
                debug!(file_id = %file.id, "Stream cancelled by consumer");
            }
            Err(e) => {
                warn!(
                    file_id = %file.id,
                    bytes = sink.bytes_written(),
                    error = %e,
                    "Stream failed"
                );
                sink.fail(e).await;
            }
        }
    }

    async fn run(
        &self,
        file: &PlayableFile,
        content_kind: ContentKind,
        kind: PathKind,
        preload: bool,
        sink: &mut AudioSink,
    ) -> Result<()> {
        let session = self.session.current_headers().await?;
        let target = self.resolver.resolve(&file.id, preload, &session).await?;

        let path = self.path(kind);
        debug!(file_id = %file.id, path = ?path.kind(), "Running decrypt path");
        let job = PathJob {
            file,
            content_kind,
            target,
            session: &session,
        };
        path.run(job, sink).await
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.as_str()
    } else {
        "unknown panic"
    }
}

fn select(entity: &PlayableEntity, requested_format: &str) -> Result<(PlayableFile, PathKind)> {
    let file = select_file(&entity.files, requested_format)?;
    let kind = path_for(&file.wire_format).ok_or_else(|| SpdlError::FormatUnavailable {
        requested: requested_format.to_string(),
        available: entity.wire_formats(),
    })?;
    debug!(entity = %entity.id, format = %file.wire_format, path = ?kind, "File selected");
    Ok((file.clone(), kind))
}
