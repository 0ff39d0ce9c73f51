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


use anyhow::Context;
use clap::{Parser, Subcommand};
use spdl_core::api::storage::{StorageResolver, StorageTarget};
use spdl_core::api::SeekTableClient;
use spdl_core::download::paths::{DecryptPath, PassthroughPath, PathJob};
use spdl_core::download::sink::channel;
use spdl_core::{
    ContentKind, Endpoints, FileId, HttpTransport, PlayableFile, ReqwestTransport, SessionHeaders,
    StreamerConfig,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spdl-cli")]
#[command(about = "spdl-core CLI - Desktop testing tool", long_about = None)]
struct Cli {
    /// Bearer access token
    #[arg(long, env = "SPDL_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    /// JSON streamer configuration
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Send every request to this base URL instead of the public hosts
    #[arg(long, global = true)]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a file id and print the usable CDN URLs
    Resolve {
        /// 40-character hex file id
        file_id: FileId,
        /// Use the interactive-prefetch endpoint
        #[arg(long)]
        preload: bool,
    },
    /// Fetch a seek table and print its byte ranges
    Seektable {
        /// 40-character hex file id
        file_id: FileId,
    },
    /// Download an unencrypted MP3 file, falling back to its preview
    Preview {
        /// 40-character hex file id
        file_id: FileId,
        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn load_config(cli: &Cli) -> anyhow::Result<StreamerConfig> {
    let mut config = match &cli.config {
        Some(path) => {
            let json = std::fs::read_to_string(path)
                .with_context(|| format!("reading {}", path.display()))?;
            StreamerConfig::from_json(&json)?
        }
        None => StreamerConfig::default(),
    };
    if let Some(base) = &cli.base_url {
        config.endpoints = Endpoints::with_base(base);
    }
    Ok(config)
}

fn session_headers(cli: &Cli) -> anyhow::Result<SessionHeaders> {
    let token = cli.token.clone().unwrap_or_default();
    Ok(SessionHeaders::new(token)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(&config)?);

    match &cli.command {
        Commands::Resolve { file_id, preload } => {
            let resolver = StorageResolver::new(transport, &config);
            match resolver.resolve(file_id, *preload, &session_headers(&cli)?).await? {
                StorageTarget::Cdn(urls) => {
                    for url in urls.as_slice() {
                        println!("{}", url);
                    }
                }
                StorageTarget::Inline(bytes) => println!("inline payload: {} bytes", bytes.len()),
            }
        }
        Commands::Seektable { file_id } => {
            let client = SeekTableClient::new(transport, config.endpoints.clone())
                .with_timeout(config.timeout());
            let table = client.fetch(file_id).await?;
            println!("pssh: {} bytes", table.pssh.len());
            for (index, range) in table.byte_ranges().iter().enumerate() {
                println!("{:>5}  bytes={}-{}  ({} bytes)", index, range.start, range.end, range.size());
            }
            println!("total: {} bytes", table.total_len());
        }
        Commands::Preview { file_id, output } => {
            let session = session_headers(&cli)?;
            let target = StorageResolver::new(transport.clone(), &config)
                .resolve(file_id, false, &session)
                .await?;
            let path = PassthroughPath::new(transport, config.endpoints.clone());
            let file = PlayableFile::new(*file_id, "MP3");

            let (mut sink, stream) = channel(config.channel_capacity);
            let mut out = tokio::fs::File::create(output)
                .await
                .with_context(|| format!("creating {}", output.display()))?;

            let job = PathJob {
                file: &file,
                content_kind: ContentKind::Track,
                target,
                session: &session,
            };
            let producer = async move {
                let result = path.run(job, &mut sink).await;
                drop(sink);
                result
            };
            let (result, written) = tokio::join!(producer, stream.write_to(&mut out));
            result?;
            println!("wrote {} bytes to {}", written?, output.display());
        }
    }

    Ok(())
}
