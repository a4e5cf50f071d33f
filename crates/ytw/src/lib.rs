//! 🎬 ytw - the YouTube watcher.
//!
//! Pages through every video of a playlist on the YouTube Data API, summarizes each one
//! (title, views, likes, comments), and publishes the summaries as keyed messages to an
//! event stream. One run, one playlist, one flush, one report. 🦆

pub mod app_config;
pub mod backends;
pub mod common;
pub mod delivery;
pub mod error;
pub mod progress;
pub mod summarizer;

mod pipeline;
mod traversal;

use anyhow::{Context, Result};
use tracing::info;

use crate::app_config::AppConfig;
use crate::backends::PublisherBackend;
use crate::backends::youtube::{PlaylistItemsFetcher, VideosFetcher, YouTubeClient};
use crate::pipeline::PublishPipeline;

pub use crate::error::WatchError;
pub use crate::pipeline::{PartialRunReport, PipelineState, RunReport};
pub use tokio_util::sync::CancellationToken;

/// 🚀 Build everything from config and run one watch to completion.
///
/// Fails before any API call if the config is unusable or the sink can't be reached.
/// Once traversal starts, a fatal error still flushes what was submitted before returning.
pub async fn run(app_config: AppConfig, cancel: CancellationToken) -> Result<RunReport> {
    let AppConfig {
        source_config,
        sink_config,
        runtime,
    } = app_config;

    let playlist_id = source_config
        .playlist_id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            WatchError::Config(
                "no playlist to watch: set source_config.playlist_id or pass --playlist-id".to_string(),
            )
        })?;

    info!("🔧 source: {source_config:?}");
    let client = YouTubeClient::new(source_config)?;
    let publisher = PublisherBackend::from_sink_config(sink_config)
        .await
        .context("💀 The publisher could not be built. Nothing was fetched, nothing was sent.")?;
    info!("📨 publishing with {publisher:?}");

    PublishPipeline::new(
        PlaylistItemsFetcher::new(client.clone()),
        VideosFetcher::new(client),
        publisher,
        runtime.topic,
    )
    .with_progress(runtime.show_progress)
    .run(&playlist_id, &cancel)
    .await
}
