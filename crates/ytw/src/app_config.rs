//! 🔧 App Configuration - the sacred TOML-to-struct pipeline.
//!
//! 📡 "Config not found: We looked everywhere. Under the couch. Behind the fridge.
//! In the junk drawer. Nothing." - every developer at 3am 🦆
//!
//! 🏗️ Powered by Figment, because manually parsing env vars is a form of
//! self-harm that even the borrow checker wouldn't approve of.

use std::path::Path;

use anyhow::Context;
use figment::{
    Figment,
    providers::{Env, Format, Toml},
};
use serde::Deserialize;
use tracing::info;

use crate::backends::{FileSinkConfig, KafkaSinkConfig, YouTubeSourceConfig};

/// 📦 One struct to rule them all: where the videos come from, where the summaries go,
/// and the knobs in between.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    /// 📡 The Data API side: key, playlist, paging.
    pub source_config: YouTubeSourceConfig,
    pub sink_config: SinkConfig,
    #[serde(default)]
    pub runtime: RuntimeConfig,
}

/// 🎭 Where the summaries go. Externally tagged, so TOML reads `[sink_config.Kafka]`.
#[derive(Debug, Deserialize, Clone)]
pub enum SinkConfig {
    Kafka(KafkaSinkConfig),
    File(FileSinkConfig),
    /// 🧠 Keeps everything in RAM and logs a count at flush. For dry runs that trust nobody.
    InMemory,
}

/// 🎛️ Run-level knobs that belong to no backend in particular.
#[derive(Debug, Deserialize, Clone)]
pub struct RuntimeConfig {
    /// 🏷️ Topic every summary is published to, whatever the sink.
    #[serde(default = "default_topic")]
    pub topic: String,
    /// 📊 Spinner + comfy table while traversing. Turn off for CI logs.
    #[serde(default = "default_show_progress")]
    pub show_progress: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            topic: default_topic(),
            show_progress: default_show_progress(),
        }
    }
}

fn default_topic() -> String {
    "youtube_videos".to_string()
}

fn default_show_progress() -> bool {
    true
}

/// 🚀 Load the config from `YTW_*` env vars, layered under an optional TOML file.
///
/// - `None` → env vars only.
/// - `Some(path)` → env vars + TOML, merged. TOML wins on conflicts.
///
/// Nested keys in env vars use a double underscore:
/// `YTW_SOURCE_CONFIG__API_KEY=...` sets `source_config.api_key`.
pub fn load_config(config_file_name: Option<&Path>) -> anyhow::Result<AppConfig> {
    info!(
        "🔧 Loading configuration: {:#?}",
        config_file_name.unwrap_or(Path::new(""))
    );

    let config = Figment::new().merge(Env::prefixed("YTW_").split("__"));
    let config = match config_file_name {
        Some(file_name) => config.merge(Toml::file(file_name)),
        None => config,
    };

    let context_msg = match config_file_name {
        Some(path) => format!(
            "💀 Failed to parse configuration from file '{}' and environment variables (YTW_*). \
             The file exists in our hearts, but apparently not in the shape we need.",
            path.display()
        ),
        None => "💀 Failed to parse configuration from environment variables (YTW_*). \
                 No file was provided, so this one's all on the environment. Classic."
            .to_string(),
    };

    config.extract().context(context_msg)
}
