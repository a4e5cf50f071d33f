// 📜 Schema registry lookup. One GET at startup, so a misconfigured registry fails before
// the first API quota unit is spent instead of after the ten-thousandth message. The
// answer becomes the value encoder: every message is framed with the schema id it returned.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::WatchError;

/// 🔒 Where the value schema for the topic is registered.
#[derive(Deserialize, Clone)]
pub struct SchemaRegistryConfig {
    /// 📡 Base URL of the registry. Scheme and port included.
    pub url: String,
    /// 🏷️ The subject whose latest version must exist before we publish anything.
    #[serde(default = "default_subject")]
    pub subject: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

fn default_subject() -> String {
    "youtube_videos-value".to_string()
}

// 🎭 manual Debug impl, the password has asked to remain anonymous.
impl fmt::Debug for SchemaRegistryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaRegistryConfig")
            .field("url", &self.url)
            .field("subject", &self.subject)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .finish()
    }
}

/// 🧾 The latest registered version of a subject, as the registry reports it.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RegisteredSchema {
    pub subject: String,
    pub version: i64,
    pub id: i64,
    pub schema: String,
    /// 🏷️ The registry leaves this out for Avro and spells out anything else.
    #[serde(default, rename = "schemaType")]
    pub schema_type: Option<String>,
}

/// 🔍 `GET {url}/subjects/{subject}/versions/latest`.
///
/// Anything other than a 2xx with a readable body is a `WatchError::Config`, because a
/// registry that cannot answer this question is a registry nobody should publish against.
pub(crate) async fn resolve_latest_schema(config: &SchemaRegistryConfig) -> Result<RegisteredSchema> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(30))
        .build()
        .context("💀 The HTTP client for the schema registry refused to be born. The TLS stack wept.")?;

    let latest_url = format!(
        "{}/subjects/{}/versions/latest",
        config.url.trim_end_matches('/'),
        config.subject
    );
    debug!("📜 asking the schema registry at {latest_url}");

    let mut request = client
        .get(&latest_url)
        .header("Accept", "application/vnd.schemaregistry.v1+json");
    if let Some(ref username) = config.username {
        request = request.basic_auth(username, config.password.as_ref());
    }

    let response = request.send().await.map_err(|source| WatchError::Transport {
        endpoint: latest_url.clone(),
        source,
    })?;
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(WatchError::Config(format!(
            "schema registry has no usable version of subject '{}' (HTTP {}): {}",
            config.subject,
            status.as_u16(),
            body
        ))
        .into());
    }

    let schema: RegisteredSchema = response.json().await.map_err(|e| {
        WatchError::Config(format!(
            "schema registry answered for subject '{}' with something that is not a schema: {e}",
            config.subject
        ))
    })?;
    info!(
        "📜 subject '{}' resolved to schema id {} (version {})",
        schema.subject, schema.id, schema.version
    );
    Ok(schema)
}
