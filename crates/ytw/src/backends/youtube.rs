//! # 📡 THE YOUTUBE BACKEND
//!
//! 🎬 COLD OPEN - INT. HOME OFFICE - 11:58 PM
//!
//! The quota resets at midnight Pacific. It is 11:58. The playlist has four thousand
//! videos. The engineer has one API key and a dream. The dream is paginated.
//!
//! 🚀 This module speaks Data API v3. Two endpoints, one client:
//! - `playlistItems?part=contentDetails` → which videos live in the playlist
//! - `videos?part=snippet,statistics` → what each video is called and how loved it is
//!
//! Both return the same envelope: `{items: [...], nextPageToken?}` on a good day,
//! `{error: {code, message}}` on a bad one, and on a truly cursed day, something else
//! entirely. `decode_page` tells those three apart, because "the API said no" and
//! "the playlist is empty" are NOT the same sentence, no matter how tired you are. 🦆

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::backends::PageFetcher;
use crate::common::{CollectionEntry, DetailRecord, Page, PageToken};
use crate::error::WatchError;

pub(crate) const PLAYLIST_ITEMS_ENDPOINT: &str = "playlistItems";
pub(crate) const VIDEOS_ENDPOINT: &str = "videos";

// 📡 YouTubeSourceConfig - where the API lives, who we are, and which playlist we stalk.
#[derive(Deserialize, Clone)]
pub struct YouTubeSourceConfig {
    /// 🔒 The Google API key. Sent as `key=` on every request. Never logged. Ever.
    pub api_key: String,
    /// 🎞️ The playlist to page through. Optional here because the CLI can supply it.
    #[serde(default)]
    pub playlist_id: Option<String>,
    /// 📡 Data API root. Overridable so tests can point it at a mock server.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// 📦 `maxResults` per page (1..=50). Unset means "whatever the API feels like" (5).
    #[serde(default)]
    pub max_results: Option<u32>,
    /// ⏱️ Per-request timeout. We will wait, but not forever.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://www.googleapis.com/youtube/v3".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

// 🎭 manual Debug impl because the api key is not for your logs, no matter how nicely they ask.
impl fmt::Debug for YouTubeSourceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeSourceConfig")
            .field("api_key", &"<redacted>")
            .field("playlist_id", &self.playlist_id)
            .field("base_url", &self.base_url)
            .field("max_results", &self.max_results)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .finish()
    }
}

/// 📡 Shared HTTP muscle for both endpoints. Cheap to clone: the reqwest client and
/// the config are both reference-counted on the inside.
#[derive(Clone)]
pub(crate) struct YouTubeClient {
    http: reqwest::Client,
    config: Arc<YouTubeSourceConfig>,
}

impl fmt::Debug for YouTubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("YouTubeClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl YouTubeClient {
    /// 🚀 Validate the config and build the HTTP client.
    ///
    /// An empty API key is rejected here instead of 4,000 requests later.
    pub(crate) fn new(config: YouTubeSourceConfig) -> Result<Self> {
        if config.api_key.trim().is_empty() {
            return Err(WatchError::Config(
                "source_config.api_key is empty. The Data API does not do anonymous.".to_string(),
            )
            .into());
        }
        if let Some(max_results) = config.max_results {
            if !(1..=50).contains(&max_results) {
                return Err(WatchError::Config(format!(
                    "source_config.max_results is {max_results}, the Data API only accepts 1..=50"
                ))
                .into());
            }
        }

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .context("💀 The HTTP client refused to be born. Probably TLS. It's always TLS.")?;

        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    /// 📄 One GET, one decoded page. Shared by both endpoints.
    async fn get_page<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
        page_token: Option<&PageToken>,
    ) -> Result<Page<T>, WatchError> {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), endpoint);

        let mut query: Vec<(&str, String)> = vec![("key", self.config.api_key.clone())];
        query.extend(params.iter().map(|(name, value)| (*name, (*value).to_string())));
        if let Some(max_results) = self.config.max_results {
            query.push(("maxResults", max_results.to_string()));
        }
        if let Some(token) = page_token {
            query.push(("pageToken", token.as_str().to_string()));
        }

        let response = self
            .http
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(|source| WatchError::Transport {
                endpoint: endpoint.to_string(),
                // 🔒 the url carries key=..., keep it out of the error text
                source: source.without_url(),
            })?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|source| WatchError::Transport {
            endpoint: endpoint.to_string(),
            source: source.without_url(),
        })?;
        trace!("📡 {endpoint} answered HTTP {status}: {body}");

        let page = decode_page(endpoint, status, &body)?;
        debug!(
            "📄 {endpoint} page: {} items, next page: {}",
            page.items.len(),
            if page.next_page_token.is_some() { "yes" } else { "no" }
        );
        Ok(page)
    }
}

// 📬 The envelope, before we decide what kind of day it is.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageEnvelope {
    #[serde(default)]
    items: Option<Vec<serde_json::Value>>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    error: Option<ApiErrorBody>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    code: i64,
    #[serde(default)]
    message: String,
}

/// 🔍 Decide whether `body` is a page, an error envelope, or soup.
///
/// - `error` present → `UpstreamApi` (quota, key, permissions, whatever it says)
/// - `items` present → page; each item must decode into `T` or it's a `RecordParse`
/// - neither → `MalformedResponse`, never an empty page
pub(crate) fn decode_page<T: DeserializeOwned>(
    endpoint: &str,
    status: u16,
    body: &str,
) -> Result<Page<T>, WatchError> {
    let envelope: PageEnvelope =
        serde_json::from_str(body).map_err(|e| WatchError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: format!("HTTP {status}, body is not a page envelope: {e}"),
        })?;

    if let Some(error) = envelope.error {
        return Err(WatchError::UpstreamApi {
            endpoint: endpoint.to_string(),
            status,
            code: error.code,
            message: error.message,
        });
    }

    let Some(raw_items) = envelope.items else {
        return Err(WatchError::MalformedResponse {
            endpoint: endpoint.to_string(),
            reason: format!("HTTP {status}, no `items` list and no `error` object"),
        });
    };

    let items = raw_items
        .into_iter()
        .enumerate()
        .map(|(index, raw)| {
            serde_json::from_value::<T>(raw).map_err(|e| WatchError::RecordParse {
                record: format!("{endpoint} item #{index}"),
                reason: e.to_string(),
            })
        })
        .collect::<Result<Vec<T>, WatchError>>()?;

    Ok(Page {
        items,
        next_page_token: PageToken::from_wire(envelope.next_page_token),
    })
}

/// 🎞️ `playlistItems` - filter is the playlist id.
#[derive(Debug, Clone)]
pub(crate) struct PlaylistItemsFetcher {
    client: YouTubeClient,
}

impl PlaylistItemsFetcher {
    pub(crate) fn new(client: YouTubeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for PlaylistItemsFetcher {
    type Item = CollectionEntry;

    async fn fetch_page(&self, playlist_id: &str, page_token: Option<&PageToken>) -> Result<Page<CollectionEntry>> {
        let page = self
            .client
            .get_page(
                PLAYLIST_ITEMS_ENDPOINT,
                &[("playlistId", playlist_id), ("part", "contentDetails")],
                page_token,
            )
            .await?;
        Ok(page)
    }
}

/// 📼 `videos` - filter is exactly one video id.
#[derive(Debug, Clone)]
pub(crate) struct VideosFetcher {
    client: YouTubeClient,
}

impl VideosFetcher {
    pub(crate) fn new(client: YouTubeClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl PageFetcher for VideosFetcher {
    type Item = DetailRecord;

    async fn fetch_page(&self, video_id: &str, page_token: Option<&PageToken>) -> Result<Page<DetailRecord>> {
        let page = self
            .client
            .get_page(
                VIDEOS_ENDPOINT,
                &[("id", video_id), ("part", "snippet,statistics")],
                page_token,
            )
            .await?;
        Ok(page)
    }
}
