//! 📦 Common data structures - the building blocks of ytw
//!
//! ---
//!
//! 🎬 COLD OPEN - INT. CONFERENCE ROOM - 4:12 PM
//!
//! "We just need the view counts," said the product manager. "For every video. In the
//! playlist. In Kafka. By Friday." Somewhere, a YouTube API quota flinched.
//!
//! This module holds the humble structs that carry a playlist, one page at a time, from
//! the Data API to the event stream. Pages, tokens, entries, details, summaries. They
//! don't ask questions. They get deserialized, summarized, and published. Please tip them.
//!
//! ---
//!
//! 🧠 Knowledge graph:
//! - `Page<T>` + `PageToken`: what a `PageFetcher` hands back per round-trip
//! - `CollectionEntry`: one playlist item, good for exactly one video id
//! - `DetailRecord`: one video, with a title and some counters (maybe)
//! - `SummaryRecord`: the normalized projection, built by the summarizer
//! - `VideoSummaryValue`: the SHOUTING value shape that lands on the topic 🦆

use serde::{Deserialize, Serialize};

/// 🎟️ Opaque continuation token handed out by a paginated endpoint.
///
/// Nobody looks inside. Nobody compares them. We only ever ask one question:
/// "is there one?" Empty strings count as "no", because the API has been known to be cute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageToken(String);

impl PageToken {
    /// 🔍 Turn whatever the wire said into "next page" or "we're done".
    pub fn from_wire(raw: Option<String>) -> Option<Self> {
        raw.filter(|token| !token.is_empty()).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 📄 One page of items plus the ticket to the next one, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub next_page_token: Option<PageToken>,
}

impl<T> Page<T> {
    /// 🏁 A page that ends the traversal.
    pub fn last(items: Vec<T>) -> Self {
        Self {
            items,
            next_page_token: None,
        }
    }
}

/// 🎞️ One element of the playlist page. We only care about the video id inside.
/// Everything else the API sends (position, etag, publishedAt...) is politely ignored.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    pub content_details: ContentDetails,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ContentDetails {
    pub video_id: String,
}

impl CollectionEntry {
    /// 🔑 The EntryID. Also the message key. Also the filter for the detail lookup.
    pub fn entry_id(&self) -> &str {
        &self.content_details.video_id
    }
}

/// 📼 One element of the videos page: id, title, counters.
///
/// `id` and `snippet.title` are required, so a record without them fails at decode time
/// instead of sneaking a blank title into the topic. `statistics` may be missing entirely
/// (and each counter inside may be missing too); the summarizer turns absence into zero.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct DetailRecord {
    pub id: String,
    pub snippet: Snippet,
    #[serde(default)]
    pub statistics: Statistics,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Snippet {
    pub title: String,
}

/// 📊 The counters. The Data API sends them as decimal strings because of course it does.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Statistics {
    #[serde(default)]
    pub view_count: Option<RawCount>,
    #[serde(default)]
    pub like_count: Option<RawCount>,
    #[serde(default)]
    pub comment_count: Option<RawCount>,
}

/// 🔢 A counter as it arrived on the wire, before anyone checked it is actually a number.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum RawCount {
    Text(String),
    Number(serde_json::Number),
}

/// ✅ The normalized projection of a `DetailRecord`. Built once, published immediately.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SummaryRecord {
    pub id: String,
    pub title: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

/// 📨 The value that goes onto the topic. Field names are uppercase because the
/// downstream stream processor was raised that way and we don't judge.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub struct VideoSummaryValue {
    pub title: String,
    pub views: u64,
    pub likes: u64,
    pub comments: u64,
}

impl From<&SummaryRecord> for VideoSummaryValue {
    fn from(summary: &SummaryRecord) -> Self {
        Self {
            title: summary.title.clone(),
            views: summary.views,
            likes: summary.likes,
            comments: summary.comments,
        }
    }
}
