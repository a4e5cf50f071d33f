use anyhow::Result;
use async_trait::async_trait;

use crate::common::{Page, PageToken};

/// 🚰 A paginated endpoint that produces one decoded page per call.
///
/// # Contract 📜
/// - `filter` scopes the endpoint: a playlist id for playlist items, one video id for videos.
/// - `page_token` is `None` for the first page, and afterwards only ever a token this same
///   fetcher returned for this same filter. No cross-endpoint token swapping. We are not animals.
/// - Exactly one network round-trip per call. No cache, no retry.
/// - A page with an empty `items` list is a real answer. An error envelope or soup is an `Err`.
///
/// # Knowledge Graph 🧠
/// - Pattern: trait → concrete impls (`PlaylistItemsFetcher`, `VideosFetcher`, scripted test
///   fetchers) → driven by `PaginatedTraversal`
/// - The fetcher decodes into `Self::Item` at the boundary, so bad records blow up here and
///   not three layers deeper.
#[async_trait]
pub(crate) trait PageFetcher: std::fmt::Debug + Send + Sync {
    /// 📦 What one element of a page decodes into.
    type Item: Send;

    /// 📄 Fetch one page for `filter`, starting wherever `page_token` says.
    async fn fetch_page(&self, filter: &str, page_token: Option<&PageToken>) -> Result<Page<Self::Item>>;
}
