//! 🔄 PaginatedTraversal - follow the tokens until the tokens stop.
//!
//! 🎬 EXT. A VERY LONG HALLWAY - NIGHT
//!
//! Every door has a note taped to it: "the next door is CAIQAA". Our hero opens the
//! door, grabs what's inside, reads the note, walks to the next door. No door remembers
//! the previous one. The hallway might be four thousand doors long. Nobody knows.
//!
//! Explicit cursor, explicit loop, one page in memory at a time. No recursion, so a
//! four-thousand-page playlist costs the same stack as a one-page playlist.
//!
//! 🧠 Knowledge graph:
//! - Driven by `PublishPipeline`, twice: outer (playlist items) and inner (videos per id)
//! - Talks to a `PageFetcher`; never inspects tokens, only checks whether one came back
//! - Lazy: the next page is fetched only once the current one is drained

use std::collections::VecDeque;

use anyhow::{Context, Result};
use tracing::trace;

use crate::backends::PageFetcher;
use crate::common::PageToken;

// 🧭 Where the traversal stands between pages.
#[derive(Debug)]
enum Cursor {
    Start,
    Next(PageToken),
    Exhausted,
}

/// 🚶 A lazy, ordered, pull-based walk over every item of a paginated endpoint.
///
/// Each instance is independent: build a new one to start over.
pub(crate) struct PaginatedTraversal<'a, F: PageFetcher> {
    fetcher: &'a F,
    filter: String,
    cursor: Cursor,
    buffered: VecDeque<F::Item>,
    pages_fetched: u64,
}

impl<'a, F: PageFetcher> PaginatedTraversal<'a, F> {
    pub(crate) fn new(fetcher: &'a F, filter: impl Into<String>) -> Self {
        Self {
            fetcher,
            filter: filter.into(),
            cursor: Cursor::Start,
            buffered: VecDeque::new(),
            pages_fetched: 0,
        }
    }

    /// 📦 The next item, in upstream order, or `None` once the token chain ends.
    ///
    /// Pages with no items but a token are walked through, not mistaken for the end.
    /// A fetch error ends the traversal; later calls return `None` without fetching.
    pub(crate) async fn next_item(&mut self) -> Result<Option<F::Item>> {
        loop {
            if let Some(item) = self.buffered.pop_front() {
                return Ok(Some(item));
            }

            let page_token = match std::mem::replace(&mut self.cursor, Cursor::Exhausted) {
                Cursor::Exhausted => return Ok(None),
                Cursor::Start => None,
                Cursor::Next(token) => Some(token),
            };

            let page = self
                .fetcher
                .fetch_page(&self.filter, page_token.as_ref())
                .await
                .with_context(|| {
                    format!(
                        "💀 Page {} of '{}' could not be fetched. The hallway ended in a wall.",
                        self.pages_fetched + 1,
                        self.filter
                    )
                })?;
            self.pages_fetched += 1;
            trace!(
                "🔄 '{}' page {} brought {} items",
                self.filter,
                self.pages_fetched,
                page.items.len()
            );

            if let Some(token) = page.next_page_token {
                self.cursor = Cursor::Next(token);
            }
            self.buffered.extend(page.items);
        }
    }

    /// 📊 How many pages this traversal has pulled so far.
    pub(crate) fn pages_fetched(&self) -> u64 {
        self.pages_fetched
    }
}
