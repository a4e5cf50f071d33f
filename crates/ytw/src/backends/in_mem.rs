//! # Previously, on ytw...
//!
//! 🎬 The summaries were ready. The broker was not. Someone needed a place to put
//! messages that was always up, never slow, and asked for no bootstrap servers.
//!
//! `in_mem` provides an in-memory [`Publisher`] for dry runs and tests. It keeps every
//! produced message behind an `Arc<Mutex<...>>` so callers can inspect what arrived,
//! and it acknowledges each message from a spawned task, so the callback lands off the
//! driving task exactly like it would with a real broker. Tests can make those
//! acknowledgments slow, out of order, or outright failures.
//!
//! In test builds it also hosts `ScriptedFetcher`, a [`PageFetcher`] that plays back
//! canned pages and keeps a diary of every call it received.
//!
//! ⚠️ This is NOT a durable event stream. When the process exits, so do the messages. 🦆

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::backends::{Publisher, PublishRequest, RecordMetadata};
use crate::common::VideoSummaryValue;
use crate::error::WatchError;

/// 📨 A message as the in-memory publisher saw it.
// 🔍 read back only by tests; a dry run just holds on to them
#[cfg_attr(not(test), allow(dead_code))]
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ProducedMessage {
    pub(crate) topic: String,
    pub(crate) key: String,
    pub(crate) value: VideoSummaryValue,
}

/// 📦 A publisher that never forgets, at least until the process exits.
///
/// Clone-able because tests need to peek inside after handing a copy to the pipeline.
/// Every clone shares the same vault.
#[derive(Debug, Clone, Default)]
pub(crate) struct InMemoryPublisher {
    produced: Arc<Mutex<Vec<ProducedMessage>>>,
    // 🔢 how many messages had been produced each time `flush` was entered
    flushes: Arc<Mutex<Vec<usize>>>,
    pending: Arc<tokio::sync::Mutex<JoinSet<()>>>,
    delivery_delays: Arc<Vec<Duration>>,
    failing_keys: Arc<HashSet<String>>,
}

impl InMemoryPublisher {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// ⏱️ Acknowledge message `n` after `delays[n % len]`. Unequal delays = out-of-order acks.
    #[cfg(test)]
    pub(crate) fn with_delivery_delays(mut self, delays: Vec<Duration>) -> Self {
        self.delivery_delays = Arc::new(delays);
        self
    }

    /// 💀 Messages with these keys are reported as failed deliveries.
    #[cfg(test)]
    pub(crate) fn failing_keys<I: IntoIterator<Item = &'static str>>(mut self, keys: I) -> Self {
        self.failing_keys = Arc::new(keys.into_iter().map(str::to_string).collect());
        self
    }

    /// 📋 Everything produced so far, in submission order.
    #[cfg(test)]
    pub(crate) fn produced(&self) -> Vec<ProducedMessage> {
        self.produced
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// ⏳ Acknowledgment tasks still held, finished or not.
    #[cfg(test)]
    pub(crate) async fn pending_acks(&self) -> usize {
        self.pending.lock().await.len()
    }

    /// 🚿 How many messages had been produced at each `flush` call.
    #[cfg(test)]
    pub(crate) fn flushes(&self) -> Vec<usize> {
        self.flushes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Publisher for InMemoryPublisher {
    async fn produce(&self, request: PublishRequest) -> Result<()> {
        let PublishRequest {
            topic,
            key,
            value,
            on_delivery,
        } = request;

        let offset = {
            let mut produced = self.produced.lock().unwrap_or_else(PoisonError::into_inner);
            produced.push(ProducedMessage {
                topic: topic.clone(),
                key: key.clone(),
                value,
            });
            produced.len() - 1
        };

        let delay = if self.delivery_delays.is_empty() {
            Duration::ZERO
        } else {
            self.delivery_delays[offset % self.delivery_delays.len()]
        };
        let should_fail = self.failing_keys.contains(&key);

        let mut pending = self.pending.lock().await;
        // 🧹 reap the acks that already landed so the set does not grow with the playlist
        while let Some(reaped) = pending.try_join_next() {
            if let Err(join_error) = reaped {
                warn!("⚠️ an acknowledgment task ended abnormally: {join_error}");
            }
        }
        // 🔔 acknowledge from another task, like a real broker would
        pending.spawn(async move {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            let outcome = if should_fail {
                Err(WatchError::Delivery {
                    key,
                    reason: "in-memory publisher was told to drop this one".to_string(),
                })
            } else {
                Ok(RecordMetadata {
                    topic,
                    key,
                    partition: Some(0),
                    offset: Some(offset as i64),
                })
            };
            on_delivery(outcome);
        });
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let produced_so_far = self.produced.lock().unwrap_or_else(PoisonError::into_inner).len();
        self.flushes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(produced_so_far);

        let mut pending = self.pending.lock().await;
        debug!("🚿 in-memory flush waiting on {} acknowledgments", pending.len());
        while let Some(joined) = pending.join_next().await {
            joined.map_err(|e| anyhow::anyhow!("💀 an acknowledgment task died mid-sentence: {e}"))?;
        }
        info!("📦 in-memory publisher is holding {produced_so_far} messages");
        Ok(())
    }
}

#[cfg(test)]
pub(crate) use scripted::ScriptedFetcher;

#[cfg(test)]
mod scripted {
    use std::collections::{HashMap, HashSet};
    use std::sync::{Mutex, PoisonError};

    use anyhow::Result;
    use async_trait::async_trait;

    use crate::backends::PageFetcher;
    use crate::common::{Page, PageToken};
    use crate::error::WatchError;

    /// 🎭 Plays back canned pages per filter and writes down every call.
    ///
    /// Tokens look like `{filter}#{page_index}` and are only ever meaningful to this fetcher.
    /// Unknown filters get one empty final page.
    #[derive(Debug)]
    pub(crate) struct ScriptedFetcher<T> {
        pages: HashMap<String, Vec<Vec<T>>>,
        failures: HashSet<(String, usize)>,
        calls: Mutex<Vec<(String, Option<String>)>>,
    }

    impl<T> ScriptedFetcher<T> {
        pub(crate) fn new() -> Self {
            Self {
                pages: HashMap::new(),
                failures: HashSet::new(),
                calls: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn with_pages(mut self, filter: &str, pages: Vec<Vec<T>>) -> Self {
            self.pages.insert(filter.to_string(), pages);
            self
        }

        /// 💀 Fetching page `page_index` of `filter` fails with a `MalformedResponse`.
        pub(crate) fn failing_at(mut self, filter: &str, page_index: usize) -> Self {
            self.failures.insert((filter.to_string(), page_index));
            self
        }

        pub(crate) fn calls(&self) -> Vec<(String, Option<String>)> {
            self.calls.lock().unwrap_or_else(PoisonError::into_inner).clone()
        }
    }

    #[async_trait]
    impl<T> PageFetcher for ScriptedFetcher<T>
    where
        T: Clone + std::fmt::Debug + Send + Sync + 'static,
    {
        type Item = T;

        async fn fetch_page(&self, filter: &str, page_token: Option<&PageToken>) -> Result<Page<T>> {
            self.calls
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push((filter.to_string(), page_token.map(|t| t.as_str().to_string())));

            let index = match page_token {
                None => 0,
                Some(token) => token
                    .as_str()
                    .rsplit_once('#')
                    .and_then(|(_, index)| index.parse::<usize>().ok())
                    .ok_or_else(|| anyhow::anyhow!("💀 scripted fetcher got a token it never issued"))?,
            };

            if self.failures.contains(&(filter.to_string(), index)) {
                return Err(WatchError::MalformedResponse {
                    endpoint: "scripted".to_string(),
                    reason: format!("page {index} of '{filter}' was scripted to be soup"),
                }
                .into());
            }

            let Some(pages) = self.pages.get(filter) else {
                return Ok(Page::last(Vec::new()));
            };
            let items = pages.get(index).cloned().unwrap_or_default();
            let next_page_token = if index + 1 < pages.len() {
                PageToken::from_wire(Some(format!("{filter}#{}", index + 1)))
            } else {
                None
            };
            Ok(Page {
                items,
                next_page_token,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn value(title: &str) -> VideoSummaryValue {
        VideoSummaryValue {
            title: title.to_string(),
            views: 1,
            likes: 0,
            comments: 0,
        }
    }

    #[tokio::test]
    async fn the_one_where_flush_waits_for_the_slowpokes() -> Result<()> {
        let the_publisher = InMemoryPublisher::new().with_delivery_delays(vec![
            Duration::from_millis(40),
            Duration::from_millis(5),
        ]);
        let the_fired = Arc::new(AtomicUsize::new(0));

        for key in ["A", "B"] {
            let fired = Arc::clone(&the_fired);
            the_publisher
                .produce(PublishRequest {
                    topic: "youtube_videos".to_string(),
                    key: key.to_string(),
                    value: value(key),
                    on_delivery: Box::new(move |outcome| {
                        assert!(outcome.is_ok());
                        fired.fetch_add(1, Ordering::SeqCst);
                    }),
                })
                .await?;
        }

        the_publisher.flush().await?;
        assert_eq!(the_fired.load(Ordering::SeqCst), 2);
        assert_eq!(the_publisher.flushes(), vec![2]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_doomed_key_reports_its_own_doom() -> Result<()> {
        let the_publisher = InMemoryPublisher::new().failing_keys(["B"]);
        let the_outcomes = Arc::new(Mutex::new(Vec::new()));

        for key in ["A", "B"] {
            let outcomes = Arc::clone(&the_outcomes);
            the_publisher
                .produce(PublishRequest {
                    topic: "t".to_string(),
                    key: key.to_string(),
                    value: value(key),
                    on_delivery: Box::new(move |outcome| {
                        outcomes
                            .lock()
                            .expect("💀 test mutex poisoned")
                            .push((key, outcome.is_ok()));
                    }),
                })
                .await?;
        }
        the_publisher.flush().await?;

        let mut the_seen = the_outcomes.lock().expect("💀 test mutex poisoned").clone();
        the_seen.sort();
        assert_eq!(the_seen, vec![("A", true), ("B", false)]);
        assert_eq!(the_publisher.produced().len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_landed_acks_are_swept_up_along_the_way() -> Result<()> {
        let the_publisher = InMemoryPublisher::new();
        let the_fired = Arc::new(AtomicUsize::new(0));

        for key in ["A", "B", "C"] {
            let fired = Arc::clone(&the_fired);
            the_publisher
                .produce(PublishRequest {
                    topic: "youtube_videos".to_string(),
                    key: key.to_string(),
                    value: value(key),
                    on_delivery: Box::new(move |_| {
                        fired.fetch_add(1, Ordering::SeqCst);
                    }),
                })
                .await?;
            // ⏳ give the zero-delay ack its moment before the next produce
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert_eq!(the_fired.load(Ordering::SeqCst), 3);
        assert_eq!(the_publisher.pending_acks().await, 1, "only the newest ack is still held");
        the_publisher.flush().await?;
        assert_eq!(the_publisher.pending_acks().await, 0);
        Ok(())
    }
}
