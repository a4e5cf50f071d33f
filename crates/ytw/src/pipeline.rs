//! 🎬 *[a playlist appears. it has no idea how many videos it holds. neither do we.]*
//! *[somewhere, a Kafka broker clears its throat.]*
//!
//! 🚀 The pipeline: walk the playlist, and for every entry walk that video's detail pages,
//! summarize each record, and hand the summary to the publisher. Then flush, exactly once,
//! and say how it went.
//!
//! ```text
//!   playlistItems pages ──▶ entry id ──▶ videos pages ──▶ summarize ──▶ produce(key = entry id)
//!                                                                          │
//!                                              DeliveryLedger ◀── callback ┘
//!   ...traversals exhausted, cancelled, or failed ──▶ flush ──▶ RunReport
//! ```
//!
//! 🧠 Knowledge graph:
//! - Everything on the driving task is sequential: one entry at a time, each inner walk
//!   drained before the outer walk moves on. Submission order = traversal order.
//! - The publisher acknowledges on its own tasks; callbacks only ever touch the ledger.
//! - A fatal error or a cancellation stops the walking, never the flush. Messages that were
//!   handed over are always given the chance to land before `run` returns.
//!
//! 🦆 The duck walks the playlist too. It is slower than us. It does not care.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::backends::{PageFetcher, PublishRequest, Publisher};
use crate::common::{CollectionEntry, DetailRecord, VideoSummaryValue};
use crate::delivery::{DeliveryLedger, FailedDelivery};
use crate::progress::PipelineProgress;
use crate::summarizer::summarize;
use crate::traversal::PaginatedTraversal;

/// 🚦 Where a run is in its life.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineState {
    Idle,
    TraversingCollection,
    TraversingDetail { entry_id: String },
    Flushing,
    Done,
}

impl PipelineState {
    /// ✅ The legal moves. Anything else is a bug in the pipeline, not in the data.
    pub fn can_advance_to(&self, next: &PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Idle, TraversingCollection)
                | (TraversingCollection, TraversingDetail { .. })
                | (TraversingCollection, Flushing)
                | (TraversingDetail { .. }, TraversingCollection)
                | (TraversingDetail { .. }, Flushing)
                | (Flushing, Done)
        )
    }
}

/// 📋 How a run went, from the pipeline's point of view and from the event stream's.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub collection_id: String,
    pub topic: String,
    /// 🎞️ playlist entries pulled from the outer traversal
    pub entries: u64,
    /// 📼 detail records summarized
    pub details: u64,
    /// 📨 handed to the publisher
    pub attempted: u64,
    /// ✅ confirmed by the event stream
    pub delivered: u64,
    /// 💀 reported failed, one entry per message
    pub failed: Vec<FailedDelivery>,
    /// 🛑 traversal stopped early on request
    pub cancelled: bool,
    pub elapsed: Duration,
}

impl RunReport {
    /// 🚪 0 = everything landed, 1 = something didn't, 130 = somebody pressed Ctrl-C.
    pub fn exit_code(&self) -> i32 {
        if self.cancelled {
            130
        } else if !self.failed.is_empty() || self.delivered < self.attempted {
            1
        } else {
            0
        }
    }
}

/// 💀 Rides along as context on the error of a run that died mid-way, carrying what had
/// been counted by then. Recover it with `downcast_ref::<PartialRunReport>()`; the
/// original cause stays reachable underneath it.
#[derive(Debug, Clone)]
pub struct PartialRunReport(pub RunReport);

impl fmt::Display for PartialRunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "💀 The run on '{}' stopped early: {} attempted, {} delivered, {} failed by then.",
            self.0.collection_id,
            self.0.attempted,
            self.0.delivered,
            self.0.failed.len()
        )
    }
}

// 🔀 What one pull from a traversal produced.
enum Pulled<T> {
    Item(T),
    Exhausted,
    Cancelled,
}

// 🧭 Per-run bookkeeping, kept apart from the pipeline so the traversals can borrow the
// fetchers while this gets mutated.
struct RunTracker {
    state: PipelineState,
    entries: u64,
    details: u64,
    ledger: Arc<DeliveryLedger>,
    progress: PipelineProgress,
}

impl RunTracker {
    fn advance(&mut self, next: PipelineState) -> Result<()> {
        if !self.state.can_advance_to(&next) {
            anyhow::bail!(
                "💀 The pipeline tried to go from {:?} to {:?}. That door is painted on the wall.",
                self.state,
                next
            );
        }
        debug!("🚦 {:?} → {:?}", self.state, next);
        match next {
            PipelineState::TraversingDetail { .. } => self.progress.set_stage("details"),
            PipelineState::TraversingCollection => self.progress.set_stage("playlist"),
            PipelineState::Flushing => self.progress.set_stage("flushing"),
            PipelineState::Idle | PipelineState::Done => {}
        }
        self.state = next;
        Ok(())
    }
}

/// 🏭 The nested traversal plus the publisher it feeds.
///
/// Generic over both fetchers and the publisher so tests can swap any of them for a
/// scripted or in-memory stand-in. `run` consumes it: one pipeline, one run.
pub(crate) struct PublishPipeline<C, D, P> {
    collection: C,
    details: D,
    publisher: P,
    topic: String,
    show_progress: bool,
}

impl<C, D, P> fmt::Debug for PublishPipeline<C, D, P>
where
    C: fmt::Debug,
    D: fmt::Debug,
    P: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublishPipeline")
            .field("collection", &self.collection)
            .field("details", &self.details)
            .field("publisher", &self.publisher)
            .field("topic", &self.topic)
            .finish()
    }
}

impl<C, D, P> PublishPipeline<C, D, P>
where
    C: PageFetcher<Item = CollectionEntry>,
    D: PageFetcher<Item = DetailRecord>,
    P: Publisher,
{
    pub(crate) fn new(collection: C, details: D, publisher: P, topic: impl Into<String>) -> Self {
        Self {
            collection,
            details,
            publisher,
            topic: topic.into(),
            show_progress: false,
        }
    }

    pub(crate) fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    /// 🚀 Walk `collection_id`, publish every summary, flush, report.
    ///
    /// Returns `Err` for fatal failures (fetch, decode, parse, or a flush that could not
    /// complete), after a best-effort flush. The error carries a [`PartialRunReport`] with
    /// the counts at the moment it stopped. Delivery failures are not `Err`: they are in
    /// the report, and they make `exit_code` non-zero.
    pub(crate) async fn run(self, collection_id: &str, cancel: &CancellationToken) -> Result<RunReport> {
        let started = Instant::now();
        let mut tracker = RunTracker {
            state: PipelineState::Idle,
            entries: 0,
            details: 0,
            ledger: DeliveryLedger::new(),
            progress: PipelineProgress::new(collection_id, self.show_progress),
        };
        info!("🚀 START: playlist '{collection_id}' → topic '{}'", self.topic);

        let walked = self.walk(collection_id, cancel, &mut tracker).await;

        tracker.advance(PipelineState::Flushing)?;
        let in_flight = tracker.ledger.snapshot().unsettled();
        info!("🚿 flushing: waiting on {in_flight} unconfirmed messages");
        let flushed = self.publisher.flush().await;
        tracker.advance(PipelineState::Done)?;
        tracker.progress.finish();

        let delivery = tracker.ledger.snapshot();
        info!(
            "🏁 flush done: {} attempted, {} delivered, {} failed",
            delivery.attempted,
            delivery.delivered,
            delivery.failed.len()
        );

        let report = RunReport {
            collection_id: collection_id.to_string(),
            topic: self.topic,
            entries: tracker.entries,
            details: tracker.details,
            attempted: delivery.attempted,
            delivered: delivery.delivered,
            failed: delivery.failed,
            cancelled: matches!(walked, Ok(true)),
            elapsed: started.elapsed(),
        };

        match (walked, flushed) {
            (Ok(_), Ok(())) => Ok(report),
            (Err(walk_error), flushed) => {
                if let Err(flush_error) = flushed {
                    warn!("⚠️ the best-effort flush after a fatal error failed too: {flush_error:#}");
                }
                Err(walk_error.context(PartialRunReport(report)))
            }
            (Ok(_), Err(flush_error)) => Err(flush_error
                .context("💀 The final flush did not complete. Some messages may still be in limbo.")
                .context(PartialRunReport(report))),
        }
    }

    // 🔄 The nested walk. Ok(true) means it stopped because of the cancellation token.
    async fn walk(&self, collection_id: &str, cancel: &CancellationToken, tracker: &mut RunTracker) -> Result<bool> {
        tracker.advance(PipelineState::TraversingCollection)?;
        let mut entries = PaginatedTraversal::new(&self.collection, collection_id);

        loop {
            let entry = match pull(&mut entries, cancel).await? {
                Pulled::Item(entry) => entry,
                Pulled::Exhausted => break,
                Pulled::Cancelled => return Ok(cancelled_at(tracker)),
            };
            tracker.entries += 1;
            tracker.progress.record_entry();
            let entry_id = entry.entry_id().to_string();
            tracker.advance(PipelineState::TraversingDetail {
                entry_id: entry_id.clone(),
            })?;

            let mut details = PaginatedTraversal::new(&self.details, entry_id.as_str());
            loop {
                let detail = match pull(&mut details, cancel).await? {
                    Pulled::Item(detail) => detail,
                    Pulled::Exhausted => break,
                    Pulled::Cancelled => return Ok(cancelled_at(tracker)),
                };
                tracker.details += 1;

                let summary = summarize(&detail)
                    .with_context(|| format!("💀 Video '{entry_id}' could not be summarized."))?;
                info!("📼 {summary:?}");

                self.publisher
                    .produce(PublishRequest {
                        topic: self.topic.clone(),
                        key: entry_id.clone(),
                        value: VideoSummaryValue::from(&summary),
                        on_delivery: tracker.ledger.track(&entry_id),
                    })
                    .await
                    .with_context(|| format!("💀 The publisher would not take the summary for '{entry_id}'."))?;
                tracker.progress.record_published();
            }
            debug!("📼 '{entry_id}' done after {} detail pages", details.pages_fetched());

            tracker.advance(PipelineState::TraversingCollection)?;
        }

        debug!("🎞️ playlist '{collection_id}' exhausted after {} pages", entries.pages_fetched());
        Ok(false)
    }
}

fn cancelled_at(tracker: &RunTracker) -> bool {
    warn!(
        "🛑 cancelled during {:?} after {} entries; flushing what was already submitted",
        tracker.state, tracker.entries
    );
    true
}

// 🎣 One pull, abandoned early if the token fires while the page is in flight.
async fn pull<F: PageFetcher>(traversal: &mut PaginatedTraversal<'_, F>, cancel: &CancellationToken) -> Result<Pulled<F::Item>> {
    if cancel.is_cancelled() {
        return Ok(Pulled::Cancelled);
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Ok(Pulled::Cancelled),
        next = traversal.next_item() => Ok(match next? {
            Some(item) => Pulled::Item(item),
            None => Pulled::Exhausted,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::in_mem::{InMemoryPublisher, ScriptedFetcher};
    use crate::backends::youtube::{PlaylistItemsFetcher, VideosFetcher, YouTubeClient, tests::config_for};
    use crate::error::WatchError;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn entry(video_id: &str) -> CollectionEntry {
        serde_json::from_value(json!({ "contentDetails": { "videoId": video_id } }))
            .expect("💀 a hand-made entry should decode")
    }

    fn detail(video_id: &str, title: &str, views: &str) -> DetailRecord {
        serde_json::from_value(json!({
            "id": video_id,
            "snippet": { "title": title },
            "statistics": { "viewCount": views }
        }))
        .expect("💀 a hand-made detail should decode")
    }

    fn keys_and_titles(publisher: &InMemoryPublisher) -> Vec<(String, String)> {
        publisher
            .produced()
            .into_iter()
            .map(|message| (message.key, message.value.title))
            .collect()
    }

    #[tokio::test]
    async fn the_one_where_every_entry_fans_out_in_order() -> Result<()> {
        let the_playlist = ScriptedFetcher::new().with_pages("PL", vec![vec![entry("A")], vec![entry("B")]]);
        let the_videos = ScriptedFetcher::new()
            .with_pages("A", vec![vec![detail("A", "d1", "1")]])
            .with_pages("B", vec![vec![detail("B", "d2", "2")], vec![detail("B", "d3", "3")]]);
        let the_publisher = InMemoryPublisher::new();

        let the_report = PublishPipeline::new(the_playlist, the_videos, the_publisher.clone(), "youtube_videos")
            .run("PL", &CancellationToken::new())
            .await?;

        assert_eq!(
            keys_and_titles(&the_publisher),
            vec![
                ("A".to_string(), "d1".to_string()),
                ("B".to_string(), "d2".to_string()),
                ("B".to_string(), "d3".to_string()),
            ]
        );
        assert_eq!(the_publisher.flushes(), vec![3], "one flush, after all three");
        assert_eq!(the_report.entries, 2);
        assert_eq!(the_report.details, 3);
        assert_eq!(the_report.attempted, 3);
        assert_eq!(the_report.delivered, 3);
        assert_eq!(the_report.exit_code(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_run_waits_for_every_slow_ack() -> Result<()> {
        let the_playlist = ScriptedFetcher::new().with_pages("PL", vec![vec![entry("A"), entry("B"), entry("C")]]);
        let the_videos = ScriptedFetcher::new()
            .with_pages("A", vec![vec![detail("A", "a", "1")]])
            .with_pages("B", vec![vec![detail("B", "b", "2")]])
            .with_pages("C", vec![vec![detail("C", "c", "3")]]);
        let the_publisher = InMemoryPublisher::new().with_delivery_delays(vec![
            Duration::from_millis(60),
            Duration::from_millis(5),
            Duration::from_millis(30),
        ]);

        let the_report = PublishPipeline::new(the_playlist, the_videos, the_publisher, "youtube_videos")
            .run("PL", &CancellationToken::new())
            .await?;

        // 🔔 the report is snapshotted after flush, so all three callbacks must already be in
        assert_eq!(the_report.attempted, 3);
        assert_eq!(the_report.delivered, 3);
        assert!(the_report.failed.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_an_empty_playlist_still_flushes() -> Result<()> {
        let the_playlist: ScriptedFetcher<CollectionEntry> = ScriptedFetcher::new().with_pages("PL", vec![vec![]]);
        let the_videos: ScriptedFetcher<DetailRecord> = ScriptedFetcher::new();
        let the_publisher = InMemoryPublisher::new();

        let the_report = PublishPipeline::new(the_playlist, the_videos, the_publisher.clone(), "youtube_videos")
            .run("PL", &CancellationToken::new())
            .await?;

        assert_eq!(the_report.entries, 0);
        assert_eq!(the_publisher.flushes(), vec![0]);
        assert_eq!(the_report.exit_code(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_soup_page_stops_the_walk_but_not_the_flush() {
        let the_playlist = ScriptedFetcher::new()
            .with_pages("PL", vec![vec![entry("A")], vec![entry("B")]])
            .failing_at("PL", 1);
        let the_videos = ScriptedFetcher::new()
            .with_pages("A", vec![vec![detail("A", "a", "1")]])
            .with_pages("B", vec![vec![detail("B", "b", "2")]]);
        let the_publisher = InMemoryPublisher::new();

        let the_error = PublishPipeline::new(the_playlist, the_videos, the_publisher.clone(), "youtube_videos")
            .run("PL", &CancellationToken::new())
            .await
            .expect_err("💀 a malformed page must fail the run");

        assert!(matches!(
            the_error.downcast_ref::<WatchError>(),
            Some(WatchError::MalformedResponse { .. })
        ));
        assert_eq!(keys_and_titles(&the_publisher), vec![("A".to_string(), "a".to_string())]);
        assert_eq!(the_publisher.flushes(), vec![1], "A was submitted, so A gets flushed");
    }

    #[tokio::test]
    async fn the_one_where_a_banana_view_count_is_fatal() {
        let the_playlist = ScriptedFetcher::new().with_pages("PL", vec![vec![entry("A"), entry("B")]]);
        let the_videos = ScriptedFetcher::new()
            .with_pages("A", vec![vec![detail("A", "a", "1")]])
            .with_pages("B", vec![vec![detail("B", "b", "banana")]]);
        let the_publisher = InMemoryPublisher::new();

        let the_error = PublishPipeline::new(the_playlist, the_videos, the_publisher.clone(), "youtube_videos")
            .run("PL", &CancellationToken::new())
            .await
            .expect_err("💀 a non-numeric counter must fail the run");

        assert!(matches!(
            the_error.downcast_ref::<WatchError>(),
            Some(WatchError::RecordParse { .. })
        ));
        assert_eq!(the_publisher.flushes(), vec![1]);

        // 🧾 A was already out the door, and the error still says so
        let PartialRunReport(the_counts) = the_error
            .downcast_ref::<PartialRunReport>()
            .expect("💀 a fatal error should carry the counts so far");
        assert_eq!(the_counts.entries, 2);
        assert_eq!(the_counts.details, 2);
        assert_eq!(the_counts.attempted, 1);
        assert_eq!(the_counts.delivered, 1);
        assert!(!the_counts.cancelled);
    }

    #[tokio::test]
    async fn the_one_where_ctrl_c_came_before_the_first_page() -> Result<()> {
        let the_playlist = ScriptedFetcher::new().with_pages("PL", vec![vec![entry("A")]]);
        let the_videos = ScriptedFetcher::new().with_pages("A", vec![vec![detail("A", "a", "1")]]);
        let the_publisher = InMemoryPublisher::new();
        let the_token = CancellationToken::new();
        the_token.cancel();

        let the_report = PublishPipeline::new(the_playlist, the_videos, the_publisher.clone(), "youtube_videos")
            .run("PL", &the_token)
            .await?;

        assert!(the_report.cancelled);
        assert_eq!(the_report.entries, 0);
        assert!(the_publisher.produced().is_empty());
        assert_eq!(the_publisher.flushes(), vec![0], "cancelled runs still flush");
        assert_eq!(the_report.exit_code(), 130);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_one_lost_message_fails_the_run() -> Result<()> {
        let the_playlist = ScriptedFetcher::new().with_pages("PL", vec![vec![entry("A"), entry("B"), entry("C")]]);
        let the_videos = ScriptedFetcher::new()
            .with_pages("A", vec![vec![detail("A", "a", "1")]])
            .with_pages("B", vec![vec![detail("B", "b", "2")]])
            .with_pages("C", vec![vec![detail("C", "c", "3")]]);
        let the_publisher = InMemoryPublisher::new().failing_keys(["B"]);

        let the_report = PublishPipeline::new(the_playlist, the_videos, the_publisher, "youtube_videos")
            .run("PL", &CancellationToken::new())
            .await?;

        assert_eq!(the_report.attempted, 3);
        assert_eq!(the_report.delivered, 2);
        assert_eq!(the_report.failed.len(), 1);
        assert_eq!(the_report.failed[0].key, "B");
        assert_eq!(the_report.exit_code(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_pl1_becomes_one_message_end_to_end() -> Result<()> {
        let the_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/playlistItems"))
            .and(query_param("playlistId", "PL1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "contentDetails": { "videoId": "V1" } }]
            })))
            .expect(1)
            .mount(&the_server)
            .await;
        Mock::given(method("GET"))
            .and(path("/videos"))
            .and(query_param("id", "V1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "id": "V1", "snippet": { "title": "T" }, "statistics": { "viewCount": "10" } }]
            })))
            .expect(1)
            .mount(&the_server)
            .await;

        let the_client = YouTubeClient::new(config_for(&the_server))?;
        let the_publisher = InMemoryPublisher::new();
        let the_report = PublishPipeline::new(
            PlaylistItemsFetcher::new(the_client.clone()),
            VideosFetcher::new(the_client),
            the_publisher.clone(),
            "youtube_videos",
        )
        .run("PL1", &CancellationToken::new())
        .await?;

        let the_messages = the_publisher.produced();
        assert_eq!(the_messages.len(), 1);
        assert_eq!(the_messages[0].topic, "youtube_videos");
        assert_eq!(the_messages[0].key, "V1");
        assert_eq!(
            serde_json::to_value(&the_messages[0].value)?,
            json!({ "TITLE": "T", "VIEWS": 10, "LIKES": 0, "COMMENTS": 0 })
        );
        assert_eq!(the_publisher.flushes(), vec![1]);
        assert_eq!(the_report.exit_code(), 0);
        Ok(())
    }

    #[test]
    fn the_one_where_the_state_machine_only_moves_forward() {
        use PipelineState::*;
        let detail_state = TraversingDetail {
            entry_id: "A".to_string(),
        };

        assert!(Idle.can_advance_to(&TraversingCollection));
        assert!(TraversingCollection.can_advance_to(&detail_state));
        assert!(detail_state.can_advance_to(&TraversingCollection));
        assert!(detail_state.can_advance_to(&Flushing));
        assert!(TraversingCollection.can_advance_to(&Flushing));
        assert!(Flushing.can_advance_to(&Done));

        assert!(!Idle.can_advance_to(&Flushing));
        assert!(!Done.can_advance_to(&TraversingCollection));
        assert!(!Flushing.can_advance_to(&TraversingCollection));
        assert!(!detail_state.can_advance_to(&detail_state.clone()));
    }
}
