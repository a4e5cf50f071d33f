use anyhow::Result;
use async_trait::async_trait;

use crate::app_config::SinkConfig;
use crate::backends::{file, in_mem, kafka};
use crate::common::VideoSummaryValue;
use crate::error::WatchError;

/// 🧾 What the event stream tells us once a message is safely written down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub key: String,
    pub partition: Option<i32>,
    pub offset: Option<i64>,
}

/// 📬 Terminal outcome of one publish: metadata on success, a `WatchError::Delivery` otherwise.
pub type DeliveryResult = std::result::Result<RecordMetadata, WatchError>;

/// 🔔 Fired exactly once per `PublishRequest`, from whatever task the publisher feels like.
/// `Send + 'static` because it will not be called on the driving task. Plan accordingly.
pub type DeliveryCallback = Box<dyn FnOnce(DeliveryResult) + Send + 'static>;

/// 📨 One keyed message on its way to the topic, with its callback stapled to it.
///
/// Ownership moves into the publisher on `produce` and stays there until the callback fires.
pub struct PublishRequest {
    pub topic: String,
    pub key: String,
    pub value: VideoSummaryValue,
    pub on_delivery: DeliveryCallback,
}

// 🎭 manual Debug impl because closures are shy and refuse to derive anything.
impl std::fmt::Debug for PublishRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublishRequest")
            .field("topic", &self.topic)
            .field("key", &self.key)
            .field("value", &self.value)
            .finish_non_exhaustive()
    }
}

/// 🕳️ A buffered, asynchronous publisher for keyed summaries.
///
/// # Contract 📜
/// - `produce` hands the request over and returns as soon as it is enqueued. It may await
///   only to apply backpressure when the local buffer is full. It never drops a message
///   silently: any failure, immediate or eventual, goes through `on_delivery`.
/// - `flush` waits until every request produced so far has fired its callback. MUST be
///   called before the process exits. Skipping `flush` is a bug. It is also considered rude.
/// - Callbacks may fire in any order. Nobody downstream is allowed to care.
#[async_trait]
pub(crate) trait Publisher: std::fmt::Debug + Send + Sync {
    /// 📡 Enqueue one message. Returns once it is buffered, not once it is delivered.
    async fn produce(&self, request: PublishRequest) -> Result<()>;
    /// 🚿 Block until every buffered message is delivered or failed.
    async fn flush(&self) -> Result<()>;
}

/// 🎭 The many faces of a Publisher.
///
/// Each variant wraps a concrete publisher. The enum dispatches via `impl Publisher`,
/// so the pipeline never needs to know whether it's talking to a broker, a file, or RAM.
#[derive(Debug)]
pub(crate) enum PublisherBackend {
    Kafka(kafka::KafkaPublisher),
    File(file::FilePublisher),
    InMemory(in_mem::InMemoryPublisher),
}

impl PublisherBackend {
    /// 🔧 Resolve the publisher from the sink config.
    ///
    /// | SinkConfig | Publisher | Lands in |
    /// |---|---|---|
    /// | Kafka | KafkaPublisher | a topic, via librdkafka |
    /// | File | FilePublisher | NDJSON lines on disk |
    /// | InMemory | InMemoryPublisher | RAM, until exit |
    ///
    /// Kafka construction talks to the registry and the brokers, so it can fail.
    pub(crate) async fn from_sink_config(sink: SinkConfig) -> Result<Self> {
        Ok(match sink {
            SinkConfig::Kafka(config) => Self::Kafka(kafka::KafkaPublisher::new(config).await?),
            SinkConfig::File(config) => Self::File(file::FilePublisher::new(config).await?),
            SinkConfig::InMemory => Self::InMemory(in_mem::InMemoryPublisher::new()),
        })
    }
}

#[async_trait]
impl Publisher for PublisherBackend {
    async fn produce(&self, request: PublishRequest) -> Result<()> {
        match self {
            PublisherBackend::Kafka(publisher) => publisher.produce(request).await,
            PublisherBackend::File(publisher) => publisher.produce(request).await,
            PublisherBackend::InMemory(publisher) => publisher.produce(request).await,
        }
    }

    async fn flush(&self) -> Result<()> {
        match self {
            PublisherBackend::Kafka(publisher) => publisher.flush().await,
            PublisherBackend::File(publisher) => publisher.flush().await,
            PublisherBackend::InMemory(publisher) => publisher.flush().await,
        }
    }
}
