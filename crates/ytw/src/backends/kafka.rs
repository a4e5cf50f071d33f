//! # 📨 THE KAFKA BACKEND
//!
//! 🎬 COLD OPEN - INT. BROKER ROOM - THE MIDDLE OF SOMEBODY'S NIGHT
//!
//! Three brokers hum in a rack. One of them is the controller this week. Nobody knows
//! which. Our summaries arrive one at a time, get tucked into librdkafka's local queue,
//! and leave for the brokers whenever librdkafka decides the batch is worth the trip.
//!
//! This module wraps an rdkafka `FutureProducer` behind the `Publisher` trait:
//! - `produce` encodes the value (Avro framed with the registry's schema id when a schema
//!   registry is configured, JSON otherwise), enqueues it, and returns. If the local queue is
//!   full it waits a beat and tries again. It never silently drops a message.
//! - every enqueued message gets a small task that awaits its `DeliveryFuture` and fires
//!   the request's callback with the partition/offset, or with the reason it failed.
//! - `flush` asks librdkafka to drain its queue, then waits for every one of those small
//!   tasks, so when it returns every callback has fired.
//!
//! `message.timeout.ms` is what keeps `flush` honest: librdkafka gives up on a message
//! after that long and reports it failed, so the drain always terminates.
//!
//! 🦆 The duck has been granted a partition of its own. It does not know what to do with it.

mod schema_registry;
mod value_encoding;

use std::fmt;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::error::{KafkaError, RDKafkaErrorCode};
use rdkafka::producer::future_producer::OwnedDeliveryResult;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, ClientContext};
use serde::Deserialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, trace, warn};

use crate::backends::sink::DeliveryResult;
use crate::backends::{Publisher, PublishRequest, RecordMetadata};
use crate::error::WatchError;

pub use schema_registry::SchemaRegistryConfig;
use schema_registry::resolve_latest_schema;
use value_encoding::ValueEncoder;

// ⏳ How long `produce` naps when librdkafka's local queue is full before knocking again.
const QUEUE_FULL_BACKOFF: Duration = Duration::from_millis(50);
// 📡 How long the startup metadata ping may take before we call the brokers unreachable.
const METADATA_PING_TIMEOUT: Duration = Duration::from_secs(15);

/// 📨 KafkaSinkConfig - everything librdkafka needs to know, and a little it doesn't.
///
/// Defaults are producer-friendly: a small linger for batching, a bounded message timeout
/// so `flush` always ends, and a generous local queue.
#[derive(Debug, Deserialize, Clone)]
pub struct KafkaSinkConfig {
    /// 📡 Comma-separated `host:port` list.
    pub bootstrap_servers: String,
    #[serde(default = "default_message_timeout_ms")]
    pub message_timeout_ms: u32,
    #[serde(default = "default_linger_ms")]
    pub linger_ms: u32,
    /// 🗜️ none, gzip, snappy, lz4, zstd. librdkafka validates it, not us.
    #[serde(default = "default_compression_codec")]
    pub compression_codec: String,
    #[serde(default = "default_queue_mib")]
    pub queue_mib: u32,
    #[serde(default = "default_queue_messages")]
    pub queue_messages: u32,
    #[serde(default)]
    pub tls: bool,
    /// 📜 If set, the value subject must resolve in the registry before anything is published,
    /// and values go out as Avro framed with the resolved schema id.
    #[serde(default)]
    pub schema_registry: Option<SchemaRegistryConfig>,
}

fn default_message_timeout_ms() -> u32 {
    5_000
}

fn default_linger_ms() -> u32 {
    20
}

fn default_compression_codec() -> String {
    "none".to_string()
}

fn default_queue_mib() -> u32 {
    400
}

fn default_queue_messages() -> u32 {
    100_000
}

/// 🔧 Translate our config into librdkafka's stringly-typed dialect.
fn client_config(config: &KafkaSinkConfig) -> ClientConfig {
    let mut client_config = ClientConfig::new();
    client_config
        .set("bootstrap.servers", &config.bootstrap_servers)
        .set("linger.ms", config.linger_ms.to_string())
        .set("message.timeout.ms", config.message_timeout_ms.to_string())
        .set("compression.codec", config.compression_codec.to_owned())
        .set(
            "queue.buffering.max.kbytes",
            (config.queue_mib * 1024).to_string(),
        )
        .set(
            "queue.buffering.max.messages",
            config.queue_messages.to_string(),
        );

    if config.tls {
        client_config
            .set("security.protocol", "ssl")
            .set("enable.ssl.certificate.verification", "false");
    }
    client_config
}

/// 🎧 Listens to librdkafka's client-level complaints and forwards them to tracing.
pub(crate) struct KafkaContext;

impl ClientContext for KafkaContext {
    fn error(&self, error: KafkaError, reason: &str) {
        // ⚠️ librdkafka retries most of these on its own; per-message fate arrives via the delivery future
        warn!("⚠️ librdkafka reported {error}: {reason}");
    }
}

/// 🧾 Turn whatever the delivery future resolved to into the callback's vocabulary.
fn delivery_outcome<C>(topic: String, key: String, awaited: Result<OwnedDeliveryResult, C>) -> DeliveryResult {
    match awaited {
        Ok(Ok((partition, offset))) => Ok(RecordMetadata {
            topic,
            key,
            partition: Some(partition),
            offset: Some(offset),
        }),
        Ok(Err((kafka_error, _message))) => Err(WatchError::Delivery {
            key,
            reason: kafka_error.to_string(),
        }),
        Err(_canceled) => Err(WatchError::Delivery {
            key,
            reason: "the producer went away before reporting back".to_string(),
        }),
    }
}

/// 📨 Publishes summaries to Kafka through one shared `FutureProducer`.
pub(crate) struct KafkaPublisher {
    producer: FutureProducer<KafkaContext>,
    encoder: ValueEncoder,
    // 🔔 one task per in-flight message, each waiting on its DeliveryFuture
    pending: tokio::sync::Mutex<JoinSet<()>>,
    config: KafkaSinkConfig,
}

// 🎭 manual Debug impl because FutureProducer keeps its feelings (and its Debug) to itself.
impl fmt::Debug for KafkaPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KafkaPublisher")
            .field("config", &self.config)
            .field("encoder", &self.encoder)
            .finish_non_exhaustive()
    }
}

impl KafkaPublisher {
    /// 🚀 Resolve the schema subject (if configured), build the producer, and ping the brokers.
    ///
    /// Any of those failing means we never talk to the Data API at all.
    pub(crate) async fn new(config: KafkaSinkConfig) -> Result<Self> {
        if config.bootstrap_servers.trim().is_empty() {
            return Err(WatchError::Config("kafka bootstrap_servers must not be empty".to_string()).into());
        }

        let encoder = match config.schema_registry {
            Some(ref registry) => {
                let registered = resolve_latest_schema(registry)
                    .await
                    .context("💀 The schema registry could not vouch for our value subject. Refusing to publish into the unknown.")?;
                ValueEncoder::for_registered_schema(&registered)?
            }
            None => ValueEncoder::Json,
        };

        let client_config = client_config(&config);
        debug!("🔧 rdkafka configuration: {:?}", client_config);
        let producer: FutureProducer<KafkaContext> = client_config
            .create_with_context(KafkaContext)
            .context("💀 librdkafka declined to build a producer from this configuration.")?;

        // 📡 "Ping" the brokers by asking for metadata. fetch_metadata blocks, so it gets its own thread.
        let pinger = producer.clone();
        let metadata = tokio::task::spawn_blocking(move || {
            pinger
                .client()
                .fetch_metadata(None, METADATA_PING_TIMEOUT)
                .map(|metadata| metadata.topics().len())
        })
        .await
        .context("💀 The broker ping thread vanished mid-handshake.")?;
        match metadata {
            Ok(topic_count) => info!(
                "📡 connected to Kafka at {}, {topic_count} topics visible",
                config.bootstrap_servers
            ),
            Err(kafka_error) => {
                error!("💀 failed to fetch metadata from Kafka brokers: {kafka_error:?}");
                return Err(kafka_error).with_context(|| {
                    format!(
                        "💀 Knocked on {} and nobody came to the door. Are the brokers up? Is the port right?",
                        config.bootstrap_servers
                    )
                });
            }
        }

        Ok(Self {
            producer,
            encoder,
            pending: tokio::sync::Mutex::new(JoinSet::new()),
            config,
        })
    }
}

#[async_trait]
impl Publisher for KafkaPublisher {
    async fn produce(&self, request: PublishRequest) -> Result<()> {
        let PublishRequest {
            topic,
            key,
            value,
            on_delivery,
        } = request;

        let payload = match self.encoder.encode(&value) {
            Ok(payload) => payload,
            Err(e) => {
                on_delivery(Err(WatchError::Delivery {
                    key,
                    reason: format!("{e:#}"),
                }));
                return Ok(());
            }
        };

        let mut record = FutureRecord::to(&topic).key(key.as_str()).payload(payload.as_slice());
        let enqueued = loop {
            match self.producer.send_result(record) {
                Ok(delivery) => break Ok(delivery),
                Err((KafkaError::MessageProduction(RDKafkaErrorCode::QueueFull), returned)) => {
                    // 🐢 backpressure: the local queue is full, let librdkafka catch its breath
                    trace!("🐢 local queue full, '{key}' waits {QUEUE_FULL_BACKOFF:?}");
                    record = returned;
                    tokio::time::sleep(QUEUE_FULL_BACKOFF).await;
                }
                Err((kafka_error, _)) => break Err(kafka_error),
            }
        };

        match enqueued {
            Ok(delivery) => {
                let mut pending = self.pending.lock().await;
                // 🧹 reap the acks that already landed so the set does not grow with the playlist
                while let Some(reaped) = pending.try_join_next() {
                    if let Err(join_error) = reaped {
                        warn!("⚠️ a delivery task ended abnormally: {join_error}");
                    }
                }
                pending.spawn(async move {
                    on_delivery(delivery_outcome(topic, key, delivery.await));
                });
            }
            Err(kafka_error) => {
                warn!("💀 '{key}' was refused at the door: {kafka_error}");
                on_delivery(Err(WatchError::Delivery {
                    key,
                    reason: kafka_error.to_string(),
                }));
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let flusher = self.producer.clone();
        debug!("🚿 asking librdkafka to drain its local queue");
        tokio::task::spawn_blocking(move || flusher.flush(Timeout::Never))
            .await
            .context("💀 The flush thread vanished before the queue was drained.")?
            .context("💀 librdkafka could not drain its local queue.")?;

        let mut pending = self.pending.lock().await;
        debug!("🚿 waiting on {} delivery callbacks", pending.len());
        while let Some(joined) = pending.join_next().await {
            joined.map_err(|e| anyhow::anyhow!("💀 a delivery task died before firing its callback: {e}"))?;
        }
        Ok(())
    }
}
