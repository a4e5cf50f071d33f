//! 🔌 Backends - where the real I/O happens.
//!
//! 🚰 Source backends page through the Data API, Sink backends (publishers) push summaries
//! to wherever the summaries are going. And in between, we panic! (kidding, we use anyhow)
//!
//! 🧠 Knowledge graph:
//! - `source`: the `PageFetcher` trait. One HTTP round-trip, one `Page<T>`.
//! - `youtube`: the two Data API endpoints (`playlistItems`, `videos`) behind one client.
//! - `sink`: the `Publisher` trait, `PublishRequest`, delivery callbacks, `PublisherBackend`.
//! - `kafka`: rdkafka `FutureProducer` publisher, the schema registry lookup, and the Avro value encoding.
//! - `file`: NDJSON dry-run publisher.
//! - `in_mem`: in-memory publisher (and scripted fetchers for tests).
//!
//! 🦆 The duck is here because every file must have one. This is law. Do not question the duck.

pub(crate) mod source;
pub(crate) mod sink;
pub(crate) mod youtube;
pub(crate) mod kafka;
pub(crate) mod file;
pub(crate) mod in_mem;

pub(crate) use sink::{DeliveryCallback, PublishRequest, Publisher, PublisherBackend, RecordMetadata};
pub(crate) use source::PageFetcher;

// 🎯 Re-export backend-specific configs so callers can do `backends::KafkaSinkConfig`
// instead of spelunking into `backends::kafka::KafkaSinkConfig`.
pub use file::FileSinkConfig;
pub use kafka::{KafkaSinkConfig, SchemaRegistryConfig};
pub use youtube::YouTubeSourceConfig;
