//! 📂 Previously, on "Things That Could Go Wrong With A File"...
//!
//! Somebody wanted to see what ytw WOULD publish, without a broker, without a registry,
//! without anyone getting paged. So the summaries go to a file instead: one NDJSON line
//! per message, `{"topic": ..., "key": ..., "value": {...}}`, in submission order.
//!
//! A line only counts as delivered once it is out of the `BufWriter`: callbacks for written
//! lines wait until `flush` succeeds. If that flush fails, every one of them hears about it
//! as a failed delivery. A write that fails outright is reported right away.
//!
//! ⚠️ `File::create` truncates. Last run's output is gone the moment this one starts. 🦆

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, trace};

use crate::backends::{DeliveryCallback, Publisher, PublishRequest, RecordMetadata};
use crate::common::VideoSummaryValue;
use crate::error::WatchError;

/// 📂 Where the dry-run lines go.
#[derive(Debug, Deserialize, Clone)]
pub struct FileSinkConfig {
    pub file_name: String,
}

// 📝 One line of output. Borrowed, because the request already owns everything.
#[derive(Serialize)]
struct FileLine<'a> {
    topic: &'a str,
    key: &'a str,
    value: &'a VideoSummaryValue,
}

/// 📝 Writes every produced message as one NDJSON line.
#[derive(Debug)]
pub(crate) struct FilePublisher {
    // 🔒 tokio Mutex: the write happens across an await, std Mutex would not survive that
    state: tokio::sync::Mutex<FileState>,
    config: FileSinkConfig,
}

struct FileState {
    writer: BufWriter<File>,
    lines_written: i64,
    // ⏳ written but not yet flushed: each callback with the metadata it will get
    unsettled: Vec<(DeliveryCallback, RecordMetadata)>,
}

// 🎭 callbacks are closures, closures don't Debug
impl std::fmt::Debug for FileState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileState")
            .field("lines_written", &self.lines_written)
            .field("unsettled", &self.unsettled.len())
            .finish_non_exhaustive()
    }
}

impl FilePublisher {
    /// 🚀 Creates (or obliterates and recreates) the output file.
    pub(crate) async fn new(config: FileSinkConfig) -> Result<Self> {
        let file_handle = File::create(&config.file_name).await.with_context(|| {
            format!(
                "💀 The output file '{}' could not be conjured into existence. \
                We stared at the path. The path stared back. One of us was wrong about \
                whether the parent directory existed.",
                config.file_name
            )
        })?;
        debug!("📂 writing summaries to '{}'", config.file_name);
        Ok(Self {
            state: tokio::sync::Mutex::new(FileState {
                writer: BufWriter::new(file_handle),
                lines_written: 0,
                unsettled: Vec::new(),
            }),
            config,
        })
    }
}

#[async_trait]
impl Publisher for FilePublisher {
    async fn produce(&self, request: PublishRequest) -> Result<()> {
        let PublishRequest {
            topic,
            key,
            value,
            on_delivery,
        } = request;

        let line = FileLine {
            topic: &topic,
            key: &key,
            value: &value,
        };
        let mut encoded = match serde_json::to_vec(&line) {
            Ok(encoded) => encoded,
            Err(e) => {
                on_delivery(Err(WatchError::Delivery {
                    key,
                    reason: format!("value could not be serialized: {e}"),
                }));
                return Ok(());
            }
        };
        encoded.push(b'\n');

        let mut state = self.state.lock().await;
        let written = state.writer.write_all(&encoded).await;
        match written {
            Ok(()) => {
                let offset = state.lines_written;
                state.lines_written += 1;
                trace!("📝 '{key}' written as line {offset}");
                state.unsettled.push((
                    on_delivery,
                    RecordMetadata {
                        topic,
                        key,
                        partition: None,
                        offset: Some(offset),
                    },
                ));
            }
            Err(e) => {
                drop(state);
                on_delivery(Err(WatchError::Delivery {
                    key,
                    reason: format!("could not write to '{}': {e}", self.config.file_name),
                }));
            }
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        let flushed = state.writer.flush().await;
        let unsettled = std::mem::take(&mut state.unsettled);
        let lines_written = state.lines_written;
        drop(state);

        match flushed {
            Ok(()) => {
                for (on_delivery, metadata) in unsettled {
                    on_delivery(Ok(metadata));
                }
                debug!("📂 '{}' flushed with {lines_written} lines", self.config.file_name);
                Ok(())
            }
            Err(e) => {
                for (on_delivery, metadata) in unsettled {
                    on_delivery(Err(WatchError::Delivery {
                        key: metadata.key,
                        reason: format!("'{}' could not be flushed: {e}", self.config.file_name),
                    }));
                }
                Err(e).with_context(|| {
                    format!(
                        "💀 The last bytes bound for '{}' never reached the disk. The BufWriter held on too tight.",
                        self.config.file_name
                    )
                })
            }
        }
    }
}
