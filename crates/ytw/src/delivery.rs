//! 🧾 DeliveryLedger - the per-run tally of who made it to the topic and who didn't.
//!
//! The publisher calls back whenever it feels like it, from whatever task it feels like.
//! The ledger is the one place those callbacks write to, so at the end of the run we can
//! say "attempted 4,012, delivered 4,011, and here's the one that got away" instead of
//! printing "done!" and hoping. 🦆

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tracing::{trace, warn};

use crate::backends::{DeliveryCallback, sink::DeliveryResult};

/// 💀 One message that reached a terminal state on the wrong side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedDelivery {
    pub key: String,
    pub reason: String,
}

/// 📊 A frozen copy of the ledger, for reports.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub attempted: u64,
    pub delivered: u64,
    pub failed: Vec<FailedDelivery>,
}

impl DeliveryReport {
    /// ⏳ Submitted but not yet settled. Zero after a completed flush.
    pub fn unsettled(&self) -> u64 {
        self.attempted
            .saturating_sub(self.delivered)
            .saturating_sub(self.failed.len() as u64)
    }
}

/// 🔒 Thread-safe tally, shared with every delivery callback through an `Arc`.
#[derive(Debug, Default)]
pub(crate) struct DeliveryLedger {
    attempted: AtomicU64,
    delivered: AtomicU64,
    failed: Mutex<Vec<FailedDelivery>>,
}

impl DeliveryLedger {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// ✍️ Build the callback for one submission. Counts the attempt right away.
    pub(crate) fn track(self: &Arc<Self>, key: &str) -> DeliveryCallback {
        self.attempted.fetch_add(1, Ordering::SeqCst);
        let ledger = Arc::clone(self);
        let key = key.to_string();
        Box::new(move |outcome| ledger.settle(&key, outcome))
    }

    fn settle(&self, key: &str, outcome: DeliveryResult) {
        match outcome {
            Ok(metadata) => {
                self.delivered.fetch_add(1, Ordering::SeqCst);
                trace!(
                    "✅ '{key}' landed on {} (partition {:?}, offset {:?})",
                    metadata.topic, metadata.partition, metadata.offset
                );
            }
            Err(error) => {
                warn!("💀 delivery failed for key '{key}': {error}");
                self.failed
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(FailedDelivery {
                        key: key.to_string(),
                        reason: error.to_string(),
                    });
            }
        }
    }

    pub(crate) fn snapshot(&self) -> DeliveryReport {
        DeliveryReport {
            attempted: self.attempted.load(Ordering::SeqCst),
            delivered: self.delivered.load(Ordering::SeqCst),
            failed: self
                .failed
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }
}
