//! 🏷️ Errors with name tags.
//!
//! 🎬 Most of ytw lets `anyhow` carry the bad news, context chain and all. But a few
//! failures need to be told apart by the code itself, not just by a human squinting at
//! logs at 3am: "the API ran out of quota" is not "the API sent us soup", and neither
//! of those is "this one video has a view count of `banana`".
//!
//! So they get a type. `WatchError` rides inside `anyhow::Error` like everything else,
//! and callers who care can `downcast_ref::<WatchError>()` to find out which flavor of
//! disaster they are holding. 🦆

use thiserror::Error;

/// 💀 The classified failures of a watch run.
#[derive(Error, Debug)]
pub enum WatchError {
    /// 📡 The request never made it, or the body never made it back.
    #[error("💀 request to '{endpoint}' fell over in transit: {source}")]
    Transport {
        endpoint: String,
        #[source]
        source: reqwest::Error,
    },

    /// 🚫 The API answered, politely, with an error envelope instead of data
    /// (quota exceeded, bad key, playlist gone private...).
    #[error("💀 '{endpoint}' answered with an error envelope (HTTP {status}, code {code}): {message}")]
    UpstreamApi {
        endpoint: String,
        status: u16,
        code: i64,
        message: String,
    },

    /// 🍲 The API answered with something that is neither a page nor an error envelope.
    /// Never confuse this with an empty page. An empty page is a valid answer; soup is not.
    #[error("💀 '{endpoint}' returned a page we cannot read: {reason}")]
    MalformedResponse { endpoint: String, reason: String },

    /// 🧾 A single record is missing required fields or carries a counter that is not a number.
    #[error("💀 record '{record}' is unusable: {reason}")]
    RecordParse { record: String, reason: String },

    /// 📨 The event stream gave up on a message. Reported through the delivery callback.
    #[error("💀 delivery of key '{key}' failed: {reason}")]
    Delivery { key: String, reason: String },

    /// 🔧 The configuration cannot possibly work.
    #[error("💀 configuration rejected: {0}")]
    Config(String),
}
