//! 🔄 Summarizer - turns a chatty video record into four facts and a title.
//!
//! 🎬 INT. NEWSROOM - DEADLINE
//!
//! "Give me the headline and the numbers. Skip the rest." The editor does not care about
//! thumbnails, tags, or localized descriptions. Neither do we.
//!
//! Pure function. No I/O. The only way it fails is a counter that claims to be a number
//! and is lying about it. Missing counters are zero. Counters that say `"banana"` are
//! a `RecordParse` error, not a zero, because a quiet zero is how dashboards start lying. 🦆

use crate::common::{DetailRecord, RawCount, SummaryRecord};
use crate::error::WatchError;

/// 📰 Project a detail record into its summary.
pub fn summarize(detail: &DetailRecord) -> Result<SummaryRecord, WatchError> {
    let stats = &detail.statistics;
    Ok(SummaryRecord {
        id: detail.id.clone(),
        title: detail.snippet.title.clone(),
        views: parse_counter(&detail.id, "viewCount", stats.view_count.as_ref())?,
        likes: parse_counter(&detail.id, "likeCount", stats.like_count.as_ref())?,
        comments: parse_counter(&detail.id, "commentCount", stats.comment_count.as_ref())?,
    })
}

// -- 🔢 absent → 0. present → must be a non-negative integer, or we say so loudly.
fn parse_counter(video_id: &str, field: &str, raw: Option<&RawCount>) -> Result<u64, WatchError> {
    let Some(raw) = raw else {
        return Ok(0);
    };
    let parsed = match raw {
        RawCount::Text(text) => text.trim().parse::<u64>().ok(),
        RawCount::Number(number) => number.as_u64(),
    };
    parsed.ok_or_else(|| WatchError::RecordParse {
        record: video_id.to_string(),
        reason: format!("statistics.{field} is {raw:?}, which is not a non-negative integer"),
    })
}
