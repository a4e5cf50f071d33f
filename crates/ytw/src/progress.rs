//! 📊 progress.rs - "Are we there yet?" - every playlist, every time, forever.
//!
//! 🚀 The Data API never tells us up front how long the walk will be (well, it hints, but
//! we don't trust hints). So instead of a bar there's a spinner, and under the spinner a
//! table so comfy it has lumbar support: entries seen, summaries published, how fast,
//! and for how long.
//!
//! ⚠️ Watching this spinner will not make it go faster. Science says no.
//!
//! 🦆 The duck has nothing to do with this module. It's just vibing.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::NOTHING};
use indicatif::{ProgressBar, ProgressStyle};

/// 🔢 Formats a number with commas. "1000000" → "1,000,000", you're welcome, eyes.
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().enumerate() {
        if i > 0 && (s.len() - i) % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result
}

/// ⏱️ MM:SS, or HH:MM:SS for the playlists that should have been split up.
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;
    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{:02}:{:02}", minutes, seconds)
    }
}

/// 📊 Live counters for one watch run, rendered on an indicatif spinner.
///
/// Rates come from a sliding 5-second window so one slow page doesn't read as a stall.
pub(crate) struct PipelineProgress {
    collection_id: String,
    entries: u64,
    published: u64,
    spinner: ProgressBar,
    // 🔄 (timestamp, entries, published), oldest at the front
    rate_samples: VecDeque<(Instant, u64, u64)>,
    start_time: Instant,
}

impl std::fmt::Debug for PipelineProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // -- 🎭 ProgressBar is a diva and doesn't derive Debug
        f.debug_struct("PipelineProgress")
            .field("collection_id", &self.collection_id)
            .field("entries", &self.entries)
            .field("published", &self.published)
            .finish()
    }
}

impl PipelineProgress {
    /// 🚀 `visible = false` draws nothing, for CI logs and other places where spinners go to die.
    pub(crate) fn new(collection_id: &str, visible: bool) -> Self {
        let spinner = if visible {
            ProgressBar::new_spinner()
        } else {
            ProgressBar::hidden()
        };
        let style = ProgressStyle::with_template("{spinner:.cyan} {prefix} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(120));

        let start_time = Instant::now();
        let mut rate_samples = VecDeque::new();
        rate_samples.push_back((start_time, 0u64, 0u64));

        Self {
            collection_id: collection_id.to_string(),
            entries: 0,
            published: 0,
            spinner,
            rate_samples,
            start_time,
        }
    }

    /// 🎞️ One more playlist entry pulled from the outer traversal.
    pub(crate) fn record_entry(&mut self) {
        self.entries += 1;
        self.render();
    }

    /// 📨 One more summary handed to the publisher.
    pub(crate) fn record_published(&mut self) {
        self.published += 1;
        self.render();
    }

    pub(crate) fn set_stage(&self, stage: &str) {
        self.spinner.set_prefix(stage.to_string());
    }

    /// ✅ Stop spinning. Leaves the last table on screen.
    pub(crate) fn finish(&self) {
        self.spinner.finish();
    }

    // 📈 (entries/s, published/s) over the last five seconds
    fn rates(&mut self) -> (f64, f64) {
        let now = Instant::now();
        let window = Duration::from_secs(5);
        while let Some(&(timestamp, _, _)) = self.rate_samples.front() {
            if now.duration_since(timestamp) > window {
                self.rate_samples.pop_front();
            } else {
                break;
            }
        }
        self.rate_samples.push_back((now, self.entries, self.published));

        if let Some(&(oldest_time, oldest_entries, oldest_published)) = self.rate_samples.front() {
            let elapsed = now.duration_since(oldest_time).as_secs_f64();
            if elapsed > 0.0 {
                return (
                    self.entries.saturating_sub(oldest_entries) as f64 / elapsed,
                    self.published.saturating_sub(oldest_published) as f64 / elapsed,
                );
            }
        }
        (0.0, 0.0)
    }

    fn render(&mut self) {
        let (entries_rate, published_rate) = self.rates();

        let mut table = Table::new();
        table.load_preset(NOTHING);
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.add_row(vec![
            Cell::new(format!("{} Entries/s", format_number(entries_rate as u64))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Entries", format_number(self.entries))).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} Msgs/s", format_number(published_rate as u64))).set_alignment(CellAlignment::Right),
            Cell::new(format!("{} Published", format_number(self.published))).set_alignment(CellAlignment::Right),
        ]);
        table.add_row(vec![
            Cell::new(format!("{} elapsed", format_duration(self.start_time.elapsed())))
                .set_alignment(CellAlignment::Right),
            Cell::new(""),
        ]);

        self.spinner
            .set_message(format!("playlist: {}\n{}", self.collection_id, table));
    }

    #[cfg(test)]
    fn counts(&self) -> (u64, u64) {
        (self.entries, self.published)
    }
}
