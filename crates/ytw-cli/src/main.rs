//! 🚀 ytw-cli - the front door, the bouncer, the maitre d' of ytw.
//!
//! 🎬 *[narrator voice]* "It all started with a simple main() function..."
//! 📦 Thin CLI wrapper: sets up logging, loads config, wires Ctrl-C to cancellation,
//! runs one watch, prints the report, and picks the exit code. Like a manager. 🦆

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::{Cell, CellAlignment, ContentArrangement, Table, presets::UTF8_FULL};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use ytw::progress::{format_duration, format_number};
use ytw::{CancellationToken, PartialRunReport, RunReport};

/// 📼 Page through a YouTube playlist and publish a summary of every video.
#[derive(Debug, Parser)]
#[command(name = "ytw", version, about)]
struct Args {
    /// 🔧 TOML config file. Used only if it exists; YTW_* env vars always apply.
    #[arg(default_value = "ytw.toml")]
    config: PathBuf,

    /// 🎞️ Watch this playlist instead of the configured one.
    #[arg(long)]
    playlist_id: Option<String>,
}

/// 🚀 main() - where it all begins. The "I pressed F5 and held my breath" moment.
///
/// 🔧 Steps:
/// 1. Init tracing (so we can see what goes wrong, and when)
/// 2. Parse args
/// 3. Load config (the moment of truth)
/// 4. Run the thing, with Ctrl-C wired to a graceful stop
/// 5. Print the report and exit with the right code
#[tokio::main]
async fn main() -> Result<()> {
    // 📡 RUST_LOG wins; otherwise info, because a silent watcher is a suspicious watcher
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 🔒 Only hand figment the file if it's actually there; env vars may be carrying the whole load
    let config_file = args.config.as_path();
    let config_file_path_which_is_validated_to_exist = match config_file.try_exists().with_context(|| {
        format!(
            "💀 Couldn't even check whether the config file exists. Permissions, probably. Was checking here: '{}'",
            config_file.display()
        )
    })? {
        true => Some(config_file),
        false => {
            warn!("⚠️ no config file at '{}', using YTW_* env vars only", config_file.display());
            None
        }
    };

    let mut app_config = ytw::app_config::load_config(config_file_path_which_is_validated_to_exist)
        .context("💀 In ytw-cli, main, we couldn't load the config. Take a look at the file and the YTW_* env vars, make sure you didn't forget something obvious, like the api key.")?;
    if let Some(playlist_id) = args.playlist_id {
        app_config.source_config.playlist_id = Some(playlist_id);
    }

    // 🛑 first Ctrl-C asks nicely: stop walking, flush what we have, report
    let cancel = CancellationToken::new();
    let on_ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("🛑 Ctrl-C received, finishing up: no new pages, flushing what's in flight");
            on_ctrl_c.cancel();
        }
    });

    match ytw::run(app_config, cancel).await {
        Ok(report) => {
            println!("{}", render_report(&report, false));
            for failed in &report.failed {
                warn!("💀 not delivered: '{}' ({})", failed.key, failed.reason);
            }
            let code = report.exit_code();
            info!("🏁 done, exit code {code}");
            if code != 0 {
                std::process::exit(code);
            }
            Ok(())
        }
        Err(err) => {
            // 🧾 if the walk had started, show how far it got before it fell over
            if let Some(PartialRunReport(partial)) = err.downcast_ref::<PartialRunReport>() {
                println!("{}", render_report(partial, true));
            }
            error!("💀 error: {}", err);
            // -- 🧅 peel the onion of sadness, one layer at a time
            let mut the_vibes_are_giving_connection_issues = false;
            for cause in err.chain().skip(1) {
                error!("⚠️  cause: {}", cause);
                let cause_str = cause.to_string();
                if cause_str.contains("error sending request")
                    || cause_str.contains("connection refused")
                    || cause_str.contains("Connection refused")
                    || cause_str.contains("tcp connect error")
                    || cause_str.contains("dns error")
                    || cause_str.contains("BrokerTransportFailure")
                    || cause_str.contains("AllBrokersDown")
                {
                    the_vibes_are_giving_connection_issues = true;
                }
            }

            if the_vibes_are_giving_connection_issues {
                error!(
                    "🔧 hint: looks like something isn't reachable. Check the network path to \
                    the Data API, and that the Kafka brokers (and schema registry, if configured) \
                    are actually running. If you're using Docker, `docker ps` is a good start. ☕"
                );
            }

            std::process::exit(1);
        }
    }
}

/// 🍽️ The end-of-run receipt. `aborted` is for runs that ended in a fatal error.
fn render_report(report: &RunReport, aborted: bool) -> Table {
    let outcome = match (aborted, report.exit_code()) {
        (true, _) => "💀 aborted",
        (false, 0) => "✅ complete",
        (false, 130) => "🛑 cancelled",
        (false, _) => "💀 delivery failures",
    };

    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![Cell::new("📼 ytw run"), Cell::new(outcome)]);

    let rows = [
        ("playlist", report.collection_id.clone()),
        ("topic", report.topic.clone()),
        ("entries", format_number(report.entries)),
        ("details", format_number(report.details)),
        ("attempted", format_number(report.attempted)),
        ("delivered", format_number(report.delivered)),
        ("failed", format_number(report.failed.len() as u64)),
        ("elapsed", format_duration(report.elapsed)),
    ];
    for (label, value) in rows {
        table.add_row(vec![
            Cell::new(label),
            Cell::new(value).set_alignment(CellAlignment::Right),
        ]);
    }
    table
}
