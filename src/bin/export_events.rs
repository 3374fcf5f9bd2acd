//! export_events - write the published event history to a CSV file

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use std::io::IsTerminal;
use std::path::PathBuf;

use live_detect::detect::EventFilter;
use live_detect::export::{csv_filename, events_csv};
use live_detect::frame::decode_data_url;
use live_detect::storage::shared;
use live_detect::{DetectionAggregator, HandoffRecord, PreferenceStore, SqliteKvStore};

#[path = "../ui.rs"]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Path to the session store.
    #[arg(long, env = "LIVE_DETECT_DB", default_value = "live_detect.db")]
    db_path: String,
    /// Output CSV path. Defaults to detection-events-<today>.csv.
    #[arg(long)]
    output: Option<PathBuf>,
    /// Only export events at or above the threshold.
    #[arg(long)]
    high_confidence_only: bool,
    /// Threshold for --high-confidence-only. Defaults to the saved preference.
    #[arg(long)]
    threshold: Option<u8>,
    /// Keep only events whose timestamp contains this text.
    #[arg(long, default_value = "")]
    filter: String,
    /// Also write the last published snapshot as a JPEG.
    #[arg(long)]
    snapshot_out: Option<PathBuf>,
    /// UI mode for stderr progress (auto|plain|pretty)
    #[arg(long, default_value = "auto", value_name = "MODE")]
    ui: String,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let ui = ui::Ui::new(
        ui::UiMode::parse(&args.ui)?,
        std::io::stderr().is_terminal(),
        std::io::stdout().is_terminal(),
    );

    let store = {
        let _stage = ui.stage("Open session store");
        shared(SqliteKvStore::open(&args.db_path)?)
    };
    let record = {
        let mut stage = ui.stage("Load published results");
        let record = HandoffRecord::load(&store)?;
        stage.detail(format!("{} events", record.events.len()));
        record
    };

    let threshold = match args.threshold {
        Some(t) if t > 100 => return Err(anyhow!("--threshold must be between 0 and 100")),
        Some(t) => t,
        None => PreferenceStore::new(store.clone()).load().threshold,
    };
    let filter = EventFilter {
        high_confidence_only: args.high_confidence_only,
        threshold,
        text: args.filter.clone(),
    };

    let summary = record.summary();
    let csv = {
        let mut stage = ui.stage("Build CSV");
        let history = DetectionAggregator::restore(record.events);
        let csv = events_csv(history.events(), &filter);
        stage.detail(format!("{} rows", csv.lines().count().saturating_sub(1)));
        csv
    };

    let output = args
        .output
        .unwrap_or_else(|| PathBuf::from(csv_filename(chrono::Local::now().date_naive())));
    {
        let _stage = ui.stage("Write export");
        std::fs::write(&output, csv)
            .with_context(|| format!("failed to write {}", output.display()))?;
    }

    if let Some(path) = &args.snapshot_out {
        let _stage = ui.stage("Write snapshot");
        let data_url = record
            .last_snapshot
            .as_deref()
            .ok_or_else(|| anyhow!("no snapshot has been published"))?;
        std::fs::write(path, decode_data_url(data_url)?)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }

    println!(
        "exported to {} (total {}, high confidence {}, average {}%)",
        output.display(),
        summary.total,
        summary.high_confidence,
        summary.average_display()
    );
    if let Some(src) = &record.last_video_src {
        println!("last video source: {}", src);
    }
    Ok(())
}
