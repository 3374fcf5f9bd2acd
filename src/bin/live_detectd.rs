//! live_detectd - live detection session daemon
//!
//! This daemon:
//! 1. Loads configuration and the saved operator preferences
//! 2. Attaches one video source (camera, stream or file)
//! 3. Runs a detection session against the inference service, or the
//!    fallback generator when the service is unreachable
//! 4. Logs every recorded event and periodic live metrics
//! 5. Publishes the results handoff record on shutdown

use anyhow::{anyhow, Result};
use clap::Parser;
use std::time::Duration;

use live_detect::session::SessionUpdate;
use live_detect::storage::shared;
use live_detect::{
    NoticeLevel, PanelConfig, SessionController, SessionError, SessionSettings, Source,
    SqliteKvStore, SyntheticProvider, VideoFile,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Source kind (camera|stream|file). Defaults to the saved input mode.
    #[arg(long)]
    source: Option<String>,
    /// Camera device id, stream URL or video file path.
    #[arg(long)]
    target: Option<String>,
    /// Stop after this many seconds. Runs until Ctrl-C otherwise.
    #[arg(long)]
    duration_s: Option<u64>,
    /// Override the saved confidence threshold (0-100).
    #[arg(long)]
    threshold: Option<u8>,
    /// Override the saved model id.
    #[arg(long)]
    model: Option<String>,
    /// Override the saved frame sampling rate (1-10 per second).
    #[arg(long)]
    frame_sampling: Option<u8>,
    /// Seconds between metrics log lines.
    #[arg(long, default_value_t = 5)]
    health_interval_s: u64,
    /// Skip publishing the results handoff record on exit.
    #[arg(long)]
    no_publish: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    let cfg = PanelConfig::load()?;

    // The controller and every helper task share one thread.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(run(args, cfg))
}

async fn run(args: Args, cfg: PanelConfig) -> Result<()> {
    let store = shared(SqliteKvStore::open(&cfg.db_path)?);
    let provider =
        SyntheticProvider::new().with_stream_delay(cfg.simulation.stream_connect_delay);
    let mut session = SessionController::new(provider, store, SessionSettings::from(&cfg));

    let mut notices = session.notices();
    tokio::spawn(async move {
        while let Ok(notice) = notices.recv().await {
            match (notice.level, notice.hint) {
                (NoticeLevel::Success, _) => log::info!("{}", notice.message),
                (NoticeLevel::Error, Some(hint)) => {
                    log::error!("{} (hint: {})", notice.message, hint)
                }
                (NoticeLevel::Error, None) => log::error!("{}", notice.message),
            }
        }
    });

    if let Some(model) = &args.model {
        session.set_model(model).map_err(with_hint)?;
    }
    if let Some(threshold) = args.threshold {
        session.set_threshold(threshold).map_err(with_hint)?;
    }
    if let Some(rate) = args.frame_sampling {
        session.set_frame_sampling(rate).map_err(with_hint)?;
    }

    let cameras = session.refresh_cameras().await.len();
    let kind = args
        .source
        .clone()
        .unwrap_or_else(|| session.preferences().input_mode.as_str().to_string());
    let source = build_source(&kind, args.target.as_deref(), session.selected_camera())?;

    log::info!("live_detectd running. store at {}", cfg.db_path);
    log::info!(
        "model={}, threshold={}%, sampling={}/s, cameras={}",
        session.preferences().model,
        session.preferences().threshold,
        session.preferences().frame_sampling,
        cameras
    );
    if cfg.inference.endpoint.is_none() {
        log::warn!("inference endpoint disabled; detections will come from the fallback generator");
    }

    session.connect(source).await.map_err(with_hint)?;
    session.start_detection().await.map_err(with_hint)?;

    let mut health = tokio::time::interval(Duration::from_secs(args.health_interval_s.max(1)));
    health.tick().await;
    let run_for = async {
        match args.duration_s {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    tokio::pin!(run_for);
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            update = session.step() => match update {
                SessionUpdate::Detections { created, .. } if created > 0 => {
                    for event in session.events().events().take(created) {
                        log::info!(
                            "event {} at {} conf={:.1}% model={}",
                            event.id,
                            event.timestamp_string(),
                            event.confidence,
                            event.model
                        );
                    }
                }
                SessionUpdate::LinkLost => {
                    log::warn!("inference service lost, continuing on fallback");
                }
                _ => {}
            },
            _ = health.tick() => {
                let metrics = session.metrics();
                let summary = session.events().summary();
                let frames = session.track_stats().map(|s| s.frames_captured).unwrap_or(0);
                log::info!(
                    "status={} fps={:.1} latency={:.0}ms buffer={:.0}% frames={} events={} avg={}%",
                    session.status(),
                    metrics.fps,
                    metrics.latency_ms,
                    metrics.buffer_fullness,
                    frames,
                    summary.total,
                    summary.average_display()
                );
            }
            _ = &mut run_for => {
                log::info!("run duration elapsed");
                break;
            }
            res = &mut shutdown => {
                if let Err(e) = res {
                    log::error!("failed to listen for shutdown signal: {}", e);
                }
                log::info!("shutdown requested");
                break;
            }
        }
    }

    if session.stop_detection().is_err() {
        log::debug!("detection was not running at shutdown");
    }
    if !args.no_publish {
        let record = session.publish_results().map_err(with_hint)?;
        let summary = record.summary();
        log::info!(
            "published {} events ({} high confidence, average {}%)",
            summary.total,
            summary.high_confidence,
            summary.average_display()
        );
    }
    session.disconnect();
    Ok(())
}

fn build_source(kind: &str, target: Option<&str>, selected_camera: &str) -> Result<Source> {
    match kind {
        "camera" => Ok(Source::camera(target.unwrap_or(selected_camera))),
        "stream" => Ok(Source::stream(target.unwrap_or_default())),
        "file" => {
            let path =
                target.ok_or_else(|| anyhow!("--target <path> is required for file sources"))?;
            Ok(Source::File(VideoFile::from_path(path)))
        }
        other => Err(anyhow!(
            "unknown source '{}' (expected camera, stream or file)",
            other
        )),
    }
}

fn with_hint(err: SessionError) -> anyhow::Error {
    match err.hint() {
        Some(hint) => anyhow!("{} (hint: {})", err, hint),
        None => anyhow!(err),
    }
}
