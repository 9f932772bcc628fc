pub mod alerts;
pub mod analytics;
pub mod args;
pub mod capture;
pub mod db;
pub mod gateway;
pub mod monitor;
pub mod pose;
pub mod posture;
pub mod settings;
pub mod source;
mod utils;
pub mod wellness;

use anyhow::{bail, Context, Result};
use clap::Parser;
use log::{info, warn};
use tokio::time::Duration;

use args::Args;
use capture::PipelineStatus;
use db::Database;
use monitor::PostureMonitor;
use settings::{PipelineSettings, SettingsStore};
use source::ReplaySource;

fn debug_mode() -> bool {
    std::env::var("POSTURE_AI_DEBUG")
        .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
        .unwrap_or(false)
}

pub fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var)
    let level = if debug_mode() {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let args = Args::parse();
    let settings = match &args.settings {
        Some(path) => SettingsStore::new(path.clone())?.pipeline(),
        None => PipelineSettings::default(),
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    runtime.block_on(run_cli(args, settings))
}

async fn run_cli(args: Args, settings: PipelineSettings) -> Result<()> {
    let database = Database::new(args.db.clone())?;
    let monitor = PostureMonitor::new(database, settings);

    let recovered = monitor.recover_incomplete_sessions().await?;
    if recovered > 0 {
        warn!("Recovered {recovered} incomplete session(s) as Interrupted");
    }

    if args.summary {
        let summary = monitor.refresh_analytics(&args.uid).await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let Some(frames) = &args.frames else {
        bail!("either --frames or --summary is required");
    };
    let source = ReplaySource::from_path(frames, Duration::from_millis(args.pace_ms))?;
    info!("replaying {} frames from {}", source.remaining(), frames.display());

    let feed = monitor.feed().await;
    let mut status = feed.watch_status();
    monitor.start_session(&args.uid, Box::new(source)).await?;

    tokio::select! {
        result = status.wait_for(|state| matches!(state, PipelineStatus::Stopped { .. })) => {
            if result.is_err() {
                warn!("capture status channel closed");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("interrupted, ending session");
        }
    }
    drop(status);

    let report = monitor.end_session().await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
