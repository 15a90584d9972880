mod recording;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use realm_config::AppConfig;
use realm_fusion::PoseFusionEngine;
use realm_space::SpaceManager;
use recording::{parse_recording, Replay};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "realm-vr")]
#[command(about = "Head and hand pose fusion for phone-based VR")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Replay a recorded sensor session and print the fused game-frame pose per frame
    Replay {
        /// JSON-lines recording
        file: PathBuf,

        /// Frame interval in milliseconds
        #[arg(long, default_value_t = 16.0)]
        frame_ms: f32,

        /// Config file (defaults to the platform config directory)
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Write the default config file
    InitConfig,
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    match path {
        Some(path) => realm_config::load_config_from(&path),
        None => Ok(realm_config::load_config().unwrap_or_else(|e| {
            warn!(?e, "Failed to load config, using defaults");
            AppConfig::default()
        })),
    }
}

async fn replay(file: PathBuf, frame_ms: f32, config: Option<PathBuf>) -> Result<()> {
    if !frame_ms.is_finite() || frame_ms <= 0.0 {
        anyhow::bail!("frame interval must be positive, got {frame_ms}");
    }

    let config = load_config(config)?;
    let text = tokio::fs::read_to_string(&file)
        .await
        .with_context(|| format!("reading {}", file.display()))?;
    let entries =
        parse_recording(&text).with_context(|| format!("parsing {}", file.display()))?;
    info!(?file, entries = entries.len(), frame_ms, "Replaying session");

    let (engine, feed) = PoseFusionEngine::connect(config.fusion);
    let mut space = SpaceManager::new(engine, config.space);
    let mut replay = Replay::new(entries, frame_ms);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut frames: u64 = 0;
    while !replay.is_finished() {
        let report = replay.step(&mut space, &feed);
        serde_json::to_writer(&mut out, &report)?;
        writeln!(out)?;
        frames += 1;
        if frames % 1000 == 0 {
            tracing::debug!(frames, "Replay heartbeat");
        }
    }

    let calibration = space.engine().calibration();
    info!(
        frames,
        calibrated = calibration.calibrated,
        drift = calibration.smoothed_drift,
        bounds = space.play_bounds().is_some(),
        "Replay finished"
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging. Poses go to stdout, logs to stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "realm_vr=info,realm_fusion=info,realm_space=info".into()),
        )
        .init();

    match Cli::parse().command {
        Command::Replay {
            file,
            frame_ms,
            config,
        } => replay(file, frame_ms, config).await,
        Command::InitConfig => {
            let path = realm_config::save_config(&AppConfig::default())?;
            info!(?path, "Wrote default config");
            println!("{}", path.display());
            Ok(())
        }
    }
}
