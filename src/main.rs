//! clipsloth - command line front end
//!
//! Preloads the given clips, plays the requested ones in order and waits
//! for the last voice to ring out.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use clipsloth::{AudioPlayer, PlayerConfig};

/// Time left for the device to drain after the last clip ends
const TAIL: Duration = Duration::from_millis(200);

#[derive(Parser, Debug)]
#[command(name = "clipsloth")]
#[command(about = "Preload short sound clips and play them by name")]
#[command(version)]
struct Args {
    /// JSON config file
    #[arg(short, long, default_value = "clipsloth.json", env = "CLIPSLOTH_CONFIG")]
    config: PathBuf,

    /// Clip to preload, as NAME=URL (repeatable)
    #[arg(long = "clip", value_parser = parse_clip, required = true)]
    clips: Vec<(String, String)>,

    /// Clip name to play, in order (repeatable)
    #[arg(long = "play")]
    play: Vec<String>,

    /// Delay between consecutive plays
    #[arg(long, default_value_t = 150)]
    gap_ms: u64,

    /// Override the configured volume (0.0 - 1.0)
    #[arg(long)]
    volume: Option<f32>,

    /// Start with playback disabled
    #[arg(long)]
    muted: bool,

    /// Open the output paused until the first play
    #[arg(long)]
    start_suspended: bool,

    /// Output device name
    #[arg(long)]
    device: Option<String>,

    /// Base directory for relative clip paths
    #[arg(long)]
    asset_root: Option<PathBuf>,
}

fn parse_clip(value: &str) -> std::result::Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, url)) if !name.is_empty() && !url.is_empty() => {
            Ok((name.to_string(), url.to_string()))
        }
        _ => Err(format!("expected NAME=URL, got {:?}", value)),
    }
}

impl Args {
    fn apply(&self, config: &mut PlayerConfig) {
        if let Some(volume) = self.volume {
            config.volume = volume;
        }
        if self.muted {
            config.enabled = false;
        }
        if self.start_suspended {
            config.start_suspended = true;
        }
        if self.device.is_some() {
            config.output_device = self.device.clone();
        }
        if self.asset_root.is_some() {
            config.asset_root = self.asset_root.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "clipsloth=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();

    let mut config = PlayerConfig::load(&args.config).context("Failed to load config")?;
    args.apply(&mut config);

    let player = AudioPlayer::from_config(&config).context("Failed to set up player")?;
    player.initialize();

    let loads: Vec<_> = args
        .clips
        .iter()
        .map(|(name, url)| player.load(name.as_str(), url.as_str()))
        .collect();
    for load in loads {
        load.settled().await;
    }
    info!(clips = ?player.loaded_names(), "Preload finished");

    if player.context_state().is_none() {
        bail!("No audio output available");
    }

    let gap = Duration::from_millis(args.gap_ms);
    let mut ring_out = Duration::ZERO;
    for (i, name) in args.play.iter().enumerate() {
        if i > 0 {
            tokio::time::sleep(gap).await;
            ring_out = ring_out.saturating_sub(gap);
        }
        player.play(name);
        match player.clip_duration(name) {
            Some(duration) => ring_out = ring_out.max(duration),
            None => warn!("{} was not loaded, nothing played", name),
        }
    }

    tokio::time::sleep(ring_out + TAIL).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_clip() {
        assert_eq!(
            parse_clip("click=sounds/click.wav").unwrap(),
            ("click".to_string(), "sounds/click.wav".to_string())
        );
        assert_eq!(
            parse_clip("ding=https://example.com/a.mp3?x=1").unwrap().1,
            "https://example.com/a.mp3?x=1"
        );
        assert!(parse_clip("click").is_err());
        assert!(parse_clip("=sounds/click.wav").is_err());
    }

    #[test]
    fn test_flags_override_config() {
        let args = Args::parse_from([
            "clipsloth",
            "--clip",
            "click=click.wav",
            "--volume",
            "0.9",
            "--muted",
        ]);
        let mut config = PlayerConfig::default();
        args.apply(&mut config);

        assert_eq!(config.volume, 0.9);
        assert!(!config.enabled);
        assert!(!config.start_suspended);
        assert_eq!(args.gap_ms, 150);
    }
}
