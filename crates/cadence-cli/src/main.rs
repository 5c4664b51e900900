//! # cadence-play
//!
//! Plays a list of files or URLs through the Cadence playback engine.
//! While playing, commands are read from stdin (`p`, `n`, `s`, `q`, `+`,
//! `-`, `m`, `f`, `b`, `seek <secs>`).

mod commands;

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cadence_audio::renderer::output::list_output_devices;
use cadence_audio::{Playback, PlaybackEvent, QueuePlaylist};
use cadence_core::{EngineConfig, PlaybackState, Track};
use clap::Parser;
use commands::{Command, VOLUME_STEP};
use crossbeam_channel::{never, select};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "cadence-play")]
#[command(about = "Play audio files and streams")]
#[command(version)]
struct Args {
    /// Files or http(s) URLs, played in order
    #[arg(required_unless_present = "list_devices")]
    tracks: Vec<String>,

    /// Renderer backend (cpal or null)
    #[arg(short, long, env = "CADENCE_BACKEND")]
    backend: Option<String>,

    /// Output device name
    #[arg(short, long, env = "CADENCE_DEVICE")]
    device: Option<String>,

    /// Initial volume (0 to 100)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=100))]
    volume: Option<u32>,

    /// Engine configuration file (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the output devices and exit
    #[arg(long)]
    list_devices: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cadence_cli=info,cadence_audio=info".into()),
        )
        .init();

    let args = Args::parse();

    if args.list_devices {
        for device in list_output_devices().context("Failed to list output devices")? {
            println!("{device}");
        }
        return Ok(());
    }

    let config = engine_config(&args)?;
    info!("Using {} backend", config.backend);

    let playlist: QueuePlaylist = args.tracks.iter().map(Track::new).collect();
    let playback = Playback::new(Arc::new(playlist), config)
        .context("Failed to initialize playback engine")?;

    let (_, events) = playback.events();
    let commands = commands::spawn_stdin_reader().context("Failed to read stdin")?;
    let closed = never();
    let mut stdin_open = true;

    playback.play();
    if playback.state() == PlaybackState::Stopped {
        bail!("Audio output is unavailable");
    }

    loop {
        let input = if stdin_open { &commands } else { &closed };
        select! {
            recv(events) -> event => {
                let Ok(event) = event else { break };
                if !report(&playback, &event) {
                    break;
                }
            }
            recv(input) -> command => match command {
                Ok(Command::Quit) => break,
                Ok(command) => apply(&playback, command),
                // stdin closed; keep playing until the playlist ends.
                Err(_) => stdin_open = false,
            },
        }
    }

    playback.stop();
    println!();
    Ok(())
}

/// Configuration file (or the default one) with command line overrides.
fn engine_config(args: &Args) -> Result<EngineConfig> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => EngineConfig::load_or_default(),
    };

    if let Some(backend) = &args.backend {
        config.backend.clone_from(backend);
    }
    if let Some(device) = &args.device {
        config.device = Some(device.clone());
    }
    if let Some(volume) = args.volume {
        config.initial_volume = volume;
    }

    config.validate()?;
    Ok(config)
}

fn apply(playback: &Playback, command: Command) {
    match command {
        Command::TogglePause => {
            if playback.state() == PlaybackState::Playing {
                playback.pause();
            } else {
                playback.play();
            }
        }
        Command::Next => playback.next(),
        Command::Stop => playback.stop(),
        Command::VolumeUp => playback.set_volume(playback.volume().saturating_add(VOLUME_STEP)),
        Command::VolumeDown => playback.set_volume(playback.volume().saturating_sub(VOLUME_STEP)),
        Command::ToggleMute => playback.set_mute(!playback.is_muted()),
        Command::Seek(seconds) => playback.seek(seconds),
        Command::SeekBy(offset) => playback.seek((playback.current_time() + offset).max(0.0)),
        Command::Quit => {}
    }
}

/// Print an event. Returns false once playback has stopped.
fn report(playback: &Playback, event: &PlaybackEvent) -> bool {
    match event {
        PlaybackEvent::NewTrackStarted(track) => {
            println!();
            println!("Now playing: {track}");
        }
        PlaybackEvent::ProgressChanged(seconds) => {
            print!(
                "\r{} / {}",
                clock(*seconds),
                clock(playback.duration())
            );
            let _ = std::io::stdout().flush();
        }
        PlaybackEvent::VolumeChanged(volume) => {
            println!();
            println!("Volume: {volume}");
        }
        PlaybackEvent::StateChanged(PlaybackState::Stopped) => return false,
        PlaybackEvent::StateChanged(state) => info!("{state}"),
        PlaybackEvent::AvailableActionsChanged(actions) => info!("Actions: {actions}"),
    }
    true
}

/// `m:ss`, or `h:mm:ss` past an hour.
fn clock(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let (hours, minutes, secs) = (total / 3600, total / 60 % 60, total % 60);
    if hours > 0 {
        format!("{hours}:{minutes:02}:{secs:02}")
    } else {
        format!("{minutes}:{secs:02}")
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_clock() {
        assert_eq!(clock(0.0), "0:00");
        assert_eq!(clock(61.9), "1:01");
        assert_eq!(clock(3_725.0), "1:02:05");
        assert_eq!(clock(-3.0), "0:00");
    }

    #[test]
    fn test_overrides_applied() {
        let args = Args::parse_from(["cadence-play", "--backend", "null", "--volume", "40", "a.flac"]);
        let config = engine_config(&args).unwrap();
        assert_eq!(config.backend, "null");
        assert_eq!(config.initial_volume, 40);
        assert_eq!(args.tracks, ["a.flac"]);
    }

    #[test]
    fn test_tracks_required() {
        assert!(Args::try_parse_from(["cadence-play"]).is_err());
        assert!(Args::try_parse_from(["cadence-play", "--list-devices"]).is_ok());
    }
}
