//! Tapenote - terminal front-end for a songwriting session
//!
//! Plays one backing track through the default output device and takes line
//! commands on stdin. The hold gesture is split across two commands so the
//! hold threshold can be tried from a terminal: `down` presses the transport
//! button, `up` releases it.
//!
//! ## Usage
//!
//! ```text
//! tapenote [--list-devices] [path/to/track]
//! ```

use std::io::{self, BufRead, Write};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};

use tapenote_core::audio::{list_devices, start_audio_system, Direction};
use tapenote_core::config::{default_config_path, load_config, TapenoteConfig};
use tapenote_core::engine::{CommandSender, SessionAtomics, SessionCommand};
use tapenote_core::looping::LoopState;

const HELP: &str = "\
Commands:
  p | play          toggle play/pause
  down / up         press / release the transport button (hold to record)
  rec / stop        start / stop a take directly
  loop              set A, then B, then clear
  loop-reset        clear the loop and pause
  seek <seconds>    jump to a position
  < / >             skip back / forward
  rate [value]      cycle the playback rate, or set it
  take [slot]       play a take (latest when no slot given)
  take-stop         stop take preview
  mute              toggle automatic take playback
  clear             delete all takes
  status            show session state
  q | quit          end the session";

fn main() -> Result<()> {
    // Set RUST_LOG=debug for verbose output
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if args.iter().any(|arg| arg == "--list-devices") {
        return print_devices();
    }
    let track_path = args.iter().find(|arg| !arg.starts_with("--"));

    log::info!("tapenote starting up");

    let config_path = default_config_path();
    let config: TapenoteConfig = load_config(&config_path);

    let mut system = start_audio_system(&config.audio, &config.session)
        .context("Failed to start audio output")?;
    println!(
        "Audio running at {} Hz (~{:.1}ms latency)",
        system.handle.sample_rate(),
        system.handle.latency_ms()
    );

    let audio = match track_path {
        Some(path) => Some(read_track(Path::new(path))?),
        None => {
            println!("No track given, recording takes against silence");
            None
        }
    };
    send(&mut system.command_sender, SessionCommand::OpenTrack(audio));

    println!("{}", HELP);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        let mut words = line.split_whitespace();
        let Some(cmd) = words.next() else {
            continue;
        };
        let arg = words.next();

        let command = match (cmd, arg) {
            ("q" | "quit", _) => break,
            ("status", _) => {
                print_status(&system.atomics);
                continue;
            }
            ("help" | "?", _) => {
                println!("{}", HELP);
                continue;
            }
            ("p" | "play", _) => SessionCommand::TogglePlay,
            ("down", _) => SessionCommand::TransportPress { at: Instant::now() },
            ("up", _) => SessionCommand::TransportRelease { at: Instant::now() },
            ("rec", _) => SessionCommand::StartRecording,
            ("stop", _) => SessionCommand::StopRecording,
            ("loop", _) => SessionCommand::CycleLoop,
            ("loop-reset", _) => SessionCommand::ResetLoop,
            ("seek", Some(value)) => match value.parse::<f64>() {
                Ok(time) => SessionCommand::Seek(time),
                Err(_) => {
                    println!("Not a number: {}", value);
                    continue;
                }
            },
            ("<", _) => SessionCommand::SkipBack,
            (">", _) => SessionCommand::SkipForward,
            ("rate", None) => SessionCommand::CyclePlaybackRate,
            ("rate", Some(value)) => match value.parse::<f64>() {
                Ok(rate) => SessionCommand::SetPlaybackRate(rate),
                Err(_) => {
                    println!("Not a number: {}", value);
                    continue;
                }
            },
            ("take", None) => SessionCommand::ToggleTake,
            ("take", Some(value)) => match value.parse::<usize>() {
                Ok(slot) => SessionCommand::PlayTake(slot),
                Err(_) => {
                    println!("Not a slot: {}", value);
                    continue;
                }
            },
            ("take-stop", _) => SessionCommand::StopTake,
            ("mute", _) => SessionCommand::ToggleTakesEnabled,
            ("clear", _) => SessionCommand::ClearTakes,
            _ => {
                println!("Unknown command: {} (try 'help')", line.trim());
                continue;
            }
        };
        send(&mut system.command_sender, command);
    }

    send(&mut system.command_sender, SessionCommand::EndSession);
    // Let the audio thread pick up the end before the stream is dropped
    std::thread::sleep(std::time::Duration::from_millis(50));
    log::info!("tapenote shutting down");
    Ok(())
}

fn read_track(path: &Path) -> Result<Arc<[u8]>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read track {:?}", path))?;
    log::info!("Loaded {} bytes from {:?}", bytes.len(), path);
    Ok(bytes.into())
}

fn send(sender: &mut CommandSender, command: SessionCommand) {
    if sender.send(command).is_err() {
        log::warn!("Command queue full, dropping command");
    }
}

fn print_devices() -> Result<()> {
    for direction in [Direction::Output, Direction::Input] {
        println!("{:?} devices:", direction);
        match list_devices(direction) {
            Ok(devices) => {
                for device in devices {
                    println!("  {}", device);
                }
            }
            Err(e) => println!("  {}", e),
        }
    }
    Ok(())
}

fn print_status(atomics: &SessionAtomics) {
    if !atomics.has_audio() {
        println!("No track");
    } else if !atomics.is_loaded() {
        println!("Loading...");
    }

    let loop_label = match atomics.loop_state() {
        LoopState::Off => "off".to_string(),
        LoopState::PointA { a } => format!("A {:.2}", a),
        LoopState::LoopAB { a, b } => format!("{:.2} -> {:.2}", a, b),
    };
    let mic = match atomics.permission() {
        None => "not asked",
        Some(true) => "granted",
        Some(false) => "denied",
    };

    println!(
        "{} {:.2}/{:.2}s  rate {}x  loop {}",
        if atomics.is_playing() { "▶" } else { "⏸" },
        atomics.position(),
        atomics.duration(),
        atomics.playback_rate(),
        loop_label
    );
    println!(
        "{}takes {} ({})  mic {}{}",
        if atomics.is_recording() { "● " } else { "" },
        atomics.take_count(),
        if atomics.takes_enabled() { "on" } else { "muted" },
        mic,
        atomics
            .take_preview()
            .map(|slot| format!("  previewing {}", slot))
            .unwrap_or_default()
    );
    let _ = io::stdout().flush();
}
