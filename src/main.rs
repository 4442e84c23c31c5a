// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::collections::BTreeMap;
use std::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{crate_version, Parser, Subcommand};
use loopbox::config::{EngineConfig, LoopId, SessionState};
use loopbox::engine::Session;
use loopbox::events::SampleId;
use loopbox::note::Note;
use loopbox::transport::{clock::Clock, mock, Transport};
use loopbox::{midi, timebase, voice};
use tracing::{info, warn};

/// Simulated time advances in steps of this size.
const SIMULATION_STEP: f64 = 0.01;

#[derive(Parser)]
#[clap(
    author = "Michael Wilson",
    version = crate_version!(),
    about = "A looping sampler and sequencer."
)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Lists the available MIDI input devices.
    MidiDevices {},
    /// Verifies a session file and prints a summary of it.
    Verify {
        /// The path to the session file (YAML or JSON).
        session_path: String,
    },
    /// Plays a session against a simulated clock and reports what would have sounded.
    Simulate {
        /// The path to the session file (YAML or JSON).
        session_path: String,
        /// The loop to play.
        #[arg(short, long = "loop", default_value = "A")]
        loop_id: String,
        /// The number of passes of the loop to play.
        #[arg(short, long, default_value_t = 1)]
        cycles: u32,
    },
    /// Runs the engine in real time, playing and recording from the configured MIDI input.
    Live {
        /// The path to the engine config.
        config_path: String,
        /// Arms recording from the start.
        #[arg(short, long)]
        record: bool,
        /// The loop to start in.
        #[arg(short, long = "loop", default_value = "A")]
        loop_id: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    match cli.command {
        Commands::MidiDevices {} => {
            let devices = midi::list_devices()?;

            if devices.is_empty() {
                println!("No devices found.");
                return Ok(());
            }

            println!("Devices:");
            for device in devices {
                println!("- {}", device);
            }
        }
        Commands::Verify { session_path } => {
            let state = SessionState::load(Path::new(&session_path))?;
            let mut session = Session::new(
                Arc::new(mock::Transport::new("verify")),
                voice::get_device("mock-verify"),
                Default::default(),
                Note::C4,
                Default::default(),
            )?;
            session.restore(state.clone())?;

            println!("Loops:");
            for loop_id in LoopId::ALL {
                let settings = session.loop_settings(loop_id)?;
                println!(
                    "- {}: {} bars of {} beats at {} bpm, swing {}",
                    loop_id,
                    settings.bars(),
                    settings.beats_per_bar(),
                    settings.bpm(),
                    settings.swing()
                );
            }

            println!("\nSamples (count: {}):", state.samples.len());
            for sample in state.samples.keys() {
                let counts: Vec<String> = LoopId::ALL
                    .iter()
                    .map(|loop_id| session.events(sample, *loop_id).len().to_string())
                    .collect();
                println!("- {} (events A/B/C/D: {})", sample, counts.join("/"));
            }
        }
        Commands::Simulate {
            session_path,
            loop_id,
            cycles,
        } => {
            let loop_id: LoopId = loop_id.parse()?;
            let state = SessionState::load(Path::new(&session_path))?;

            let transport = Arc::new(mock::Transport::new("simulate"));
            let voices = Arc::new(voice::mock::Device::get("mock-simulate"));
            let mut session = Session::new(
                transport.clone(),
                voices.clone(),
                Default::default(),
                Note::C4,
                Default::default(),
            )?;
            session.restore(state)?;
            session.select_loop(loop_id)?;

            let loop_end = timebase::loop_end_seconds(&session.loop_settings(loop_id)?);
            let end = loop_end * f64::from(cycles);
            session.start()?;
            session.pump();
            let mut now = 0.0;
            while now < end {
                now = (now + SIMULATION_STEP).min(end);
                transport.advance_to(now);
                session.pump();
            }
            session.stop();

            let mut attacks: BTreeMap<SampleId, usize> = BTreeMap::new();
            for (sample, _, _) in voices.attacks() {
                *attacks.entry(sample).or_default() += 1;
            }

            println!(
                "Played loop {} for {} cycle(s) ({:.3}s):",
                loop_id, cycles, end
            );
            for (sample, count) in attacks {
                println!("- {}: {} note(s)", sample, count);
            }
        }
        Commands::Live {
            config_path,
            record,
            loop_id,
        } => {
            let config = EngineConfig::deserialize(&PathBuf::from(&config_path))?;
            let timing = config.timing()?;
            let transport: Arc<dyn Transport> =
                Arc::new(Clock::new("live", timing.lookahead, timing.tick_interval));
            let mut session =
                Session::from_config(&config, transport, voice::get_device("log"))?;

            let session_path = config.session().map(PathBuf::from);
            if let Some(path) = &session_path {
                if path.exists() {
                    session.restore(SessionState::load(path)?)?;
                } else {
                    warn!(path = ?path, "Session file doesn't exist yet, starting empty.");
                }
            }

            let (sender, mut receiver) = tokio::sync::mpsc::channel::<midi::RawMessage>(64);
            let midi_device = match config.midi() {
                Some(midi) => {
                    let device = midi::get_device(midi.device())?;
                    device.watch_events(sender)?;
                    Some(device)
                }
                None => {
                    warn!("No MIDI input configured.");
                    None
                }
            };

            session.select_loop(loop_id.parse()?)?;
            session.set_recording(record);
            session.start()?;

            let mut pump =
                tokio::time::interval(timing.tick_interval.max(Duration::from_millis(1)));
            loop {
                tokio::select! {
                    Some(message) = receiver.recv() => session.handle_midi(&message),
                    _ = pump.tick() => {
                        session.pump();
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted, shutting down.");
                        break;
                    }
                }
            }

            if let Some(device) = midi_device {
                device.stop_watch_events();
            }
            session.stop();
            if let Some(path) = &session_path {
                session.snapshot().save(path)?;
            }
        }
    }

    Ok(())
}
