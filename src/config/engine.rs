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
use std::{path::Path, time::Duration};

use config::{Config, File};
use duration_string::DurationString;
use serde::Deserialize;

use super::error::ConfigError;
use super::loops::LoopSettings;
use crate::note::Note;

const DEFAULT_LOOKAHEAD: Duration = Duration::from_millis(100);
const DEFAULT_TICK_INTERVAL: Duration = Duration::from_millis(5);
const DEFAULT_MIDI_DEDUP_WINDOW: Duration = Duration::from_millis(15);
const DEFAULT_MIN_EVENT_DURATION: Duration = Duration::from_millis(10);

/// Timing parameters of the engine.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Timing {
    /// How far ahead of the clock the real-time transport fires callbacks.
    pub lookahead: Duration,

    /// How often the real-time transport wakes up.
    pub tick_interval: Duration,

    /// Note-ons for the same note closer together than this are dropped.
    pub midi_dedup_window: Duration,

    /// The shortest duration a recorded event may have.
    pub min_event_duration: Duration,
}

impl Default for Timing {
    fn default() -> Self {
        Timing {
            lookahead: DEFAULT_LOOKAHEAD,
            tick_interval: DEFAULT_TICK_INTERVAL,
            midi_dedup_window: DEFAULT_MIDI_DEDUP_WINDOW,
            min_event_duration: DEFAULT_MIN_EVENT_DURATION,
        }
    }
}

/// A YAML representation of the MIDI input configuration.
#[derive(Deserialize, Clone, Debug)]
pub struct MidiInput {
    /// The MIDI device, matched by name.
    device: String,

    /// Only notes on this channel (1-16) are accepted. All channels when absent.
    channel: Option<u8>,
}

impl MidiInput {
    /// Creates a new MIDI input configuration.
    pub fn new(device: &str, channel: Option<u8>) -> MidiInput {
        MidiInput {
            device: device.to_string(),
            channel,
        }
    }

    /// Returns the device from the configuration.
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Returns the zero based MIDI channel to listen on, if any.
    pub fn channel(&self) -> Result<Option<u8>, ConfigError> {
        match self.channel {
            Some(channel) if (1..=16).contains(&channel) => Ok(Some(channel - 1)),
            Some(channel) => Err(ConfigError::MidiChannel(channel)),
            None => Ok(None),
        }
    }
}

/// The engine configuration.
#[derive(Deserialize, Clone, Debug, Default)]
pub struct EngineConfig {
    /// The settings every loop starts with.
    default_loop: Option<LoopSettings>,

    /// The note voices treat as the sample's natural pitch.
    reference_note: Option<Note>,

    lookahead: Option<String>,
    tick_interval: Option<String>,
    midi_dedup_window: Option<String>,
    min_event_duration: Option<String>,

    /// MIDI input used by the live command.
    midi: Option<MidiInput>,

    /// The session file to load on start and save on exit.
    session: Option<String>,
}

impl EngineConfig {
    /// Parse the engine configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<EngineConfig, ConfigError> {
        let config = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize::<EngineConfig>()?;

        if let Err(e) = config.default_loop().validate() {
            return Err(ConfigError::Invalid("default_loop".into(), e));
        }
        Ok(config)
    }

    /// The settings every loop starts with.
    pub fn default_loop(&self) -> LoopSettings {
        self.default_loop.unwrap_or_default()
    }

    /// The reference note, C4 unless configured.
    pub fn reference_note(&self) -> Note {
        self.reference_note.unwrap_or(Note::C4)
    }

    /// Resolves the timing parameters, applying defaults.
    pub fn timing(&self) -> Result<Timing, ConfigError> {
        Ok(Timing {
            lookahead: parse_duration("lookahead", &self.lookahead, DEFAULT_LOOKAHEAD)?,
            tick_interval: parse_duration(
                "tick_interval",
                &self.tick_interval,
                DEFAULT_TICK_INTERVAL,
            )?,
            midi_dedup_window: parse_duration(
                "midi_dedup_window",
                &self.midi_dedup_window,
                DEFAULT_MIDI_DEDUP_WINDOW,
            )?,
            min_event_duration: parse_duration(
                "min_event_duration",
                &self.min_event_duration,
                DEFAULT_MIN_EVENT_DURATION,
            )?,
        })
    }

    /// Returns the MIDI input configuration.
    pub fn midi(&self) -> Option<&MidiInput> {
        self.midi.as_ref()
    }

    /// Returns the session file path.
    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }
}

fn parse_duration(
    name: &str,
    value: &Option<String>,
    default: Duration,
) -> Result<Duration, ConfigError> {
    match value {
        Some(value) => Ok(DurationString::from_string(value.clone())
            .map_err(|e| ConfigError::Duration(name.to_string(), e.to_string()))?
            .into()),
        None => Ok(default),
    }
}

#[cfg(test)]
mod test {
    use std::{error::Error, fs};

    use config::FileFormat;

    use super::*;

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let config = EngineConfig::default();
        assert_eq!(config.default_loop(), LoopSettings::default());
        assert_eq!(config.reference_note(), Note::C4);
        assert_eq!(config.timing()?, Timing::default());
        assert!(config.midi().is_none());
        Ok(())
    }

    #[test]
    fn parse() -> Result<(), Box<dyn Error>> {
        let yaml = r#"
            default_loop:
              beats_per_bar: 3
              bars: 4
              bpm: 90
            reference_note: A3
            midi_dedup_window: 20ms
            midi:
              device: mock-keys
              channel: 10
            session: session.yaml
        "#;

        let config: EngineConfig = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        assert_eq!(config.default_loop(), LoopSettings::new(3, 4, 90.0, 0.0));
        assert_eq!(config.reference_note(), "A3".parse::<Note>()?);
        let timing = config.timing()?;
        assert_eq!(timing.midi_dedup_window, Duration::from_millis(20));
        assert_eq!(timing.lookahead, DEFAULT_LOOKAHEAD);

        let midi = config.midi().ok_or("expected MIDI config")?;
        assert_eq!(midi.device(), "mock-keys");
        assert_eq!(midi.channel()?, Some(9));
        assert_eq!(config.session(), Some("session.yaml"));
        Ok(())
    }

    #[test]
    fn bad_values() -> Result<(), Box<dyn Error>> {
        assert!(matches!(
            MidiInput::new("mock", Some(17)).channel(),
            Err(ConfigError::MidiChannel(17))
        ));

        let dir = tempfile::tempdir()?;
        let path = dir.path().join("loopbox.yaml");
        fs::write(&path, "lookahead: soon\n")?;
        let config = EngineConfig::deserialize(&path)?;
        assert!(matches!(config.timing(), Err(ConfigError::Duration(_, _))));

        fs::write(&path, "default_loop:\n  beats_per_bar: 0\n  bars: 1\n  bpm: 120\n")?;
        assert!(matches!(
            EngineConfig::deserialize(&path),
            Err(ConfigError::Invalid(_, _))
        ));
        Ok(())
    }
}
