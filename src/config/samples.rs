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
use serde::{Deserialize, Serialize};

use crate::note::Note;
use crate::timebase::Subdivision;

/// The kind of filter applied to a sample's output.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterKind {
    Highpass,
    Lowpass,
}

/// A filter on a sample's output.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
pub struct Filter {
    pub kind: FilterKind,

    /// The cutoff frequency in Hz.
    pub cutoff_hz: f64,

    /// The filter resonance (Q). The voice device's default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resonance: Option<f64>,
}

impl Filter {
    fn validate(&self) -> Result<(), String> {
        if !(self.cutoff_hz.is_finite() && self.cutoff_hz > 0.0) {
            return Err(format!(
                "filter cutoff must be greater than zero, got {}",
                self.cutoff_hz
            ));
        }
        if let Some(resonance) = self.resonance {
            if !(resonance.is_finite() && resonance > 0.0) {
                return Err(format!(
                    "filter resonance must be greater than zero, got {}",
                    resonance
                ));
            }
        }
        Ok(())
    }
}

/// A YAML representation of the playback settings of one sample.
#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SampleSettings {
    pub mute: bool,
    pub solo: bool,

    /// Plays the trimmed region backwards.
    pub reverse: bool,

    /// Where playback starts within the sample, in seconds.
    pub trim_start: f64,

    /// Where playback stops within the sample, in seconds. The whole sample plays when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trim_end: Option<f64>,

    /// Volume in dB.
    pub volume: f64,

    /// Stereo position from -1 (left) to 1 (right).
    pub pan: f64,

    /// The note at which incoming MIDI plays the sample unshifted.
    pub base_note: Note,

    /// Additional transposition in semitones.
    pub pitch: f64,

    /// Envelope attack in seconds.
    pub attack: f64,

    /// Envelope release in seconds.
    pub release: f64,

    /// Whether recorded events snap to the quantize unit on playback.
    pub quantize: bool,
    pub quantize_unit: Subdivision,

    pub filters: Vec<Filter>,
}

impl SampleSettings {
    /// The length of the trimmed region in seconds, if the trim end is set.
    pub fn trim_length(&self) -> Option<f64> {
        self.trim_end.map(|trim_end| (trim_end - self.trim_start).max(0.0))
    }

    /// Checks the settings, returning a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.trim_start.is_finite() && self.trim_start >= 0.0) {
            return Err(format!(
                "trim start must not be negative, got {}",
                self.trim_start
            ));
        }
        if let Some(trim_end) = self.trim_end {
            if !(trim_end.is_finite() && trim_end > self.trim_start) {
                return Err(format!(
                    "trim end ({}) must be after trim start ({})",
                    trim_end, self.trim_start
                ));
            }
        }
        if !self.volume.is_finite() {
            return Err(format!("volume must be finite, got {}", self.volume));
        }
        if !(-1.0..=1.0).contains(&self.pan) {
            return Err(format!("pan must be between -1 and 1, got {}", self.pan));
        }
        if !self.pitch.is_finite() {
            return Err(format!("pitch must be finite, got {}", self.pitch));
        }
        if !(self.attack.is_finite() && self.attack >= 0.0) {
            return Err(format!("attack must not be negative, got {}", self.attack));
        }
        if !(self.release.is_finite() && self.release >= 0.0) {
            return Err(format!(
                "release must not be negative, got {}",
                self.release
            ));
        }
        self.filters.iter().try_for_each(Filter::validate)
    }
}

impl Default for SampleSettings {
    fn default() -> Self {
        SampleSettings {
            mute: false,
            solo: false,
            reverse: false,
            trim_start: 0.0,
            trim_end: None,
            volume: 0.0,
            pan: 0.0,
            base_note: Note::C4,
            pitch: 0.0,
            attack: 0.0,
            release: 0.0,
            quantize: false,
            quantize_unit: Subdivision::SIXTEENTH,
            filters: Vec::new(),
        }
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;

    #[test]
    fn defaults() -> Result<(), Box<dyn Error>> {
        let settings: SampleSettings = serde_yml::from_str("mute: true\n")?;
        assert!(settings.mute);
        assert_eq!(settings.base_note, Note::C4);
        assert_eq!(settings.quantize_unit, Subdivision::SIXTEENTH);
        assert_eq!(settings.trim_length(), None);
        assert!(settings.validate().is_ok());
        Ok(())
    }

    #[test]
    fn parse_full() -> Result<(), Box<dyn Error>> {
        let settings: SampleSettings = serde_yml::from_str(
            r#"
            solo: true
            trim_start: 0.25
            trim_end: 1.0
            base_note: A3
            quantize: true
            quantize_unit: 8t
            filters:
              - kind: lowpass
                cutoff_hz: 1200
                resonance: 0.7
            "#,
        )?;

        assert!(settings.solo);
        assert_eq!(settings.trim_length(), Some(0.75));
        assert_eq!(settings.base_note, "A3".parse::<Note>()?);
        assert_eq!(settings.quantize_unit, "8t".parse::<Subdivision>()?);
        assert_eq!(
            settings.filters,
            vec![Filter {
                kind: FilterKind::Lowpass,
                cutoff_hz: 1200.0,
                resonance: Some(0.7),
            }]
        );
        Ok(())
    }

    #[test]
    fn validation() {
        let bad = [
            SampleSettings {
                trim_start: -1.0,
                ..Default::default()
            },
            SampleSettings {
                trim_start: 1.0,
                trim_end: Some(0.5),
                ..Default::default()
            },
            SampleSettings {
                pan: 1.5,
                ..Default::default()
            },
            SampleSettings {
                release: -0.1,
                ..Default::default()
            },
            SampleSettings {
                filters: vec![Filter {
                    kind: FilterKind::Highpass,
                    cutoff_hz: 0.0,
                    resonance: None,
                }],
                ..Default::default()
            },
        ];

        for settings in bad {
            assert!(settings.validate().is_err(), "{:?}", settings);
        }
    }
}
