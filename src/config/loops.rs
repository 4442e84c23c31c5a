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
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::ParseError;

/// One of the four independently recorded loops.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LoopId {
    A,
    B,
    C,
    D,
}

impl LoopId {
    /// All loops, in order.
    pub const ALL: [LoopId; 4] = [LoopId::A, LoopId::B, LoopId::C, LoopId::D];
}

impl fmt::Display for LoopId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LoopId::A => "A",
            LoopId::B => "B",
            LoopId::C => "C",
            LoopId::D => "D",
        };
        write!(f, "{}", name)
    }
}

impl FromStr for LoopId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "A" => Ok(LoopId::A),
            "B" => Ok(LoopId::B),
            "C" => Ok(LoopId::C),
            "D" => Ok(LoopId::D),
            _ => Err(ParseError::Loop(s.to_string())),
        }
    }
}

/// A YAML representation of a loop's musical settings.
#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq)]
pub struct LoopSettings {
    /// Beats (quarter notes) per bar.
    beats_per_bar: u32,

    /// The number of bars in one pass of the loop.
    bars: u32,

    /// The tempo of the loop.
    bpm: f64,

    /// Swing amount between 0 (straight) and 1 (full triplet feel).
    #[serde(default)]
    swing: f64,
}

impl LoopSettings {
    /// Creates new loop settings. Use [`LoopSettings::validate`] before handing them to an
    /// engine.
    pub fn new(beats_per_bar: u32, bars: u32, bpm: f64, swing: f64) -> LoopSettings {
        LoopSettings {
            beats_per_bar,
            bars,
            bpm,
            swing,
        }
    }

    /// Gets the beats per bar.
    pub fn beats_per_bar(&self) -> u32 {
        self.beats_per_bar
    }

    /// Gets the number of bars.
    pub fn bars(&self) -> u32 {
        self.bars
    }

    /// Gets the tempo.
    pub fn bpm(&self) -> f64 {
        self.bpm
    }

    /// Gets the swing amount.
    pub fn swing(&self) -> f64 {
        self.swing
    }

    /// Returns a copy with a different tempo.
    pub fn with_bpm(&self, bpm: f64) -> LoopSettings {
        LoopSettings { bpm, ..*self }
    }

    /// Returns a copy with a different length.
    pub fn with_length(&self, beats_per_bar: u32, bars: u32) -> LoopSettings {
        LoopSettings {
            beats_per_bar,
            bars,
            ..*self
        }
    }

    /// Returns a copy with a different swing amount.
    pub fn with_swing(&self, swing: f64) -> LoopSettings {
        LoopSettings { swing, ..*self }
    }

    /// Checks the settings, returning a description of the first problem found.
    pub fn validate(&self) -> Result<(), String> {
        if self.beats_per_bar == 0 {
            return Err("beats per bar must be greater than zero".into());
        }
        if self.bars == 0 {
            return Err("bars must be greater than zero".into());
        }
        if !(self.bpm.is_finite() && self.bpm > 0.0) {
            return Err(format!("bpm must be greater than zero, got {}", self.bpm));
        }
        if !(0.0..=1.0).contains(&self.swing) {
            return Err(format!("swing must be between 0 and 1, got {}", self.swing));
        }
        Ok(())
    }
}

impl Default for LoopSettings {
    fn default() -> Self {
        LoopSettings {
            beats_per_bar: 4,
            bars: 2,
            bpm: 120.0,
            swing: 0.0,
        }
    }
}
