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

//! Conversions between the three time representations used by the engine.
//!
//! - Ticks: integer musical time, [`TICKS_PER_BEAT`] per quarter note. Event start times are
//!   stored in ticks so they survive tempo changes.
//! - Seconds: wall-clock time within the loop, derived from the loop's own bpm.
//! - Columns: discrete grid cells of a [`Subdivision`].
//!
//! Every function here is pure and takes the loop's settings explicitly. The loop's bpm is
//! always used rather than the transport's, so that a loop whose settings differ from a
//! transport that hasn't re-synced yet doesn't drift.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::config::LoopSettings;
use crate::error::ParseError;

/// Musical time in ticks.
pub type Ticks = u64;

/// Ticks per beat (quarter note). Every supported subdivision is a whole number of ticks.
pub const TICKS_PER_BEAT: Ticks = 192;

/// Absorbs float error when flooring a time into a column.
const COLUMN_EPSILON: f64 = 1e-6;

/// The finest supported subdivision.
const MAX_DIVISION: u32 = 64;

/// A grid resolution or quantize unit: "4n" is a quarter note, "8t" an eighth-note triplet.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Subdivision {
    division: u32,
    triplet: bool,
}

impl Subdivision {
    pub const QUARTER: Subdivision = Subdivision {
        division: 4,
        triplet: false,
    };
    pub const EIGHTH: Subdivision = Subdivision {
        division: 8,
        triplet: false,
    };
    pub const SIXTEENTH: Subdivision = Subdivision {
        division: 16,
        triplet: false,
    };
    pub const THIRTY_SECOND: Subdivision = Subdivision {
        division: 32,
        triplet: false,
    };

    /// Creates a subdivision. The division must be a power of two between 1 and 64.
    pub fn new(division: u32, triplet: bool) -> Result<Subdivision, ParseError> {
        if !division.is_power_of_two() || division > MAX_DIVISION {
            return Err(ParseError::Subdivision(format!(
                "{}{}",
                division,
                if triplet { 't' } else { 'n' }
            )));
        }
        Ok(Subdivision { division, triplet })
    }

    /// Gets the note division (4 for quarter notes, 8 for eighths, ...).
    pub fn division(&self) -> u32 {
        self.division
    }

    /// Whether this is a triplet subdivision.
    pub fn is_triplet(&self) -> bool {
        self.triplet
    }

    /// How many cells of this subdivision fit in one beat.
    pub fn cells_per_beat(&self) -> f64 {
        let cells = f64::from(self.division) / 4.0;
        if self.triplet {
            cells * 1.5
        } else {
            cells
        }
    }

    /// The length of one cell in beats.
    pub fn beats(&self) -> f64 {
        1.0 / self.cells_per_beat()
    }

    /// The length of one cell in ticks.
    pub fn ticks(&self) -> Ticks {
        (TICKS_PER_BEAT as f64 * self.beats()).round() as Ticks
    }

    /// Lists every supported subdivision, plain and triplet.
    pub fn all() -> Vec<Subdivision> {
        let mut all = Vec::new();
        let mut division = 1;
        while division <= MAX_DIVISION {
            all.push(Subdivision {
                division,
                triplet: false,
            });
            all.push(Subdivision {
                division,
                triplet: true,
            });
            division *= 2;
        }
        all
    }
}

impl fmt::Display for Subdivision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}",
            self.division,
            if self.triplet { 't' } else { 'n' }
        )
    }
}

impl FromStr for Subdivision {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (number, triplet) = if let Some(number) = trimmed.strip_suffix('n') {
            (number, false)
        } else if let Some(number) = trimmed.strip_suffix('t') {
            (number, true)
        } else {
            return Err(ParseError::Subdivision(s.to_string()));
        };

        let division = number
            .parse::<u32>()
            .map_err(|_| ParseError::Subdivision(s.to_string()))?;
        Subdivision::new(division, triplet).map_err(|_| ParseError::Subdivision(s.to_string()))
    }
}

impl TryFrom<String> for Subdivision {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Subdivision> for String {
    fn from(subdivision: Subdivision) -> Self {
        subdivision.to_string()
    }
}

/// Seconds per beat at the loop's bpm.
pub fn seconds_per_beat(settings: &LoopSettings) -> f64 {
    60.0 / settings.bpm()
}

/// The number of beats in one pass of the loop.
pub fn loop_beats(settings: &LoopSettings) -> u64 {
    u64::from(settings.bars()) * u64::from(settings.beats_per_bar())
}

/// The length of one pass of the loop in ticks.
pub fn loop_ticks(settings: &LoopSettings) -> Ticks {
    loop_beats(settings) * TICKS_PER_BEAT
}

/// The length of one pass of the loop in seconds.
pub fn loop_end_seconds(settings: &LoopSettings) -> f64 {
    loop_beats(settings) as f64 * seconds_per_beat(settings)
}

/// The length of one grid cell in seconds.
pub fn cell_duration_seconds(settings: &LoopSettings, subdivision: Subdivision) -> f64 {
    seconds_per_beat(settings) / subdivision.cells_per_beat()
}

/// The number of grid columns in one pass of the loop.
pub fn total_columns(settings: &LoopSettings, subdivision: Subdivision) -> usize {
    (loop_beats(settings) as f64 * subdivision.cells_per_beat()).floor() as usize
}

/// Converts ticks to seconds at the loop's bpm.
pub fn ticks_to_seconds(settings: &LoopSettings, ticks: Ticks) -> f64 {
    fractional_ticks_to_seconds(settings, ticks as f64)
}

/// Converts a fractional tick count to seconds at the loop's bpm.
pub fn fractional_ticks_to_seconds(settings: &LoopSettings, ticks: f64) -> f64 {
    ticks / TICKS_PER_BEAT as f64 * seconds_per_beat(settings)
}

/// Converts seconds to the nearest tick at the loop's bpm. Negative times map to zero.
pub fn seconds_to_ticks(settings: &LoopSettings, seconds: f64) -> Ticks {
    (seconds.max(0.0) / seconds_per_beat(settings) * TICKS_PER_BEAT as f64).round() as Ticks
}

/// Converts ticks to the grid column containing them, clamped to the loop.
pub fn ticks_to_column(settings: &LoopSettings, subdivision: Subdivision, ticks: Ticks) -> usize {
    let total = total_columns(settings, subdivision);
    if total == 0 {
        return 0;
    }

    let column = (ticks_to_seconds(settings, ticks) / cell_duration_seconds(settings, subdivision)
        + COLUMN_EPSILON)
        .floor();
    (column.max(0.0) as usize).min(total - 1)
}

/// Converts a grid column to the tick at its start, rounded to the nearest tick.
pub fn column_to_ticks(settings: &LoopSettings, subdivision: Subdivision, column: usize) -> Ticks {
    seconds_to_ticks(
        settings,
        column as f64 * cell_duration_seconds(settings, subdivision),
    )
}
