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

//! Snaps times to the nearest boundary of a quantize unit.
//!
//! The loop is a cycle: a time that snaps onto (or past) the loop end is wrapped to the loop
//! start, so there is never a second event "at the end" duplicating one at zero.

use crate::config::LoopSettings;
use crate::timebase::{self, Subdivision, Ticks};

/// Relative tolerance used when comparing a snapped time in seconds to the loop end.
const END_TOLERANCE: f64 = 1e-9;

/// A quantizer for one loop and one quantize unit.
#[derive(Clone, Copy, Debug)]
pub struct Quantizer {
    settings: LoopSettings,
    unit: Subdivision,
}

impl Quantizer {
    /// Creates a quantizer snapping to `unit` within the loop described by `settings`.
    pub fn new(settings: &LoopSettings, unit: Subdivision) -> Quantizer {
        Quantizer {
            settings: *settings,
            unit,
        }
    }

    /// Gets the quantize unit.
    pub fn unit(&self) -> Subdivision {
        self.unit
    }

    /// Snaps a tick position.
    pub fn snap_ticks(&self, ticks: Ticks) -> Ticks {
        let unit = self.unit.ticks() as f64;
        let snapped = ((ticks as f64 / unit).round() * unit).round() as Ticks;
        if snapped >= timebase::loop_ticks(&self.settings) {
            0
        } else {
            snapped
        }
    }

    /// Snaps a position in seconds.
    pub fn snap_seconds(&self, seconds: f64) -> f64 {
        let unit = self.unit.beats() * timebase::seconds_per_beat(&self.settings);
        let snapped = (seconds / unit).round() * unit;
        let loop_end = timebase::loop_end_seconds(&self.settings);
        if snapped >= loop_end * (1.0 - END_TOLERANCE) {
            0.0
        } else {
            snapped.max(0.0)
        }
    }

    /// Snaps a (possibly fractional) column of the `grid` subdivision, returning the column.
    pub fn snap_column(&self, column: f64, grid: Subdivision) -> usize {
        let unit = self.unit.beats() * grid.cells_per_beat();
        let snapped = ((column / unit).round() * unit).round();
        let total = timebase::total_columns(&self.settings, grid);
        if snapped < 0.0 || snapped as usize >= total {
            0
        } else {
            snapped as usize
        }
    }
}
