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
use std::fmt;

use tracing::info;

use crate::events::SampleId;
use crate::note::Note;
use crate::router::Route;

/// A voice device that logs what it would play.
pub struct Device {
    name: String,
}

impl Device {
    pub fn new(name: &str) -> Device {
        Device {
            name: name.to_string(),
        }
    }
}

impl super::Device for Device {
    fn attack(&self, sample: &SampleId, note: Note, time: f64, offset: f64, velocity: f32) {
        info!(
            device = self.name,
            sample = sample.as_str(),
            note = note.to_string(),
            time,
            offset,
            velocity,
            "Attack."
        );
    }

    fn release(&self, sample: &SampleId, note: Note, time: f64) {
        info!(
            device = self.name,
            sample = sample.as_str(),
            note = note.to_string(),
            time,
            "Release."
        );
    }

    fn route(&self, sample: &SampleId, route: &Route) {
        info!(
            device = self.name,
            sample = sample.as_str(),
            gain = route.gain,
            volume_db = route.volume_db,
            pan = route.pan,
            pitch = route.pitch,
            reverse = route.reverse,
            filters = route.filters.len(),
            "Route."
        );
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Log)", self.name)
    }
}
