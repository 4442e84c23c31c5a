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
use std::{fmt, sync::Arc};

use crate::events::SampleId;
use crate::note::Note;
use crate::router::Route;

pub mod log;
pub mod mock;

/// Something that turns samples into sound. Times are on the transport's monotonic clock and
/// may be slightly in the future.
pub trait Device: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts a voice of the sample at the given note, playing from `offset` seconds into the
    /// sample.
    fn attack(&self, sample: &SampleId, note: Note, time: f64, offset: f64, velocity: f32);

    /// Releases the voice of the sample at the given note.
    fn release(&self, sample: &SampleId, note: Note, time: f64);

    /// Replaces the output route of the sample.
    fn route(&self, sample: &SampleId, route: &Route);
}

/// Gets a voice device by name. Names starting with "mock" get a mock device.
pub fn get_device(name: &str) -> Arc<dyn Device> {
    if name.starts_with("mock") {
        return Arc::new(mock::Device::get(name));
    }

    Arc::new(log::Device::new(name))
}
