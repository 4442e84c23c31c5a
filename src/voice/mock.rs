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

use parking_lot::Mutex;

use crate::events::SampleId;
use crate::note::Note;
use crate::router::Route;

/// A call made to the mock device.
#[derive(Clone, Debug, PartialEq)]
pub enum Call {
    Attack {
        sample: SampleId,
        note: Note,
        time: f64,
        offset: f64,
        velocity: f32,
    },
    Release {
        sample: SampleId,
        note: Note,
        time: f64,
    },
    Route {
        sample: SampleId,
        route: Route,
    },
}

/// A mock device. Doesn't play anything, only records the calls made to it.
#[derive(Clone)]
pub struct Device {
    name: String,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every call made so far, in order.
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    /// The attacks made so far as (sample, note, time).
    pub fn attacks(&self) -> Vec<(SampleId, Note, f64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Attack {
                    sample, note, time, ..
                } => Some((sample.clone(), *note, *time)),
                _ => None,
            })
            .collect()
    }

    /// The releases made so far as (sample, note, time).
    pub fn releases(&self) -> Vec<(SampleId, Note, f64)> {
        self.calls
            .lock()
            .iter()
            .filter_map(|call| match call {
                Call::Release { sample, note, time } => Some((sample.clone(), *note, *time)),
                _ => None,
            })
            .collect()
    }

    /// The last route pushed for the sample.
    pub fn route_for(&self, sample: &SampleId) -> Option<Route> {
        self.calls.lock().iter().rev().find_map(|call| match call {
            Call::Route { sample: routed, route } if routed == sample => Some(route.clone()),
            _ => None,
        })
    }

    /// Forgets every call made so far.
    pub fn clear(&self) {
        self.calls.lock().clear();
    }
}

impl super::Device for Device {
    fn attack(&self, sample: &SampleId, note: Note, time: f64, offset: f64, velocity: f32) {
        self.calls.lock().push(Call::Attack {
            sample: sample.clone(),
            note,
            time,
            offset,
            velocity,
        });
    }

    fn release(&self, sample: &SampleId, note: Note, time: f64) {
        self.calls.lock().push(Call::Release {
            sample: sample.clone(),
            note,
            time,
        });
    }

    fn route(&self, sample: &SampleId, route: &Route) {
        self.calls.lock().push(Call::Route {
            sample: sample.clone(),
            route: route.clone(),
        });
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
