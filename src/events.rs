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
use std::{collections::BTreeMap, fmt};

use serde::{Deserialize, Serialize};

use crate::config::LoopId;
use crate::note::Note;
use crate::timebase::Ticks;

/// Identifies a loaded sample.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SampleId(String);

impl SampleId {
    pub fn new(id: &str) -> SampleId {
        SampleId(id.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SampleId {
    fn from(id: &str) -> Self {
        SampleId::new(id)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A recorded note: when it starts within the loop, how long it sounds, and how.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct SampleEvent {
    /// Start within the loop, in ticks.
    pub start_time: Ticks,

    /// How long the note sounds, in seconds.
    pub duration: f64,

    /// The played note, relative to the session's reference note: the reference plays the
    /// sample at its natural rate. Pads always record the reference.
    pub note: Note,

    /// Velocity from 0 to 1.
    pub velocity: f32,
}

impl SampleEvent {
    pub fn new(start_time: Ticks, duration: f64, note: Note, velocity: f32) -> SampleEvent {
        SampleEvent {
            start_time,
            duration,
            note,
            velocity,
        }
    }
}

/// Recorded events for every sample and loop, in insertion order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EventStore {
    events: BTreeMap<SampleId, BTreeMap<LoopId, Vec<SampleEvent>>>,
}

impl EventStore {
    pub fn new() -> EventStore {
        EventStore::default()
    }

    /// Appends an event to the end of the sample's list for the loop.
    pub fn append(&mut self, sample: &SampleId, loop_id: LoopId, event: SampleEvent) {
        self.events
            .entry(sample.clone())
            .or_default()
            .entry(loop_id)
            .or_default()
            .push(event);
    }

    /// The events of the sample in the loop. Empty if nothing was recorded.
    pub fn events(&self, sample: &SampleId, loop_id: LoopId) -> &[SampleEvent] {
        self.events
            .get(sample)
            .and_then(|loops| loops.get(&loop_id))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Replaces the start time and duration of one event together. Returns false if there is
    /// no such event.
    pub fn edit(
        &mut self,
        sample: &SampleId,
        loop_id: LoopId,
        index: usize,
        start_time: Ticks,
        duration: f64,
    ) -> bool {
        match self.event_mut(sample, loop_id, index) {
            Some(event) => {
                event.start_time = start_time;
                event.duration = duration;
                true
            }
            None => false,
        }
    }

    /// Removes one event, returning it.
    pub fn remove(
        &mut self,
        sample: &SampleId,
        loop_id: LoopId,
        index: usize,
    ) -> Option<SampleEvent> {
        let events = self.events.get_mut(sample)?.get_mut(&loop_id)?;
        (index < events.len()).then(|| events.remove(index))
    }

    /// Removes every event recorded into the loop, across all samples.
    pub fn clear_loop(&mut self, loop_id: LoopId) {
        for loops in self.events.values_mut() {
            loops.remove(&loop_id);
        }
        self.events.retain(|_, loops| !loops.is_empty());
    }

    /// Removes every event of the sample.
    pub fn remove_sample(&mut self, sample: &SampleId) {
        self.events.remove(sample);
    }

    /// The samples with events in the loop.
    pub fn samples_in(&self, loop_id: LoopId) -> Vec<SampleId> {
        self.events
            .iter()
            .filter(|(_, loops)| loops.get(&loop_id).is_some_and(|events| !events.is_empty()))
            .map(|(sample, _)| sample.clone())
            .collect()
    }

    /// The total number of events.
    pub fn len(&self) -> usize {
        self.events
            .values()
            .flat_map(|loops| loops.values())
            .map(Vec::len)
            .sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the store into its serializable form.
    pub fn to_map(&self) -> BTreeMap<SampleId, BTreeMap<LoopId, Vec<SampleEvent>>> {
        self.events.clone()
    }

    /// Builds a store from its serializable form.
    pub fn from_map(events: BTreeMap<SampleId, BTreeMap<LoopId, Vec<SampleEvent>>>) -> EventStore {
        EventStore { events }
    }

    fn event_mut(
        &mut self,
        sample: &SampleId,
        loop_id: LoopId,
        index: usize,
    ) -> Option<&mut SampleEvent> {
        self.events.get_mut(sample)?.get_mut(&loop_id)?.get_mut(index)
    }
}
