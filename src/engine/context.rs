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
use std::{collections::BTreeMap, sync::Arc};

use crossbeam_channel::Sender;

use super::table::SampleTable;
use crate::config::{LoopId, LoopSettings, SampleSettings, Timing};
use crate::error::EngineError;
use crate::events::{EventStore, SampleEvent, SampleId};
use crate::note::Note;
use crate::recorder::InputId;
use crate::transport::Transport;
use crate::voice;

/// Whether the session is playing, recording, and which loop is active.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransportState {
    pub current_loop: LoopId,
    pub playing: bool,
    pub recording: bool,
}

impl Default for TransportState {
    fn default() -> Self {
        TransportState {
            current_loop: LoopId::A,
            playing: false,
            recording: false,
        }
    }
}

/// Work posted by transport callbacks, applied by the session on its own thread.
#[derive(Clone, Debug, PartialEq)]
pub enum Cue {
    /// A recorded event is due.
    Play {
        sample: SampleId,
        /// The sample's generation when the cue was scheduled.
        generation: u64,
        loop_id: LoopId,
        /// The lane epoch when the cue was scheduled.
        epoch: u64,
        event: SampleEvent,
        time: f64,
    },

    /// A held note reached the end of its trimmed region.
    AutoRelease {
        input: InputId,
        serial: u64,
        time: f64,
    },
}

/// All mutable engine state. Owned by a [`super::Session`] and lent to the recorder and the
/// scheduler for the duration of each operation.
pub struct EngineContext {
    pub transport_state: TransportState,
    /// Bumped every time the transport's tempo or loop length is reconfigured.
    pub transport_changes: u64,
    pub loops: BTreeMap<LoopId, LoopSettings>,
    pub samples: SampleTable,
    pub store: EventStore,
    pub selected_sample: Option<SampleId>,

    /// The note voices play at the sample's natural rate.
    pub reference: Note,
    pub timing: Timing,

    pub transport: Arc<dyn Transport>,
    pub voices: Arc<dyn voice::Device>,
    pub cues: Sender<Cue>,
}

impl EngineContext {
    /// Reads the settings of a loop. Loops are initialized when the session is created, so a
    /// missing loop is a programming error and is reported rather than defaulted.
    pub fn loop_settings(&self, loop_id: LoopId) -> Result<&LoopSettings, EngineError> {
        self.loops
            .get(&loop_id)
            .ok_or(EngineError::LoopNotInitialized(loop_id))
    }

    pub fn sample_settings(&self, sample: &SampleId) -> Result<&SampleSettings, EngineError> {
        self.samples
            .get(sample)
            .ok_or_else(|| EngineError::UnknownSample(sample.clone()))
    }

    /// Whether loop-relative playback of the loop is live right now.
    pub fn is_playing(&self, loop_id: LoopId) -> bool {
        self.transport_state.playing && self.transport_state.current_loop == loop_id
    }
}
