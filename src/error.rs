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
use crate::config::LoopId;
use crate::events::SampleId;

/// Errors produced when parsing the textual forms of engine values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    #[error("Invalid subdivision '{0}', expected something like 8n or 16t")]
    Subdivision(String),

    #[error("Invalid note name '{0}'")]
    Note(String),

    #[error("Invalid loop '{0}', expected one of A, B, C or D")]
    Loop(String),
}

/// Errors returned to the collaborator driving the engine.
///
/// Hot-path problems (stale cues, missing settings during playback, odd durations) never
/// surface here. They are logged and dropped.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Loop {0} has not been initialized")]
    LoopNotInitialized(LoopId),

    #[error("Invalid settings for loop {0}: {1}")]
    InvalidLoopSettings(LoopId, String),

    #[error("Invalid settings for sample {0}: {1}")]
    InvalidSampleSettings(SampleId, String),

    #[error("Unknown sample {0}")]
    UnknownSample(SampleId),

    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Sample {sample} has no event {index} in loop {loop_id}")]
    EventOutOfRange {
        sample: SampleId,
        loop_id: LoopId,
        index: usize,
    },
}
