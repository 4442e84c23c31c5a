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

//! Turns press/release pairs into recorded events.
//!
//! Every press sounds. A press only opens a gesture, which becomes an event on release, when
//! the session is playing and recording. The gesture remembers the sample and loop it started
//! in, so switching loops mid-gesture still records into the loop the note was played in.

use std::collections::HashMap;

use tracing::debug;

use crate::config::{LoopId, LoopSettings};
use crate::engine::{Cue, EngineContext};
use crate::events::{SampleEvent, SampleId};
use crate::note::Note;
use crate::router;
use crate::timebase::{self, Ticks};
use crate::transport::ScheduleHandle;

/// Where a press came from. Each input holds at most one note at a time.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum InputId {
    /// A sample's pad.
    Pad(SampleId),
    /// A cell of the pitch grid of the selected sample.
    PitchCell(Note),
    /// A key on the MIDI input, by the note it sent.
    Midi(Note),
}

/// The controls inputs belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Control {
    Pads,
    PitchGrid,
    Midi,
}

impl InputId {
    pub fn control(&self) -> Control {
        match self {
            InputId::Pad(_) => Control::Pads,
            InputId::PitchCell(_) => Control::PitchGrid,
            InputId::Midi(_) => Control::Midi,
        }
    }
}

/// An event produced by a release.
#[derive(Clone, Debug, PartialEq)]
pub struct Committed {
    pub sample: SampleId,
    pub loop_id: LoopId,
    pub event: SampleEvent,
}

/// The recording half of a held note.
struct ActiveGesture {
    loop_id: LoopId,
    /// The loop's settings at press time. Ticks and seconds of the gesture convert with these.
    settings: LoopSettings,
    start_ticks: Ticks,
    pressed_at: f64,
    /// `EngineContext::transport_changes` at press time.
    transport_changes: u64,
}

struct HeldNote {
    serial: u64,
    sample: SampleId,
    note: Note,
    velocity: f32,
    auto_release: Option<ScheduleHandle>,
    gesture: Option<ActiveGesture>,
}

#[derive(Default)]
pub struct Recorder {
    held: HashMap<InputId, HeldNote>,
    next_serial: u64,
}

impl Recorder {
    pub fn new() -> Recorder {
        Recorder::default()
    }

    /// Starts a note. A note already held by the same input is dropped without recording.
    pub fn on_press(
        &mut self,
        ctx: &EngineContext,
        input: InputId,
        sample: &SampleId,
        note: Note,
        velocity: f32,
    ) {
        let Some(settings) = ctx.samples.get(sample) else {
            debug!(sample = sample.as_str(), "Press for unknown sample ignored.");
            return;
        };

        let velocity = if velocity.is_nan() {
            0.0
        } else {
            velocity.clamp(0.0, 1.0)
        };

        let now = ctx.transport.now();
        if let Some(previous) = self.held.remove(&input) {
            debug!(input = ?input, "Re-triggered, discarding the previous gesture.");
            Self::silence(ctx, previous, now);
        }

        ctx.voices
            .attack(sample, note, now, router::start_offset(settings), velocity);

        let gesture = if ctx.transport_state.playing && ctx.transport_state.recording {
            let loop_id = ctx.transport_state.current_loop;
            match ctx.loop_settings(loop_id) {
                Ok(loop_settings) => Some(ActiveGesture {
                    loop_id,
                    settings: *loop_settings,
                    start_ticks: start_ticks(loop_settings, ctx.transport.position_seconds_at(now)),
                    pressed_at: now,
                    transport_changes: ctx.transport_changes,
                }),
                Err(e) => {
                    debug!(err = %e, "Not recording press.");
                    None
                }
            }
        } else {
            None
        };

        self.next_serial += 1;
        let serial = self.next_serial;
        let auto_release = router::playable_duration(settings, note, ctx.reference).map(|delay| {
            let cues = ctx.cues.clone();
            let input = input.clone();
            ctx.transport.schedule_once(
                delay,
                Box::new(move |time| {
                    let cue = Cue::AutoRelease {
                        input: input.clone(),
                        serial,
                        time,
                    };
                    if cues.send(cue).is_err() {
                        debug!("Session is gone, dropping auto release.");
                    }
                }),
            )
        });

        debug!(
            input = ?input,
            sample = sample.as_str(),
            note = %note,
            recording = gesture.is_some(),
            "Press."
        );
        self.held.insert(
            input,
            HeldNote {
                serial,
                sample: sample.clone(),
                note,
                velocity,
                auto_release,
                gesture,
            },
        );
    }

    /// Ends the note held by the input, returning the event to record, if any.
    pub fn on_release(&mut self, ctx: &EngineContext, input: &InputId) -> Option<Committed> {
        let Some(held) = self.held.remove(input) else {
            debug!(input = ?input, "Release without a press ignored.");
            return None;
        };
        Self::finish(ctx, held, ctx.transport.now())
    }

    /// Ends a note whose trimmed region ran out. Stale timers are ignored.
    pub fn on_auto_release(
        &mut self,
        ctx: &EngineContext,
        input: &InputId,
        serial: u64,
        time: f64,
    ) -> Option<Committed> {
        if self.held.get(input).map(|held| held.serial) != Some(serial) {
            debug!(input = ?input, "Stale auto release ignored.");
            return None;
        }
        let held = self.held.remove(input)?;
        Self::finish(ctx, held, time)
    }

    /// Drops every note held by inputs of the control without recording them.
    pub fn invalidate(&mut self, ctx: &EngineContext, control: Control) {
        let now = ctx.transport.now();
        let inputs: Vec<InputId> = self
            .held
            .keys()
            .filter(|input| input.control() == control)
            .cloned()
            .collect();
        for input in inputs {
            if let Some(held) = self.held.remove(&input) {
                Self::silence(ctx, held, now);
            }
        }
    }

    /// Drops every held note without recording.
    pub fn clear(&mut self, ctx: &EngineContext) {
        let now = ctx.transport.now();
        for (_, held) in self.held.drain() {
            Self::silence(ctx, held, now);
        }
    }

    /// Whether the input holds a note.
    pub fn is_held(&self, input: &InputId) -> bool {
        self.held.contains_key(input)
    }

    /// Whether the input holds a note that will be recorded.
    pub fn is_recording(&self, input: &InputId) -> bool {
        self.held
            .get(input)
            .is_some_and(|held| held.gesture.is_some())
    }

    fn finish(ctx: &EngineContext, held: HeldNote, time: f64) -> Option<Committed> {
        if let Some(auto_release) = &held.auto_release {
            auto_release.cancel();
        }
        ctx.voices.release(&held.sample, held.note, time);

        let gesture = held.gesture?;
        if let Err(e) = ctx.loop_settings(gesture.loop_id) {
            debug!(err = %e, "Dropping gesture.");
            return None;
        }
        let Some(settings) = ctx.samples.get(&held.sample) else {
            debug!(sample = held.sample.as_str(), "Sample is gone, dropping gesture.");
            return None;
        };

        let held_for = time - gesture.pressed_at;
        let release = if ctx.transport_changes == gesture.transport_changes {
            ctx.transport.position_seconds_at(time)
        } else {
            // Reconfigured since the press: the transport position is in another loop's time.
            debug!(loop_id = %gesture.loop_id, "Transport changed mid-gesture.");
            elapsed_position(&gesture.settings, gesture.start_ticks, held_for)
        };
        let duration = gesture_duration(
            &gesture.settings,
            gesture.start_ticks,
            release,
            held_for,
            router::playable_duration(settings, held.note, ctx.reference),
            ctx.timing.min_event_duration.as_secs_f64(),
        );

        debug!(
            sample = held.sample.as_str(),
            loop_id = %gesture.loop_id,
            start = gesture.start_ticks,
            duration,
            "Recorded event."
        );
        Some(Committed {
            sample: held.sample,
            loop_id: gesture.loop_id,
            event: SampleEvent::new(gesture.start_ticks, duration, held.note, held.velocity),
        })
    }

    fn silence(ctx: &EngineContext, held: HeldNote, now: f64) {
        if let Some(auto_release) = held.auto_release {
            auto_release.cancel();
        }
        ctx.voices.release(&held.sample, held.note, now);
    }
}

/// The tick a gesture pressed at `position` seconds into the loop starts on.
fn start_ticks(loop_settings: &LoopSettings, position: f64) -> Ticks {
    timebase::seconds_to_ticks(loop_settings, position) % timebase::loop_ticks(loop_settings)
}

/// The loop position `held_for` seconds after `start_ticks`, wrapped into the loop.
fn elapsed_position(loop_settings: &LoopSettings, start_ticks: Ticks, held_for: f64) -> f64 {
    (timebase::ticks_to_seconds(loop_settings, start_ticks) + held_for.max(0.0))
        .rem_euclid(timebase::loop_end_seconds(loop_settings))
}

/// Works out how long a gesture lasted.
///
/// `release` is the loop position at release. If it is after the start the gesture stayed in
/// one pass of the loop; otherwise it crossed the loop end, and the time after the seam is
/// added to the time before it. `held_for` is the elapsed time on the monotonic clock. It tells
/// a zero-length tap from a wrap, and caps gestures held for a whole loop or more at one loop.
/// The result never exceeds the playable length of the trimmed sample and never falls below
/// `minimum`.
pub fn gesture_duration(
    loop_settings: &LoopSettings,
    start_ticks: Ticks,
    release: f64,
    held_for: f64,
    playable: Option<f64>,
    minimum: f64,
) -> f64 {
    let loop_end = timebase::loop_end_seconds(loop_settings);
    let start = timebase::ticks_to_seconds(loop_settings, start_ticks);

    let mut duration = if held_for >= loop_end {
        loop_end
    } else if release > start {
        release - start
    } else if held_for < loop_end - start {
        // Released at or before the start without reaching the seam.
        release - start
    } else {
        loop_end - start + release
    };

    if let Some(playable) = playable {
        duration = duration.min(playable);
    }
    if duration >= minimum {
        duration
    } else {
        minimum
    }
}
