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

//! Plays recorded events back against the transport.
//!
//! Each (sample, loop) pair is a lane. Scheduling a lane cancels whatever it had registered and
//! registers one repeating transport callback per event. The callbacks only post a [`Cue`]; the
//! session hands the cue back to [`Scheduler::on_cue`], which checks that nothing it refers to
//! has gone stale before touching the voice device.

use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use tracing::{debug, warn};

use crate::config::{LoopId, LoopSettings, SampleSettings};
use crate::engine::{Cue, EngineContext};
use crate::events::{SampleEvent, SampleId};
use crate::note::Note;
use crate::quantize::Quantizer;
use crate::router;
use crate::timebase::{self, Ticks, TICKS_PER_BEAT};
use crate::transport::ScheduleHandle;

/// The playback state of a lane.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PlaybackState {
    /// Nothing registered.
    #[default]
    Idle,
    /// Callbacks registered, none fired yet.
    Scheduled,
    /// At least one callback has fired since scheduling.
    Playing,
}

/// An event placed on the loop, ready to register.
#[derive(Clone, Debug, PartialEq)]
pub struct PlannedCue {
    /// The effective start, after quantization.
    pub start_ticks: Ticks,
    /// Where in the loop the cue fires, in seconds, after swing.
    pub position: f64,
    pub event: SampleEvent,
}

/// Places a lane's events on the loop: quantizes if the sample asks for it, drops repeated
/// (start, note) pairs keeping the first, applies swing and sorts by time. Events that start
/// past the end of the loop (the loop was shortened after recording) are skipped.
pub fn plan(
    loop_settings: &LoopSettings,
    sample: &SampleSettings,
    events: &[SampleEvent],
) -> Vec<PlannedCue> {
    let loop_ticks = timebase::loop_ticks(loop_settings);
    let quantizer = Quantizer::new(loop_settings, sample.quantize_unit);

    let mut seen: HashSet<(Ticks, Note)> = HashSet::new();
    let mut planned: Vec<PlannedCue> = Vec::with_capacity(events.len());
    for event in events {
        if event.start_time >= loop_ticks {
            continue;
        }

        let start_ticks = if sample.quantize {
            quantizer.snap_ticks(event.start_time)
        } else {
            event.start_time
        };

        if !seen.insert((start_ticks, event.note)) {
            continue;
        }

        planned.push(PlannedCue {
            start_ticks,
            position: timebase::ticks_to_seconds(loop_settings, start_ticks)
                + swing_offset(loop_settings, start_ticks),
            event: *event,
        });
    }

    planned.sort_by(|a, b| a.position.total_cmp(&b.position));
    planned
}

/// How far swing delays a start. Within each pair of eighth notes the delay follows a half sine,
/// peaking at the off-beat eighth at a third of an eighth note times the swing amount.
pub fn swing_offset(loop_settings: &LoopSettings, ticks: Ticks) -> f64 {
    if loop_settings.swing() <= 0.0 {
        return 0.0;
    }

    let progress = (ticks % TICKS_PER_BEAT) as f64 / TICKS_PER_BEAT as f64;
    let eighth = timebase::seconds_per_beat(loop_settings) / 2.0;
    (PI * progress).sin() * loop_settings.swing() * eighth / 3.0
}

#[derive(Default)]
struct Lane {
    handles: Vec<ScheduleHandle>,
    epoch: u64,
    state: PlaybackState,
}

impl Lane {
    fn cancel(&mut self, next_epoch: u64) {
        for handle in self.handles.drain(..) {
            handle.cancel();
        }
        self.epoch = next_epoch;
        self.state = PlaybackState::Idle;
    }
}

/// A voice started by the scheduler that may still be sounding.
struct Sounding {
    sample: SampleId,
    note: Note,
    from: f64,
    until: f64,
}

#[derive(Default)]
pub struct Scheduler {
    lanes: HashMap<(SampleId, LoopId), Lane>,
    next_epoch: u64,
    sounding: Vec<Sounding>,
}

impl Scheduler {
    pub fn new() -> Scheduler {
        Scheduler::default()
    }

    /// Re-registers the lane of the sample in the loop. Only the active loop of a playing
    /// session gets callbacks; anything else ends up idle.
    pub fn schedule(&mut self, ctx: &EngineContext, sample: &SampleId, loop_id: LoopId) {
        let epoch = self.bump_epoch();
        let lane = self.lanes.entry((sample.clone(), loop_id)).or_default();
        lane.cancel(epoch);

        if !ctx.is_playing(loop_id) {
            return;
        }

        let loop_settings = match ctx.loop_settings(loop_id) {
            Ok(loop_settings) => loop_settings,
            Err(e) => {
                warn!(err = %e, "Not scheduling lane.");
                return;
            }
        };
        let (settings, generation) =
            match (ctx.samples.get(sample), ctx.samples.generation(sample)) {
                (Some(settings), Some(generation)) => (settings, generation),
                _ => {
                    debug!(sample = sample.as_str(), "Sample is gone, not scheduling.");
                    return;
                }
            };

        let planned = plan(loop_settings, settings, ctx.store.events(sample, loop_id));
        for cue in planned {
            let cues = ctx.cues.clone();
            let sample = sample.clone();
            let event = cue.event;
            let handle = ctx.transport.schedule_at(
                cue.position,
                Box::new(move |time| {
                    let cue = Cue::Play {
                        sample: sample.clone(),
                        generation,
                        loop_id,
                        epoch,
                        event,
                        time,
                    };
                    if cues.send(cue).is_err() {
                        debug!("Session is gone, dropping cue.");
                    }
                }),
            );
            lane.handles.push(handle);
        }

        if !lane.handles.is_empty() {
            lane.state = PlaybackState::Scheduled;
        }
        debug!(
            sample = sample.as_str(),
            loop_id = %loop_id,
            cues = lane.handles.len(),
            "Scheduled lane."
        );
    }

    /// Re-registers every lane of the loop.
    pub fn schedule_loop(&mut self, ctx: &EngineContext, loop_id: LoopId) {
        let mut samples: HashSet<SampleId> = ctx.samples.ids().into_iter().collect();
        samples.extend(
            self.lanes
                .keys()
                .filter(|(_, lane_loop)| *lane_loop == loop_id)
                .map(|(sample, _)| sample.clone()),
        );

        for sample in samples {
            self.schedule(ctx, &sample, loop_id);
        }
    }

    /// Cancels every lane of the loop.
    pub fn cancel_loop(&mut self, loop_id: LoopId) {
        let epoch = self.bump_epoch();
        for ((_, lane_loop), lane) in self.lanes.iter_mut() {
            if *lane_loop == loop_id {
                lane.cancel(epoch);
            }
        }
    }

    /// Cancels the lanes of the sample in every loop.
    pub fn cancel_sample(&mut self, sample: &SampleId) {
        let epoch = self.bump_epoch();
        for ((lane_sample, _), lane) in self.lanes.iter_mut() {
            if lane_sample == sample {
                lane.cancel(epoch);
            }
        }
    }

    /// Cancels everything and releases every voice that may still be sounding at `now`. Cues
    /// fire ahead of the clock, so a voice may not have started yet; it is released at its own
    /// attack time instead.
    pub fn stop(&mut self, ctx: &EngineContext, now: f64) {
        let epoch = self.bump_epoch();
        for lane in self.lanes.values_mut() {
            lane.cancel(epoch);
        }

        for voice in self.sounding.drain(..) {
            if voice.until > now {
                ctx.voices
                    .release(&voice.sample, voice.note, now.max(voice.from));
            }
        }
    }

    /// Plays a cue, unless it has gone stale: the transport stopped or moved to another loop, the
    /// lane was rescheduled, or the sample was removed or replaced.
    pub fn on_cue(&mut self, ctx: &EngineContext, cue: &Cue) {
        let Cue::Play {
            sample,
            generation,
            loop_id,
            epoch,
            event,
            time,
        } = cue
        else {
            return;
        };

        if !ctx.is_playing(*loop_id) {
            debug!(sample = sample.as_str(), "Loop isn't playing, dropping cue.");
            return;
        }
        let lane = match self.lanes.get_mut(&(sample.clone(), *loop_id)) {
            Some(lane) if lane.epoch == *epoch => lane,
            _ => {
                debug!(sample = sample.as_str(), "Lane was rescheduled, dropping cue.");
                return;
            }
        };
        let settings = match ctx.samples.get(sample) {
            Some(settings) if ctx.samples.generation(sample) == Some(*generation) => settings,
            _ => {
                debug!(sample = sample.as_str(), "Sample changed, dropping cue.");
                return;
            }
        };

        let mut duration = event.duration.max(0.0);
        if let Some(playable) = router::playable_duration(settings, event.note, ctx.reference) {
            duration = duration.min(playable);
        }
        let offset = router::start_offset(settings);

        ctx.voices
            .attack(sample, event.note, *time, offset, event.velocity);
        ctx.voices.release(sample, event.note, *time + duration);
        lane.state = PlaybackState::Playing;

        self.sounding.retain(|voice| voice.until > *time);
        self.sounding.push(Sounding {
            sample: sample.clone(),
            note: event.note,
            from: *time,
            until: *time + duration,
        });
    }

    /// The state of the lane of the sample in the loop.
    pub fn state(&self, sample: &SampleId, loop_id: LoopId) -> PlaybackState {
        self.lanes
            .get(&(sample.clone(), loop_id))
            .map(|lane| lane.state)
            .unwrap_or_default()
    }

    /// The number of live callbacks registered for the lane.
    pub fn pending(&self, sample: &SampleId, loop_id: LoopId) -> usize {
        self.lanes
            .get(&(sample.clone(), loop_id))
            .map(|lane| lane.handles.iter().filter(|h| !h.is_cancelled()).count())
            .unwrap_or(0)
    }

    fn bump_epoch(&mut self) -> u64 {
        self.next_epoch += 1;
        self.next_epoch
    }
}
