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

use parking_lot::Mutex;
use tracing::debug;

use super::{timeline::Timeline, Callback, ScheduleHandle};

/// Anything scheduled within this distance of "now" counts as due.
const DUE_EPSILON: f64 = 1e-9;

struct State {
    now: f64,
    lookahead: f64,
    timeline: Timeline,
}

/// A transport whose clock only moves when told to. Used by tests and the simulate command.
pub struct Transport {
    name: String,
    state: Mutex<State>,
}

impl Transport {
    /// Creates a stopped mock transport at time zero, 120 bpm with an 8 second loop.
    pub fn new(name: &str) -> Transport {
        Transport::with_lookahead(name, 0.0)
    }

    /// Creates a mock transport that fires callbacks up to `lookahead` seconds ahead of its
    /// clock, the way the real-time clock does.
    pub fn with_lookahead(name: &str, lookahead: f64) -> Transport {
        Transport {
            name: name.to_string(),
            state: Mutex::new(State {
                now: 0.0,
                lookahead: lookahead.max(0.0),
                timeline: Timeline::new(120.0, 8.0),
            }),
        }
    }

    /// Moves the clock forward, firing everything that comes due on the way.
    pub fn advance(&self, seconds: f64) {
        let mut state = self.state.lock();
        let to = state.now + seconds.max(0.0);
        Self::advance_locked(&mut state, to);
    }

    /// Moves the clock to the given time, if it's in the future.
    pub fn advance_to(&self, time: f64) {
        let mut state = self.state.lock();
        Self::advance_locked(&mut state, time);
    }

    /// The number of callbacks waiting to fire.
    pub fn pending(&self) -> usize {
        self.state.lock().timeline.pending()
    }

    fn advance_locked(state: &mut State, to: f64) {
        if to < state.now {
            return;
        }
        state.now = to;
        let until = to + state.lookahead + DUE_EPSILON;
        state.timeline.fire_until(until);
    }
}

impl super::Transport for Transport {
    fn start(&self) {
        let mut state = self.state.lock();
        let now = state.now;
        state.timeline.start(now);
        debug!(transport = self.name, now, "Started.");
        // Anything at the top of the loop is due immediately.
        let until = now + state.lookahead + DUE_EPSILON;
        state.timeline.fire_until(until);
    }

    fn stop(&self) {
        self.state.lock().timeline.stop();
        debug!(transport = self.name, "Stopped.");
    }

    fn is_running(&self) -> bool {
        self.state.lock().timeline.is_running()
    }

    fn configure(&self, bpm: f64, loop_end: f64) {
        let mut state = self.state.lock();
        let now = state.now;
        state.timeline.configure(now, bpm, loop_end);
    }

    fn bpm(&self) -> f64 {
        self.state.lock().timeline.bpm()
    }

    fn now(&self) -> f64 {
        self.state.lock().now
    }

    fn position_seconds_at(&self, time: f64) -> f64 {
        self.state.lock().timeline.position(time)
    }

    fn loop_end_seconds(&self) -> f64 {
        self.state.lock().timeline.loop_end()
    }

    fn schedule_at(&self, loop_seconds: f64, callback: Callback) -> ScheduleHandle {
        self.state.lock().timeline.schedule_at(loop_seconds, callback)
    }

    fn schedule_once(&self, delay: f64, callback: Callback) -> ScheduleHandle {
        let mut state = self.state.lock();
        let at = state.now + delay.max(0.0);
        state.timeline.schedule_once(at, callback)
    }
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name)
    }
}
