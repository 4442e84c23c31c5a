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

use crate::playsync::CancelHandle;
use crate::timebase::{Ticks, TICKS_PER_BEAT};

pub mod clock;
pub mod mock;
mod timeline;

/// A scheduled callback. It receives the time the callback was scheduled for, on the
/// transport's monotonic clock, which may be slightly ahead of [`Transport::now`].
///
/// Callbacks run on the transport's thread with its internal lock held, so they must not call
/// back into the transport. Post the work somewhere instead.
pub type Callback = Box<dyn FnMut(f64) + Send>;

/// A handle to a scheduled callback.
#[derive(Clone)]
pub struct ScheduleHandle {
    id: u64,
    cancel_handle: CancelHandle,
}

impl ScheduleHandle {
    pub(crate) fn new(id: u64, cancel_handle: CancelHandle) -> ScheduleHandle {
        ScheduleHandle { id, cancel_handle }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Prevents any further invocation of the callback.
    pub fn cancel(&self) {
        self.cancel_handle.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel_handle.is_cancelled()
    }
}

impl fmt::Debug for ScheduleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScheduleHandle")
            .field("id", &self.id)
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

/// The transport clock. Times are in seconds; "now" is a monotonic clock, "position" is the
/// offset within the current pass of the loop.
pub trait Transport: fmt::Display + std::marker::Send + std::marker::Sync {
    /// Starts the transport from the top of the loop.
    fn start(&self);

    /// Stops the transport. Loop-relative callbacks stop firing.
    fn stop(&self);

    fn is_running(&self) -> bool;

    /// Sets the tempo and loop length. The musical position is kept, wrapped into the new loop.
    fn configure(&self, bpm: f64, loop_end: f64);

    fn bpm(&self) -> f64;

    /// The monotonic clock, in seconds.
    fn now(&self) -> f64;

    /// The position within the loop at the given monotonic time. Zero while stopped.
    fn position_seconds_at(&self, time: f64) -> f64;

    fn loop_end_seconds(&self) -> f64;

    /// Schedules a callback at the given position of every pass of the loop, while running.
    fn schedule_at(&self, loop_seconds: f64, callback: Callback) -> ScheduleHandle;

    /// Schedules a callback once, the given number of seconds from now. Fires whether or not the
    /// transport is running.
    fn schedule_once(&self, delay: f64, callback: Callback) -> ScheduleHandle;

    /// The current position within the loop.
    fn position_seconds(&self) -> f64 {
        self.position_seconds_at(self.now())
    }

    /// The current position within the loop in whole ticks.
    fn position_ticks(&self) -> Ticks {
        let beats = self.position_seconds() * self.bpm() / 60.0;
        (beats * TICKS_PER_BEAT as f64).floor().max(0.0) as Ticks
    }
}
