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

//! The bookkeeping shared by every transport: where the loop started, what has already been
//! fired, and which callbacks are waiting.

use tracing::debug;

use super::{Callback, ScheduleHandle};
use crate::playsync::CancelHandle;

enum When {
    /// At this offset within every pass of the loop.
    Repeating(f64),
    /// Once, at this monotonic time.
    Once(f64),
}

struct Entry {
    id: u64,
    when: When,
    cancel_handle: CancelHandle,
    callback: Callback,
}

pub(crate) struct Timeline {
    running: bool,
    bpm: f64,
    loop_end: f64,
    /// The monotonic time at which the current pass structure began.
    origin: f64,
    /// Everything before this monotonic time has been fired.
    cursor: f64,
    entries: Vec<Entry>,
    next_id: u64,
}

impl Timeline {
    pub(crate) fn new(bpm: f64, loop_end: f64) -> Timeline {
        Timeline {
            running: false,
            bpm,
            loop_end,
            origin: 0.0,
            cursor: 0.0,
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn start(&mut self, now: f64) {
        self.running = true;
        self.origin = now;
        self.cursor = now;
    }

    pub(crate) fn stop(&mut self) {
        self.running = false;
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running
    }

    pub(crate) fn bpm(&self) -> f64 {
        self.bpm
    }

    pub(crate) fn loop_end(&self) -> f64 {
        self.loop_end
    }

    pub(crate) fn configure(&mut self, now: f64, bpm: f64, loop_end: f64) {
        if self.running {
            // Keep the musical position, expressed in beats, across the change.
            let beats = self.position(now) * self.bpm / 60.0;
            let position = (beats * 60.0 / bpm).rem_euclid(loop_end);
            self.origin = now - position;
        }
        self.bpm = bpm;
        self.loop_end = loop_end;
    }

    pub(crate) fn position(&self, time: f64) -> f64 {
        if !self.running || self.loop_end <= 0.0 {
            return 0.0;
        }
        (time - self.origin).rem_euclid(self.loop_end)
    }

    pub(crate) fn schedule_at(&mut self, loop_seconds: f64, callback: Callback) -> ScheduleHandle {
        self.push(When::Repeating(loop_seconds), callback)
    }

    pub(crate) fn schedule_once(&mut self, at: f64, callback: Callback) -> ScheduleHandle {
        self.push(When::Once(at), callback)
    }

    /// The number of callbacks that haven't been cancelled or fired.
    pub(crate) fn pending(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.cancel_handle.is_cancelled())
            .count()
    }

    /// Fires every callback due before `to`, in time order.
    pub(crate) fn fire_until(&mut self, to: f64) {
        self.entries
            .retain(|entry| !entry.cancel_handle.is_cancelled());

        let mut due: Vec<(f64, usize)> = Vec::new();
        for (index, entry) in self.entries.iter().enumerate() {
            match entry.when {
                When::Once(at) => {
                    if at < to {
                        due.push((at, index));
                    }
                }
                When::Repeating(offset) => {
                    if !self.running || offset < 0.0 || offset >= self.loop_end {
                        continue;
                    }
                    let first = (((self.cursor - self.origin - offset) / self.loop_end).floor()
                        - 1.0)
                        .max(0.0);
                    let mut at = self.origin + first * self.loop_end + offset;
                    while at < to {
                        if at >= self.cursor {
                            due.push((at, index));
                        }
                        at += self.loop_end;
                    }
                }
            }
        }

        due.sort_by(|a, b| {
            a.0.total_cmp(&b.0)
                .then_with(|| self.entries[a.1].id.cmp(&self.entries[b.1].id))
        });

        let mut fired_once = Vec::new();
        for (at, index) in due {
            let entry = &mut self.entries[index];
            // A callback earlier in this batch may have been cancelled by its owner.
            if entry.cancel_handle.is_cancelled() {
                continue;
            }
            debug!(id = entry.id, at, "Firing scheduled callback.");
            (entry.callback)(at);
            if let When::Once(_) = entry.when {
                fired_once.push(entry.id);
            }
        }

        if !fired_once.is_empty() {
            self.entries.retain(|entry| !fired_once.contains(&entry.id));
        }

        if self.running && to > self.cursor {
            self.cursor = to;
        }
    }

    fn push(&mut self, when: When, callback: Callback) -> ScheduleHandle {
        let id = self.next_id;
        self.next_id += 1;
        let cancel_handle = CancelHandle::new();
        self.entries.push(Entry {
            id,
            when,
            cancel_handle: cancel_handle.clone(),
            callback,
        });
        ScheduleHandle::new(id, cancel_handle)
    }
}
