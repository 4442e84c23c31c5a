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
use std::{
    fmt,
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use parking_lot::Mutex;
use tracing::{debug, info};

use super::{timeline::Timeline, Callback, ScheduleHandle};
use crate::playsync::CancelHandle;

/// A transport driven by the system clock. A background thread wakes up every tick interval
/// and fires everything due within the lookahead window, so callbacks run slightly ahead of
/// the time they are scheduled for.
pub struct Clock {
    name: String,
    epoch: Instant,
    timeline: Arc<Mutex<Timeline>>,
    shutdown: CancelHandle,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Clock {
    /// Creates a stopped clock and starts its thread.
    pub fn new(name: &str, lookahead: Duration, tick_interval: Duration) -> Clock {
        let epoch = Instant::now();
        let timeline = Arc::new(Mutex::new(Timeline::new(120.0, 8.0)));
        let shutdown = CancelHandle::new();

        let thread = {
            let timeline = timeline.clone();
            let shutdown = shutdown.clone();
            let lookahead = lookahead.as_secs_f64();
            thread::spawn(move || {
                let mut last_time = Instant::now();
                loop {
                    if shutdown.is_cancelled() {
                        return;
                    }

                    let running = {
                        let mut timeline = timeline.lock();
                        timeline.fire_until(epoch.elapsed().as_secs_f64() + lookahead);
                        timeline.is_running()
                    };

                    last_time += tick_interval;
                    let now = Instant::now();
                    if last_time < now {
                        last_time = now;
                    }
                    if running {
                        spin_sleep::sleep(last_time.saturating_duration_since(now));
                    } else if shutdown.wait_timeout(last_time.saturating_duration_since(now)) {
                        return;
                    }
                }
            })
        };

        info!(
            clock = name,
            lookahead = ?lookahead,
            tick_interval = ?tick_interval,
            "Started clock thread."
        );
        Clock {
            name: name.to_string(),
            epoch,
            timeline,
            shutdown,
            thread: Mutex::new(Some(thread)),
        }
    }

    fn elapsed(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }
}

impl super::Transport for Clock {
    fn start(&self) {
        let now = self.elapsed();
        self.timeline.lock().start(now);
        debug!(clock = self.name, now, "Started.");
    }

    fn stop(&self) {
        self.timeline.lock().stop();
        debug!(clock = self.name, "Stopped.");
    }

    fn is_running(&self) -> bool {
        self.timeline.lock().is_running()
    }

    fn configure(&self, bpm: f64, loop_end: f64) {
        let now = self.elapsed();
        self.timeline.lock().configure(now, bpm, loop_end);
    }

    fn bpm(&self) -> f64 {
        self.timeline.lock().bpm()
    }

    fn now(&self) -> f64 {
        self.elapsed()
    }

    fn position_seconds_at(&self, time: f64) -> f64 {
        self.timeline.lock().position(time)
    }

    fn loop_end_seconds(&self) -> f64 {
        self.timeline.lock().loop_end()
    }

    fn schedule_at(&self, loop_seconds: f64, callback: Callback) -> ScheduleHandle {
        self.timeline.lock().schedule_at(loop_seconds, callback)
    }

    fn schedule_once(&self, delay: f64, callback: Callback) -> ScheduleHandle {
        let at = self.elapsed() + delay.max(0.0);
        self.timeline.lock().schedule_once(at, callback)
    }
}

impl Drop for Clock {
    fn drop(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.lock().take() {
            if thread.join().is_err() {
                tracing::error!(clock = self.name, "Clock thread panicked.");
            }
        }
    }
}

impl fmt::Display for Clock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Clock)", self.name)
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serial_test::serial;

    use super::*;
    use crate::testutil::eventually;
    use crate::transport::Transport;

    #[test]
    #[serial]
    fn fires_repeating_callbacks() {
        let clock = Clock::new(
            "test",
            Duration::from_millis(10),
            Duration::from_millis(2),
        );
        clock.configure(120.0, 0.05);

        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = count.clone();
            clock.schedule_at(
                0.0,
                Box::new(move |_| {
                    count.fetch_add(1, Ordering::Relaxed);
                }),
            );
        }

        // Stopped, so nothing fires.
        thread::sleep(Duration::from_millis(30));
        assert_eq!(count.load(Ordering::Relaxed), 0);

        clock.start();
        eventually(
            || count.load(Ordering::Relaxed) >= 3,
            "Repeating callback did not fire every pass",
        );
        assert!(clock.position_seconds() < 0.05);
    }

    #[test]
    #[serial]
    fn fires_once_while_stopped() {
        let clock = Clock::new("test", Duration::ZERO, Duration::from_millis(2));
        let fired = Arc::new(AtomicUsize::new(0));
        let handle = {
            let fired = fired.clone();
            clock.schedule_once(
                0.01,
                Box::new(move |_| {
                    fired.fetch_add(1, Ordering::Relaxed);
                }),
            )
        };

        eventually(
            || fired.load(Ordering::Relaxed) == 1,
            "One-shot callback did not fire",
        );
        thread::sleep(Duration::from_millis(20));
        assert_eq!(fired.load(Ordering::Relaxed), 1);
        assert!(!handle.is_cancelled());
    }
}
