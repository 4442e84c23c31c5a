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
use std::{error::Error, fmt, sync::Arc, time::Duration};

use parking_lot::Mutex;
use tokio::sync::mpsc::Sender;
use tracing::{debug, info};

use super::RawMessage;

/// A mock device. Events are injected by hand.
#[derive(Clone)]
pub struct Device {
    name: String,
    sender: Arc<Mutex<Option<Sender<RawMessage>>>>,
}

impl Device {
    /// Gets the given mock device.
    pub fn get(name: &str) -> Device {
        Device {
            name: name.to_string(),
            sender: Arc::new(Mutex::new(None)),
        }
    }

    /// Sends the mock event through to the watcher. Returns false if nothing is watching or the
    /// watcher is full.
    pub fn mock_event(&self, at: Duration, event: &[u8]) -> bool {
        let sender = self.sender.lock();
        match sender.as_ref() {
            Some(sender) => sender
                .try_send(RawMessage {
                    at,
                    bytes: event.to_vec(),
                })
                .is_ok(),
            None => {
                debug!(device = self.name, "Not watching, dropping mock event.");
                false
            }
        }
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    /// Watches MIDI input for events and sends them to the given sender.
    fn watch_events(&self, sender: Sender<RawMessage>) -> Result<(), Box<dyn Error>> {
        let mut current = self.sender.lock();
        if current.is_some() {
            return Err("Already watching events.".into());
        }

        info!(device = self.name, "Watching mock MIDI events.");
        *current = Some(sender);
        Ok(())
    }

    /// Stops watching events.
    fn stop_watch_events(&self) {
        self.sender.lock().take();
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (Mock)", self.name,)
    }
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::midi::Device as _;

    #[test]
    fn forwards_events_while_watching() -> Result<(), Box<dyn Error>> {
        let device = Device::get("mock-keys");
        assert!(!device.mock_event(Duration::ZERO, &[0x90, 60, 100]));

        let (tx, mut rx) = tokio::sync::mpsc::channel(4);
        device.watch_events(tx.clone())?;
        assert!(device.watch_events(tx).is_err());

        assert!(device.mock_event(Duration::from_millis(3), &[0x90, 60, 100]));
        assert_eq!(
            rx.try_recv()?,
            RawMessage {
                at: Duration::from_millis(3),
                bytes: vec![0x90, 60, 100],
            }
        );

        device.stop_watch_events();
        assert!(!device.mock_event(Duration::ZERO, &[0x80, 60, 0]));
        Ok(())
    }
}
