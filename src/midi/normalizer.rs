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
use std::{collections::HashMap, time::Duration};

use midly::{live::LiveEvent, MidiMessage};
use tracing::debug;

use super::RawMessage;
use crate::note::Note;

/// A note message, after parsing, filtering and transposition.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum NoteAction {
    On {
        /// The note the device sent. Identifies the key until its note off.
        key: Note,
        /// The note to play, after transposition.
        note: Note,
        /// Velocity from 0 to 1.
        velocity: f32,
    },
    Off {
        key: Note,
    },
}

/// The transposition that makes `base_note` play at the natural rate, i.e. as `reference`.
pub fn transpose_offset(reference: Note, base_note: Note) -> i32 {
    reference.semitones_from(base_note)
}

/// Turns raw MIDI messages into note actions.
///
/// Controllers that expose the same physical key on several ports send the same note on more
/// than once. A note on for a key that arrives within the dedup window of the last accepted note
/// on for that key is dropped.
pub struct Normalizer {
    dedup_window: Duration,
    channel: Option<u8>,
    last_note_on: HashMap<u8, Duration>,
}

impl Normalizer {
    /// Creates a normalizer. With a channel (zero based) only messages on that channel pass.
    pub fn new(dedup_window: Duration, channel: Option<u8>) -> Normalizer {
        Normalizer {
            dedup_window,
            channel,
            last_note_on: HashMap::new(),
        }
    }

    /// Normalizes a message, shifting notes by `offset` semitones. Anything other than a note
    /// message is ignored.
    pub fn normalize(&mut self, message: &RawMessage, offset: i32) -> Option<NoteAction> {
        let event = match LiveEvent::parse(&message.bytes) {
            Ok(event) => event,
            Err(e) => {
                debug!(error = ?e, "Failed to parse MIDI event");
                return None;
            }
        };

        let LiveEvent::Midi { channel, message: midi } = event else {
            return None;
        };
        if self.channel.is_some_and(|wanted| wanted != u8::from(channel)) {
            return None;
        }

        match midi {
            MidiMessage::NoteOff { key, .. } => Some(NoteAction::Off {
                key: Note::new(u8::from(key))?,
            }),
            // Note On with velocity 0 is equivalent to Note Off
            MidiMessage::NoteOn { key, vel } if u8::from(vel) == 0 => Some(NoteAction::Off {
                key: Note::new(u8::from(key))?,
            }),
            MidiMessage::NoteOn { key, vel } => {
                let key = u8::from(key);
                if let Some(last) = self.last_note_on.get(&key) {
                    if message.at.saturating_sub(*last) < self.dedup_window {
                        debug!(key, "Duplicate note on suppressed.");
                        return None;
                    }
                }
                self.last_note_on.insert(key, message.at);

                let key = Note::new(key)?;
                Some(NoteAction::On {
                    key,
                    note: key.transpose(offset),
                    velocity: f32::from(u8::from(vel)) / 127.0,
                })
            }
            _ => None,
        }
    }

    /// Forgets the note on history.
    pub fn reset(&mut self) {
        self.last_note_on.clear();
    }
}
