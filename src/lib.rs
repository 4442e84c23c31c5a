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

//! A looping sampler and sequencer engine.
//!
//! Four loops (A to D) each hold their own tempo, length and swing. Samples are played from
//! pads, a pitch grid or a MIDI input, recorded against the active loop while the transport
//! runs, and replayed every pass of the loop through a voice device.

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod midi;
pub mod note;
pub mod playsync;
pub mod quantize;
pub mod recorder;
pub mod router;
pub mod scheduler;
pub mod timebase;
pub mod transport;
pub mod voice;

#[cfg(test)]
mod testutil;
