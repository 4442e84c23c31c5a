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

//! Resolves what a sample sounds like from its settings. Nothing here holds state: every
//! route is recomputed from scratch, for every sample, whenever any setting changes, because a
//! single solo changes the gain of every other sample.

use std::collections::BTreeMap;

use crate::config::{Filter, SampleSettings};
use crate::events::SampleId;
use crate::note::Note;

/// The full output configuration of one sample, as pushed to the voice device.
#[derive(Clone, Debug, PartialEq)]
pub struct Route {
    /// Either 0 (silent) or 1 (audible), from mute and solo.
    pub gain: f64,
    pub volume_db: f64,
    pub pan: f64,

    /// Transposition in semitones applied on top of the played note.
    pub pitch: f64,
    pub reverse: bool,
    pub attack: f64,
    pub release: f64,
    pub filters: Vec<Filter>,
}

/// Whether any sample is soloed.
pub fn solos_exist<'a>(samples: impl IntoIterator<Item = &'a SampleSettings>) -> bool {
    samples.into_iter().any(|settings| settings.solo)
}

/// The gain of a sample. When anything is soloed only soloed samples are audible and mute is
/// ignored; otherwise everything but muted samples is audible.
pub fn effective_gain(settings: &SampleSettings, solos_exist: bool) -> f64 {
    let audible = if solos_exist {
        settings.solo
    } else {
        !settings.mute
    };
    if audible {
        1.0
    } else {
        0.0
    }
}

/// The rate at which the sample plays when triggered with `note`. The reference note plays at
/// the natural rate.
pub fn playback_rate(settings: &SampleSettings, note: Note, reference: Note) -> f64 {
    2f64.powf((f64::from(note.semitones_from(reference)) + settings.pitch) / 12.0)
}

/// How long the trimmed region lasts when played with `note`, if the trim end is set.
pub fn playable_duration(settings: &SampleSettings, note: Note, reference: Note) -> Option<f64> {
    settings
        .trim_length()
        .map(|length| length / playback_rate(settings, note, reference))
}

/// Where in the sample a voice starts: the trim start, or the trim end when the sample plays
/// reversed and has one.
pub fn start_offset(settings: &SampleSettings) -> f64 {
    match (settings.reverse, settings.trim_end) {
        (true, Some(trim_end)) => trim_end,
        _ => settings.trim_start,
    }
}

/// Resolves the route of one sample.
pub fn route(settings: &SampleSettings, solos_exist: bool) -> Route {
    Route {
        gain: effective_gain(settings, solos_exist),
        volume_db: settings.volume,
        pan: settings.pan,
        pitch: settings.pitch,
        reverse: settings.reverse,
        attack: settings.attack,
        release: settings.release,
        filters: settings.filters.clone(),
    }
}

/// Resolves the routes of every sample.
pub fn resolve_all<'a>(
    samples: impl IntoIterator<Item = (&'a SampleId, &'a SampleSettings)>,
) -> BTreeMap<SampleId, Route> {
    let samples: Vec<(&SampleId, &SampleSettings)> = samples.into_iter().collect();
    let solos = solos_exist(samples.iter().map(|(_, settings)| *settings));
    samples
        .into_iter()
        .map(|(id, settings)| (id.clone(), route(settings, solos)))
        .collect()
}
