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
use std::collections::BTreeMap;

use crate::config::SampleSettings;
use crate::events::SampleId;

struct Entry {
    settings: SampleSettings,
    generation: u64,
}

/// The loaded samples. Every insert gets a new generation, so anything holding on to a sample
/// id can tell whether the sample it knew about has since been removed or replaced.
#[derive(Default)]
pub struct SampleTable {
    samples: BTreeMap<SampleId, Entry>,
    next_generation: u64,
}

impl SampleTable {
    pub fn new() -> SampleTable {
        SampleTable::default()
    }

    /// Adds or replaces a sample, returning its new generation.
    pub fn insert(&mut self, id: SampleId, settings: SampleSettings) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;
        self.samples.insert(
            id,
            Entry {
                settings,
                generation,
            },
        );
        generation
    }

    pub fn remove(&mut self, id: &SampleId) -> Option<SampleSettings> {
        self.samples.remove(id).map(|entry| entry.settings)
    }

    pub fn get(&self, id: &SampleId) -> Option<&SampleSettings> {
        self.samples.get(id).map(|entry| &entry.settings)
    }

    /// Updates settings in place. The generation is kept.
    pub fn get_mut(&mut self, id: &SampleId) -> Option<&mut SampleSettings> {
        self.samples.get_mut(id).map(|entry| &mut entry.settings)
    }

    pub fn generation(&self, id: &SampleId) -> Option<u64> {
        self.samples.get(id).map(|entry| entry.generation)
    }

    pub fn contains(&self, id: &SampleId) -> bool {
        self.samples.contains_key(id)
    }

    pub fn ids(&self) -> Vec<SampleId> {
        self.samples.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SampleId, &SampleSettings)> {
        self.samples.iter().map(|(id, entry)| (id, &entry.settings))
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn generations() {
        let kick = SampleId::from("kick");
        let mut table = SampleTable::new();
        let first = table.insert(kick.clone(), SampleSettings::default());
        assert_eq!(table.generation(&kick), Some(first));

        if let Some(settings) = table.get_mut(&kick) {
            settings.mute = true;
        }
        assert_eq!(table.generation(&kick), Some(first));
        assert!(table.get(&kick).is_some_and(|settings| settings.mute));

        let second = table.insert(kick.clone(), SampleSettings::default());
        assert_ne!(first, second);

        table.remove(&kick);
        table.insert(kick.clone(), SampleSettings::default());
        assert_ne!(table.generation(&kick), Some(second));
        assert_eq!(table.len(), 1);
    }
}
