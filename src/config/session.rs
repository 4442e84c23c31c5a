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
use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};
use tracing::info;

use super::error::ConfigError;
use super::loops::{LoopId, LoopSettings};
use super::samples::SampleSettings;
use crate::events::{SampleEvent, SampleId};

/// Everything needed to rebuild a session: loop settings, sample settings and recorded events.
///
/// Ordered maps keep the serialized form stable, so restoring a state and saving it again
/// produces identical output.
#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq)]
#[serde(default)]
pub struct SessionState {
    pub loops: BTreeMap<LoopId, LoopSettings>,
    pub samples: BTreeMap<SampleId, SampleSettings>,
    pub events: BTreeMap<SampleId, BTreeMap<LoopId, Vec<SampleEvent>>>,
}

impl SessionState {
    /// Loads a session from a YAML or JSON file, chosen by extension.
    pub fn load(path: &Path) -> Result<SessionState, ConfigError> {
        let contents = fs::read_to_string(path)?;
        if is_json(path) {
            Ok(serde_json::from_str(&contents)?)
        } else {
            SessionState::from_yaml(&contents)
        }
    }

    /// Saves the session to a YAML or JSON file, chosen by extension.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = if is_json(path) {
            serde_json::to_string_pretty(self)?
        } else {
            self.to_yaml()?
        };
        fs::write(path, contents)?;
        info!(path = ?path, samples = self.samples.len(), "Saved session.");
        Ok(())
    }

    /// Parses a session from YAML.
    pub fn from_yaml(yaml: &str) -> Result<SessionState, ConfigError> {
        Ok(serde_yml::from_str(yaml)?)
    }

    /// Serializes the session to YAML.
    pub fn to_yaml(&self) -> Result<String, ConfigError> {
        Ok(serde_yml::to_string(self)?)
    }

    /// The number of recorded events across every sample and loop.
    pub fn event_count(&self) -> usize {
        self.events
            .values()
            .flat_map(|loops| loops.values())
            .map(Vec::len)
            .sum()
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "json")
}

#[cfg(test)]
mod test {
    use std::error::Error;

    use super::*;
    use crate::note::Note;

    fn state() -> SessionState {
        let mut state = SessionState::default();
        state
            .loops
            .insert(LoopId::A, LoopSettings::new(4, 2, 120.0, 0.0));
        state
            .loops
            .insert(LoopId::C, LoopSettings::new(3, 1, 96.5, 0.25));
        state.samples.insert(
            SampleId::from("kick"),
            SampleSettings {
                trim_end: Some(0.5),
                quantize: true,
                ..Default::default()
            },
        );
        state.events.insert(
            SampleId::from("kick"),
            BTreeMap::from([(
                LoopId::A,
                vec![
                    SampleEvent::new(0, 0.25, Note::C4, 1.0),
                    SampleEvent::new(384, 0.125, Note::C4, 0.5),
                ],
            )]),
        );
        state
    }

    #[test]
    fn yaml_round_trip() -> Result<(), Box<dyn Error>> {
        let state = state();
        let yaml = state.to_yaml()?;
        let restored = SessionState::from_yaml(&yaml)?;
        assert_eq!(restored, state);
        assert_eq!(restored.to_yaml()?, yaml);
        assert_eq!(restored.event_count(), 2);
        Ok(())
    }

    #[test]
    fn files() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let state = state();
        for name in ["session.yaml", "session.json"] {
            let path = dir.path().join(name);
            state.save(&path)?;
            assert_eq!(SessionState::load(&path)?, state);
        }

        let json = fs::read_to_string(dir.path().join("session.json"))?;
        assert!(json.contains("\"kick\""));
        assert!(SessionState::load(&dir.path().join("missing.yaml")).is_err());
        Ok(())
    }
}
