/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: Apache-2.0
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 * http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Soft cache of the asset topology (sensor assets and their device
//! bindings), persisted between runs so sensors are known before the
//! first topology message arrives.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::PowermonError;
use crate::messages::{AssetMessage, AssetOperation};

/// One cached asset. Mirrors the topology message minus name and
/// operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssetEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub subtype: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub logical_asset: Option<String>,
    #[serde(default)]
    pub port: Option<u32>,
}

/// The whole cache, stored as one JSON document. The format is private
/// to this agent; nothing else reads the file.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct AssetState {
    assets: BTreeMap<String, AssetEntry>,
}

impl AssetState {
    /// Load the cache, falling back to an empty one when the file is
    /// missing or unreadable. A corrupt cache is not worth failing
    /// startup over; topology messages rebuild it.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "Could not load state file, starting empty");
                return Self::default();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(state) => state,
            Err(e) => {
                warn!(file = %path.display(), error = %e, "State file is corrupt, starting empty");
                Self::default()
            }
        }
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), PowermonError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_vec_pretty(self)?)?;
        debug!(file = %path.display(), assets = self.assets.len(), "Saved asset state");
        Ok(())
    }

    /// Apply one topology message. Returns true when the cache
    /// actually changed, so callers know whether to save and rebuild
    /// the sensor registry.
    pub fn apply(&mut self, message: &AssetMessage) -> bool {
        match message.operation {
            AssetOperation::Delete => self.assets.remove(&message.name).is_some(),
            AssetOperation::Create | AssetOperation::Update => {
                let entry = AssetEntry {
                    kind: message.kind.clone(),
                    subtype: message.subtype.clone(),
                    parent: message.parent.clone(),
                    logical_asset: message.logical_asset.clone(),
                    port: message.port,
                };
                let prior = self.assets.insert(message.name.clone(), entry.clone());
                prior.as_ref() != Some(&entry)
            }
        }
    }

    /// Assets representing environmental sensors.
    pub fn sensors(&self) -> impl Iterator<Item = (&String, &AssetEntry)> {
        self.assets
            .iter()
            .filter(|(_, entry)| entry.subtype == "sensor")
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::AssetOperation;

    fn sensor_message(name: &str, parent: &str) -> AssetMessage {
        AssetMessage {
            name: name.to_string(),
            operation: AssetOperation::Create,
            kind: "device".to_string(),
            subtype: "sensor".to_string(),
            parent: Some(parent.to_string()),
            logical_asset: Some("Rack-04".to_string()),
            port: Some(1),
        }
    }

    #[test]
    fn apply_create_update_delete() {
        let mut state = AssetState::default();
        let msg = sensor_message("sensor-1", "ups-1");

        assert!(state.apply(&msg));
        // Re-applying the identical message is not a change.
        assert!(!state.apply(&msg));

        let mut moved = msg.clone();
        moved.operation = AssetOperation::Update;
        moved.parent = Some("ups-2".to_string());
        assert!(state.apply(&moved));

        let mut gone = msg.clone();
        gone.operation = AssetOperation::Delete;
        assert!(state.apply(&gone));
        assert!(state.is_empty());
        // Deleting a missing asset is not a change either.
        assert!(!state.apply(&gone));
    }

    #[test]
    fn sensors_filter_by_subtype() {
        let mut state = AssetState::default();
        state.apply(&sensor_message("sensor-1", "ups-1"));
        let mut ups = sensor_message("ups-1", "dc");
        ups.subtype = "ups".to_string();
        state.apply(&ups);

        let sensors: Vec<_> = state.sensors().map(|(name, _)| name.clone()).collect();
        assert_eq!(sensors, vec!["sensor-1".to_string()]);
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("nut").join("state_file");

        let mut state = AssetState::default();
        state.apply(&sensor_message("sensor-1", "ups-1"));
        state.save(&path).expect("save");

        let loaded = AssetState::load(&path);
        assert_eq!(loaded, state);
    }

    #[test]
    fn missing_or_corrupt_file_loads_empty() {
        assert!(AssetState::load("/nonexistent/state_file").is_empty());

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("state_file");
        std::fs::write(&path, "definitely not json").expect("write");
        assert!(AssetState::load(&path).is_empty());
    }
}
