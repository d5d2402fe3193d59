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

//! Name-mapping store: translates daemon variable names into the
//! canonical names the upstream consumers expect.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::NutmegError;

/// Which of the two mapping tables to use for a lookup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MappingKind {
    /// Numeric measurements (voltage, realpower, ...).
    Physics,
    /// Textual inventory (model, serial, type, ...).
    Inventory,
}

impl MappingKind {
    fn member(self) -> &'static str {
        match self {
            Self::Physics => "physicsMapping",
            Self::Inventory => "inventoryMapping",
        }
    }
}

/// Holds the daemon-name to canonical-name tables loaded from the JSON
/// mapping file. Either table may be empty; consumers skip advertising
/// until a load has succeeded.
///
/// Keys may contain the literal token `.#.` and the mapped value `.#`;
/// the update pipeline substitutes a matched index into both.
#[derive(Debug, Default)]
pub struct MappingStore {
    physics: BTreeMap<String, String>,
    inventory: BTreeMap<String, String>,
    loaded: bool,
}

impl MappingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load both tables from a JSON file with top-level members
    /// `physicsMapping` and `inventoryMapping`.
    ///
    /// An unreadable file or invalid JSON leaves the store untouched.
    /// A missing member leaves that one table untouched. Individual
    /// entries whose value is not a string are skipped.
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<(), NutmegError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            NutmegError::mapping(format!("cannot read '{}': {e}", path.display()))
        })?;
        let doc: Value = serde_json::from_str(&raw).map_err(|e| {
            NutmegError::mapping(format!("'{}' is not valid JSON: {e}", path.display()))
        })?;

        for kind in [MappingKind::Physics, MappingKind::Inventory] {
            match doc.get(kind.member()) {
                Some(member) => {
                    let table = collect_string_map(kind.member(), member);
                    debug!(
                        member = kind.member(),
                        entries = table.len(),
                        "Loaded mapping table"
                    );
                    match kind {
                        MappingKind::Physics => self.physics = table,
                        MappingKind::Inventory => self.inventory = table,
                    }
                }
                None => {
                    warn!(
                        file = %path.display(),
                        member = kind.member(),
                        "Mapping file does not contain member, keeping previous table"
                    );
                }
            }
        }

        self.loaded = true;
        Ok(())
    }

    /// True iff a load has completed successfully since construction.
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn get(&self, kind: MappingKind) -> &BTreeMap<String, String> {
        match kind {
            MappingKind::Physics => &self.physics,
            MappingKind::Inventory => &self.inventory,
        }
    }
}

#[cfg(test)]
impl MappingStore {
    /// Build a loaded store from literal tables, bypassing the file
    /// format. Test-only.
    pub(crate) fn from_tables(
        physics: &[(&str, &str)],
        inventory: &[(&str, &str)],
    ) -> Self {
        let to_map = |entries: &[(&str, &str)]| {
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect()
        };
        Self {
            physics: to_map(physics),
            inventory: to_map(inventory),
            loaded: true,
        }
    }
}

fn collect_string_map(member: &str, value: &Value) -> BTreeMap<String, String> {
    let mut table = BTreeMap::new();
    let Some(object) = value.as_object() else {
        warn!(member, "Mapping member is not a JSON object, ignoring");
        return table;
    };
    for (name, entry) in object {
        match entry.as_str() {
            Some(s) => {
                table.insert(name.clone(), s.to_string());
            }
            None => {
                warn!(member, property = %name, "Mapping value is not a string, skipping");
            }
        }
    }
    table
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write_file(content: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().expect("tempfile");
        f.write_all(content.as_bytes()).expect("write");
        f
    }

    #[test]
    fn load_both_tables() {
        let f = write_file(
            r#"{
                "physicsMapping": {"input.voltage": "voltage.input"},
                "inventoryMapping": {"device.model": "model"},
                "somethingElse": 42
            }"#,
        );
        let mut store = MappingStore::new();
        assert!(!store.is_loaded());
        store.load(f.path()).expect("load should succeed");
        assert!(store.is_loaded());
        assert_eq!(
            store.get(MappingKind::Physics).get("input.voltage"),
            Some(&"voltage.input".to_string())
        );
        assert_eq!(
            store.get(MappingKind::Inventory).get("device.model"),
            Some(&"model".to_string())
        );
    }

    #[test]
    fn missing_file_keeps_prior_state() {
        let mut store = MappingStore::new();
        let err = store.load("/nonexistent/mapping.conf").unwrap_err();
        assert!(matches!(err, NutmegError::Mapping(_)));
        assert!(!store.is_loaded());
        assert!(store.get(MappingKind::Physics).is_empty());
    }

    #[test]
    fn invalid_json_keeps_prior_tables() {
        let good = write_file(r#"{"physicsMapping": {"a": "b"}, "inventoryMapping": {}}"#);
        let bad = write_file("{ this is not json");

        let mut store = MappingStore::new();
        store.load(good.path()).expect("first load");
        store.load(bad.path()).unwrap_err();

        // The earlier tables survive the failed reload.
        assert!(store.is_loaded());
        assert_eq!(store.get(MappingKind::Physics).len(), 1);
    }

    #[test]
    fn non_string_entries_are_skipped() {
        let f = write_file(
            r#"{
                "physicsMapping": {"good": "kept", "bad": 17, "worse": {"nested": true}},
                "inventoryMapping": {}
            }"#,
        );
        let mut store = MappingStore::new();
        store.load(f.path()).expect("load should succeed");
        let physics = store.get(MappingKind::Physics);
        assert_eq!(physics.len(), 1);
        assert_eq!(physics.get("good"), Some(&"kept".to_string()));
    }

    #[test]
    fn missing_member_keeps_previous_table() {
        let full = write_file(
            r#"{"physicsMapping": {"a": "b"}, "inventoryMapping": {"m": "n"}}"#,
        );
        let partial = write_file(r#"{"physicsMapping": {"x": "y"}}"#);

        let mut store = MappingStore::new();
        store.load(full.path()).expect("first load");
        store.load(partial.path()).expect("second load");

        assert_eq!(store.get(MappingKind::Physics).get("x"), Some(&"y".to_string()));
        assert!(!store.get(MappingKind::Physics).contains_key("a"));
        // inventoryMapping was absent from the second file.
        assert_eq!(store.get(MappingKind::Inventory).get("m"), Some(&"n".to_string()));
    }
}
