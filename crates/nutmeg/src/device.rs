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

//! Per-device state: committed and candidate measurements, inventory
//! strings, change flags, and the update pipeline that feeds them from
//! raw daemon variables through the name mapping.

use std::collections::BTreeMap;
use std::collections::btree_map::Entry;
use std::fmt;

use chrono::Utc;
use tracing::{debug, error};

use crate::mapping::{MappingKind, MappingStore};
use crate::transform::{self, VarMap};

/// A numeric measurement in fixed-point, value x 100 with two implicit
/// decimals. `committed` is what was last published; `candidate` is
/// what the next commit would publish if the change is significant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhysicalValue {
    pub committed: i32,
    pub candidate: i32,
    pub changed: bool,
}

/// A textual reading. Multi-value daemon variables are joined with
/// `", "` before they get here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryValue {
    pub value: String,
    pub changed: bool,
}

/// Render a fixed-point x100 value the way it is published: sign,
/// integer part, and a two-digit decimal suffix unless it is zero.
pub fn format_fixed(x: i32) -> String {
    let sign = if x < 0 { "-" } else { "" };
    let a = i64::from(x).unsigned_abs();
    let num = a / 100;
    let dec = a % 100;
    if dec == 0 {
        format!("{sign}{num}")
    } else {
        format!("{sign}{num}.{dec:02}")
    }
}

/// In-memory state of one daemon device (UPS, ePDU, ...), keyed by the
/// daemon-assigned name. Values are stored under canonical names; raw
/// daemon names never leave the update pipeline.
#[derive(Debug, Clone)]
pub struct NutDevice {
    name: String,
    physics: BTreeMap<String, PhysicalValue>,
    inventory: BTreeMap<String, InventoryValue>,
    last_update: i64,
    threshold: u32,
}

impl NutDevice {
    pub fn new(name: impl Into<String>, threshold: u32) -> Self {
        Self {
            name: name.into(),
            physics: BTreeMap::new(),
            inventory: BTreeMap::new(),
            last_update: 0,
            threshold,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Wall-clock seconds of the last non-empty update batch.
    pub fn last_update(&self) -> i64 {
        self.last_update
    }

    /// Minimum percent change required before a new reading replaces
    /// the committed one.
    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub fn set_default_threshold(&mut self, threshold: u32) {
        self.threshold = threshold;
    }

    /// True iff any physics or inventory entry is pending publication.
    pub fn changed(&self) -> bool {
        self.physics.values().any(|p| p.changed)
            || self.inventory.values().any(|i| i.changed)
    }

    /// Pending flag of a single entry, physics or inventory.
    pub fn is_changed(&self, name: &str) -> bool {
        if let Some(p) = self.physics.get(name) {
            return p.changed;
        }
        if let Some(i) = self.inventory.get(name) {
            return i.changed;
        }
        false
    }

    pub fn set_changed(&mut self, name: &str, status: bool) {
        if let Some(p) = self.physics.get_mut(name) {
            p.changed = status;
        }
        if let Some(i) = self.inventory.get_mut(name) {
            i.changed = status;
        }
    }

    pub fn set_changed_all(&mut self, status: bool) {
        for p in self.physics.values_mut() {
            p.changed = status;
        }
        for i in self.inventory.values_mut() {
            i.changed = status;
        }
    }

    /// Feed one numeric reading into the physics map.
    ///
    /// The reading is scaled to fixed-point x100; a scaled value that
    /// does not fit `i32` marks the measurement as bogus (stray
    /// gigawatt spikes) and removes the entry entirely. An existing
    /// entry first has its candidate reset to the committed value, so
    /// a previously suppressed candidate is discarded, then the new
    /// reading becomes the candidate only when the relative change
    /// reaches `threshold` percent (or the committed value is 0).
    pub fn update_physics(&mut self, var: &str, value: f64, threshold: u32) {
        let scaled = (value * 100.0).round();
        if !scaled.is_finite() || scaled > f64::from(i32::MAX) || scaled < f64::from(i32::MIN) {
            error!(device = %self.name, variable = var, value, "Value exceeded the range, dropping measurement");
            self.physics.remove(var);
            return;
        }
        let new_fixed = scaled as i32;

        match self.physics.entry(var.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(PhysicalValue {
                    committed: 0,
                    candidate: new_fixed,
                    changed: true,
                });
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                let old = entry.committed;
                entry.candidate = entry.committed;
                if old == new_fixed {
                    return;
                }
                let significant = old == 0
                    || ((i64::from(old) - i64::from(new_fixed)) * 100 / i64::from(old))
                        .unsigned_abs()
                        >= u64::from(threshold);
                if significant {
                    entry.candidate = new_fixed;
                }
            }
        }
    }

    /// Physics variant taking the daemon's value list. Only
    /// single-element lists are meaningful for numbers; anything else
    /// is ignored.
    pub fn update_physics_list(&mut self, var: &str, values: &[String], threshold: u32) {
        let [value] = values else { return };
        match value.trim().parse::<f64>() {
            Ok(v) => self.update_physics(var, v, threshold),
            Err(_) => {
                debug!(device = %self.name, variable = var, value = %value, "Non-numeric physics value, skipping");
            }
        }
    }

    /// Feed one textual reading into the inventory map. List values
    /// are joined with `", "`.
    pub fn update_inventory(&mut self, var: &str, values: &[String]) {
        let mut joined = values.join(", ");
        // The daemon reports plain PDUs as "pdu"; upstream knows only epdu.
        if var == "type" && joined == "pdu" {
            joined = "epdu".to_string();
        }
        match self.inventory.entry(var.to_string()) {
            Entry::Vacant(slot) => {
                slot.insert(InventoryValue {
                    value: joined,
                    changed: true,
                });
            }
            Entry::Occupied(mut slot) => {
                let entry = slot.get_mut();
                if entry.value != joined {
                    entry.value = joined;
                    entry.changed = true;
                }
            }
        }
    }

    /// Promote accepted candidates: wherever `candidate` differs from
    /// `committed`, advance `committed` and mark the entry pending.
    /// This is the only place physics `committed` moves.
    pub fn commit_changes(&mut self) {
        for entry in self.physics.values_mut() {
            if entry.committed != entry.candidate {
                entry.committed = entry.candidate;
                entry.changed = true;
            }
        }
    }

    /// Run a raw variable batch through transformation, both mapping
    /// tables (literal and `.#.` wildcard lookups), and a final commit.
    ///
    /// An empty batch is a no-op and does not touch `last_update`; a
    /// non-empty one stamps `last_update` before transformation even
    /// when nothing ends up changing. `force` drops the threshold to 0
    /// so every change is significant.
    pub fn update(&mut self, mut vars: VarMap, store: &MappingStore, force: bool) {
        if vars.is_empty() {
            return;
        }
        self.last_update = Utc::now().timestamp();
        transform::normalize(&mut vars);
        let threshold = if force { 0 } else { self.threshold };

        for (daemon_name, canonical) in store.get(MappingKind::Physics) {
            if let Some(values) = vars.get(daemon_name) {
                self.update_physics_list(canonical, values, threshold);
            } else {
                for (canon_name, values) in wildcard_matches(&vars, daemon_name, canonical) {
                    self.update_physics_list(&canon_name, &values, threshold);
                }
            }
        }

        for (daemon_name, canonical) in store.get(MappingKind::Inventory) {
            if let Some(values) = vars.get(daemon_name) {
                self.update_inventory(canonical, values);
            } else {
                for (canon_name, values) in wildcard_matches(&vars, daemon_name, canonical) {
                    self.update_inventory(&canon_name, &values);
                }
            }
        }

        self.commit_changes();
    }

    /// Drop all measurement and inventory data, keeping the record
    /// itself. Called when the daemon has been unreachable for longer
    /// than the staleness window.
    pub fn clear(&mut self) {
        if !self.physics.is_empty() || !self.inventory.is_empty() {
            self.physics.clear();
            self.inventory.clear();
            error!(device = %self.name, "Dropping all measurement and inventory data");
        }
    }

    /// Committed physics values, optionally restricted to entries with
    /// the pending flag set.
    pub fn physics(&self, only_changed: bool) -> BTreeMap<String, i32> {
        self.physics
            .iter()
            .filter(|(_, p)| !only_changed || p.changed)
            .map(|(name, p)| (name.clone(), p.committed))
            .collect()
    }

    /// Inventory values, optionally restricted to pending entries.
    pub fn inventory(&self, only_changed: bool) -> BTreeMap<String, String> {
        self.inventory
            .iter()
            .filter(|(_, i)| !only_changed || i.changed)
            .map(|(name, i)| (name.clone(), i.value.clone()))
            .collect()
    }

    /// Merged name -> string view over both maps, physics rendered
    /// through the fixed-point formatter.
    pub fn properties(&self) -> BTreeMap<String, String> {
        let mut map: BTreeMap<String, String> = self
            .physics
            .iter()
            .map(|(name, p)| (name.clone(), format_fixed(p.committed)))
            .collect();
        for (name, i) in &self.inventory {
            map.insert(name.clone(), i.value.clone());
        }
        map
    }

    /// One property as a published string, whichever map holds it.
    pub fn property(&self, name: &str) -> Option<String> {
        if let Some(p) = self.physics.get(name) {
            return Some(format_fixed(p.committed));
        }
        self.inventory.get(name).map(|i| i.value.clone())
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.physics.contains_key(name) || self.inventory.contains_key(name)
    }

    pub fn has_physics(&self, name: &str) -> bool {
        self.physics.contains_key(name)
    }

    #[cfg(test)]
    pub(crate) fn set_last_update(&mut self, seconds: i64) {
        self.last_update = seconds;
    }
}

/// JSON-shaped rendering of the full record, used by debug logging.
/// Physics values are unquoted; inventory strings get embedded double
/// quotes replaced by spaces.
impl fmt::Display for NutDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        write!(f, "{{")?;
        for (name, p) in &self.physics {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "\"{name}\":{}", format_fixed(p.committed))?;
        }
        for (name, i) in &self.inventory {
            if !first {
                write!(f, ", ")?;
            }
            first = false;
            write!(f, "\"{name}\":\"{}\"", i.value.replace('"', " "))?;
        }
        write!(f, "}}")
    }
}

/// Enumerate indexed matches of a `.#.` daemon template against the
/// variable batch, pairing each with the `.#` canonical template.
/// Index 1 upward; the first absent index terminates the sequence.
/// Templates with the wildcard at position 0 never match.
fn wildcard_matches(
    vars: &VarMap,
    daemon_tpl: &str,
    canon_tpl: &str,
) -> Vec<(String, Vec<String>)> {
    let Some(x) = daemon_tpl.find(".#.") else {
        return Vec::new();
    };
    let Some(y) = canon_tpl.find(".#") else {
        return Vec::new();
    };
    if x == 0 || y == 0 {
        return Vec::new();
    }

    let daemon_prefix = &daemon_tpl[..=x];
    let daemon_suffix = &daemon_tpl[x + 2..];
    let canon_prefix = &canon_tpl[..=y];
    let canon_suffix = &canon_tpl[y + 2..];

    let mut matches = Vec::new();
    for i in 1.. {
        let daemon_name = format!("{daemon_prefix}{i}{daemon_suffix}");
        match vars.get(&daemon_name) {
            Some(values) => {
                matches.push((format!("{canon_prefix}{i}{canon_suffix}"), values.clone()));
            }
            None => break,
        }
    }
    matches
}
