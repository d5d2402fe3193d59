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

//! Wire shapes of everything the agent exchanges with the bus: metric,
//! inventory, alert and rule events going out, asset topology messages
//! coming in.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// One published measurement. `kind` is the canonical variable name
/// with the unit short-form appended (`realpower.output.L1@W`); the
/// value is pre-rendered through the fixed-point formatter. A consumer
/// that misses one poll still has live state for `ttl` seconds.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricMessage {
    pub device: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub value: String,
    pub unit: String,
    pub ttl: u32,
    pub timestamp: i64,
}

/// Full inventory snapshot of one device, published at the soft
/// inventory cadence. Values never contain double quotes; they are
/// replaced by spaces before publishing.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct InventoryMessage {
    pub device: String,
    pub properties: BTreeMap<String, String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertState {
    Active,
    Resolved,
}

/// Alert-state transition for one device, derived from the daemon's
/// alarm surface.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AlertMessage {
    pub device: String,
    pub rule: String,
    pub state: AlertState,
    pub severity: String,
    pub description: String,
    pub time: i64,
}

/// Declarative rule telling downstream what to watch to reproduce an
/// alert. Published once per rule identity.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RuleMessage {
    pub rule: String,
    pub device: String,
    pub class: String,
    pub description: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AssetOperation {
    Create,
    Update,
    Delete,
}

/// Asset topology update arriving from the bus. Sensors carry their
/// parent device, the index on that device, and the logical asset
/// their readings are attributed to.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct AssetMessage {
    pub name: String,
    pub operation: AssetOperation,
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metric_serializes_with_type_member() {
        let m = MetricMessage {
            device: "ups-1".into(),
            kind: "realpower.output.L1@W".into(),
            value: "120.50".into(),
            unit: "W".into(),
            ttl: 60,
            timestamp: 1700000000,
        };
        let json = serde_json::to_value(&m).expect("serialize");
        assert_eq!(json["type"], "realpower.output.L1@W");
        assert_eq!(json["value"], "120.50");
    }

    #[test]
    fn alert_state_uses_uppercase_wire_form() {
        assert_eq!(
            serde_json::to_string(&AlertState::Active).expect("serialize"),
            "\"ACTIVE\""
        );
        assert_eq!(
            serde_json::to_string(&AlertState::Resolved).expect("serialize"),
            "\"RESOLVED\""
        );
    }

    #[test]
    fn asset_message_parses_with_optional_members_absent() {
        let msg: AssetMessage = serde_json::from_str(
            r#"{"name": "epdu-7", "operation": "update", "type": "device", "subtype": "epdu"}"#,
        )
        .expect("parse");
        assert_eq!(msg.operation, AssetOperation::Update);
        assert_eq!(msg.parent, None);
        assert_eq!(msg.port, None);
    }

    #[test]
    fn sensor_asset_message_round_trip() {
        let msg: AssetMessage = serde_json::from_str(
            r#"{
                "name": "sensor-42",
                "operation": "create",
                "type": "device",
                "subtype": "sensor",
                "parent": "ups-1",
                "logical_asset": "Rack-04",
                "port": 2
            }"#,
        )
        .expect("parse");
        assert_eq!(msg.parent.as_deref(), Some("ups-1"));
        assert_eq!(msg.port, Some(2));
    }
}
