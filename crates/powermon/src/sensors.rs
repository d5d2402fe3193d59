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

//! Environmental sensors (temperature/humidity probes) attached to
//! power devices. Sensors are discovered from the asset topology, read
//! through their parent device's ambient variables, and published
//! against the logical asset they are located at.

use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use nutmeg::NutClient;
use tracing::{debug, info, warn};

use crate::bus::BusClient;
use crate::messages::MetricMessage;
use crate::state::AssetState;

/// One environmental probe. The parent is the daemon device carrying
/// the readings; the logical asset is where the probe physically sits
/// and is what the published metrics are attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sensor {
    name: String,
    parent: String,
    index: u32,
    logical_asset: String,
    temperature: Option<String>,
    humidity: Option<String>,
}

impl Sensor {
    /// Daemon variable holding this probe's temperature. Index 0 means
    /// the device's unindexed ambient readings.
    fn temperature_var(&self) -> String {
        if self.index == 0 {
            "ambient.temperature".to_string()
        } else {
            format!("ambient.{}.temperature", self.index)
        }
    }

    fn humidity_var(&self) -> String {
        if self.index == 0 {
            "ambient.humidity".to_string()
        } else {
            format!("ambient.{}.humidity", self.index)
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> &str {
        &self.parent
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn logical_asset(&self) -> &str {
        &self.logical_asset
    }

    pub fn temperature(&self) -> Option<&str> {
        self.temperature.as_deref()
    }

    pub fn humidity(&self) -> Option<&str> {
        self.humidity.as_deref()
    }
}

/// Registry of sensors, rebuilt from the asset state cache whenever
/// the topology changes. Owns its own daemon connection so sensor
/// polling does not interleave with the device poll cycle.
pub struct Sensors {
    sensors: BTreeMap<String, Sensor>,
    client: NutClient,
}

impl Sensors {
    pub fn new(client: NutClient) -> Self {
        Self {
            sensors: BTreeMap::new(),
            client,
        }
    }

    pub fn len(&self) -> usize {
        self.sensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sensors.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Sensor> {
        self.sensors.get(name)
    }

    /// Rebuild the registry from the asset cache. Readings are
    /// refreshed on the next poll.
    pub fn update_sensor_list(&mut self, state: &AssetState) {
        let mut sensors = BTreeMap::new();
        for (name, entry) in state.sensors() {
            let Some(parent) = &entry.parent else {
                warn!(sensor = %name, "Sensor asset has no parent device, skipping");
                continue;
            };
            sensors.insert(
                name.clone(),
                Sensor {
                    name: name.clone(),
                    parent: parent.clone(),
                    index: entry.port.unwrap_or(0),
                    logical_asset: entry
                        .logical_asset
                        .clone()
                        .unwrap_or_else(|| parent.clone()),
                    temperature: None,
                    humidity: None,
                },
            );
        }
        info!(count = sensors.len(), "Rebuilt sensor registry");
        self.sensors = sensors;
    }

    /// Read the latest ambient values through the daemon, one variable
    /// fetch per distinct parent device. Connection problems leave the
    /// previous readings in place.
    pub async fn update_from_nut(&mut self) {
        if self.sensors.is_empty() {
            return;
        }
        if let Err(e) = self.client.connect().await {
            debug!(error = %e, "Could not connect to NUT daemon for sensor update");
            return;
        }

        let parents: BTreeSet<String> =
            self.sensors.values().map(|s| s.parent.clone()).collect();
        let mut fetched = BTreeMap::new();
        for parent in parents {
            match self.client.device_vars(&parent).await {
                Ok(vars) => {
                    fetched.insert(parent, vars);
                }
                Err(e) => {
                    warn!(device = %parent, error = %e, "Could not read sensor variables");
                }
            }
        }
        self.client.disconnect();

        for sensor in self.sensors.values_mut() {
            if let Some(vars) = fetched.get(&sensor.parent) {
                sensor.temperature = vars
                    .get(&sensor.temperature_var())
                    .and_then(|values| values.first())
                    .cloned();
                sensor.humidity = vars
                    .get(&sensor.humidity_var())
                    .and_then(|values| values.first())
                    .cloned();
            }
        }
    }

    /// Publish every current reading as a sensor metric.
    pub async fn publish(&self, bus: &BusClient, ttl: u32) {
        for message in self.metrics(ttl, Utc::now().timestamp()) {
            if let Err(e) = bus.publish_sensor_metric(&message).await {
                warn!(device = %message.device, kind = %message.kind, error = %e, "Failed to publish sensor metric");
            }
        }
    }

    fn metrics(&self, ttl: u32, timestamp: i64) -> Vec<MetricMessage> {
        let mut messages = Vec::new();
        for sensor in self.sensors.values() {
            if let Some(temperature) = &sensor.temperature {
                messages.push(MetricMessage {
                    device: sensor.logical_asset.clone(),
                    kind: format!("temperature.{}", sensor.index),
                    value: temperature.clone(),
                    unit: "C".to_string(),
                    ttl,
                    timestamp,
                });
            }
            if let Some(humidity) = &sensor.humidity {
                messages.push(MetricMessage {
                    device: sensor.logical_asset.clone(),
                    kind: format!("humidity.{}", sensor.index),
                    value: humidity.clone(),
                    unit: "%".to_string(),
                    ttl,
                    timestamp,
                });
            }
        }
        messages
    }
}
