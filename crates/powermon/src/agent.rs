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

//! The polling agent: drives the device registry once per tick and
//! advertises pending physics, inventory, and alert state to the bus.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::Utc;
use nutmeg::{MappingStore, NutDeviceList, format_fixed};
use tracing::{debug, warn};

use crate::alerts::AlertSubsystem;
use crate::bus::BusClient;
use crate::messages::{InventoryMessage, MetricMessage};

/// Canonical quantity (the first dotted token of a canonical name) to
/// its published unit string.
pub const UNITS: &[(&str, &str)] = &[
    ("realpower", "W"),
    ("power", "VA"),
    ("voltage", "V"),
    ("current", "A"),
    ("temperature", "C"),
    ("humidity", "%"),
    ("frequency", "Hz"),
    ("load", "%"),
    ("charge", "%"),
    ("runtime", "s"),
    ("timer", "s"),
    ("delay", "s"),
];

/// Unit for a canonical variable name, looked up by its leading
/// quantity token. Unknown quantities publish with an empty unit.
pub fn quantity_to_unit(canonical: &str) -> &'static str {
    let quantity = canonical.split('.').next().unwrap_or(canonical);
    UNITS
        .iter()
        .find(|(name, _)| *name == quantity)
        .map(|(_, unit)| *unit)
        .unwrap_or("")
}

/// Owns the registry, the mapping store, the publish half of the bus,
/// and the alert bookkeeping. One `on_poll` call is one full cycle:
/// poll the daemon, then advertise everything pending.
pub struct NutAgent {
    registry: NutDeviceList,
    mapping: MappingStore,
    bus: BusClient,
    alerts: AlertSubsystem,
    poll_interval: Duration,
    inventory_interval: Duration,
    inventory_timestamp: i64,
    force_pending: bool,
}

impl NutAgent {
    pub fn new(
        registry: NutDeviceList,
        mapping: MappingStore,
        bus: BusClient,
        poll_interval: Duration,
        inventory_interval: Duration,
    ) -> Self {
        Self {
            registry,
            mapping,
            bus,
            alerts: AlertSubsystem::new(),
            poll_interval,
            inventory_interval,
            inventory_timestamp: 0,
            force_pending: false,
        }
    }

    pub fn bus(&self) -> &BusClient {
        &self.bus
    }

    /// Make the next poll a forced one: every change is significant,
    /// so re-bound devices republish immediately.
    pub fn schedule_forced_update(&mut self) {
        self.force_pending = true;
    }

    pub async fn on_poll(&mut self) {
        let force = std::mem::take(&mut self.force_pending);
        // The registry cycle (reconciliation, refresh, staleness clear)
        // runs every tick; an unloaded mapping only disables advertising.
        self.registry.update(&self.mapping, force).await;
        if !self.mapping.is_loaded() {
            debug!("Mapping not loaded, skipping advertising");
            return;
        }
        self.advertise_physics().await;
        self.advertise_inventory().await;
        self.advertise_alerts().await;
    }

    pub async fn shutdown(&mut self) {
        self.registry.disconnect();
        self.bus.disconnect().await;
    }

    /// One metric event per pending physics entry. The pending flag is
    /// only cleared when the publish went through, so failures retry
    /// on the next cycle.
    async fn advertise_physics(&mut self) {
        let ttl = (2 * self.poll_interval.as_secs()) as u32;
        let Self { registry, bus, .. } = self;
        for device in registry.devices_mut() {
            let timestamp = device.last_update();
            for (name, value) in device.physics(true) {
                let unit = quantity_to_unit(&name);
                let message = MetricMessage {
                    device: device.name().to_string(),
                    kind: format!("{name}@{unit}"),
                    value: format_fixed(value),
                    unit: unit.to_string(),
                    ttl,
                    timestamp,
                };
                match bus.publish_metric(&message).await {
                    Ok(()) => device.set_changed(&name, false),
                    Err(e) => {
                        warn!(device = %message.device, kind = %message.kind, error = %e, "Failed to publish metric, will retry");
                    }
                }
            }
        }
    }

    /// One inventory snapshot per device with pending inventory, at
    /// most once per inventory interval. The watermark only advances
    /// when everything went out, so failed snapshots retry on the next
    /// tick rather than waiting out the interval.
    async fn advertise_inventory(&mut self) {
        let now = Utc::now().timestamp();
        if now - self.inventory_timestamp < self.inventory_interval.as_secs() as i64 {
            return;
        }

        let mut published_any = false;
        let mut failed_any = false;
        let Self { registry, bus, .. } = self;
        for device in registry.devices_mut() {
            if device.inventory(true).is_empty() {
                continue;
            }
            let properties = device
                .inventory(false)
                .into_iter()
                .map(|(name, value)| (name, value.replace('"', " ")))
                .collect();
            let message = InventoryMessage {
                device: device.name().to_string(),
                properties,
            };
            match bus.publish_inventory(&message).await {
                Ok(()) => {
                    for name in device.inventory(false).keys() {
                        device.set_changed(name, false);
                    }
                    published_any = true;
                }
                Err(e) => {
                    warn!(device = %message.device, error = %e, "Failed to publish inventory, will retry");
                    failed_any = true;
                }
            }
        }

        if published_any && !failed_any {
            self.inventory_timestamp = now;
        }
    }

    /// Alert transitions, evaluated every cycle. Rules go out before
    /// their first alert so downstream can interpret it; bookkeeping
    /// advances only on successful publishes.
    async fn advertise_alerts(&mut self) {
        let now = Utc::now().timestamp();
        let transitions = self.alerts.scan(self.registry.devices(), now);
        for transition in transitions {
            if let Some(rule) = &transition.rule {
                match self.bus.publish_rule(rule).await {
                    Ok(()) => self.alerts.commit_rule(rule),
                    Err(e) => {
                        warn!(rule = %rule.rule, error = %e, "Failed to publish rule, will retry");
                        continue;
                    }
                }
            }
            match self.bus.publish_alert(&transition.alert).await {
                Ok(()) => self.alerts.commit(&transition),
                Err(e) => {
                    warn!(rule = %transition.alert.rule, error = %e, "Failed to publish alert, will retry");
                }
            }
        }

        let live: BTreeSet<String> = self
            .registry
            .devices()
            .map(|device| device.name().to_string())
            .collect();
        self.alerts.prune(&live);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_by_leading_quantity() {
        assert_eq!(quantity_to_unit("realpower.output.L1"), "W");
        assert_eq!(quantity_to_unit("voltage.input"), "V");
        assert_eq!(quantity_to_unit("load"), "%");
        assert_eq!(quantity_to_unit("charge.battery"), "%");
        assert_eq!(quantity_to_unit("status.ups"), "");
    }

    #[test]
    fn metric_kind_carries_unit_suffix() {
        let name = "realpower.output.L1";
        let unit = quantity_to_unit(name);
        assert_eq!(format!("{name}@{unit}"), "realpower.output.L1@W");
    }
}
