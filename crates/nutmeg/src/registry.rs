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

//! Registry of device records, reconciled against the daemon's device
//! set on every poll cycle. Owns the daemon connection; records never
//! talk to the daemon themselves.

use std::collections::BTreeMap;

use chrono::Utc;
use tracing::{debug, warn};

use crate::client::NutClient;
use crate::device::NutDevice;
use crate::mapping::MappingStore;

/// Age in seconds after which stale data is dropped. Records that
/// cannot be refreshed keep their last values for half this long
/// before they are cleared.
pub const MEASUREMENT_REPEAT_AFTER: i64 = 300;

/// Collection of device records keyed by the daemon-assigned name.
pub struct NutDeviceList {
    devices: BTreeMap<String, NutDevice>,
    client: NutClient,
    default_threshold: u32,
}

impl NutDeviceList {
    pub fn new(client: NutClient, default_threshold: u32) -> Self {
        Self {
            devices: BTreeMap::new(),
            client,
            default_threshold,
        }
    }

    /// Connect to the daemon, swallowing failures; success is reported
    /// through the connection probe.
    pub async fn connect(&mut self) -> bool {
        if let Err(e) = self.client.connect().await {
            debug!(error = %e, "Could not connect to NUT daemon");
        }
        self.client.is_connected()
    }

    pub fn disconnect(&mut self) {
        self.client.disconnect();
    }

    /// Reconcile the record set against the daemon's current device
    /// list: new names get empty records, vanished names are dropped
    /// together with any pending candidates. A failed listing leaves
    /// the set as it is.
    pub async fn update_device_list(&mut self) {
        match self.client.device_names().await {
            Ok(names) => {
                for name in &names {
                    if !self.devices.contains_key(name) {
                        self.devices
                            .insert(name.clone(), NutDevice::new(name, self.default_threshold));
                    }
                }
                self.devices.retain(|name, _| names.contains(name));
            }
            Err(e) => {
                debug!(error = %e, "Could not list NUT devices, keeping previous set");
            }
        }
    }

    /// Refresh every record from the daemon. A record whose fetch
    /// fails keeps its stale values until the last successful update
    /// is older than half the repeat interval, at which point its
    /// measurements are cleared (publish-visible erasure).
    pub async fn update_device_status(&mut self, store: &MappingStore, force: bool) {
        let now = Utc::now().timestamp();
        let Self {
            devices, client, ..
        } = self;
        for (name, device) in devices.iter_mut() {
            match client.device_vars(name).await {
                Ok(vars) => device.update(vars, store, force),
                Err(e) => {
                    warn!(device = %name, error = %e, "Communication problem with device");
                    if now - device.last_update() > MEASUREMENT_REPEAT_AFTER / 2 {
                        device.clear();
                    }
                }
            }
        }
    }

    /// One full poll cycle: connect, reconcile, refresh, disconnect.
    /// The socket is never held across idle intervals.
    pub async fn update(&mut self, store: &MappingStore, force: bool) {
        if self.connect().await {
            self.update_device_list().await;
            self.update_device_status(store, force).await;
        }
        self.disconnect();
    }

    /// True iff any record has a pending physics or inventory entry.
    pub fn changed(&self) -> bool {
        self.devices.values().any(NutDevice::changed)
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&NutDevice> {
        self.devices.get(name)
    }

    pub fn devices(&self) -> impl Iterator<Item = &NutDevice> {
        self.devices.values()
    }

    pub fn devices_mut(&mut self) -> impl Iterator<Item = &mut NutDevice> {
        self.devices.values_mut()
    }

    #[cfg(test)]
    pub(crate) fn insert_device(&mut self, device: NutDevice) {
        self.devices.insert(device.name().to_string(), device);
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
    use tokio::net::TcpListener;

    use super::*;
    use crate::mapping::MappingStore;

    /// Daemon fixture serving devices B and C with one voltage each.
    async fn spawn_daemon() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let port = listener.local_addr().expect("addr").port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let (read_half, mut write_half) = socket.split();
            let mut reader = BufReader::new(read_half);
            let mut line = String::new();
            loop {
                line.clear();
                if reader.read_line(&mut line).await.unwrap_or(0) == 0 {
                    break;
                }
                let response = match line.trim_end() {
                    "LIST UPS" => concat!(
                        "BEGIN LIST UPS\n",
                        "UPS B \"ups B\"\n",
                        "UPS C \"ups C\"\n",
                        "END LIST UPS\n"
                    ),
                    "LIST VAR B" => concat!(
                        "BEGIN LIST VAR B\n",
                        "VAR B input.voltage \"230.0\"\n",
                        "END LIST VAR B\n"
                    ),
                    "LIST VAR C" => concat!(
                        "BEGIN LIST VAR C\n",
                        "VAR C input.voltage \"115.0\"\n",
                        "END LIST VAR C\n"
                    ),
                    _ => "ERR UNKNOWN-COMMAND\n",
                };
                write_half.write_all(response.as_bytes()).await.expect("write");
            }
        });
        port
    }

    fn store() -> MappingStore {
        MappingStore::from_tables(&[("input.voltage", "voltage.input")], &[])
    }

    #[tokio::test]
    async fn reconciliation_preserves_surviving_records() {
        let port = spawn_daemon().await;
        let mut list = NutDeviceList::new(NutClient::new("127.0.0.1", port), 5);

        let mut a = NutDevice::new("A", 5);
        a.update_physics("voltage.input", 230.0, 5);
        let mut b = NutDevice::new("B", 5);
        b.update_physics("voltage.input", 231.0, 5);
        b.commit_changes();
        list.insert_device(a);
        list.insert_device(b);

        assert!(list.connect().await);
        list.update_device_list().await;

        // A vanished, C appeared empty, B kept its state.
        assert!(list.get("A").is_none());
        assert_eq!(list.get("B").expect("B").physics(false)["voltage.input"], 23100);
        assert!(list.get("C").expect("C").physics(false).is_empty());
        assert_eq!(list.len(), 2);
    }

    #[tokio::test]
    async fn full_update_keeps_registry_aligned_with_daemon() {
        let port = spawn_daemon().await;
        let mut list = NutDeviceList::new(NutClient::new("127.0.0.1", port), 5);

        list.update(&store(), false).await;

        assert_eq!(list.len(), 2);
        assert_eq!(list.get("B").expect("B").physics(false)["voltage.input"], 23000);
        assert_eq!(list.get("C").expect("C").physics(false)["voltage.input"], 11500);
        assert!(list.changed());
        // The socket is released at the bottom of the cycle.
        assert!(!list.client.is_connected());
    }

    #[tokio::test]
    async fn failed_listing_keeps_previous_set() {
        // No daemon: connect fails, listing is skipped entirely.
        let mut list = NutDeviceList::new(NutClient::new("127.0.0.1", 1), 5);
        list.insert_device(NutDevice::new("A", 5));

        list.update(&store(), false).await;
        assert_eq!(list.len(), 1);
    }

    #[tokio::test]
    async fn stale_record_is_cleared_on_fetch_failure() {
        let mut list = NutDeviceList::new(NutClient::new("127.0.0.1", 1), 5);

        let now = Utc::now().timestamp();
        let mut stale = NutDevice::new("old", 5);
        stale.update_physics("voltage.input", 230.0, 5);
        stale.update_inventory("model", &["5P".to_string()]);
        stale.set_last_update(now - 200);

        let mut fresh = NutDevice::new("young", 5);
        fresh.update_physics("voltage.input", 230.0, 5);
        fresh.set_last_update(now - 100);

        list.insert_device(stale);
        list.insert_device(fresh);

        // Fetches fail (no connection); only the stale record is wiped.
        list.update_device_status(&store(), false).await;

        let old = list.get("old").expect("old");
        assert!(old.physics(false).is_empty());
        assert!(old.inventory(false).is_empty());
        assert_eq!(old.last_update(), now - 200);

        let young = list.get("young").expect("young");
        assert_eq!(young.physics(false).len(), 1);
    }
}
