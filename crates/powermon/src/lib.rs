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

// src/lib.rs
// Main exports and the service loop of the powermon agent.

pub mod agent;
pub mod alerts;
pub mod bus;
pub mod config;
pub mod errors;
pub mod messages;
pub mod sensors;
pub mod state;

pub use config::Config;
pub use errors::PowermonError;

use nutmeg::{MappingStore, NutClient, NutDeviceList};
use tokio::signal::unix::{SignalKind, signal};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, warn};

use crate::agent::NutAgent;
use crate::sensors::Sensors;
use crate::state::AssetState;

/// Run the agent until a shutdown signal arrives.
///
/// The whole service is one cooperative loop with a single wait point;
/// daemon and bus I/O happen inline, bounded by their own timeouts.
/// Only bus-client construction failures are fatal here; every other
/// error is logged and retried on a later cycle.
pub async fn run_service(config: Config) -> Result<(), PowermonError> {
    let mut mapping = MappingStore::new();
    if let Err(e) = mapping.load(&config.mapping) {
        // Non-fatal: the agent idles (and publishes nothing) until the
        // file is fixed and the service restarted.
        error!(error = %e, "Could not load name mapping, advertising is disabled");
    }

    let mut asset_state = AssetState::load(&config.state_file);

    let (bus, mut bus_events) =
        bus::connect(&config.broker_host, config.broker_port, &config.client_id).await?;

    let registry = NutDeviceList::new(
        NutClient::new(config.nut_host.clone(), config.nut_port)
            .with_timeout(config.nut_timeout),
        config.threshold,
    );
    let mut agent = NutAgent::new(
        registry,
        mapping,
        bus,
        config.poll_interval,
        config.inventory_interval,
    );

    let mut sensors = Sensors::new(
        NutClient::new(config.nut_host.clone(), config.nut_port)
            .with_timeout(config.nut_timeout),
    );
    sensors.update_sensor_list(&asset_state);
    let sensor_ttl = (2 * config.sensor_interval.as_secs()) as u32;

    let mut poll = tokio::time::interval(config.poll_interval);
    poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut sensor_poll = tokio::time::interval(config.sensor_interval);
    sensor_poll.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;

    loop {
        tokio::select! {
            _ = sigint.recv() => {
                info!("Received interrupt, shutting down");
                break;
            }
            _ = sigterm.recv() => {
                info!("Received terminate, shutting down");
                break;
            }
            _ = poll.tick() => {
                agent.on_poll().await;
            }
            _ = sensor_poll.tick() => {
                sensors.update_from_nut().await;
                sensors.publish(agent.bus(), sensor_ttl).await;
            }
            asset = bus_events.next_asset() => {
                if let Some(message) = asset {
                    info!(asset = %message.name, "Received asset topology update");
                    if asset_state.apply(&message) {
                        if let Err(e) = asset_state.save(&config.state_file) {
                            warn!(error = %e, "Could not save asset state");
                        }
                        sensors.update_sensor_list(&asset_state);
                        agent.schedule_forced_update();
                    }
                }
            }
        }
    }

    agent.shutdown().await;
    Ok(())
}
