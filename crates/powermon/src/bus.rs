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

// src/bus.rs
// North-bound MQTT client: publishes metric/inventory/alert/rule
// events and surfaces incoming asset topology messages.
//
// The publishing half and the event loop are split so the agent can
// publish from its poll path while the select loop drives the event
// loop; both sides live on the same single-threaded runtime.

use std::time::Duration;

use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Packet, QoS};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::PowermonError;
use crate::messages::{AlertMessage, AssetMessage, InventoryMessage, MetricMessage, RuleMessage};

pub const METRIC_TOPIC_PREFIX: &str = "metrics/power";
pub const SENSOR_TOPIC_PREFIX: &str = "metrics/sensor";
pub const INVENTORY_TOPIC_PREFIX: &str = "inventory";
pub const ALERT_TOPIC_PREFIX: &str = "alerts";
pub const RULE_TOPIC_PREFIX: &str = "rules";
pub const ASSET_TOPIC_FILTER: &str = "assets/#";

const DEFAULT_KEEP_ALIVE: Duration = Duration::from_secs(300);
const DEFAULT_MESSAGE_CHANNEL_CAPACITY: usize = 1000;

/// Create the broker connection, subscribe to asset topology, and
/// return the publish handle plus the event stream the select loop
/// drives. Construction failure is the one bus error that stops the
/// service.
pub async fn connect(
    host: &str,
    port: u16,
    client_id: &str,
) -> Result<(BusClient, BusEventStream), PowermonError> {
    let mut options = MqttOptions::new(client_id, host, port);
    options.set_keep_alive(DEFAULT_KEEP_ALIVE);
    options.set_clean_session(false);

    let (client, event_loop) = AsyncClient::new(options, DEFAULT_MESSAGE_CHANNEL_CAPACITY);
    client.subscribe(ASSET_TOPIC_FILTER, QoS::AtLeastOnce).await?;

    info!("Created MQTT client for {}:{}", host, port);
    Ok((
        BusClient { client },
        BusEventStream { event_loop },
    ))
}

/// Publishing half. Periodic measurements go out at QoS 0 (they are
/// republished anyway and carry a TTL); alerts, rules and inventory at
/// QoS 1.
pub struct BusClient {
    client: AsyncClient,
}

impl BusClient {
    pub async fn publish_metric(&self, message: &MetricMessage) -> Result<(), PowermonError> {
        let topic = format!("{METRIC_TOPIC_PREFIX}/{}@{}", message.kind, message.device);
        self.publish_json(&topic, QoS::AtMostOnce, message).await
    }

    pub async fn publish_sensor_metric(
        &self,
        message: &MetricMessage,
    ) -> Result<(), PowermonError> {
        let topic = format!("{SENSOR_TOPIC_PREFIX}/{}@{}", message.kind, message.device);
        self.publish_json(&topic, QoS::AtMostOnce, message).await
    }

    pub async fn publish_inventory(
        &self,
        message: &InventoryMessage,
    ) -> Result<(), PowermonError> {
        let topic = format!("{INVENTORY_TOPIC_PREFIX}/{}", message.device);
        self.publish_json(&topic, QoS::AtLeastOnce, message).await
    }

    pub async fn publish_alert(&self, message: &AlertMessage) -> Result<(), PowermonError> {
        let topic = format!("{ALERT_TOPIC_PREFIX}/{}@{}", message.rule, message.device);
        self.publish_json(&topic, QoS::AtLeastOnce, message).await
    }

    pub async fn publish_rule(&self, message: &RuleMessage) -> Result<(), PowermonError> {
        let topic = format!("{RULE_TOPIC_PREFIX}/{}@{}", message.rule, message.device);
        self.publish_json(&topic, QoS::AtLeastOnce, message).await
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self.client.disconnect().await {
            debug!(error = %e, "MQTT disconnect failed");
        }
    }

    async fn publish_json(
        &self,
        topic: &str,
        qos: QoS,
        payload: &impl Serialize,
    ) -> Result<(), PowermonError> {
        let bytes = serde_json::to_vec(payload)?;
        self.client.publish(topic, qos, false, bytes).await?;
        Ok(())
    }
}

/// Receiving half: owns the rumqttc event loop. One call awaits one
/// event; everything that is not an asset topology message comes back
/// as `None` so the caller's select loop stays responsive.
pub struct BusEventStream {
    event_loop: EventLoop,
}

impl BusEventStream {
    pub async fn next_asset(&mut self) -> Option<AssetMessage> {
        match self.event_loop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                if publish.topic != "assets" && !publish.topic.starts_with("assets/") {
                    debug!(topic = %publish.topic, "Ignoring publish on unexpected topic");
                    return None;
                }
                match serde_json::from_slice::<AssetMessage>(&publish.payload) {
                    Ok(message) => Some(message),
                    Err(e) => {
                        warn!(topic = %publish.topic, error = %e, "Malformed asset message, skipping");
                        None
                    }
                }
            }
            Ok(_) => None,
            Err(e) => {
                // rumqttc reconnects on the next poll; back off so a
                // dead broker does not spin the loop.
                warn!(error = %e, "MQTT event loop error");
                tokio::time::sleep(Duration::from_secs(1)).await;
                None
            }
        }
    }
}
