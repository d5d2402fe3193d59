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

// src/config.rs
// Runtime configuration, parsed from CLI flags with environment
// variable fallbacks.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "powermon")]
#[command(about = "Polls the local NUT daemon and publishes metrics, inventory and alerts to the bus.", long_about = None)]
pub struct Config {
    // NUT daemon host
    #[arg(long, env = "POWERMON_NUT_HOST", default_value = "localhost")]
    pub nut_host: String,

    // NUT daemon port
    #[arg(long, env = "POWERMON_NUT_PORT", default_value_t = nutmeg::DEFAULT_NUT_PORT)]
    pub nut_port: u16,

    // Per-operation NUT I/O deadline
    #[arg(long, env = "POWERMON_NUT_TIMEOUT", default_value = "5s", value_parser = humantime::parse_duration)]
    pub nut_timeout: Duration,

    // MQTT broker host
    #[arg(long, env = "POWERMON_BROKER_HOST", default_value = "localhost")]
    pub broker_host: String,

    // MQTT broker port
    #[arg(long, env = "POWERMON_BROKER_PORT", default_value_t = 1883)]
    pub broker_port: u16,

    // MQTT client ID
    #[arg(long, env = "POWERMON_CLIENT_ID", default_value = "powermon")]
    pub client_id: String,

    // Path to the JSON name-mapping file
    #[arg(long, env = "POWERMON_MAPPING")]
    pub mapping: PathBuf,

    // Asset topology cache location
    #[arg(
        long,
        env = "POWERMON_STATE_FILE",
        default_value = "/var/lib/powermon/nut/state_file"
    )]
    pub state_file: PathBuf,

    // Device poll cadence
    #[arg(long, env = "POWERMON_POLL_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub poll_interval: Duration,

    // Soft cadence for inventory snapshots
    #[arg(long, env = "POWERMON_INVENTORY_INTERVAL", default_value = "5m", value_parser = humantime::parse_duration)]
    pub inventory_interval: Duration,

    // Environmental sensor poll cadence
    #[arg(long, env = "POWERMON_SENSOR_INTERVAL", default_value = "30s", value_parser = humantime::parse_duration)]
    pub sensor_interval: Duration,

    // Default percent change required to publish a new reading
    #[arg(long, env = "POWERMON_THRESHOLD", default_value_t = 5)]
    pub threshold: u32,
}
