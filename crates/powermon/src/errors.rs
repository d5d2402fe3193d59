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

// src/errors.rs
// Error types for the powermon agent.

use thiserror::Error;

// PowermonError covers the error conditions of the agent itself.
// Only bus-client construction failures are fatal; everything else is
// logged and retried on the next cycle.
#[derive(Error, Debug)]
pub enum PowermonError {
    // Bus occurs when publishing to or subscribing on the MQTT broker
    // fails. A failed publish leaves the pending flag set so the
    // event is retried on the next cycle.
    #[error("MQTT client error: {0}")]
    Bus(#[from] rumqttc::ClientError),
    // Json occurs when an outgoing payload cannot be serialized.
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
    // Io occurs when the asset state cache cannot be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    // Engine wraps device model errors surfaced to the agent.
    #[error(transparent)]
    Engine(#[from] nutmeg::NutmegError),
}
