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
// Error types for the NUT device model engine.

use std::time::Duration;

use thiserror::Error;

// NutmegError covers all error conditions in the device model engine
// and the south-bound NUT client. Daemon-side failures are expected
// during normal operation (the daemon restarts, devices disappear) and
// callers are expected to swallow them per poll cycle.
#[derive(Error, Debug)]
pub enum NutmegError {
    // Io occurs when the TCP connection to the NUT daemon fails or
    // drops mid-conversation.
    #[error("NUT I/O error: {0}")]
    Io(#[from] std::io::Error),
    // Protocol occurs when the daemon answers with an ERR line or a
    // response that does not fit the expected list format.
    #[error("NUT protocol error: {0}")]
    Protocol(String),
    // Timeout occurs when a single daemon operation exceeds its
    // configured deadline.
    #[error("NUT operation timed out after {0:?}")]
    Timeout(Duration),
    // NotConnected occurs when a list operation is attempted without
    // an established daemon connection.
    #[error("not connected to the NUT daemon")]
    NotConnected,
    // Mapping occurs when the name-mapping configuration file cannot
    // be loaded. The mapping store keeps its previous state.
    #[error("mapping configuration error: {0}")]
    Mapping(String),
    // Json occurs when the mapping file is not valid JSON.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl NutmegError {
    // Create a Protocol error with a descriptive message.
    pub fn protocol(message: impl Into<String>) -> Self {
        Self::Protocol(message.into())
    }

    // Create a Mapping error with a descriptive message.
    pub fn mapping(message: impl Into<String>) -> Self {
        Self::Mapping(message.into())
    }

    // Check if this error is a daemon-side communication failure
    // (as opposed to a local configuration problem).
    pub fn is_daemon_error(&self) -> bool {
        matches!(
            self,
            Self::Io(_) | Self::Protocol(_) | Self::Timeout(_) | Self::NotConnected
        )
    }
}
