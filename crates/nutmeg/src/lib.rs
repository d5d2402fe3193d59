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
// Main exports for the nutmeg device model engine.

pub mod client;
pub mod device;
pub mod errors;
pub mod mapping;
pub mod registry;
pub mod transform;

// Export the working set for convenience.
pub use client::{DEFAULT_NUT_PORT, NutClient};
pub use device::{InventoryValue, NutDevice, PhysicalValue, format_fixed};
pub use errors::NutmegError;
pub use mapping::{MappingKind, MappingStore};
pub use registry::{MEASUREMENT_REPEAT_AFTER, NutDeviceList};
pub use transform::VarMap;
