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

//! Pre-normalization of raw daemon variables, applied before the name
//! mapping. Devices differ in which realpower/phase variables they
//! expose; this levels the differences so one mapping table fits all.

use std::collections::BTreeMap;

/// Raw variable batch as fetched from the daemon: variable name to its
/// list of values (almost always a single element).
pub type VarMap = BTreeMap<String, Vec<String>>;

/// Copy `src`'s values to `dst` unless `dst` already exists.
fn set_if_not_present(vars: &mut VarMap, dst: &str, src: &str) {
    if vars.contains_key(dst) {
        return;
    }
    if let Some(values) = vars.get(src).cloned() {
        vars.insert(dst.to_string(), values);
    }
}

/// Normalize a raw variable batch in place. All rules are idempotent;
/// nothing is removed and existing values are never overwritten, with
/// the single exception of the `pdu` -> `epdu` device type rewrite.
pub fn normalize(vars: &mut VarMap) {
    if vars.is_empty() {
        return;
    }

    // Single-phase devices usually do not report phase counts at all.
    if !vars.contains_key("input.phases") {
        vars.insert("input.phases".to_string(), vec!["1".to_string()]);
    }
    if !vars.contains_key("output.phases") {
        vars.insert("output.phases".to_string(), vec!["1".to_string()]);
    }

    // The daemon reports plain PDUs as "pdu"; upstream knows only epdu.
    if let Some(values) = vars.get_mut("device.type") {
        if values.first().map(String::as_str) == Some("pdu") {
            values[0] = "epdu".to_string();
        }
    }

    // Realpower lives under different names from ups to ups.
    set_if_not_present(vars, "ups.realpower", "input.realpower");
    set_if_not_present(vars, "ups.realpower", "outlet.realpower");
    set_if_not_present(vars, "input.L1.realpower", "input.realpower");
    set_if_not_present(vars, "input.L1.realpower", "ups.realpower");
    set_if_not_present(vars, "output.L1.realpower", "output.realpower");

    // Mirror input realpower as output and the other way around, per
    // total and per phase.
    for suffix in ["realpower", "L1.realpower", "L2.realpower", "L3.realpower"] {
        let outvar = format!("output.{suffix}");
        let invar = format!("input.{suffix}");
        set_if_not_present(vars, &outvar, &invar);
        set_if_not_present(vars, &invar, &outvar);
    }
}
