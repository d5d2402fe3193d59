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

//! Alert-state tracking. The daemon surfaces alarms as a per-device
//! `ups.alarm` string; this module remembers the last published
//! fingerprint per device and turns changes into alert events, plus
//! one declarative rule event the first time a rule identity shows up.

use std::collections::{BTreeMap, BTreeSet};

use nutmeg::NutDevice;

use crate::messages::{AlertMessage, AlertState, RuleMessage};

/// The daemon variable the alert fingerprint is read from.
const ALARM_PROPERTY: &str = "ups.alarm";

/// Alarm strings that mean "no alarm" besides the empty string.
const NO_ALARM: &str = "none";

/// One pending transition: the alert to publish, the rule to publish
/// first if its identity is new, and the fingerprint to remember once
/// the alert went out.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlertTransition {
    pub alert: AlertMessage,
    pub rule: Option<RuleMessage>,
    fingerprint: String,
}

/// Per-device alert bookkeeping. Fingerprints advance only after a
/// successful publish, so a failed publish is retried on the next
/// scan.
#[derive(Debug, Default)]
pub struct AlertSubsystem {
    fingerprints: BTreeMap<String, String>,
    published_rules: BTreeSet<String>,
}

impl AlertSubsystem {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare every device's current alarm surface against the last
    /// published fingerprint and collect the transitions to publish.
    /// A device first seen in a healthy state produces nothing.
    pub fn scan<'a>(
        &self,
        devices: impl Iterator<Item = &'a NutDevice>,
        now: i64,
    ) -> Vec<AlertTransition> {
        let mut transitions = Vec::new();
        for device in devices {
            let fingerprint = device.property(ALARM_PROPERTY).unwrap_or_default();
            let active = !fingerprint.is_empty() && fingerprint != NO_ALARM;
            let prior = self.fingerprints.get(device.name());

            let changed = match prior {
                Some(previous) => previous != &fingerprint,
                // Unknown device: only an active alarm is worth an event.
                None => active,
            };
            if !changed {
                continue;
            }

            let rule_name = format!("{ALARM_PROPERTY}@{}", device.name());
            let rule = if self.published_rules.contains(&rule_name) {
                None
            } else {
                Some(RuleMessage {
                    rule: rule_name.clone(),
                    device: device.name().to_string(),
                    class: "alarm".to_string(),
                    description: format!(
                        "Raise an alert while {ALARM_PROPERTY} on {} reports an alarm",
                        device.name()
                    ),
                })
            };

            let (state, description) = if active {
                (AlertState::Active, fingerprint.clone())
            } else {
                (AlertState::Resolved, "UPS alarms resolved".to_string())
            };

            transitions.push(AlertTransition {
                alert: AlertMessage {
                    device: device.name().to_string(),
                    rule: rule_name,
                    state,
                    severity: "WARNING".to_string(),
                    description,
                    time: now,
                },
                rule,
                fingerprint,
            });
        }
        transitions
    }

    /// Remember a fingerprint after its alert event went out.
    pub fn commit(&mut self, transition: &AlertTransition) {
        self.fingerprints
            .insert(transition.alert.device.clone(), transition.fingerprint.clone());
    }

    /// Remember a rule identity after its rule event went out.
    pub fn commit_rule(&mut self, rule: &RuleMessage) {
        self.published_rules.insert(rule.rule.clone());
    }

    /// Forget devices the registry no longer tracks, so a device that
    /// comes back is treated as new.
    pub fn prune(&mut self, live: &BTreeSet<String>) {
        self.fingerprints.retain(|device, _| live.contains(device));
        self.published_rules
            .retain(|rule| match rule.split_once('@') {
                Some((_, device)) => live.contains(device),
                None => false,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device_with_alarm(name: &str, alarm: Option<&str>) -> NutDevice {
        let mut device = NutDevice::new(name, 5);
        if let Some(alarm) = alarm {
            device.update_inventory(ALARM_PROPERTY, &[alarm.to_string()]);
        }
        device
    }

    fn commit_all(subsystem: &mut AlertSubsystem, transitions: &[AlertTransition]) {
        for t in transitions {
            if let Some(rule) = &t.rule {
                subsystem.commit_rule(rule);
            }
            subsystem.commit(t);
        }
    }

    #[test]
    fn healthy_device_first_seen_is_silent() {
        let subsystem = AlertSubsystem::new();
        let device = device_with_alarm("ups-1", None);
        assert!(subsystem.scan([&device].into_iter(), 0).is_empty());

        let device = device_with_alarm("ups-1", Some("none"));
        assert!(subsystem.scan([&device].into_iter(), 0).is_empty());
    }

    #[test]
    fn alarm_raises_then_resolves() {
        let mut subsystem = AlertSubsystem::new();

        let device = device_with_alarm("ups-1", Some("low battery!"));
        let transitions = subsystem.scan([&device].into_iter(), 100);
        assert_eq!(transitions.len(), 1);
        let t = &transitions[0];
        assert_eq!(t.alert.state, AlertState::Active);
        assert_eq!(t.alert.description, "low battery!");
        assert_eq!(t.alert.rule, "ups.alarm@ups-1");
        assert!(t.rule.is_some(), "first sighting carries the rule");
        commit_all(&mut subsystem, &transitions);

        // Same alarm again: no new event.
        assert!(subsystem.scan([&device].into_iter(), 101).is_empty());

        // Alarm clears.
        let device = device_with_alarm("ups-1", Some(""));
        let transitions = subsystem.scan([&device].into_iter(), 102);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].alert.state, AlertState::Resolved);
        assert!(
            transitions[0].rule.is_none(),
            "rule identity already published"
        );
    }

    #[test]
    fn uncommitted_transition_is_rescanned() {
        // A failed publish must not advance the fingerprint.
        let subsystem = AlertSubsystem::new();
        let device = device_with_alarm("ups-1", Some("on battery"));
        assert_eq!(subsystem.scan([&device].into_iter(), 0).len(), 1);
        assert_eq!(subsystem.scan([&device].into_iter(), 1).len(), 1);
    }

    #[test]
    fn prune_forgets_dead_devices() {
        let mut subsystem = AlertSubsystem::new();
        let device = device_with_alarm("ups-1", Some("overload"));
        let transitions = subsystem.scan([&device].into_iter(), 0);
        commit_all(&mut subsystem, &transitions);

        subsystem.prune(&BTreeSet::new());

        // Back from the dead: treated as a brand new device.
        let transitions = subsystem.scan([&device].into_iter(), 1);
        assert_eq!(transitions.len(), 1);
        assert!(transitions[0].rule.is_some());
    }

    #[test]
    fn alarm_text_change_is_a_transition() {
        let mut subsystem = AlertSubsystem::new();
        let device = device_with_alarm("ups-1", Some("on battery"));
        let transitions = subsystem.scan([&device].into_iter(), 0);
        commit_all(&mut subsystem, &transitions);

        let device = device_with_alarm("ups-1", Some("low battery"));
        let transitions = subsystem.scan([&device].into_iter(), 1);
        assert_eq!(transitions.len(), 1);
        assert_eq!(transitions[0].alert.state, AlertState::Active);
        assert_eq!(transitions[0].alert.description, "low battery");
    }
}
