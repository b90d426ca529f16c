//! Eligibility gate for automatic pinging.
//!
//! `GateState` owns every input of the gate (charging, connectivity, the
//! auto-ping flag, the channel key) plus the derived status. Transitions go
//! through [`GateState::apply`], which mutates the state and returns the
//! side effects for the caller to execute. The transition logic itself
//! touches no clock, no network and no storage, so it is testable with
//! plain asserts.

use chrono::{DateTime, Utc};

use crate::types::{ConditionSet, EventType, RequestStatus, StatusSnapshot};

/// An input event entering the gate.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    ChargingChanged(bool),
    ConnectivityChanged(bool),
    SetAutoPing(bool),
    /// Pre-normalized channel key (see [`crate::types::normalize_channel_key`]).
    SetChannelKey(String),
    /// One firing of the periodic trigger.
    Tick,
    /// Manual "test request" trigger.
    ManualRequest,
    /// Completion of an in-flight ping.
    PingCompleted {
        success: bool,
        status_code: Option<u16>,
        at: DateTime<Utc>,
    },
}

/// A side effect the caller must execute after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Spawn one ping for the given key. Never cancelled once sent.
    SendPing { channel_key: String },
    /// Arm (or restart) the periodic trigger.
    ArmTimer,
    /// Cancel the periodic trigger. Idempotent.
    CancelTimer,
    /// Append one event-log record.
    Append {
        event_type: EventType,
        detail: Option<String>,
    },
    /// Persist the channel key.
    PersistChannelKey(String),
    /// Persist the auto-ping flag.
    PersistAutoPing(bool),
}

fn append(event_type: EventType, detail: impl Into<String>) -> Effect {
    Effect::Append {
        event_type,
        detail: Some(detail.into()),
    }
}

/// The eligibility state machine.
#[derive(Debug, Clone)]
pub struct GateState {
    charging: bool,
    connected: bool,
    auto_enabled: bool,
    channel_key: String,
    status: RequestStatus,
    timer_armed: bool,
    last_request_at: Option<DateTime<Utc>>,
}

impl GateState {
    /// Rebuild the gate from persisted settings. Both external signals start
    /// `false`, so a freshly restored gate is always ineligible.
    pub fn restore(channel_key: String, auto_enabled: bool) -> Self {
        Self {
            charging: false,
            connected: false,
            auto_enabled,
            channel_key,
            status: RequestStatus::Error,
            timer_armed: false,
            last_request_at: None,
        }
    }

    pub fn conditions(&self) -> ConditionSet {
        ConditionSet {
            charging: self.charging,
            connected: self.connected,
            auto_enabled: self.auto_enabled,
            identifier_present: !self.channel_key.is_empty(),
        }
    }

    pub fn is_eligible(&self) -> bool {
        self.conditions().is_eligible()
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn timer_armed(&self) -> bool {
        self.timer_armed
    }

    pub fn channel_key(&self) -> &str {
        &self.channel_key
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.status,
            eligible: self.is_eligible(),
            conditions: self.conditions(),
            channel_key: self.channel_key.clone(),
            auto_enabled: self.auto_enabled,
            last_request_at: self.last_request_at,
        }
    }

    /// Apply one input, returning the effects to execute. Inputs equal to
    /// the current state are no-ops: no record, no persistence, no effects.
    pub fn apply(&mut self, input: Input) -> Vec<Effect> {
        match input {
            Input::ChargingChanged(charging) => {
                if charging == self.charging {
                    return Vec::new();
                }
                self.charging = charging;
                let mut effects = vec![append(
                    EventType::ChargingChanged,
                    if charging { "charging" } else { "not charging" },
                )];
                effects.extend(self.revalidate());
                effects
            }
            Input::ConnectivityChanged(connected) => {
                if connected == self.connected {
                    return Vec::new();
                }
                self.connected = connected;
                let mut effects = vec![append(
                    EventType::ConnectivityChanged,
                    if connected { "connected" } else { "disconnected" },
                )];
                effects.extend(self.revalidate());
                effects
            }
            Input::SetAutoPing(enabled) => {
                if enabled == self.auto_enabled {
                    return Vec::new();
                }
                self.auto_enabled = enabled;
                let mut effects = vec![
                    append(EventType::AutoToggled, toggle_detail(enabled)),
                    Effect::PersistAutoPing(enabled),
                ];
                effects.extend(self.revalidate());
                effects
            }
            Input::SetChannelKey(key) => {
                if key == self.channel_key {
                    return Vec::new();
                }
                self.channel_key = key.clone();
                let mut effects = vec![Effect::PersistChannelKey(key)];
                // Clearing the key while auto mode is on force-disables it.
                if self.channel_key.is_empty() && self.auto_enabled {
                    self.auto_enabled = false;
                    effects.push(append(EventType::AutoToggled, toggle_detail(false)));
                    effects.push(Effect::PersistAutoPing(false));
                }
                effects.extend(self.revalidate());
                effects
            }
            Input::Tick => {
                if self.is_eligible() {
                    self.status = RequestStatus::Idle;
                    vec![Effect::SendPing {
                        channel_key: self.channel_key.clone(),
                    }]
                } else {
                    // Stale tick: the timer is cancelled on the ineligible
                    // edge, so this only happens if a tick raced the cancel.
                    self.status = RequestStatus::Error;
                    Vec::new()
                }
            }
            Input::ManualRequest => {
                if !self.connected {
                    self.status = RequestStatus::Error;
                    return Vec::new();
                }
                let mut effects = vec![append(EventType::TestRequest, "manual test request")];
                if self.auto_enabled {
                    if self.is_eligible() {
                        self.status = RequestStatus::Idle;
                        self.timer_armed = true;
                        effects.push(Effect::SendPing {
                            channel_key: self.channel_key.clone(),
                        });
                        effects.push(Effect::ArmTimer);
                    } else {
                        self.status = RequestStatus::Error;
                    }
                } else {
                    // One-off ping; no timer.
                    self.status = RequestStatus::Idle;
                    effects.push(Effect::SendPing {
                        channel_key: self.channel_key.clone(),
                    });
                }
                effects
            }
            Input::PingCompleted {
                success,
                status_code,
                at,
            } => {
                self.last_request_at = Some(at);
                self.status = if success {
                    RequestStatus::Success
                } else {
                    RequestStatus::Warning
                };
                let (event_type, detail) = match (success, status_code) {
                    (true, Some(code)) => (
                        EventType::RequestSuccess,
                        format!("request succeeded, status code {code}"),
                    ),
                    (true, None) => (EventType::RequestSuccess, "request succeeded".into()),
                    (false, Some(code)) => (
                        EventType::RequestFailure,
                        format!("request failed, status code {code}"),
                    ),
                    (false, None) => (
                        EventType::RequestFailure,
                        "request failed, transport error".into(),
                    ),
                };
                vec![append(event_type, detail)]
            }
        }
    }

    /// Re-evaluate the gate after an input change. On the eligible edge:
    /// one immediate ping plus an armed timer. On the ineligible edge: the
    /// timer is cancelled synchronously.
    fn revalidate(&mut self) -> Vec<Effect> {
        if self.is_eligible() {
            self.status = RequestStatus::Idle;
            if self.timer_armed {
                Vec::new()
            } else {
                self.timer_armed = true;
                vec![
                    Effect::SendPing {
                        channel_key: self.channel_key.clone(),
                    },
                    Effect::ArmTimer,
                ]
            }
        } else {
            self.status = RequestStatus::Error;
            if self.timer_armed {
                self.timer_armed = false;
                vec![Effect::CancelTimer]
            } else {
                Vec::new()
            }
        }
    }
}

fn toggle_detail(enabled: bool) -> &'static str {
    if enabled {
        "auto ping enabled"
    } else {
        "auto ping disabled"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eligible_gate() -> GateState {
        let mut gate = GateState::restore("ABC123".into(), true);
        gate.apply(Input::ChargingChanged(true));
        gate.apply(Input::ConnectivityChanged(true));
        gate
    }

    fn has_ping(effects: &[Effect]) -> bool {
        effects
            .iter()
            .any(|e| matches!(e, Effect::SendPing { .. }))
    }

    #[test]
    fn restored_gate_is_ineligible() {
        let gate = GateState::restore("ABC123".into(), true);
        assert!(!gate.is_eligible());
        assert_eq!(gate.status(), RequestStatus::Error);
        assert!(!gate.timer_armed());
    }

    #[test]
    fn eligibility_matches_conjunction_for_all_combinations() {
        for bits in 0u8..16 {
            let mut gate = GateState::restore(
                if bits & 8 != 0 { "KEY".into() } else { String::new() },
                bits & 4 != 0,
            );
            gate.apply(Input::ChargingChanged(bits & 1 != 0));
            gate.apply(Input::ConnectivityChanged(bits & 2 != 0));
            assert_eq!(gate.is_eligible(), bits == 0b1111, "bits {bits:04b}");
        }
    }

    #[test]
    fn eligible_edge_pings_once_and_arms_once() {
        let mut gate = GateState::restore("ABC123".into(), true);
        let fx = gate.apply(Input::ChargingChanged(true));
        assert!(!has_ping(&fx), "gate not yet open");

        let fx = gate.apply(Input::ConnectivityChanged(true));
        let pings = fx
            .iter()
            .filter(|e| matches!(e, Effect::SendPing { .. }))
            .count();
        let arms = fx.iter().filter(|e| matches!(e, Effect::ArmTimer)).count();
        assert_eq!(pings, 1);
        assert_eq!(arms, 1);
        assert_eq!(gate.status(), RequestStatus::Idle);
        assert!(gate.timer_armed());
    }

    #[test]
    fn ping_carries_current_key() {
        let mut gate = GateState::restore("ABC123".into(), true);
        gate.apply(Input::ChargingChanged(true));
        let fx = gate.apply(Input::ConnectivityChanged(true));
        assert!(fx.contains(&Effect::SendPing {
            channel_key: "ABC123".into()
        }));
    }

    #[test]
    fn duplicate_inputs_are_noops() {
        let mut gate = eligible_gate();
        assert!(gate.apply(Input::ChargingChanged(true)).is_empty());
        assert!(gate.apply(Input::ConnectivityChanged(true)).is_empty());
        assert!(gate.apply(Input::SetAutoPing(true)).is_empty());
        assert!(gate.apply(Input::SetChannelKey("ABC123".into())).is_empty());
    }

    #[test]
    fn losing_a_condition_cancels_timer_and_errors() {
        let mut gate = eligible_gate();
        let fx = gate.apply(Input::ChargingChanged(false));
        assert!(fx.contains(&Effect::CancelTimer));
        assert_eq!(gate.status(), RequestStatus::Error);
        assert!(!gate.timer_armed());

        // Cancel is idempotent: losing a second condition emits no second cancel.
        let fx = gate.apply(Input::ConnectivityChanged(false));
        assert!(!fx.contains(&Effect::CancelTimer));
    }

    #[test]
    fn every_input_change_appends_matching_record() {
        let mut gate = GateState::restore(String::new(), false);
        let fx = gate.apply(Input::ChargingChanged(true));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::ChargingChanged,
                ..
            }
        )));
        let fx = gate.apply(Input::ConnectivityChanged(true));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::ConnectivityChanged,
                ..
            }
        )));
        let fx = gate.apply(Input::SetAutoPing(true));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::AutoToggled,
                ..
            }
        )));
    }

    #[test]
    fn key_edit_persists_without_record() {
        let mut gate = GateState::restore(String::new(), false);
        let fx = gate.apply(Input::SetChannelKey("ABC123".into()));
        assert!(fx.contains(&Effect::PersistChannelKey("ABC123".into())));
        assert!(!fx.iter().any(|e| matches!(e, Effect::Append { .. })));
    }

    #[test]
    fn clearing_key_force_disables_auto() {
        let mut gate = eligible_gate();
        let fx = gate.apply(Input::SetChannelKey(String::new()));

        assert!(fx.contains(&Effect::PersistChannelKey(String::new())));
        assert!(fx.contains(&Effect::PersistAutoPing(false)));
        assert!(fx.contains(&Effect::CancelTimer));
        let toggles = fx
            .iter()
            .filter(|e| matches!(
                e,
                Effect::Append {
                    event_type: EventType::AutoToggled,
                    ..
                }
            ))
            .count();
        assert_eq!(toggles, 1);
        assert_eq!(gate.status(), RequestStatus::Error);
        assert!(!gate.conditions().auto_enabled);
    }

    #[test]
    fn clearing_key_with_auto_off_stays_silent() {
        let mut gate = GateState::restore("ABC123".into(), false);
        let fx = gate.apply(Input::SetChannelKey(String::new()));
        assert!(!fx.iter().any(|e| matches!(e, Effect::Append { .. })));
        assert_eq!(gate.status(), RequestStatus::Error);
    }

    #[test]
    fn tick_pings_while_eligible() {
        let mut gate = eligible_gate();
        let fx = gate.apply(Input::Tick);
        assert!(has_ping(&fx));
        assert!(!fx.contains(&Effect::ArmTimer), "tick does not re-arm");
        assert_eq!(gate.status(), RequestStatus::Idle);
    }

    #[test]
    fn stale_tick_while_ineligible_is_rejected() {
        let mut gate = GateState::restore("ABC123".into(), true);
        let fx = gate.apply(Input::Tick);
        assert!(fx.is_empty());
        assert_eq!(gate.status(), RequestStatus::Error);
    }

    #[test]
    fn manual_request_offline_rejected_silently() {
        let mut gate = GateState::restore("ABC123".into(), false);
        let fx = gate.apply(Input::ManualRequest);
        assert!(fx.is_empty());
        assert_eq!(gate.status(), RequestStatus::Error);
    }

    #[test]
    fn manual_request_one_off_when_auto_disabled() {
        let mut gate = GateState::restore("ABC123".into(), false);
        gate.apply(Input::ConnectivityChanged(true));
        let fx = gate.apply(Input::ManualRequest);

        assert!(has_ping(&fx));
        assert!(!fx.contains(&Effect::ArmTimer));
        assert!(!gate.timer_armed());
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::TestRequest,
                ..
            }
        )));
        assert_eq!(gate.status(), RequestStatus::Idle);
    }

    #[test]
    fn manual_request_rearms_when_auto_enabled() {
        let mut gate = eligible_gate();
        let fx = gate.apply(Input::ManualRequest);
        assert!(has_ping(&fx));
        assert!(fx.contains(&Effect::ArmTimer));
        assert!(gate.timer_armed());
    }

    #[test]
    fn manual_request_with_auto_on_but_gate_closed_errors() {
        // Connected but not charging: the test record is appended, the
        // automatic action is refused, no timer is armed.
        let mut gate = GateState::restore("ABC123".into(), true);
        gate.apply(Input::ConnectivityChanged(true));
        let fx = gate.apply(Input::ManualRequest);

        assert!(!has_ping(&fx));
        assert!(!fx.contains(&Effect::ArmTimer));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::TestRequest,
                ..
            }
        )));
        assert_eq!(gate.status(), RequestStatus::Error);
    }

    #[test]
    fn ping_success_sets_status_and_timestamp() {
        let mut gate = eligible_gate();
        let at = Utc::now();
        let fx = gate.apply(Input::PingCompleted {
            success: true,
            status_code: Some(200),
            at,
        });
        assert_eq!(gate.status(), RequestStatus::Success);
        assert_eq!(gate.snapshot().last_request_at, Some(at));
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::RequestSuccess,
                detail: Some(d),
            } if d.contains("200")
        )));
    }

    #[test]
    fn ping_failure_503_sets_warning_with_code_in_detail() {
        let mut gate = eligible_gate();
        let fx = gate.apply(Input::PingCompleted {
            success: false,
            status_code: Some(503),
            at: Utc::now(),
        });
        assert_eq!(gate.status(), RequestStatus::Warning);
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::RequestFailure,
                detail: Some(d),
            } if d.contains("503")
        )));
    }

    #[test]
    fn ping_transport_failure_has_no_code_in_detail() {
        let mut gate = eligible_gate();
        let fx = gate.apply(Input::PingCompleted {
            success: false,
            status_code: None,
            at: Utc::now(),
        });
        assert!(fx.iter().any(|e| matches!(
            e,
            Effect::Append {
                event_type: EventType::RequestFailure,
                detail: Some(d),
            } if d.contains("transport")
        )));
    }

    #[test]
    fn late_outcome_after_gate_closed_is_still_logged() {
        let mut gate = eligible_gate();
        gate.apply(Input::ChargingChanged(false));
        let fx = gate.apply(Input::PingCompleted {
            success: true,
            status_code: Some(200),
            at: Utc::now(),
        });
        assert!(fx.iter().any(|e| matches!(e, Effect::Append { .. })));
        assert_eq!(gate.status(), RequestStatus::Success);
    }

    #[test]
    fn enabling_auto_with_empty_key_stays_closed() {
        let mut gate = GateState::restore(String::new(), false);
        gate.apply(Input::ChargingChanged(true));
        gate.apply(Input::ConnectivityChanged(true));
        let fx = gate.apply(Input::SetAutoPing(true));
        assert!(!has_ping(&fx));
        assert_eq!(gate.status(), RequestStatus::Error);
    }

    #[test]
    fn setting_key_last_opens_gate() {
        let mut gate = GateState::restore(String::new(), true);
        gate.apply(Input::ChargingChanged(true));
        gate.apply(Input::ConnectivityChanged(true));
        let fx = gate.apply(Input::SetChannelKey("ABC123".into()));
        assert!(has_ping(&fx));
        assert!(fx.contains(&Effect::ArmTimer));
    }
}
