use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User-visible outcome of the most recent gate evaluation or ping.
/// Derived state — never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Gate open or a ping in flight, no outcome yet.
    Idle,
    /// Last ping succeeded.
    Success,
    /// Last ping failed; the next trigger will try again.
    Warning,
    /// Gate closed (some condition is false) or a trigger was rejected.
    Error,
}

impl RequestStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Success => "success",
            Self::Warning => "warning",
            Self::Error => "error",
        }
    }
}

/// Kind of an event-log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    RequestSuccess,
    RequestFailure,
    ChargingChanged,
    ConnectivityChanged,
    AutoToggled,
    TestRequest,
}

impl EventType {
    /// Convert to DB string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::RequestSuccess => "request_success",
            Self::RequestFailure => "request_failure",
            Self::ChargingChanged => "charging_changed",
            Self::ConnectivityChanged => "connectivity_changed",
            Self::AutoToggled => "auto_toggled",
            Self::TestRequest => "test_request",
        }
    }

    /// Parse from DB string representation.
    pub fn from_db(s: &str) -> Option<Self> {
        match s {
            "request_success" => Some(Self::RequestSuccess),
            "request_failure" => Some(Self::RequestFailure),
            "charging_changed" => Some(Self::ChargingChanged),
            "connectivity_changed" => Some(Self::ConnectivityChanged),
            "auto_toggled" => Some(Self::AutoToggled),
            "test_request" => Some(Self::TestRequest),
            _ => None,
        }
    }
}

/// One immutable event-log entry. Created exactly once per transition or
/// request outcome, never updated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub detail: Option<String>,
}

impl EventRecord {
    pub fn new(event_type: EventType, detail: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            event_type,
            detail,
        }
    }
}

/// The four inputs of the eligibility gate, as booleans.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConditionSet {
    pub charging: bool,
    pub connected: bool,
    pub auto_enabled: bool,
    pub identifier_present: bool,
}

impl ConditionSet {
    /// Auto-pinging is allowed iff every condition holds.
    pub fn is_eligible(&self) -> bool {
        self.charging && self.connected && self.auto_enabled && self.identifier_present
    }
}

/// Snapshot of engine state, broadcast on a watch channel after every
/// handled event. The presentation boundary reads this and nothing else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: RequestStatus,
    pub eligible: bool,
    pub conditions: ConditionSet,
    pub channel_key: String,
    pub auto_enabled: bool,
    pub last_request_at: Option<DateTime<Utc>>,
}

impl Default for StatusSnapshot {
    fn default() -> Self {
        Self {
            status: RequestStatus::Error,
            eligible: false,
            conditions: ConditionSet::default(),
            channel_key: String::new(),
            auto_enabled: false,
            last_request_at: None,
        }
    }
}

/// A user command entering the engine from the presentation layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Replace the channel key. Normalized before it reaches the gate.
    SetChannelKey(String),
    /// Enable or disable automatic pinging.
    SetAutoPing(bool),
    /// Manual one-shot trigger ("test request").
    TestRequest,
}

/// Case-normalize a user-supplied channel key: trimmed, uppercased.
pub fn normalize_channel_key(raw: &str) -> String {
    raw.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_db_roundtrip() {
        let types = [
            EventType::RequestSuccess,
            EventType::RequestFailure,
            EventType::ChargingChanged,
            EventType::ConnectivityChanged,
            EventType::AutoToggled,
            EventType::TestRequest,
        ];
        for ty in &types {
            assert_eq!(EventType::from_db(ty.as_db_str()), Some(*ty));
        }
        assert_eq!(EventType::from_db("nonsense"), None);
    }

    #[test]
    fn eligibility_requires_all_four() {
        for bits in 0u8..16 {
            let set = ConditionSet {
                charging: bits & 1 != 0,
                connected: bits & 2 != 0,
                auto_enabled: bits & 4 != 0,
                identifier_present: bits & 8 != 0,
            };
            assert_eq!(set.is_eligible(), bits == 0b1111);
        }
    }

    #[test]
    fn normalize_trims_and_uppercases() {
        assert_eq!(normalize_channel_key("  abc123 "), "ABC123");
        assert_eq!(normalize_channel_key("ABC123"), "ABC123");
        assert_eq!(normalize_channel_key("   "), "");
    }

    #[test]
    fn event_record_constructor() {
        let rec = EventRecord::new(EventType::TestRequest, Some("manual".into()));
        assert_eq!(rec.event_type, EventType::TestRequest);
        assert_eq!(rec.detail.as_deref(), Some("manual"));
        assert!(!rec.id.is_nil());
    }

    #[test]
    fn default_snapshot_is_ineligible_error() {
        let snap = StatusSnapshot::default();
        assert_eq!(snap.status, RequestStatus::Error);
        assert!(!snap.eligible);
        assert!(snap.last_request_at.is_none());
    }
}
