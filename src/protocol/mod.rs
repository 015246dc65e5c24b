//! Wire protocol: the `{type, data}` frame envelope, user roles, and the
//! event names exchanged with the backend.
//!
//! The connection layer never interprets `data`; each event's payload shape
//! is a contract between the producing and consuming screens.

use serde::{Deserialize, Serialize};

/// Which class of user this connection represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Customer,
    Provider,
}

impl Role {
    /// Wire value used in the `userType` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Customer => "customer",
            Role::Provider => "provider",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "customer" => Ok(Role::Customer),
            "provider" => Ok(Role::Provider),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// A single text frame on the wire, in both directions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Frame {
    /// Event name, e.g. `provider_location`.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Opaque JSON payload.
    #[serde(default)]
    pub data: serde_json::Value,
}

impl Frame {
    pub fn new(event_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
        }
    }

    /// Serialize to the wire representation.
    pub fn to_text(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse a received text frame. Malformed frames are the caller's
    /// responsibility to log and drop.
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// The full envelope as a JSON value, for wildcard subscribers.
    pub fn envelope(&self) -> serde_json::Value {
        serde_json::json!({
            "type": self.event_type,
            "data": self.data,
        })
    }
}

/// Event names observed in the RoadCall system.
pub mod events {
    /// Matches every event type.
    pub const WILDCARD: &str = "*";

    // Outbound (client -> backend)
    pub const REQUEST_STATUS: &str = "request_status";
    pub const SUBSCRIBE: &str = "subscribe";
    pub const CANCEL_BOOKING: &str = "cancel_booking";
    pub const START_SERVICE: &str = "start_service";
    pub const ACCEPT_JOB: &str = "accept_job";
    pub const DECLINE_JOB: &str = "decline_job";
    pub const REQUEST_PROVIDER_LOCATION: &str = "request_provider_location";

    // Inbound (backend -> client)
    pub const PROVIDER_LOCATION: &str = "provider_location";
    pub const PROVIDER_ASSIGNED: &str = "provider_assigned";
    pub const JOB_ACCEPTED: &str = "job_accepted";
    pub const STATUS_UPDATE: &str = "status_update";
    pub const PROVIDER_STATUS_UPDATE: &str = "provider_status_update";
    pub const ETA_UPDATE: &str = "eta_update";
    pub const CONNECTION_CHANGE: &str = "connection_change";
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_frame_round_trip() {
        let frame = Frame::new(events::ACCEPT_JOB, json!({"jobId": "job-42"}));
        let text = frame.to_text().unwrap();
        let parsed = Frame::parse(&text).unwrap();

        assert_eq!(parsed.event_type, "accept_job");
        assert_eq!(parsed.data, json!({"jobId": "job-42"}));
    }

    #[test]
    fn test_frame_wire_shape() {
        let frame = Frame::new("ping", json!({"n": 1}));
        assert_eq!(frame.to_text().unwrap(), r#"{"type":"ping","data":{"n":1}}"#);
    }

    #[test]
    fn test_frame_missing_data_defaults_to_null() {
        let frame = Frame::parse(r#"{"type":"status_update"}"#).unwrap();
        assert_eq!(frame.event_type, "status_update");
        assert!(frame.data.is_null());
    }

    #[test]
    fn test_frame_parse_rejects_garbage() {
        assert!(Frame::parse("not json").is_err());
        assert!(Frame::parse(r#"{"data": {}}"#).is_err());
    }

    #[test]
    fn test_role_wire_values() {
        assert_eq!(Role::Customer.as_str(), "customer");
        assert_eq!(Role::Provider.as_str(), "provider");
        assert_eq!("provider".parse::<Role>().unwrap(), Role::Provider);
        assert!("dispatcher".parse::<Role>().is_err());
    }

    #[test]
    fn test_envelope_contains_type_and_data() {
        let frame = Frame::new(events::ETA_UPDATE, json!({"minutes": 7}));
        let envelope = frame.envelope();
        assert_eq!(envelope["type"], "eta_update");
        assert_eq!(envelope["data"]["minutes"], 7);
    }
}
