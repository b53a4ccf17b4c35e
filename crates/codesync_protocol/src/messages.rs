//! Protocol messages for sync.
//!
//! All bodies are JSON with camelCase field names.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The `{success, data, error}` wrapper every endpoint answers with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    /// Whether the request was accepted.
    pub success: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    /// Error message on failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> Envelope<T> {
    /// Creates a successful envelope carrying `data`.
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    /// Creates a failed envelope.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(message.into()),
        }
    }

    /// Converts into the payload, or the error message.
    pub fn into_result(self) -> Result<T, String> {
        match (self.success, self.data) {
            (true, Some(data)) => Ok(data),
            (true, None) => Err("response carried no data".into()),
            (false, _) => Err(self.error.unwrap_or_else(|| "request rejected".into())),
        }
    }
}

/// Canonical state of a session as seen on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionView {
    /// Document body.
    pub code: String,
    /// Time of the last accepted write (Unix millis).
    pub last_modified: u64,
    /// Participant count under the server's policy.
    pub participants: u64,
    /// Participant that made the last accepted write.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated_by: Option<String>,
}

impl SessionView {
    /// Creates a view of an empty, never-written session.
    pub fn empty(last_modified: u64) -> Self {
        Self {
            code: String::new(),
            last_modified,
            participants: 0,
            last_updated_by: None,
        }
    }
}

/// Body of an update (POST) request.
///
/// `code` is optional on the wire so that the server can reject a missing
/// body field explicitly instead of failing to parse.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    /// New document body.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Editor identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

impl UpdateRequest {
    /// Creates an update request.
    pub fn new(code: impl Into<String>, participant_id: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            participant_id: Some(participant_id.into()),
        }
    }
}

/// Body of a join (PUT) request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JoinRequest {
    /// Joining device identity.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub participant_id: Option<String>,
}

impl JoinRequest {
    /// Creates a join request for a device.
    pub fn new(participant_id: impl Into<String>) -> Self {
        Self {
            participant_id: Some(participant_id.into()),
        }
    }
}

/// Body of a presence heartbeat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HeartbeatRequest {
    /// Device sending the heartbeat.
    pub device_id: String,
}

impl HeartbeatRequest {
    /// Creates a heartbeat for a device.
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

/// A live device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    /// Opaque device token.
    pub id: String,
    /// Time of the last heartbeat (Unix millis).
    pub last_heartbeat: u64,
}

/// The set of live devices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresenceView {
    /// Devices whose last heartbeat is within the TTL.
    pub active_devices: Vec<DeviceView>,
    /// Staleness window in milliseconds.
    pub ttl_millis: u64,
}

/// Health endpoint payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthView {
    /// Human-readable status line.
    pub message: String,
    /// Path -> verb -> description.
    pub endpoints: BTreeMap<String, BTreeMap<String, String>>,
    /// Server time (Unix millis).
    pub timestamp: u64,
}
