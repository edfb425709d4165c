//! Shared types and OpenAPI schemas.
//!
//! This module contains the data model shared by the pairing engine and its
//! consumers. Types that belong to a single component (proximity samples,
//! the connection snapshot, session events) live in their own modules.

use std::fmt;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Platform identifier of a Bluetooth device (a MAC address on BlueZ).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = String, example = "24:6F:28:AA:BB:CC")]
pub struct DeviceId(String);

impl DeviceId {
    /// Wrap a platform device identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A physical object the user registered for tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({
    "id": "01930e7a-3c2b-7d4e-9f10-2a3b4c5d6e7f",
    "name": "Keys",
    "description": "Usually on the hallway shelf"
}))]
pub struct TrackedObject {
    /// Stable identifier assigned on registration.
    pub id: Uuid,

    /// Display name.
    #[schema(example = "Keys")]
    pub name: String,

    /// Free-text note about where the object usually lives.
    #[schema(example = "Usually on the hallway shelf")]
    pub description: String,
}

/// A device seen during a scan. Only lives for the duration of that scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DiscoveredDevice {
    /// Platform device identifier.
    pub id: DeviceId,

    /// Advertised local name, if the advertisement carried one.
    #[schema(example = "ESP32-Locator")]
    pub name: Option<String>,

    /// Signal strength of the advertisement in dBm.
    #[schema(example = -58)]
    pub rssi: Option<i16>,
}

impl DiscoveredDevice {
    /// Returns `true` if the advertised name equals `target` exactly.
    #[must_use]
    pub fn matches_name(&self, target: &str) -> bool {
        self.name.as_deref() == Some(target)
    }
}

/// Lifecycle state of the single beacon connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No connection. Initial state, and the end of every session.
    Disconnected,
    /// Transport-level connect in flight.
    Connecting,
    /// Enumerating the beacon's services and characteristics.
    Discovering,
    /// Paired and sampling signal strength.
    Monitoring,
    /// Connect or discovery failed. Not retried automatically.
    Failed,
}

impl ConnectionState {
    /// Returns `true` while a connection attempt or live connection exists.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Connecting | Self::Discovering | Self::Monitoring)
    }

    /// Lower-case label used in logs and error messages.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Discovering => "discovering",
            Self::Monitoring => "monitoring",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// State of the scan controller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    /// No scan running.
    Idle,
    /// Discovery in progress.
    Scanning,
    /// A matching beacon was accepted.
    Found {
        /// The accepted device.
        device: DiscoveredDevice,
    },
    /// The timeout elapsed without a match.
    TimedOut,
    /// Radio permissions were refused.
    PermissionDenied,
    /// Discovery failed.
    Error {
        /// Failure description.
        message: String,
    },
}

impl ScanState {
    /// Returns `true` while discovery is running.
    #[must_use]
    pub const fn is_scanning(&self) -> bool {
        matches!(self, Self::Scanning)
    }

    /// Lower-case label used in logs and error messages.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Scanning => "scanning",
            Self::Found { .. } => "found",
            Self::TimedOut => "timed_out",
            Self::PermissionDenied => "permission_denied",
            Self::Error { .. } => "error",
        }
    }
}

/// A radio capability the platform may gate behind a permission prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    /// Location access, required for BLE scanning on some platforms.
    Location,
    /// BLE scan access.
    Scan,
    /// BLE connect access.
    Connect,
}

impl Capability {
    /// Every capability a pairing needs.
    pub const REQUIRED: [Self; 3] = [Self::Location, Self::Scan, Self::Connect];
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Location => "location",
            Self::Scan => "scan",
            Self::Connect => "connect",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_name_match_is_exact() {
        let device = DiscoveredDevice {
            id: DeviceId::new("24:6F:28:AA:BB:CC"),
            name: Some("ESP32-Locator".to_string()),
            rssi: Some(-60),
        };
        assert!(device.matches_name("ESP32-Locator"));
        assert!(!device.matches_name("esp32-locator"));
        assert!(!device.matches_name("ESP32"));

        let unnamed = DiscoveredDevice {
            name: None,
            ..device
        };
        assert!(!unnamed.matches_name("ESP32-Locator"));
    }

    #[test]
    fn test_active_connection_states() {
        assert!(ConnectionState::Connecting.is_active());
        assert!(ConnectionState::Discovering.is_active());
        assert!(ConnectionState::Monitoring.is_active());
        assert!(!ConnectionState::Disconnected.is_active());
        assert!(!ConnectionState::Failed.is_active());
    }

    #[test]
    fn test_scan_state_serialization() {
        let json = serde_json::to_string(&ScanState::TimedOut).unwrap();
        assert_eq!(json, r#"{"state":"timed_out"}"#);

        let json = serde_json::to_string(&DeviceId::new("AA:BB")).unwrap();
        assert_eq!(json, r#""AA:BB""#);
    }
}
