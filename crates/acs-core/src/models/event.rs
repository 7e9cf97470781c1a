//! Device event models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured event classification
///
/// Vendor codes that do not map to a known kind become [`DeviceEventKind::Unknown`];
/// they are kept, never dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceEventKind {
    DoorOpened,
    AccessGranted,
    AccessDenied,
    Heartbeat,
    Unknown,
}

impl fmt::Display for DeviceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DoorOpened => write!(f, "DoorOpened"),
            Self::AccessGranted => write!(f, "AccessGranted"),
            Self::AccessDenied => write!(f, "AccessDenied"),
            Self::Heartbeat => write!(f, "Heartbeat"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// A normalised event received from a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEvent {
    /// Device that produced the event
    pub device_id: String,
    /// Event classification
    pub kind: DeviceEventKind,
    /// When the event happened on the device (UTC)
    pub occurred_at: DateTime<Utc>,
    /// Compact JSON with the vendor-specific fields
    pub payload: String,
}
