//! Device, session and connectivity models

use std::fmt;
use std::net::IpAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// How a device was found on the network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoverySource {
    /// Answered an HTTP device-info probe
    Probe,
    /// Reported by the vendor broadcast-discovery call
    Broadcast,
}

/// A device candidate found during discovery
///
/// Produced fresh per discovery call and never persisted by this layer.
/// Two candidates are the same device when their `ip:port` match.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredDevice {
    /// Vendor serial number, or `ip:port` when the device did not report one
    pub id: String,
    /// Display name
    pub name: String,
    /// Device address
    pub ip: IpAddr,
    /// Device port
    pub port: u16,
    /// Model designation, if reported
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Device answered but rejected our credentials (HTTP 401)
    #[serde(default)]
    pub auth_required: bool,
    /// Discovery strategy that produced this entry
    pub source: DiscoverySource,
}

impl DiscoveredDevice {
    /// Identifier synthesized from the network address
    pub fn synthesized_id(ip: IpAddr, port: u16) -> String {
        format!("{}:{}", ip, port)
    }

    /// Deduplication key
    pub fn endpoint(&self) -> (IpAddr, u16) {
        (self.ip, self.port)
    }
}

/// A live native login session for one device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSession {
    /// Logical device identifier
    pub device_id: String,
    /// Device address
    pub ip: IpAddr,
    /// Device port
    pub port: u16,
    /// Native session handle (always >= 0 for a live session)
    pub handle: i32,
    /// Serial number reported by the device at login
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serial_number: Option<String>,
    /// When the session was established
    pub connected_since: DateTime<Utc>,
}

impl DeviceSession {
    /// Whether this session points at the given network endpoint
    pub fn is_same_endpoint(&self, ip: IpAddr, port: u16) -> bool {
        self.ip == ip && self.port == port
    }
}

/// Externally visible connectivity state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectivityStatus {
    Disconnected,
    Connected,
}

impl fmt::Display for ConnectivityStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected => write!(f, "disconnected"),
            Self::Connected => write!(f, "connected"),
        }
    }
}

/// Point-in-time connectivity view of a device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConnectivitySnapshot {
    pub device_id: String,
    pub status: ConnectivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}
