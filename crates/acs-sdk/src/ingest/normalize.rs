//! Vendor event code normalisation

use acs_core::{DeviceEvent, DeviceEventKind};
use chrono::{DateTime, Utc};
use serde_json::json;

use crate::native::RawEvent;

/// Major type of access-control events
pub const MAJOR_EVENT: u32 = 0x5;

const GRANTED: &[u32] = &[
    0x01, // valid card
    0x26, // fingerprint match
    0x4B, // face authentication pass
];

const DENIED: &[u32] = &[
    0x06, // card without permission
    0x09, // card expired
    0x27, // fingerprint mismatch
    0x4C, // face authentication fail
];

const DOOR_OPENED: &[u32] = &[
    0x15, // door unlocked
    0x17, // door open (contact)
    0x18, // door opened abnormally
];

/// Classify a `major`/`minor` vendor code pair
pub fn classify(major: u32, minor: u32) -> DeviceEventKind {
    match (major, minor) {
        (0, 0) => DeviceEventKind::Heartbeat,
        (MAJOR_EVENT, m) if GRANTED.contains(&m) => DeviceEventKind::AccessGranted,
        (MAJOR_EVENT, m) if DENIED.contains(&m) => DeviceEventKind::AccessDenied,
        (MAJOR_EVENT, m) if DOOR_OPENED.contains(&m) => DeviceEventKind::DoorOpened,
        _ => DeviceEventKind::Unknown,
    }
}

/// Build a [`DeviceEvent`] from a raw record
///
/// Records without a usable device timestamp are stamped with `received_at`.
pub fn normalize(device_id: &str, raw: &RawEvent, received_at: DateTime<Utc>) -> DeviceEvent {
    let payload = json!({
        "major": raw.major,
        "minor": raw.minor,
        "card_no": raw.card_no,
        "door_no": raw.door_no,
        "employee_no": raw.employee_no,
        "serial_no": raw.serial_no,
    });

    DeviceEvent {
        device_id: device_id.to_string(),
        kind: classify(raw.major, raw.minor),
        occurred_at: raw.occurred_at.unwrap_or(received_at),
        payload: payload.to_string(),
    }
}
