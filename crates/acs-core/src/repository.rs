//! Repository seam towards the persistence layer
//!
//! The integration layer does not own device records. It reads the set of
//! registered devices from a [`DeviceRepository`] and pushes connectivity
//! changes back through it after connect, disconnect, heartbeat and stale
//! eviction.

use std::collections::HashMap;
use std::net::IpAddr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{RepositoryError, RepositoryResult};
use crate::models::ConnectivityStatus;

/// A device known to the persistence layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisteredDevice {
    pub id: String,
    pub ip: IpAddr,
    pub port: u16,
}

/// Connectivity change pushed to durable storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusUpdate {
    pub device_id: String,
    pub status: ConnectivityStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_seen: Option<DateTime<Utc>>,
}

/// Persistence-side collaborator of the session manager
#[async_trait]
pub trait DeviceRepository: Send + Sync {
    /// Devices that should be connected
    async fn registered_devices(&self) -> RepositoryResult<Vec<RegisteredDevice>>;

    /// Record a status / last-seen change
    async fn record_status(&self, update: &StatusUpdate) -> RepositoryResult<()>;
}

/// Repository kept in process memory
///
/// Used by the daemon (devices come from its configuration file) and by tests.
#[derive(Default)]
pub struct InMemoryDeviceRepository {
    devices: RwLock<Vec<RegisteredDevice>>,
    statuses: RwLock<HashMap<String, StatusUpdate>>,
    history: RwLock<Vec<StatusUpdate>>,
}

impl InMemoryDeviceRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_devices(devices: Vec<RegisteredDevice>) -> Self {
        Self {
            devices: RwLock::new(devices),
            ..Self::default()
        }
    }

    /// Register (or replace) a device
    pub fn register(&self, device: RegisteredDevice) {
        let mut devices = self.devices.write();
        devices.retain(|d| d.id != device.id);
        devices.push(device);
    }

    /// Latest recorded status of a device
    pub fn status_of(&self, device_id: &str) -> Option<StatusUpdate> {
        self.statuses.read().get(device_id).cloned()
    }

    /// Every update received, oldest first
    pub fn history(&self) -> Vec<StatusUpdate> {
        self.history.read().clone()
    }
}

#[async_trait]
impl DeviceRepository for InMemoryDeviceRepository {
    async fn registered_devices(&self) -> RepositoryResult<Vec<RegisteredDevice>> {
        Ok(self.devices.read().clone())
    }

    async fn record_status(&self, update: &StatusUpdate) -> RepositoryResult<()> {
        if update.device_id.is_empty() {
            return Err(RepositoryError::NotFound(String::new()));
        }

        debug!(
            device_id = %update.device_id,
            status = %update.status,
            "Recording device status"
        );
        self.statuses
            .write()
            .insert(update.device_id.clone(), update.clone());
        self.history.write().push(update.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(id: &str) -> RegisteredDevice {
        RegisteredDevice {
            id: id.to_string(),
            ip: "10.0.0.5".parse().unwrap(),
            port: 8000,
        }
    }

    #[tokio::test]
    async fn test_register_replaces_existing() {
        let repo = InMemoryDeviceRepository::with_devices(vec![device("AC-01")]);
        repo.register(RegisteredDevice {
            port: 80,
            ..device("AC-01")
        });

        let devices = repo.registered_devices().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].port, 80);
    }

    #[tokio::test]
    async fn test_record_status_keeps_latest_and_history() {
        let repo = InMemoryDeviceRepository::new();
        let now = Utc::now();

        for status in [ConnectivityStatus::Connected, ConnectivityStatus::Disconnected] {
            repo.record_status(&StatusUpdate {
                device_id: "AC-01".into(),
                status,
                last_seen: Some(now),
            })
            .await
            .unwrap();
        }

        let latest = repo.status_of("AC-01").unwrap();
        assert_eq!(latest.status, ConnectivityStatus::Disconnected);
        assert_eq!(repo.history().len(), 2);
    }

    #[tokio::test]
    async fn test_record_status_rejects_empty_id() {
        let repo = InMemoryDeviceRepository::new();
        let result = repo
            .record_status(&StatusUpdate {
                device_id: String::new(),
                status: ConnectivityStatus::Connected,
                last_seen: None,
            })
            .await;
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }
}
