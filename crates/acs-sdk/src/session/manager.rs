//! Session manager for device logins

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use acs_core::{
    ConnectivityStatus, DeviceConnectivitySnapshot, DeviceRepository, DeviceSession, StatusUpdate,
};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::error::SdkResult;
use crate::gateway::SdkGateway;

/// Tracks live native sessions and last-seen times per device
///
/// Connect, disconnect and stale eviction for one device are serialised by a
/// per-device lock. Heartbeats update last-seen atomically without it.
pub struct SessionManager {
    gateway: SdkGateway,
    repository: Arc<dyn DeviceRepository>,
    sessions: DashMap<String, DeviceSession>,
    last_seen: DashMap<String, DateTime<Utc>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionManager {
    pub fn new(gateway: SdkGateway, repository: Arc<dyn DeviceRepository>) -> Self {
        Self {
            gateway,
            repository,
            sessions: DashMap::new(),
            last_seen: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Connect a device, replacing a session that points elsewhere
    ///
    /// Already connected to the same endpoint: returns the existing session.
    #[instrument(skip(self))]
    pub async fn connect(&self, device_id: &str, ip: IpAddr, port: u16) -> SdkResult<DeviceSession> {
        let lock = self.device_lock(device_id);
        let result = {
            let _guard = lock.lock().await;
            self.connect_locked(device_id, ip, port).await
        };
        drop(lock);
        if result.is_err() {
            self.release_lock(device_id);
        }
        result
    }

    async fn connect_locked(&self, device_id: &str, ip: IpAddr, port: u16) -> SdkResult<DeviceSession> {
        let existing = self.sessions.get(device_id).map(|s| s.clone());
        if let Some(existing) = existing {
            if existing.is_same_endpoint(ip, port) {
                debug!(device_id, "Already connected");
                return Ok(existing);
            }
            info!(
                device_id,
                old = %format!("{}:{}", existing.ip, existing.port),
                new = %format!("{}:{}", ip, port),
                "Endpoint changed, dropping old session"
            );
            self.disconnect_locked(device_id).await;
        }

        let outcome = self.gateway.login(ip, port).await?;
        let now = Utc::now();
        let session = DeviceSession {
            device_id: device_id.to_string(),
            ip,
            port,
            handle: outcome.handle,
            serial_number: outcome.serial_number,
            connected_since: now,
        };
        self.sessions.insert(device_id.to_string(), session.clone());
        self.last_seen.insert(device_id.to_string(), now);

        info!(device_id, ip = %ip, port, handle = session.handle, "Device connected");
        self.notify(device_id, ConnectivityStatus::Connected, Some(now))
            .await;
        Ok(session)
    }

    /// Drop a device's session; returns whether one existed
    ///
    /// Local state is removed even when the native logout fails.
    pub async fn disconnect(&self, device_id: &str) -> bool {
        let lock = self.device_lock(device_id);
        let removed = {
            let _guard = lock.lock().await;
            self.disconnect_locked(device_id).await
        };
        drop(lock);
        self.release_lock(device_id);
        removed
    }

    async fn disconnect_locked(&self, device_id: &str) -> bool {
        let Some((_, session)) = self.sessions.remove(device_id) else {
            return false;
        };
        self.gateway.logout(session.handle).await;

        info!(device_id, handle = session.handle, "Device disconnected");
        let last_seen = self.last_seen.get(device_id).map(|t| *t);
        self.notify(device_id, ConnectivityStatus::Disconnected, last_seen)
            .await;
        true
    }

    /// Connectivity of one device
    pub fn status(&self, device_id: &str) -> DeviceConnectivitySnapshot {
        let status = if self.sessions.contains_key(device_id) {
            ConnectivityStatus::Connected
        } else {
            ConnectivityStatus::Disconnected
        };
        DeviceConnectivitySnapshot {
            device_id: device_id.to_string(),
            status,
            last_seen: self.last_seen.get(device_id).map(|t| *t),
        }
    }

    /// Connectivity of every tracked device, ordered by id
    pub fn statuses(&self) -> Vec<DeviceConnectivitySnapshot> {
        let mut ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.extend(self.last_seen.iter().map(|e| e.key().clone()));
        ids.sort();
        ids.dedup();
        ids.iter().map(|id| self.status(id)).collect()
    }

    /// Record activity from a device
    ///
    /// Last-seen only moves forward; an older timestamp is ignored. Times
    /// ahead of the local clock are clamped to now.
    pub async fn touch_heartbeat(&self, device_id: &str, occurred_at: DateTime<Utc>) {
        let occurred_at = occurred_at.min(Utc::now());
        let last_seen = {
            let mut entry = self
                .last_seen
                .entry(device_id.to_string())
                .or_insert(occurred_at);
            if occurred_at > *entry {
                *entry = occurred_at;
            }
            *entry
        };

        let status = self.status(device_id).status;
        self.notify(device_id, status, Some(last_seen)).await;
    }

    /// Disconnect every connected device silent for longer than `threshold`
    pub async fn mark_stale_offline(&self, threshold: Duration) -> Vec<String> {
        self.mark_stale_offline_at(Utc::now(), threshold).await
    }

    /// [`SessionManager::mark_stale_offline`] against an explicit clock
    pub async fn mark_stale_offline_at(&self, now: DateTime<Utc>, threshold: Duration) -> Vec<String> {
        let threshold = chrono::Duration::milliseconds(threshold.as_millis().min(i64::MAX as u128) as i64);
        let is_stale = |last_seen: Option<DateTime<Utc>>| {
            last_seen.is_some_and(|seen| now.signed_duration_since(seen) > threshold)
        };

        let candidates: Vec<String> = self
            .sessions
            .iter()
            .map(|e| e.key().clone())
            .filter(|id| is_stale(self.last_seen.get(id).map(|t| *t)))
            .collect();

        let mut evicted = Vec::with_capacity(candidates.len());
        for device_id in candidates {
            let lock = self.device_lock(&device_id);
            let removed = {
                let _guard = lock.lock().await;

                // A heartbeat may have landed while waiting for the lock
                let last_seen = self.last_seen.get(&device_id).map(|t| *t);
                if !is_stale(last_seen) {
                    continue;
                }
                warn!(
                    device_id = %device_id,
                    last_seen = ?last_seen,
                    "No heartbeat within threshold, marking offline"
                );
                self.disconnect_locked(&device_id).await
            };
            drop(lock);
            if removed {
                self.release_lock(&device_id);
                evicted.push(device_id);
            }
        }
        evicted
    }

    /// Live sessions, ordered by device id
    pub fn connected_devices(&self) -> Vec<DeviceSession> {
        let mut sessions: Vec<DeviceSession> = self.sessions.iter().map(|e| e.value().clone()).collect();
        sessions.sort_by(|a, b| a.device_id.cmp(&b.device_id));
        sessions
    }

    pub fn session(&self, device_id: &str) -> Option<DeviceSession> {
        self.sessions.get(device_id).map(|s| s.clone())
    }

    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Disconnect every device
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        for device_id in ids {
            self.disconnect(&device_id).await;
        }
    }

    fn device_lock(&self, device_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(device_id.to_string())
            .or_default()
            .clone()
    }

    /// Forget a device's lock once nobody holds or waits on it
    fn release_lock(&self, device_id: &str) {
        self.locks
            .remove_if(device_id, |_, lock| Arc::strong_count(lock) == 1);
    }

    async fn notify(
        &self,
        device_id: &str,
        status: ConnectivityStatus,
        last_seen: Option<DateTime<Utc>>,
    ) {
        let update = StatusUpdate {
            device_id: device_id.to_string(),
            status,
            last_seen,
        };
        if let Err(e) = self.repository.record_status(&update).await {
            warn!(device_id, error = %e, "Failed to persist device status");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcsConfig;
    use crate::native::{MockCall, MockDeviceSpec, MockLoader, MockSdk};
    use acs_core::InMemoryDeviceRepository;

    struct Fixture {
        manager: Arc<SessionManager>,
        sdk: Arc<MockSdk>,
        repo: Arc<InMemoryDeviceRepository>,
    }

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    fn fixture() -> Fixture {
        let sdk = Arc::new(
            MockSdk::new()
                .with_device(MockDeviceSpec::new(ip("10.0.0.5"), 8000, "SN-0005"))
                .with_device(MockDeviceSpec::new(ip("10.0.0.6"), 8000, "SN-0006")),
        );
        let gateway = SdkGateway::new(Arc::new(MockLoader::new(sdk.clone())), &AcsConfig::default());
        let repo = Arc::new(InMemoryDeviceRepository::new());
        let manager = Arc::new(SessionManager::new(gateway, repo.clone()));
        Fixture { manager, sdk, repo }
    }

    #[tokio::test]
    async fn test_connect_same_endpoint_is_noop() {
        let f = fixture();
        let first = f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        let second = f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first.serial_number.as_deref(), Some("SN-0005"));
        assert_eq!(f.sdk.count_calls(|c| matches!(c, MockCall::Login { .. })), 1);
        assert_eq!(
            f.repo.status_of("AC-01").unwrap().status,
            ConnectivityStatus::Connected
        );
    }

    #[tokio::test]
    async fn test_reconnect_new_endpoint_logs_out_first() {
        let f = fixture();
        let old = f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        let new = f.manager.connect("AC-01", ip("10.0.0.6"), 8000).await.unwrap();

        let calls = f.sdk.calls();
        let logout_at = calls
            .iter()
            .position(|c| *c == MockCall::Logout { handle: old.handle })
            .unwrap();
        let login_at = calls
            .iter()
            .position(|c| matches!(c, MockCall::Login { handle, .. } if *handle == new.handle))
            .unwrap();
        assert!(logout_at < login_at);
        assert_eq!(f.sdk.open_sessions(), 1);
        assert_eq!(f.manager.active_count(), 1);
    }

    #[tokio::test]
    async fn test_failed_login_leaves_disconnected() {
        let f = fixture();
        let result = f.manager.connect("AC-09", ip("10.0.0.9"), 8000).await;
        assert!(result.is_err());
        assert_eq!(f.manager.status("AC-09").status, ConnectivityStatus::Disconnected);
        assert!(f.repo.status_of("AC-09").is_none());
    }

    #[tokio::test]
    async fn test_disconnect_survives_logout_failure() {
        let f = fixture();
        f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        f.sdk.set_logout_fails(true);

        assert!(f.manager.disconnect("AC-01").await);
        assert_eq!(f.manager.status("AC-01").status, ConnectivityStatus::Disconnected);
        assert!(!f.manager.disconnect("AC-01").await);
    }

    #[tokio::test]
    async fn test_heartbeat_only_moves_forward() {
        let f = fixture();
        let t0 = Utc::now();
        f.manager.touch_heartbeat("AC-01", t0).await;
        f.manager
            .touch_heartbeat("AC-01", t0 - chrono::Duration::seconds(30))
            .await;

        let snapshot = f.manager.status("AC-01");
        assert_eq!(snapshot.last_seen, Some(t0));
        // Seen but never connected
        assert_eq!(snapshot.status, ConnectivityStatus::Disconnected);
    }

    #[tokio::test]
    async fn test_stale_sweep_evicts_only_stale() {
        let f = fixture();
        f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        f.manager.connect("AC-02", ip("10.0.0.6"), 8000).await.unwrap();
        let t0 = f.manager.status("AC-01").last_seen.unwrap();

        tokio::time::sleep(Duration::from_millis(50)).await;
        let t1 = Utc::now();
        f.manager.touch_heartbeat("AC-02", t1).await;

        let evicted = f
            .manager
            .mark_stale_offline_at(t1 + chrono::Duration::seconds(10), Duration::from_secs(10))
            .await;

        assert_eq!(evicted, vec!["AC-01".to_string()]);
        let snapshot = f.manager.status("AC-01");
        assert_eq!(snapshot.status, ConnectivityStatus::Disconnected);
        assert_eq!(snapshot.last_seen, Some(t0));
        assert_eq!(f.manager.status("AC-02").status, ConnectivityStatus::Connected);
    }

    #[tokio::test]
    async fn test_future_heartbeat_is_clamped_to_now() {
        let f = fixture();
        f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        f.manager
            .touch_heartbeat("AC-01", Utc::now() + chrono::Duration::hours(1))
            .await;

        let last_seen = f.manager.status("AC-01").last_seen.unwrap();
        assert!(last_seen <= Utc::now());

        let evicted = f
            .manager
            .mark_stale_offline_at(Utc::now() + chrono::Duration::seconds(11), Duration::from_secs(10))
            .await;
        assert_eq!(evicted, vec!["AC-01".to_string()]);
    }

    #[tokio::test]
    async fn test_lock_released_after_disconnect() {
        let f = fixture();
        f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        assert_eq!(f.manager.locks.len(), 1);

        assert!(f.manager.disconnect("AC-01").await);
        assert!(f.manager.locks.is_empty());

        // Failed logins and stale evictions leave nothing behind either
        assert!(f.manager.connect("AC-09", ip("10.0.0.9"), 8000).await.is_err());
        f.manager.connect("AC-02", ip("10.0.0.6"), 8000).await.unwrap();
        let evicted = f
            .manager
            .mark_stale_offline_at(Utc::now() + chrono::Duration::seconds(11), Duration::from_secs(10))
            .await;
        assert_eq!(evicted, vec!["AC-02".to_string()]);
        assert!(f.manager.locks.is_empty());
    }

    #[tokio::test]
    async fn test_exact_threshold_is_not_stale() {
        let f = fixture();
        f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        let t0 = Utc::now();
        f.manager.touch_heartbeat("AC-01", t0).await;

        let evicted = f
            .manager
            .mark_stale_offline_at(t0 + chrono::Duration::seconds(10), Duration::from_secs(10))
            .await;
        assert!(evicted.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_connects_yield_one_session() {
        let f = fixture();
        let a = f.manager.clone();
        let b = f.manager.clone();
        let (ra, rb) = tokio::join!(
            async move { a.connect("AC-01", ip("10.0.0.5"), 8000).await },
            async move { b.connect("AC-01", ip("10.0.0.5"), 8000).await },
        );

        assert_eq!(ra.unwrap().handle, rb.unwrap().handle);
        assert_eq!(f.sdk.open_sessions(), 1);
    }

    #[tokio::test]
    async fn test_statuses_sorted() {
        let f = fixture();
        f.manager.connect("AC-02", ip("10.0.0.6"), 8000).await.unwrap();
        f.manager.touch_heartbeat("AC-01", Utc::now()).await;

        let ids: Vec<String> = f.manager.statuses().into_iter().map(|s| s.device_id).collect();
        assert_eq!(ids, vec!["AC-01".to_string(), "AC-02".to_string()]);
    }

    #[tokio::test]
    async fn test_shutdown_disconnects_all() {
        let f = fixture();
        f.manager.connect("AC-01", ip("10.0.0.5"), 8000).await.unwrap();
        f.manager.connect("AC-02", ip("10.0.0.6"), 8000).await.unwrap();

        f.manager.shutdown().await;
        assert_eq!(f.manager.active_count(), 0);
        assert_eq!(f.sdk.open_sessions(), 0);
    }
}
