//! Service facade
//!
//! Wires the gateway, session manager, discovery engine and ingestion loop
//! together and exposes the operations the persistence / API layer calls.

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use acs_core::{
    DeviceConnectivitySnapshot, DeviceEvent, DeviceRepository, DeviceSession, DiscoveredDevice,
    SdkHealth,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::AcsConfig;
use crate::discovery::{DiscoveryEngine, DiscoveryStrategy};
use crate::error::{SdkError, SdkResult};
use crate::gateway::SdkGateway;
use crate::ingest::{EventIngestor, LoopState};
use crate::native::{create_loader, SdkLoader};
use crate::session::SessionManager;

/// Outcome of connecting every registered device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConnectSummary {
    pub connected: Vec<String>,
    /// Device id and failure description
    pub failed: Vec<(String, String)>,
}

/// Device integration layer entry point
pub struct AccessControlService {
    config: AcsConfig,
    gateway: SdkGateway,
    repository: Arc<dyn DeviceRepository>,
    sessions: Arc<SessionManager>,
    discovery: DiscoveryEngine,
    ingestor: Arc<EventIngestor>,
    cancel: CancellationToken,
    ingest_task: Mutex<Option<JoinHandle<()>>>,
}

impl AccessControlService {
    /// Service over the backend selected in `config.sdk.backend`
    pub fn new(config: AcsConfig, repository: Arc<dyn DeviceRepository>) -> Self {
        let loader = create_loader(&config);
        Self::with_loader(loader, config, repository)
    }

    pub fn with_loader(
        loader: Arc<dyn SdkLoader>,
        config: AcsConfig,
        repository: Arc<dyn DeviceRepository>,
    ) -> Self {
        let gateway = SdkGateway::new(loader, &config);
        let sessions = Arc::new(SessionManager::new(gateway.clone(), repository.clone()));
        let discovery = DiscoveryEngine::new(config.discovery.clone(), gateway.clone());
        let ingestor = Arc::new(EventIngestor::new(
            sessions.clone(),
            gateway.clone(),
            config.ingest.clone(),
            config.connectivity.stale_threshold(),
        ));

        Self {
            config,
            gateway,
            repository,
            sessions,
            discovery,
            ingestor,
            cancel: CancellationToken::new(),
            ingest_task: Mutex::new(None),
        }
    }

    /// Replace the discovery engine
    pub fn with_discovery(mut self, discovery: DiscoveryEngine) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn config(&self) -> &AcsConfig {
        &self.config
    }

    pub fn gateway(&self) -> &SdkGateway {
        &self.gateway
    }

    /// Find devices with `strategy`, or the configured one
    pub async fn discover(&self, strategy: Option<DiscoveryStrategy>) -> Vec<DiscoveredDevice> {
        let strategy = strategy.unwrap_or(self.config.discovery.strategy);
        let sessions = self.sessions.connected_devices();
        self.discovery.discover(strategy, &sessions, &self.cancel).await
    }

    pub async fn connect(&self, device_id: &str, ip: IpAddr, port: u16) -> SdkResult<DeviceSession> {
        self.sessions.connect(device_id, ip, port).await
    }

    pub async fn disconnect(&self, device_id: &str) -> bool {
        self.sessions.disconnect(device_id).await
    }

    pub fn status(&self, device_id: &str) -> DeviceConnectivitySnapshot {
        self.sessions.status(device_id)
    }

    pub fn statuses(&self) -> Vec<DeviceConnectivitySnapshot> {
        self.sessions.statuses()
    }

    pub async fn touch_heartbeat(&self, device_id: &str, occurred_at: DateTime<Utc>) {
        self.sessions.touch_heartbeat(device_id, occurred_at).await
    }

    /// Disconnect devices silent for longer than `threshold`; returns their ids
    pub async fn mark_stale_offline(&self, threshold: Duration) -> Vec<String> {
        self.sessions.mark_stale_offline(threshold).await
    }

    pub fn read_recent(&self, take: i64) -> Vec<DeviceEvent> {
        self.ingestor.read_recent(take)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DeviceEvent> {
        self.ingestor.subscribe()
    }

    /// Gateway health with the live session count; never fails
    pub fn health(&self) -> SdkHealth {
        let mut health = self.gateway.health();
        health.active_sessions = self.sessions.active_count();
        health
    }

    pub fn ingest_state(&self) -> LoopState {
        self.ingestor.state()
    }

    pub fn ingest_ticks(&self) -> u64 {
        self.ingestor.ticks()
    }

    /// Connect every device the repository knows about
    ///
    /// Individual failures are logged and reported in the summary.
    pub async fn connect_registered(&self) -> SdkResult<ConnectSummary> {
        let devices = self.repository.registered_devices().await?;
        let mut summary = ConnectSummary::default();

        for device in devices {
            match self.sessions.connect(&device.id, device.ip, device.port).await {
                Ok(_) => summary.connected.push(device.id),
                Err(e) => {
                    warn!(device_id = %device.id, error = %e, "Could not connect registered device");
                    summary.failed.push((device.id, e.to_string()));
                }
            }
        }

        info!(
            connected = summary.connected.len(),
            failed = summary.failed.len(),
            "Registered devices processed"
        );
        Ok(summary)
    }

    /// Start the ingestion loop
    pub fn start(&self) -> SdkResult<()> {
        self.config.ingest.validate()?;
        self.config.connectivity.validate()?;

        let mut task = self.ingest_task.lock();
        if task.is_some() {
            return Err(SdkError::Unavailable("ingestion loop already started".into()));
        }
        if self.cancel.is_cancelled() {
            return Err(SdkError::Unavailable("service is shut down".into()));
        }

        let ingestor = self.ingestor.clone();
        let cancel = self.cancel.child_token();
        *task = Some(tokio::spawn(async move { ingestor.run(cancel).await }));
        Ok(())
    }

    /// Stop ingestion, disconnect every device and release the native library
    pub async fn shutdown(&self) {
        self.cancel.cancel();

        let task = self.ingest_task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Ingestion task ended abnormally");
            }
        }

        self.sessions.shutdown().await;

        let gateway = self.gateway.clone();
        if let Err(e) = tokio::task::spawn_blocking(move || gateway.shutdown()).await {
            warn!(error = %e, "Gateway shutdown task failed");
        }
        info!("Access control service stopped");
    }
}
