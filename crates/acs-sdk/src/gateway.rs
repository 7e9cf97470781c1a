//! Native gateway
//!
//! Single owner of the vendor library. Loading, component-path setup and
//! native init happen once, under one lock, on first use; a failure leaves the
//! gateway un-initialised so the next caller retries. Every blocking native
//! call runs on the blocking thread pool.

use std::net::IpAddr;
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use acs_core::{ErrorDiagnostic, SdkHealth};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::codes::{self, SdkErrorCode};
use crate::config::{AcsConfig, Credentials};
use crate::error::{SdkError, SdkResult};
use crate::native::ffi::{
    AcsEventCond, AcsEventRecord, DeviceInfoV40, LocalSdkPath, SadpDeviceList, UserLoginInfo,
    NET_DVR_GET_ACS_EVENT,
};
use crate::native::{paths, LoginOutcome, NativeSdk, NextStatus, RawEvent, SdkLoader, SearchedDevice};

/// Event pull for one device inside a batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub device_id: String,
    pub handle: i32,
    pub from: DateTime<Utc>,
}

/// Records drained from one event stream
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventBatch {
    pub records: Vec<RawEvent>,
    /// The stream was closed before the device reported the end of the
    /// window (record or wait ceiling); later records may still be pending
    pub truncated: bool,
}

/// Result of one device's pull inside a batch
#[derive(Debug)]
pub struct PullOutcome {
    pub device_id: String,
    pub result: SdkResult<EventBatch>,
}

/// Stream draining limits
#[derive(Debug, Clone, Copy)]
struct PullLimits {
    max_wait_retries: u32,
    wait_backoff: Duration,
    max_records: usize,
}

struct Loaded {
    sdk: Arc<dyn NativeSdk>,
    location: Option<PathBuf>,
}

struct Inner {
    loader: Arc<dyn SdkLoader>,
    credentials: Credentials,
    library_dir: Option<PathBuf>,
    limits: PullLimits,
    search_dirs: OnceLock<Vec<PathBuf>>,
    init_lock: Mutex<()>,
    loaded: RwLock<Option<Loaded>>,
    ready: AtomicBool,
    /// Live native sessions, handle -> endpoint
    sessions: DashMap<i32, String>,
    /// Most recent failure raised on this side (load / init)
    last_failure: RwLock<Option<ErrorDiagnostic>>,
}

/// Cheaply cloneable handle to the native library
#[derive(Clone)]
pub struct SdkGateway {
    inner: Arc<Inner>,
}

impl SdkGateway {
    pub fn new(loader: Arc<dyn SdkLoader>, config: &AcsConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                loader,
                credentials: config.credentials.clone(),
                library_dir: config.sdk.library_dir.clone(),
                limits: PullLimits {
                    max_wait_retries: config.ingest.max_wait_retries,
                    wait_backoff: config.ingest.wait_backoff(),
                    max_records: config.ingest.max_records_per_pull,
                },
                search_dirs: OnceLock::new(),
                init_lock: Mutex::new(()),
                loaded: RwLock::new(None),
                ready: AtomicBool::new(false),
                sessions: DashMap::new(),
                last_failure: RwLock::new(None),
            }),
        }
    }

    /// Whether the library is loaded and initialised
    pub fn is_ready(&self) -> bool {
        self.inner.ready.load(Ordering::SeqCst)
    }

    /// Load and initialise the library if that has not happened yet
    ///
    /// Blocking. Async callers go through [`SdkGateway::ensure_ready_async`].
    pub fn ensure_ready(&self) -> SdkResult<()> {
        self.inner.ensure_ready().map(|_| ())
    }

    pub async fn ensure_ready_async(&self) -> SdkResult<()> {
        let inner = self.inner.clone();
        run_blocking(move || inner.ensure_ready().map(|_| ())).await
    }

    /// Open a native session with the configured credentials
    #[instrument(skip(self))]
    pub async fn login(&self, ip: IpAddr, port: u16) -> SdkResult<LoginOutcome> {
        let inner = self.inner.clone();
        run_blocking(move || inner.login(ip, port)).await
    }

    /// Close a native session; failures are logged, never returned
    pub async fn logout(&self, handle: i32) {
        let inner = self.inner.clone();
        if let Err(e) = run_blocking(move || {
            inner.logout(handle);
            Ok(())
        })
        .await
        {
            warn!(handle, error = %e, "Logout task failed");
        }
    }

    /// Drain one device's events for `[from, to]`
    pub async fn pull_events(
        &self,
        device_id: &str,
        handle: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SdkResult<EventBatch> {
        let inner = self.inner.clone();
        let device_id = device_id.to_string();
        let cancel = cancel.clone();
        run_blocking(move || {
            let sdk = inner.ensure_ready()?;
            inner.pull(&*sdk, &device_id, handle, from, to, &cancel)
        })
        .await
    }

    /// Pull events for several devices in one blocking call
    ///
    /// A failing device does not stop the batch. Cancellation is checked
    /// between devices; devices not reached are left out of the result.
    #[instrument(skip(self, requests, cancel), fields(devices = requests.len()))]
    pub async fn pull_events_batch(
        &self,
        requests: Vec<PullRequest>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SdkResult<Vec<PullOutcome>> {
        let inner = self.inner.clone();
        let cancel = cancel.clone();
        run_blocking(move || {
            let sdk = inner.ensure_ready()?;
            let mut outcomes = Vec::with_capacity(requests.len());
            for request in requests {
                if cancel.is_cancelled() {
                    debug!("Batch pull cancelled");
                    break;
                }
                let result = inner.pull(&*sdk, &request.device_id, request.handle, request.from, to, &cancel);
                outcomes.push(PullOutcome {
                    device_id: request.device_id,
                    result,
                });
            }
            Ok(outcomes)
        })
        .await
    }

    /// Snapshot of the gateway state; never fails
    pub fn health(&self) -> SdkHealth {
        let inner = &self.inner;
        let ready = self.is_ready();
        let loaded = inner.loaded.read();

        let last_error = match (&*loaded, ready) {
            (Some(loaded), true) => {
                let sdk = loaded.sdk.clone();
                let code = panic::catch_unwind(AssertUnwindSafe(move || sdk.last_error()))
                    .unwrap_or(0);
                (code != 0).then(|| codes::diagnose(code))
            }
            _ => inner.last_failure.read().clone(),
        };

        SdkHealth {
            initialized: ready,
            platform: paths::platform(),
            active_sessions: inner.sessions.len(),
            last_error,
            library_search_paths: inner.search_dirs().to_vec(),
            library_location: loaded.as_ref().and_then(|l| l.location.clone()),
        }
    }

    /// Log out every tracked session and release the library
    ///
    /// Blocking. The gateway can be initialised again afterwards.
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let _guard = inner.init_lock.lock();
        let loaded = inner.loaded.read();
        let Some(loaded) = loaded.as_ref() else {
            return;
        };

        let handles: Vec<i32> = inner.sessions.iter().map(|e| *e.key()).collect();
        for handle in handles {
            if let Some((_, endpoint)) = inner.sessions.remove(&handle) {
                if !loaded.sdk.logout(handle) {
                    warn!(handle, endpoint = %endpoint, "Forced logout failed during shutdown");
                }
            }
        }

        if inner.ready.swap(false, Ordering::SeqCst) && !loaded.sdk.cleanup() {
            warn!(code = loaded.sdk.last_error(), "Native cleanup reported failure");
        }
        info!("Native SDK shut down");
    }

    pub(crate) fn login_blocking(&self, ip: IpAddr, port: u16) -> SdkResult<LoginOutcome> {
        self.inner.login(ip, port)
    }

    pub(crate) fn logout_blocking(&self, handle: i32) {
        self.inner.logout(handle)
    }

    pub(crate) fn search_blocking(&self, handle: i32) -> SdkResult<Vec<SearchedDevice>> {
        let sdk = self.inner.ensure_ready()?;
        let mut list = SadpDeviceList::empty();
        if !sdk.search_devices(handle, &mut list) {
            let diagnostic = codes::diagnose(sdk.last_error());
            return Err(SdkError::Unavailable(format!(
                "device search on session {} failed: {}",
                handle, diagnostic
            )));
        }
        Ok(list.decode())
    }
}

impl Inner {
    fn search_dirs(&self) -> &[PathBuf] {
        self.search_dirs
            .get_or_init(|| paths::search_dirs(self.library_dir.as_deref()))
    }

    fn ensure_ready(&self) -> SdkResult<Arc<dyn NativeSdk>> {
        if self.ready.load(Ordering::SeqCst) {
            if let Some(loaded) = self.loaded.read().as_ref() {
                return Ok(loaded.sdk.clone());
            }
        }

        let _guard = self.init_lock.lock();
        if self.ready.load(Ordering::SeqCst) {
            if let Some(loaded) = self.loaded.read().as_ref() {
                return Ok(loaded.sdk.clone());
            }
        }

        let dirs = self.search_dirs();
        if self.loaded.read().is_none() {
            match self.loader.load(dirs) {
                Ok(loaded) => {
                    *self.loaded.write() = Some(Loaded {
                        sdk: loaded.sdk,
                        location: loaded.location,
                    });
                }
                Err(e) => {
                    error!(error = %e, searched = dirs.len(), "Failed to load native SDK");
                    *self.last_failure.write() = e.diagnostic().cloned();
                    return Err(e);
                }
            }
        }

        let (sdk, component_dir) = {
            let loaded = self.loaded.read();
            let Some(loaded) = loaded.as_ref() else {
                return Err(SdkError::initialization(codes::LIBRARY_LOAD_FAILED));
            };
            let dir = loaded
                .location
                .as_ref()
                .and_then(|l| l.parent().map(|p| p.to_path_buf()))
                .or_else(|| dirs.first().cloned());
            (loaded.sdk.clone(), dir)
        };

        if let Some(dir) = component_dir {
            match LocalSdkPath::new(&dir.to_string_lossy()) {
                Ok(path) => {
                    if !sdk.set_component_path(&path) {
                        warn!(dir = %dir.display(), code = sdk.last_error(), "Setting SDK component path failed");
                    }
                }
                Err(e) => warn!(dir = %dir.display(), error = %e, "SDK component path too long"),
            }
        }

        if !sdk.init() {
            let diagnostic = codes::diagnose(sdk.last_error());
            error!(code = diagnostic.code, message = %diagnostic.message, "Native SDK init failed");
            *self.last_failure.write() = Some(diagnostic.clone());
            return Err(SdkError::Initialization(diagnostic));
        }

        self.ready.store(true, Ordering::SeqCst);
        *self.last_failure.write() = None;
        info!(platform = %paths::platform(), "Native SDK initialised");
        Ok(sdk)
    }

    fn login(&self, ip: IpAddr, port: u16) -> SdkResult<LoginOutcome> {
        let sdk = self.ensure_ready()?;
        let endpoint = format!("{}:{}", ip, port);

        let info = UserLoginInfo::new(ip, port, &self.credentials.username, &self.credentials.password)
            .map_err(|e| {
                let mut diagnostic = codes::diagnose(SdkErrorCode::ParameterError.into());
                diagnostic.message = e.to_string();
                SdkError::Login {
                    endpoint: endpoint.clone(),
                    diagnostic,
                }
            })?;

        let mut device = DeviceInfoV40::new();
        let handle = sdk.login(&info, &mut device);
        if handle < 0 {
            let code = sdk.last_error();
            let mut diagnostic = codes::diagnose(code);
            if SdkErrorCode::from(code) == SdkErrorCode::UserLocked && device.surplus_lock_time > 0 {
                diagnostic.hint = format!(
                    "{} Remaining lock time: {}s.",
                    diagnostic.hint, device.surplus_lock_time
                );
            }
            warn!(endpoint = %endpoint, code, "Device login failed");
            return Err(SdkError::Login {
                endpoint,
                diagnostic,
            });
        }

        self.sessions.insert(handle, endpoint);
        Ok(LoginOutcome {
            handle,
            serial_number: device.serial(),
        })
    }

    fn logout(&self, handle: i32) {
        let Some((_, endpoint)) = self.sessions.remove(&handle) else {
            debug!(handle, "Logout of untracked session ignored");
            return;
        };
        let loaded = self.loaded.read();
        let Some(loaded) = loaded.as_ref().filter(|_| self.ready.load(Ordering::SeqCst)) else {
            return;
        };
        if !loaded.sdk.logout(handle) {
            let code = loaded.sdk.last_error();
            warn!(handle, endpoint = %endpoint, code, "Native logout failed");
        }
    }

    fn pull(
        &self,
        sdk: &dyn NativeSdk,
        device_id: &str,
        handle: i32,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> SdkResult<EventBatch> {
        let stream_error = |sdk: &dyn NativeSdk| SdkError::Stream {
            device_id: device_id.to_string(),
            diagnostic: codes::diagnose(sdk.last_error()),
        };

        let cond = AcsEventCond::window(from, to);
        let stream = sdk.start_remote_config(handle, NET_DVR_GET_ACS_EVENT, &cond);
        if stream < 0 {
            return Err(stream_error(sdk));
        }
        let _stream = StreamGuard { sdk, handle: stream };

        let mut record = AcsEventRecord::empty();
        let mut batch = EventBatch::default();
        let mut waits = 0;
        loop {
            if cancel.is_cancelled() {
                return Err(SdkError::Cancelled);
            }
            if batch.records.len() >= self.limits.max_records {
                debug!(device_id, "Record ceiling reached, closing stream");
                batch.truncated = true;
                break;
            }
            match NextStatus::from(sdk.get_next_remote_config(stream, &mut record)) {
                NextStatus::Success => batch.records.push(record.decode()),
                NextStatus::NeedWait => {
                    waits += 1;
                    if waits > self.limits.max_wait_retries {
                        debug!(device_id, waits, "Device kept asking to wait, closing stream");
                        batch.truncated = true;
                        break;
                    }
                    std::thread::sleep(self.limits.wait_backoff);
                }
                NextStatus::Finished => break,
                NextStatus::Failed | NextStatus::Other(_) => return Err(stream_error(sdk)),
            }
        }
        Ok(batch)
    }
}

/// Stops a remote-config stream when dropped
struct StreamGuard<'a> {
    sdk: &'a dyn NativeSdk,
    handle: i32,
}

impl Drop for StreamGuard<'_> {
    fn drop(&mut self) {
        if !self.sdk.stop_remote_config(self.handle) {
            debug!(handle = self.handle, "Stopping event stream failed");
        }
    }
}

async fn run_blocking<T, F>(f: F) -> SdkResult<T>
where
    F: FnOnce() -> SdkResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SdkError::Unavailable(format!("native call task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::{MockCall, MockDeviceSpec, MockLoader, MockSdk};
    use crate::native::DynamicLoader;

    const DEVICE_IP: &str = "10.0.0.5";

    fn ip() -> IpAddr {
        DEVICE_IP.parse().unwrap()
    }

    fn fixture() -> (SdkGateway, Arc<MockSdk>) {
        let sdk = Arc::new(MockSdk::new().with_device(MockDeviceSpec::new(ip(), 8000, "SN-0001")));
        let config = AcsConfig {
            ingest: crate::config::IngestConfig {
                wait_backoff_ms: 1,
                max_wait_retries: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let gateway = SdkGateway::new(Arc::new(MockLoader::new(sdk.clone())), &config);
        (gateway, sdk)
    }

    fn event(serial_no: u32, at: DateTime<Utc>) -> RawEvent {
        RawEvent {
            major: 5,
            minor: 1,
            occurred_at: Some(at),
            card_no: "1234".into(),
            door_no: 1,
            employee_no: String::new(),
            serial_no,
        }
    }

    #[test]
    fn test_ensure_ready_is_idempotent() {
        let (gateway, sdk) = fixture();
        gateway.ensure_ready().unwrap();
        gateway.ensure_ready().unwrap();
        assert!(gateway.is_ready());
        assert_eq!(sdk.count_calls(|c| *c == MockCall::Init), 1);
        assert!(sdk.component_path().is_some());
    }

    #[test]
    fn test_failed_init_does_not_reload_library() {
        let sdk = Arc::new(MockSdk::new());
        let loader = Arc::new(MockLoader::new(sdk.clone()));
        let gateway = SdkGateway::new(loader.clone(), &AcsConfig::default());
        sdk.fail_next_inits(1);

        assert!(gateway.ensure_ready().is_err());
        gateway.ensure_ready().unwrap();

        assert_eq!(loader.load_count(), 1);
        assert_eq!(sdk.count_calls(|c| *c == MockCall::Init), 2);
    }

    #[test]
    fn test_init_failure_is_retryable() {
        let (gateway, sdk) = fixture();
        sdk.fail_next_inits(1);

        let err = gateway.ensure_ready().unwrap_err();
        assert!(matches!(err, SdkError::Initialization(_)));
        assert!(!gateway.is_ready());
        assert!(gateway.health().last_error.is_some());

        gateway.ensure_ready().unwrap();
        assert!(gateway.is_ready());
        assert!(gateway.health().last_error.is_none());
    }

    #[test]
    fn test_health_without_library() {
        let gateway = SdkGateway::new(Arc::new(DynamicLoader::new(None)), &AcsConfig::default());
        let health = gateway.health();
        assert!(!health.initialized);
        assert_eq!(health.active_sessions, 0);
        assert!(health.last_error.is_none());

        assert!(gateway.ensure_ready().is_err());
        let health = gateway.health();
        assert_eq!(
            health.last_error.map(|d| d.code),
            Some(codes::LIBRARY_LOAD_FAILED)
        );
        assert!(!health.initialized);
    }

    #[tokio::test]
    async fn test_login_success_and_failure() {
        let (gateway, sdk) = fixture();
        let outcome = gateway.login(ip(), 8000).await.unwrap();
        assert!(outcome.handle >= 0);
        assert_eq!(outcome.serial_number.as_deref(), Some("SN-0001"));
        assert_eq!(gateway.health().active_sessions, 1);

        sdk.set_reachable(ip(), 8000, false);
        let err = gateway.login(ip(), 8000).await.unwrap_err();
        let SdkError::Login { diagnostic, .. } = err else {
            panic!("expected login error");
        };
        assert_eq!(diagnostic.code, 7);
    }

    #[tokio::test]
    async fn test_locked_account_hint_includes_remaining_time() {
        let (gateway, sdk) = fixture();
        sdk.lock_account(ip(), 8000, 120);
        let err = gateway.login(ip(), 8000).await.unwrap_err();
        let diagnostic = err.diagnostic().unwrap();
        assert_eq!(diagnostic.code, 153);
        assert!(diagnostic.hint.contains("120s"));
    }

    #[tokio::test]
    async fn test_logout_failure_is_swallowed() {
        let (gateway, sdk) = fixture();
        let outcome = gateway.login(ip(), 8000).await.unwrap();
        sdk.set_logout_fails(true);
        gateway.logout(outcome.handle).await;
        assert_eq!(gateway.health().active_sessions, 0);
    }

    #[tokio::test]
    async fn test_pull_releases_stream() {
        let (gateway, sdk) = fixture();
        let now = Utc::now();
        sdk.push_event(ip(), 8000, event(1, now - chrono::Duration::seconds(5)));
        sdk.push_event(ip(), 8000, event(2, now - chrono::Duration::seconds(1)));

        let outcome = gateway.login(ip(), 8000).await.unwrap();
        let cancel = CancellationToken::new();
        let events = gateway
            .pull_events("AC-01", outcome.handle, now - chrono::Duration::seconds(30), now, &cancel)
            .await
            .unwrap();

        assert_eq!(events.records.len(), 2);
        assert!(!events.truncated);
        assert_eq!(sdk.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_pull_failure_still_releases_stream() {
        let (gateway, sdk) = fixture();
        let outcome = gateway.login(ip(), 8000).await.unwrap();
        sdk.set_stream_fails(ip(), 8000, true);

        let now = Utc::now();
        let err = gateway
            .pull_events("AC-01", outcome.handle, now, now, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Stream { .. }));
        assert_eq!(sdk.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_pull_gives_up_after_wait_ceiling() {
        let (gateway, sdk) = fixture();
        let now = Utc::now();
        sdk.push_event(ip(), 8000, event(1, now));
        sdk.set_stream_waits(ip(), 8000, 10);

        let outcome = gateway.login(ip(), 8000).await.unwrap();
        let events = gateway
            .pull_events(
                "AC-01",
                outcome.handle,
                now - chrono::Duration::seconds(30),
                now,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert!(events.records.is_empty());
        assert!(events.truncated);
        assert_eq!(sdk.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_record_ceiling_marks_batch_truncated() {
        let sdk = Arc::new(MockSdk::new().with_device(MockDeviceSpec::new(ip(), 8000, "SN-0001")));
        let config = AcsConfig {
            ingest: crate::config::IngestConfig {
                max_records_per_pull: 2,
                ..Default::default()
            },
            ..Default::default()
        };
        let gateway = SdkGateway::new(Arc::new(MockLoader::new(sdk.clone())), &config);
        let now = Utc::now();
        for serial in 1..=3 {
            sdk.push_event(ip(), 8000, event(serial, now - chrono::Duration::seconds(10)));
        }

        let outcome = gateway.login(ip(), 8000).await.unwrap();
        let events = gateway
            .pull_events(
                "AC-01",
                outcome.handle,
                now - chrono::Duration::seconds(30),
                now,
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(events.records.len(), 2);
        assert!(events.truncated);
        assert_eq!(sdk.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pull_releases_stream() {
        let (gateway, sdk) = fixture();
        let outcome = gateway.login(ip(), 8000).await.unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let now = Utc::now();
        let err = gateway
            .pull_events("AC-01", outcome.handle, now, now, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, SdkError::Cancelled));
        assert_eq!(sdk.open_streams(), 0);
    }

    #[tokio::test]
    async fn test_batch_isolates_failures() {
        let (gateway, sdk) = fixture();
        let other: IpAddr = "10.0.0.6".parse().unwrap();
        sdk.add_device(MockDeviceSpec::new(other, 8000, "SN-0002"));

        let first = gateway.login(ip(), 8000).await.unwrap();
        let second = gateway.login(other, 8000).await.unwrap();
        sdk.set_stream_fails(ip(), 8000, true);

        let now = Utc::now();
        let outcomes = gateway
            .pull_events_batch(
                vec![
                    PullRequest {
                        device_id: "AC-01".into(),
                        handle: first.handle,
                        from: now,
                    },
                    PullRequest {
                        device_id: "AC-02".into(),
                        handle: second.handle,
                        from: now,
                    },
                ],
                now,
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 2);
        assert!(outcomes[0].result.is_err());
        assert!(outcomes[1].result.is_ok());
    }

    #[tokio::test]
    async fn test_shutdown_forces_logout() {
        let (gateway, sdk) = fixture();
        gateway.login(ip(), 8000).await.unwrap();
        assert_eq!(sdk.open_sessions(), 1);

        gateway.shutdown();
        assert!(!gateway.is_ready());
        assert_eq!(sdk.open_sessions(), 0);
        assert_eq!(gateway.health().active_sessions, 0);
        assert_eq!(sdk.count_calls(|c| *c == MockCall::Cleanup), 1);
    }
}
