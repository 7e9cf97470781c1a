//! In-process simulation of the vendor library
//!
//! Devices are registered by `ip:port`. Login checks credentials, the event
//! stream replays the device's event log filtered by the requested window, and
//! device search reports every reachable device. Failure toggles let tests
//! drive each error path of the gateway.

use std::collections::{HashMap, VecDeque};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;

use super::ffi::{
    self, AcsEventCond, AcsEventRecord, DeviceInfoV40, LocalSdkPath, RawEvent, SadpDeviceList,
    UserLoginInfo, NET_DVR_GET_ACS_EVENT, NET_SDK_GET_NEXT_STATUS_FAILED,
    NET_SDK_GET_NEXT_STATUS_FINISH, NET_SDK_GET_NEXT_STATUS_NEED_WAIT,
    NET_SDK_GET_NEXT_STATUS_SUCCESS,
};
use super::{LoadedSdk, NativeSdk, SdkLoader};
use crate::codes::SdkErrorCode;
use crate::config::{Credentials, MockSdkConfig};
use crate::error::SdkResult;

/// A simulated device
#[derive(Debug, Clone)]
pub struct MockDeviceSpec {
    pub ip: IpAddr,
    pub port: u16,
    pub serial_number: String,
    pub model: String,
    pub name: String,
    pub username: String,
    pub password: String,
}

impl MockDeviceSpec {
    pub fn new(ip: IpAddr, port: u16, serial_number: impl Into<String>) -> Self {
        Self {
            ip,
            port,
            serial_number: serial_number.into(),
            model: "DS-K1T671M".to_string(),
            name: "Access Controller".to_string(),
            username: "admin".to_string(),
            password: "12345".to_string(),
        }
    }

    pub fn with_credentials(mut self, username: &str, password: &str) -> Self {
        self.username = username.to_string();
        self.password = password.to_string();
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.model = model.to_string();
        self
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }
}

/// Native calls observed by the mock, in call order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    Init,
    Cleanup,
    Login { ip: IpAddr, port: u16, handle: i32 },
    Logout { handle: i32 },
    StartStream { user_id: i32, handle: i32 },
    StopStream { handle: i32 },
    Search { user_id: i32 },
}

struct DeviceState {
    spec: MockDeviceSpec,
    reachable: bool,
    lock_remaining_secs: Option<u32>,
    events: Vec<RawEvent>,
    waits_before_data: u32,
    stream_fails: bool,
}

struct StreamState {
    records: VecDeque<RawEvent>,
    waits_remaining: u32,
    fails: bool,
}

#[derive(Default)]
struct State {
    initialized: bool,
    component_path: Option<String>,
    devices: HashMap<(IpAddr, u16), DeviceState>,
    sessions: HashMap<i32, (IpAddr, u16)>,
    streams: HashMap<i32, StreamState>,
    next_user_id: i32,
    next_stream: i32,
    last_error: u32,
    calls: Vec<MockCall>,
    init_failures: u32,
    logout_fails: bool,
    search_fails: bool,
}

/// Simulated vendor library
#[derive(Default)]
pub struct MockSdk {
    state: Mutex<State>,
}

impl MockSdk {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mock library populated from configuration
    pub fn from_config(config: &MockSdkConfig, credentials: &Credentials) -> Self {
        let sdk = Self::new();
        for device in &config.devices {
            sdk.add_device(
                MockDeviceSpec::new(device.ip, device.port, device.serial_number.clone())
                    .with_model(&device.model)
                    .with_credentials(&credentials.username, &credentials.password),
            );
        }
        sdk
    }

    pub fn with_device(self, spec: MockDeviceSpec) -> Self {
        self.add_device(spec);
        self
    }

    pub fn add_device(&self, spec: MockDeviceSpec) {
        self.state.lock().devices.insert(
            (spec.ip, spec.port),
            DeviceState {
                spec,
                reachable: true,
                lock_remaining_secs: None,
                events: Vec::new(),
                waits_before_data: 0,
                stream_fails: false,
            },
        );
    }

    /// Append an event to a device's log
    pub fn push_event(&self, ip: IpAddr, port: u16, event: RawEvent) {
        if let Some(device) = self.state.lock().devices.get_mut(&(ip, port)) {
            device.events.push(event);
        }
    }

    pub fn set_reachable(&self, ip: IpAddr, port: u16, reachable: bool) {
        if let Some(device) = self.state.lock().devices.get_mut(&(ip, port)) {
            device.reachable = reachable;
        }
    }

    /// Lock the account; logins fail with the remaining time reported
    pub fn lock_account(&self, ip: IpAddr, port: u16, remaining_secs: u32) {
        if let Some(device) = self.state.lock().devices.get_mut(&(ip, port)) {
            device.lock_remaining_secs = Some(remaining_secs);
        }
    }

    /// "No data yet" answers each new stream gives before its first record
    pub fn set_stream_waits(&self, ip: IpAddr, port: u16, waits: u32) {
        if let Some(device) = self.state.lock().devices.get_mut(&(ip, port)) {
            device.waits_before_data = waits;
        }
    }

    pub fn set_stream_fails(&self, ip: IpAddr, port: u16, fails: bool) {
        if let Some(device) = self.state.lock().devices.get_mut(&(ip, port)) {
            device.stream_fails = fails;
        }
    }

    /// The next `count` init calls fail
    pub fn fail_next_inits(&self, count: u32) {
        self.state.lock().init_failures = count;
    }

    pub fn set_logout_fails(&self, fails: bool) {
        self.state.lock().logout_fails = fails;
    }

    pub fn set_search_fails(&self, fails: bool) {
        self.state.lock().search_fails = fails;
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().initialized
    }

    pub fn component_path(&self) -> Option<String> {
        self.state.lock().component_path.clone()
    }

    /// Sessions the library still considers open
    pub fn open_sessions(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Streams not yet stopped
    pub fn open_streams(&self) -> usize {
        self.state.lock().streams.len()
    }

    pub fn calls(&self) -> Vec<MockCall> {
        self.state.lock().calls.clone()
    }

    pub fn count_calls(&self, matches: impl Fn(&MockCall) -> bool) -> usize {
        self.state.lock().calls.iter().filter(|c| matches(c)).count()
    }

    fn fail(state: &mut State, code: SdkErrorCode) {
        state.last_error = code.into();
    }
}

impl NativeSdk for MockSdk {
    fn set_component_path(&self, path: &LocalSdkPath) -> bool {
        self.state.lock().component_path = Some(path.dir());
        true
    }

    fn init(&self) -> bool {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Init);
        if state.init_failures > 0 {
            state.init_failures -= 1;
            Self::fail(&mut state, SdkErrorCode::LoadComponentFailed);
            return false;
        }
        state.initialized = true;
        state.last_error = 0;
        true
    }

    fn cleanup(&self) -> bool {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Cleanup);
        state.initialized = false;
        state.sessions.clear();
        state.streams.clear();
        true
    }

    fn last_error(&self) -> u32 {
        self.state.lock().last_error
    }

    fn login(&self, info: &UserLoginInfo, device: &mut DeviceInfoV40) -> i32 {
        let mut state = self.state.lock();
        if !state.initialized {
            Self::fail(&mut state, SdkErrorCode::NotInitialized);
            return -1;
        }

        let Ok(ip) = info.address().parse::<IpAddr>() else {
            Self::fail(&mut state, SdkErrorCode::ParameterError);
            return -1;
        };
        let key = (ip, info.port);

        let (serial, lock) = match state.devices.get(&key) {
            Some(d) if d.reachable => {
                if info.user() != d.spec.username {
                    (Err(SdkErrorCode::UserNotExist), None)
                } else if let Some(remaining) = d.lock_remaining_secs {
                    (Err(SdkErrorCode::UserLocked), Some(remaining))
                } else if info.secret() != d.spec.password {
                    (Err(SdkErrorCode::PasswordError), None)
                } else {
                    (Ok(d.spec.serial_number.clone()), None)
                }
            }
            _ => (Err(SdkErrorCode::NetworkConnectFailed), None),
        };

        match serial {
            Ok(serial) => {
                let handle = state.next_user_id;
                state.next_user_id += 1;
                state.sessions.insert(handle, key);
                state.calls.push(MockCall::Login {
                    ip,
                    port: info.port,
                    handle,
                });
                // Serial numbers are ASCII and well under the field size
                let _ = ffi::encode_cstr(&mut device.serial_number, &serial, "serial");
                state.last_error = 0;
                handle
            }
            Err(code) => {
                if let Some(remaining) = lock {
                    device.surplus_lock_time = remaining;
                }
                Self::fail(&mut state, code);
                -1
            }
        }
    }

    fn logout(&self, user_id: i32) -> bool {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Logout { handle: user_id });
        if state.logout_fails {
            Self::fail(&mut state, SdkErrorCode::NetworkSendError);
            return false;
        }
        if state.sessions.remove(&user_id).is_none() {
            Self::fail(&mut state, SdkErrorCode::OrderError);
            return false;
        }
        true
    }

    fn start_remote_config(&self, user_id: i32, command: u32, cond: &AcsEventCond) -> i32 {
        let mut state = self.state.lock();
        if command != NET_DVR_GET_ACS_EVENT {
            Self::fail(&mut state, SdkErrorCode::NotSupported);
            return -1;
        }
        let Some(key) = state.sessions.get(&user_id).copied() else {
            Self::fail(&mut state, SdkErrorCode::OrderError);
            return -1;
        };

        let from = cond.start_time.to_utc();
        let to = cond.end_time.to_utc();
        let Some(device) = state.devices.get(&key) else {
            Self::fail(&mut state, SdkErrorCode::NetworkConnectFailed);
            return -1;
        };
        if !device.reachable {
            Self::fail(&mut state, SdkErrorCode::NetworkConnectFailed);
            return -1;
        }

        let records = device
            .events
            .iter()
            .filter(|e| match (e.occurred_at, from, to) {
                (Some(at), Some(from), Some(to)) => at >= from && at <= to,
                _ => true,
            })
            .cloned()
            .collect();
        let stream = StreamState {
            records,
            waits_remaining: device.waits_before_data,
            fails: device.stream_fails,
        };

        let handle = state.next_stream;
        state.next_stream += 1;
        state.streams.insert(handle, stream);
        state.calls.push(MockCall::StartStream { user_id, handle });
        handle
    }

    fn get_next_remote_config(&self, handle: i32, record: &mut AcsEventRecord) -> i32 {
        let mut state = self.state.lock();
        let Some(stream) = state.streams.get_mut(&handle) else {
            Self::fail(&mut state, SdkErrorCode::OrderError);
            return NET_SDK_GET_NEXT_STATUS_FAILED;
        };

        if stream.fails {
            Self::fail(&mut state, SdkErrorCode::NetworkRecvTimeout);
            return NET_SDK_GET_NEXT_STATUS_FAILED;
        }
        if stream.waits_remaining > 0 {
            stream.waits_remaining -= 1;
            return NET_SDK_GET_NEXT_STATUS_NEED_WAIT;
        }

        match stream.records.pop_front() {
            Some(event) => {
                *record = AcsEventRecord::empty();
                record.major = event.major;
                record.minor = event.minor;
                if let Some(at) = event.occurred_at {
                    record.time = at.into();
                }
                record.detail.door_no = event.door_no;
                record.detail.serial_no = event.serial_no;
                let _ = ffi::encode_cstr(&mut record.detail.card_no, &event.card_no, "card");
                let _ = ffi::encode_cstr(
                    &mut record.detail.employee_no_string,
                    &event.employee_no,
                    "employee",
                );
                NET_SDK_GET_NEXT_STATUS_SUCCESS
            }
            None => NET_SDK_GET_NEXT_STATUS_FINISH,
        }
    }

    fn stop_remote_config(&self, handle: i32) -> bool {
        let mut state = self.state.lock();
        state.calls.push(MockCall::StopStream { handle });
        state.streams.remove(&handle).is_some()
    }

    fn search_devices(&self, user_id: i32, list: &mut SadpDeviceList) -> bool {
        let mut state = self.state.lock();
        state.calls.push(MockCall::Search { user_id });
        if state.search_fails {
            Self::fail(&mut state, SdkErrorCode::NotSupported);
            return false;
        }
        if !state.sessions.contains_key(&user_id) {
            Self::fail(&mut state, SdkErrorCode::OrderError);
            return false;
        }

        let mut devices: Vec<&DeviceState> =
            state.devices.values().filter(|d| d.reachable).collect();
        devices.sort_by_key(|d| (d.spec.ip, d.spec.port));

        let mut count = 0;
        for (slot, device) in list.devices.iter_mut().zip(devices) {
            *slot = ffi::SadpDevice::empty();
            let _ = ffi::encode_cstr(&mut slot.ipv4, &device.spec.ip.to_string(), "ip");
            slot.port = device.spec.port;
            let _ = ffi::encode_cstr(&mut slot.serial_number, &device.spec.serial_number, "serial");
            let _ = ffi::encode_cstr(&mut slot.device_type, &device.spec.model, "model");
            let _ = ffi::encode_cstr(&mut slot.device_name, &device.spec.name, "name");
            slot.activated = 1;
            count += 1;
        }
        list.count = count;
        true
    }
}

/// Loader handing out a shared [`MockSdk`]
pub struct MockLoader {
    sdk: Arc<MockSdk>,
    loads: AtomicU32,
}

impl MockLoader {
    pub fn new(sdk: Arc<MockSdk>) -> Self {
        Self {
            sdk,
            loads: AtomicU32::new(0),
        }
    }

    /// Number of times the library was "loaded"
    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::SeqCst)
    }
}

impl SdkLoader for MockLoader {
    fn load(&self, _search_dirs: &[PathBuf]) -> SdkResult<LoadedSdk> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(LoadedSdk {
            sdk: self.sdk.clone(),
            location: None,
        })
    }
}
