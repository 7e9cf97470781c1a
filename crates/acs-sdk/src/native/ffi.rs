//! Marshaled structures exchanged with the vendor library
//!
//! Every structure is `#[repr(C)]` with fixed-capacity byte arrays. Strings are
//! NUL-terminated inside those arrays. Nothing in this module leaves the native
//! gateway: callers only ever see the decoded values ([`RawEvent`],
//! [`SearchedDevice`], [`LoginOutcome`]).

use std::mem;
use std::net::IpAddr;

use chrono::{DateTime, Datelike, TimeZone, Timelike, Utc};
use thiserror::Error;

pub const SERIALNO_LEN: usize = 48;
pub const NAME_LEN: usize = 32;
pub const ADDRESS_LEN: usize = 129;
pub const LOGIN_USERNAME_MAX_LEN: usize = 64;
pub const LOGIN_PASSWD_MAX_LEN: usize = 64;
pub const ACS_CARD_NO_LEN: usize = 32;
pub const EMPLOYEE_NO_LEN: usize = 32;
pub const IPV4_ADDRESS_LEN: usize = 16;
pub const SDK_PATH_LEN: usize = 256;
pub const MAX_SEARCHED_DEVICES: usize = 256;

/// Remote-config command that streams access-control events
pub const NET_DVR_GET_ACS_EVENT: u32 = 2514;

/// Init-config type selecting the component path
pub const NET_SDK_INIT_CFG_SDK_PATH: i32 = 2;

pub const NET_SDK_GET_NEXT_STATUS_SUCCESS: i32 = 1000;
pub const NET_SDK_GET_NEXT_STATUS_NEED_WAIT: i32 = 1001;
pub const NET_SDK_GET_NEXT_STATUS_FINISH: i32 = 1002;
pub const NET_SDK_GET_NEXT_STATUS_FAILED: i32 = 1003;

/// Status of a "get next record" call on a remote-config stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextStatus {
    /// A record was written to the output buffer
    Success,
    /// No record available yet
    NeedWait,
    /// Stream exhausted
    Finished,
    /// Stream failed; consult the last error
    Failed,
    /// Status outside the documented set
    Other(i32),
}

impl From<i32> for NextStatus {
    fn from(value: i32) -> Self {
        match value {
            NET_SDK_GET_NEXT_STATUS_SUCCESS => Self::Success,
            NET_SDK_GET_NEXT_STATUS_NEED_WAIT => Self::NeedWait,
            NET_SDK_GET_NEXT_STATUS_FINISH => Self::Finished,
            NET_SDK_GET_NEXT_STATUS_FAILED => Self::Failed,
            other => Self::Other(other),
        }
    }
}

/// A string did not fit its fixed-size native field
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} exceeds {capacity} bytes")]
pub struct FieldTooLong {
    pub field: &'static str,
    pub capacity: usize,
}

/// Copy `value` into `dst` as a NUL-terminated string
///
/// The remainder of `dst` is zeroed. Fails when `value` plus its terminator
/// does not fit.
pub fn encode_cstr(dst: &mut [u8], value: &str, field: &'static str) -> Result<(), FieldTooLong> {
    let bytes = value.as_bytes();
    if bytes.len() >= dst.len() || bytes.contains(&0) {
        return Err(FieldTooLong {
            field,
            capacity: dst.len().saturating_sub(1),
        });
    }
    dst.fill(0);
    dst[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}

/// Read a NUL-terminated string from a fixed-size field
///
/// A field without a terminator is read in full. Invalid UTF-8 is replaced.
pub fn decode_cstr(src: &[u8]) -> String {
    let end = src.iter().position(|&b| b == 0).unwrap_or(src.len());
    String::from_utf8_lossy(&src[..end]).trim().to_string()
}

// =============================================================================
// Time
// =============================================================================

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NetDvrTime {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub hour: u32,
    pub minute: u32,
    pub second: u32,
}

impl From<DateTime<Utc>> for NetDvrTime {
    fn from(value: DateTime<Utc>) -> Self {
        Self {
            year: value.year().max(0) as u32,
            month: value.month(),
            day: value.day(),
            hour: value.hour(),
            minute: value.minute(),
            second: value.second(),
        }
    }
}

impl NetDvrTime {
    /// Convert to UTC, `None` for impossible dates
    ///
    /// Sessions are opened in UTC mode so device times need no offset.
    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        let year = i32::try_from(self.year).ok()?;
        Utc.with_ymd_and_hms(year, self.month, self.day, self.hour, self.minute, self.second)
            .single()
    }
}

// =============================================================================
// Login
// =============================================================================

/// Login request (`NET_DVR_USER_LOGIN_INFO`)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct UserLoginInfo {
    pub device_address: [u8; ADDRESS_LEN],
    pub use_transport: u8,
    pub port: u16,
    pub user_name: [u8; LOGIN_USERNAME_MAX_LEN],
    pub password: [u8; LOGIN_PASSWD_MAX_LEN],
    /// Pointer-sized callback slot, always null (synchronous login)
    pub login_result_cb: usize,
    /// Pointer-sized user data slot, always null
    pub user_data: usize,
    pub async_login: i32,
    pub proxy_type: u8,
    pub use_utc_time: u8,
    pub login_mode: u8,
    pub https: u8,
    pub proxy_id: i32,
    pub verify_mode: u8,
    pub reserved: [u8; 119],
}

impl UserLoginInfo {
    /// Synchronous login request in UTC mode
    pub fn new(ip: IpAddr, port: u16, username: &str, password: &str) -> Result<Self, FieldTooLong> {
        let mut info = Self {
            device_address: [0; ADDRESS_LEN],
            use_transport: 0,
            port,
            user_name: [0; LOGIN_USERNAME_MAX_LEN],
            password: [0; LOGIN_PASSWD_MAX_LEN],
            login_result_cb: 0,
            user_data: 0,
            async_login: 0,
            proxy_type: 0,
            use_utc_time: 1,
            login_mode: 0,
            https: 0,
            proxy_id: 0,
            verify_mode: 0,
            reserved: [0; 119],
        };
        encode_cstr(&mut info.device_address, &ip.to_string(), "device address")?;
        encode_cstr(&mut info.user_name, username, "user name")?;
        encode_cstr(&mut info.password, password, "password")?;
        Ok(info)
    }

    pub fn address(&self) -> String {
        decode_cstr(&self.device_address)
    }

    pub fn user(&self) -> String {
        decode_cstr(&self.user_name)
    }

    pub fn secret(&self) -> String {
        decode_cstr(&self.password)
    }
}

/// Device description filled by a successful login (`NET_DVR_DEVICEINFO_V40`)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct DeviceInfoV40 {
    pub serial_number: [u8; SERIALNO_LEN],
    pub alarm_in_port_num: u8,
    pub alarm_out_port_num: u8,
    pub disk_num: u8,
    pub dvr_type: u8,
    pub chan_num: u8,
    pub start_chan: u8,
    pub audio_chan_num: u8,
    pub ip_chan_num: u8,
    pub reserved_v30: [u8; 24],
    pub support_lock: u8,
    pub retry_login_time: u8,
    pub password_level: u8,
    pub proxy_type: u8,
    /// Seconds until a locked account unlocks
    pub surplus_lock_time: u32,
    pub char_encode_type: u8,
    pub support_dev5: u8,
    pub support: u8,
    pub login_mode: u8,
    pub reserved: [u8; 252],
}

impl DeviceInfoV40 {
    pub fn new() -> Self {
        Self {
            serial_number: [0; SERIALNO_LEN],
            alarm_in_port_num: 0,
            alarm_out_port_num: 0,
            disk_num: 0,
            dvr_type: 0,
            chan_num: 0,
            start_chan: 0,
            audio_chan_num: 0,
            ip_chan_num: 0,
            reserved_v30: [0; 24],
            support_lock: 0,
            retry_login_time: 0,
            password_level: 0,
            proxy_type: 0,
            surplus_lock_time: 0,
            char_encode_type: 0,
            support_dev5: 0,
            support: 0,
            login_mode: 0,
            reserved: [0; 252],
        }
    }

    pub fn serial(&self) -> Option<String> {
        let serial = decode_cstr(&self.serial_number);
        (!serial.is_empty()).then_some(serial)
    }
}

impl Default for DeviceInfoV40 {
    fn default() -> Self {
        Self::new()
    }
}

/// Decoded result of a successful login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginOutcome {
    pub handle: i32,
    pub serial_number: Option<String>,
}

// =============================================================================
// Access-control event stream
// =============================================================================

/// Event query (`NET_DVR_ACS_EVENT_COND`)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AcsEventCond {
    pub size: u32,
    /// 0 = all
    pub major: u32,
    /// 0 = all
    pub minor: u32,
    pub start_time: NetDvrTime,
    pub end_time: NetDvrTime,
    pub card_no: [u8; ACS_CARD_NO_LEN],
    pub name: [u8; NAME_LEN],
    pub pic_enable: u8,
    pub time_type: u8,
    pub reserved2: [u8; 2],
    pub begin_serial_no: u32,
    pub end_serial_no: u32,
    pub reserved: [u8; 244],
}

impl AcsEventCond {
    /// All events inside `[from, to]`
    pub fn window(from: DateTime<Utc>, to: DateTime<Utc>) -> Self {
        Self {
            size: mem::size_of::<Self>() as u32,
            major: 0,
            minor: 0,
            start_time: from.into(),
            end_time: to.into(),
            card_no: [0; ACS_CARD_NO_LEN],
            name: [0; NAME_LEN],
            pic_enable: 0,
            time_type: 0,
            reserved2: [0; 2],
            begin_serial_no: 0,
            end_serial_no: 0,
            reserved: [0; 244],
        }
    }
}

/// Event detail (`NET_DVR_ACS_EVENT_DETAIL`, trimmed to the fields we read)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AcsEventDetail {
    pub size: u32,
    pub card_no: [u8; ACS_CARD_NO_LEN],
    pub card_type: u8,
    pub allow_list_no: u8,
    pub report_channel: u8,
    pub card_reader_kind: u8,
    pub card_reader_no: u32,
    pub door_no: u32,
    pub verify_no: u32,
    pub alarm_in_no: u32,
    pub alarm_out_no: u32,
    pub case_sensor_no: u32,
    pub rs485_no: u32,
    pub multi_card_group_no: u32,
    pub access_channel: u16,
    pub device_no: u8,
    pub distract_control_no: u8,
    pub employee_no: u32,
    pub local_controller_id: u16,
    pub internet_access: u8,
    pub kind: u8,
    pub mac_addr: [u8; 6],
    pub swipe_card_type: u8,
    pub mask: u8,
    pub serial_no: u32,
    pub employee_no_string: [u8; EMPLOYEE_NO_LEN],
    pub reserved: [u8; 128],
}

/// One streamed event record (`NET_DVR_ACS_EVENT_CFG`)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct AcsEventRecord {
    pub size: u32,
    pub major: u32,
    pub minor: u32,
    pub time: NetDvrTime,
    pub net_user: [u8; 16],
    pub remote_host_addr: [u8; IPV4_ADDRESS_LEN],
    pub detail: AcsEventDetail,
    pub pic_data_len: u32,
    /// Pointer-sized picture buffer slot, unused
    pub pic_data: usize,
    pub time_type: u8,
    pub reserved: [u8; 61],
}

impl AcsEventRecord {
    /// Zeroed output buffer for one record
    pub fn empty() -> Self {
        Self {
            size: mem::size_of::<Self>() as u32,
            major: 0,
            minor: 0,
            time: NetDvrTime::default(),
            net_user: [0; 16],
            remote_host_addr: [0; IPV4_ADDRESS_LEN],
            detail: AcsEventDetail {
                size: mem::size_of::<AcsEventDetail>() as u32,
                card_no: [0; ACS_CARD_NO_LEN],
                card_type: 0,
                allow_list_no: 0,
                report_channel: 0,
                card_reader_kind: 0,
                card_reader_no: 0,
                door_no: 0,
                verify_no: 0,
                alarm_in_no: 0,
                alarm_out_no: 0,
                case_sensor_no: 0,
                rs485_no: 0,
                multi_card_group_no: 0,
                access_channel: 0,
                device_no: 0,
                distract_control_no: 0,
                employee_no: 0,
                local_controller_id: 0,
                internet_access: 0,
                kind: 0,
                mac_addr: [0; 6],
                swipe_card_type: 0,
                mask: 0,
                serial_no: 0,
                employee_no_string: [0; EMPLOYEE_NO_LEN],
                reserved: [0; 128],
            },
            pic_data_len: 0,
            pic_data: 0,
            time_type: 0,
            reserved: [0; 61],
        }
    }

    /// Decode into an owned record
    pub fn decode(&self) -> RawEvent {
        let employee_no = match decode_cstr(&self.detail.employee_no_string) {
            s if !s.is_empty() => s,
            _ if self.detail.employee_no != 0 => self.detail.employee_no.to_string(),
            _ => String::new(),
        };
        RawEvent {
            major: self.major,
            minor: self.minor,
            occurred_at: self.time.to_utc(),
            card_no: decode_cstr(&self.detail.card_no),
            door_no: self.detail.door_no,
            employee_no,
            serial_no: self.detail.serial_no,
        }
    }
}

impl Default for AcsEventRecord {
    fn default() -> Self {
        Self::empty()
    }
}

/// An event record decoded from the native buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub major: u32,
    pub minor: u32,
    /// `None` when the device reported an impossible timestamp
    pub occurred_at: Option<DateTime<Utc>>,
    pub card_no: String,
    pub door_no: u32,
    pub employee_no: String,
    /// Device-side monotonic record number
    pub serial_no: u32,
}

// =============================================================================
// Device search
// =============================================================================

/// One device reported by the vendor broadcast search
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SadpDevice {
    pub ipv4: [u8; IPV4_ADDRESS_LEN],
    pub port: u16,
    pub serial_number: [u8; SERIALNO_LEN],
    pub device_type: [u8; NAME_LEN],
    pub device_name: [u8; NAME_LEN],
    pub activated: u8,
    pub reserved: [u8; 29],
}

impl SadpDevice {
    pub fn empty() -> Self {
        Self {
            ipv4: [0; IPV4_ADDRESS_LEN],
            port: 0,
            serial_number: [0; SERIALNO_LEN],
            device_type: [0; NAME_LEN],
            device_name: [0; NAME_LEN],
            activated: 0,
            reserved: [0; 29],
        }
    }

    /// Decode, `None` when the address is missing or unparsable
    pub fn decode(&self) -> Option<SearchedDevice> {
        let ip = decode_cstr(&self.ipv4).parse().ok()?;
        let opt = |s: String| (!s.is_empty()).then_some(s);
        Some(SearchedDevice {
            ip,
            port: self.port,
            serial_number: opt(decode_cstr(&self.serial_number)),
            model: opt(decode_cstr(&self.device_type)),
            name: opt(decode_cstr(&self.device_name)),
        })
    }
}

/// Output buffer for a device search
#[repr(C)]
#[derive(Clone, Copy)]
pub struct SadpDeviceList {
    pub size: u32,
    pub count: u32,
    pub devices: [SadpDevice; MAX_SEARCHED_DEVICES],
}

impl SadpDeviceList {
    pub fn empty() -> Box<Self> {
        Box::new(Self {
            size: mem::size_of::<Self>() as u32,
            count: 0,
            devices: [SadpDevice::empty(); MAX_SEARCHED_DEVICES],
        })
    }

    /// Decoded entries, clamped to the buffer capacity
    pub fn decode(&self) -> Vec<SearchedDevice> {
        let count = (self.count as usize).min(MAX_SEARCHED_DEVICES);
        self.devices[..count]
            .iter()
            .filter_map(SadpDevice::decode)
            .collect()
    }
}

/// A device decoded from a search result
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchedDevice {
    pub ip: IpAddr,
    pub port: u16,
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub name: Option<String>,
}

// =============================================================================
// Init config
// =============================================================================

/// Component directory handed to the library before init (`NET_DVR_LOCAL_SDK_PATH`)
#[repr(C)]
#[derive(Clone, Copy)]
pub struct LocalSdkPath {
    pub path: [u8; SDK_PATH_LEN],
    pub reserved: [u8; 128],
}

impl LocalSdkPath {
    pub fn new(dir: &str) -> Result<Self, FieldTooLong> {
        let mut value = Self {
            path: [0; SDK_PATH_LEN],
            reserved: [0; 128],
        };
        encode_cstr(&mut value.path, dir, "sdk path")?;
        Ok(value)
    }

    pub fn dir(&self) -> String {
        decode_cstr(&self.path)
    }
}
