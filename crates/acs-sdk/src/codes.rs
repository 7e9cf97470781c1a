//! Vendor SDK error codes
//!
//! Native calls report failure through a numeric "last error" code. This
//! module names the documented codes and maps each one to an operator-facing
//! message and remediation hint.

use std::fmt;

use acs_core::ErrorDiagnostic;

/// Gateway-side code for "the native library itself could not be loaded".
///
/// Lives outside the vendor range so it never collides with a native code.
pub const LIBRARY_LOAD_FAILED: u32 = 0xFFFF_0001;

/// Documented vendor error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdkErrorCode {
    NoError,

    // Authentication
    PasswordError,
    UserNotExist,
    UserLocked,

    // Permission
    NoPermission,

    // Initialization order
    NotInitialized,
    OrderError,

    // Addressing
    ChannelError,

    // Session limits
    OverMaxLink,
    MaxUserNum,

    // Capability mismatch
    VersionMismatch,
    AbilityMismatch,

    // Network
    NetworkConnectFailed,
    NetworkSendError,
    NetworkRecvError,
    NetworkRecvTimeout,
    NetworkDataError,

    // Request
    ParameterError,
    NotSupported,
    OperationFailed,
    BufferTooSmall,
    AllocFailed,

    // Rate limiting
    RequestTooFrequent,
    DeviceBusy,

    // XML / parse
    XmlParseError,
    XmlContentError,

    // Dependency load
    LoadPlayerSdkFailed,
    LoadPlayerSdkProcFailed,
    LoadDsSdkFailed,
    LoadComponentFailed,
    LibraryLoadFailed,

    /// Code outside the documented table
    Unknown(u32),
}

impl From<u32> for SdkErrorCode {
    fn from(value: u32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::PasswordError,
            2 => Self::NoPermission,
            3 => Self::NotInitialized,
            4 => Self::ChannelError,
            5 => Self::OverMaxLink,
            6 => Self::VersionMismatch,
            7 => Self::NetworkConnectFailed,
            8 => Self::NetworkSendError,
            9 => Self::NetworkRecvError,
            10 => Self::NetworkRecvTimeout,
            11 => Self::NetworkDataError,
            12 => Self::OrderError,
            17 => Self::ParameterError,
            23 => Self::NotSupported,
            29 => Self::OperationFailed,
            41 => Self::AllocFailed,
            43 => Self::BufferTooSmall,
            47 => Self::UserNotExist,
            52 => Self::MaxUserNum,
            64 => Self::LoadPlayerSdkFailed,
            65 => Self::LoadPlayerSdkProcFailed,
            67 => Self::LoadDsSdkFailed,
            68 => Self::LoadComponentFailed,
            91 => Self::AbilityMismatch,
            153 => Self::UserLocked,
            800 => Self::RequestTooFrequent,
            801 => Self::DeviceBusy,
            1010 => Self::XmlParseError,
            1011 => Self::XmlContentError,
            LIBRARY_LOAD_FAILED => Self::LibraryLoadFailed,
            other => Self::Unknown(other),
        }
    }
}

impl From<SdkErrorCode> for u32 {
    fn from(code: SdkErrorCode) -> Self {
        match code {
            SdkErrorCode::NoError => 0,
            SdkErrorCode::PasswordError => 1,
            SdkErrorCode::NoPermission => 2,
            SdkErrorCode::NotInitialized => 3,
            SdkErrorCode::ChannelError => 4,
            SdkErrorCode::OverMaxLink => 5,
            SdkErrorCode::VersionMismatch => 6,
            SdkErrorCode::NetworkConnectFailed => 7,
            SdkErrorCode::NetworkSendError => 8,
            SdkErrorCode::NetworkRecvError => 9,
            SdkErrorCode::NetworkRecvTimeout => 10,
            SdkErrorCode::NetworkDataError => 11,
            SdkErrorCode::OrderError => 12,
            SdkErrorCode::ParameterError => 17,
            SdkErrorCode::NotSupported => 23,
            SdkErrorCode::OperationFailed => 29,
            SdkErrorCode::AllocFailed => 41,
            SdkErrorCode::BufferTooSmall => 43,
            SdkErrorCode::UserNotExist => 47,
            SdkErrorCode::MaxUserNum => 52,
            SdkErrorCode::LoadPlayerSdkFailed => 64,
            SdkErrorCode::LoadPlayerSdkProcFailed => 65,
            SdkErrorCode::LoadDsSdkFailed => 67,
            SdkErrorCode::LoadComponentFailed => 68,
            SdkErrorCode::AbilityMismatch => 91,
            SdkErrorCode::UserLocked => 153,
            SdkErrorCode::RequestTooFrequent => 800,
            SdkErrorCode::DeviceBusy => 801,
            SdkErrorCode::XmlParseError => 1010,
            SdkErrorCode::XmlContentError => 1011,
            SdkErrorCode::LibraryLoadFailed => LIBRARY_LOAD_FAILED,
            SdkErrorCode::Unknown(v) => v,
        }
    }
}

impl SdkErrorCode {
    /// Message and remediation hint for this code
    pub fn describe(&self) -> (&'static str, &'static str) {
        match self {
            Self::NoError => ("No error", "Nothing to do."),
            Self::PasswordError => (
                "User name or password is incorrect",
                "Check the credentials configured for this device; repeated failures lock the account.",
            ),
            Self::UserNotExist => (
                "User does not exist on the device",
                "Create the account on the device or configure an existing one.",
            ),
            Self::UserLocked => (
                "Account is locked after too many failed logins",
                "Wait for the lock to expire or unlock the account from the device's web page.",
            ),
            Self::NoPermission => (
                "Account lacks permission for this operation",
                "Grant the account remote-configuration rights on the device.",
            ),
            Self::NotInitialized => (
                "SDK is not initialised",
                "The SDK must be initialised before any other call; check the gateway start-up log.",
            ),
            Self::OrderError => (
                "SDK calls made in the wrong order",
                "A session or stream was used after it was closed; reconnect the device.",
            ),
            Self::ChannelError => (
                "Channel or door number not found",
                "Verify the door/channel number exists on this device model.",
            ),
            Self::OverMaxLink => (
                "Device has reached its maximum number of connections",
                "Close other clients connected to the device or raise its connection limit.",
            ),
            Self::MaxUserNum => (
                "Maximum number of logged-in users reached",
                "Log out unused sessions on the device, then reconnect.",
            ),
            Self::VersionMismatch => (
                "SDK and device firmware versions do not match",
                "Upgrade the device firmware or use an SDK build that supports it.",
            ),
            Self::AbilityMismatch => (
                "Device does not report the required capability",
                "This device model does not support the requested feature set.",
            ),
            Self::NetworkConnectFailed => (
                "Failed to connect to the device",
                "Check that the device is powered, reachable from this host and the port is correct.",
            ),
            Self::NetworkSendError => (
                "Failed to send data to the device",
                "Check network stability between this host and the device.",
            ),
            Self::NetworkRecvError => (
                "Failed to receive data from the device",
                "Check network stability between this host and the device.",
            ),
            Self::NetworkRecvTimeout => (
                "Timed out waiting for the device",
                "The device is slow or unreachable; check latency and firewall rules.",
            ),
            Self::NetworkDataError => (
                "Device sent malformed data",
                "Restart the device; if it persists, check for firmware issues.",
            ),
            Self::ParameterError => (
                "Invalid parameter passed to the SDK",
                "Check the request values (time window, door number, buffer sizes).",
            ),
            Self::NotSupported => (
                "Operation not supported by the device",
                "This device model or firmware does not implement the operation.",
            ),
            Self::OperationFailed => (
                "Device failed to execute the operation",
                "Retry later; check the device log for the underlying cause.",
            ),
            Self::BufferTooSmall => (
                "Result buffer too small",
                "The device returned more data than expected; narrow the query window.",
            ),
            Self::AllocFailed => (
                "SDK could not allocate resources",
                "The host is low on memory or handles; restart the service.",
            ),
            Self::RequestTooFrequent => (
                "Requests are being sent too frequently",
                "Increase the polling interval for this device.",
            ),
            Self::DeviceBusy => (
                "Device is busy",
                "Retry after the device finishes its current task.",
            ),
            Self::XmlParseError => (
                "Failed to parse XML exchanged with the device",
                "The device firmware may be incompatible with this SDK build.",
            ),
            Self::XmlContentError => (
                "XML content rejected by the device",
                "Check the request content against the device's protocol version.",
            ),
            Self::LoadPlayerSdkFailed
            | Self::LoadPlayerSdkProcFailed
            | Self::LoadDsSdkFailed
            | Self::LoadComponentFailed => (
                "Failed to load an SDK component library",
                "Make sure the SDK component directory is deployed next to the main library.",
            ),
            Self::LibraryLoadFailed => (
                "Native SDK library could not be loaded",
                "Install the SDK for this platform or point ACS_SDK_LIB_DIR / sdk.library_dir at it.",
            ),
            Self::Unknown(_) => (
                "Unknown SDK error",
                "Look this code up in the vendor error list for the installed SDK build.",
            ),
        }
    }
}

impl fmt::Display for SdkErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown(v) => write!(f, "Unknown({})", v),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Message and hint for a raw native code
pub fn describe(code: u32) -> (&'static str, &'static str) {
    SdkErrorCode::from(code).describe()
}

/// Build a diagnostic for a raw native code
pub fn diagnose(code: u32) -> ErrorDiagnostic {
    let (message, hint) = describe(code);
    ErrorDiagnostic {
        code,
        message: message.to_string(),
        hint: hint.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_no_error() {
        assert_eq!(describe(0).0, "No error");
    }

    #[rstest]
    #[case(1, SdkErrorCode::PasswordError)]
    #[case(3, SdkErrorCode::NotInitialized)]
    #[case(5, SdkErrorCode::OverMaxLink)]
    #[case(10, SdkErrorCode::NetworkRecvTimeout)]
    #[case(23, SdkErrorCode::NotSupported)]
    #[case(153, SdkErrorCode::UserLocked)]
    #[case(800, SdkErrorCode::RequestTooFrequent)]
    #[case(1010, SdkErrorCode::XmlParseError)]
    #[case(64, SdkErrorCode::LoadPlayerSdkFailed)]
    fn test_known_codes(#[case] raw: u32, #[case] expected: SdkErrorCode) {
        let code = SdkErrorCode::from(raw);
        assert_eq!(code, expected);
        assert_eq!(u32::from(code), raw);
        assert_ne!(code.describe().0, "Unknown SDK error");
    }

    #[rstest]
    #[case(13)]
    #[case(999)]
    #[case(u32::MAX)]
    fn test_unknown_codes_fall_back(#[case] raw: u32) {
        let (message, hint) = describe(raw);
        assert_eq!(message, "Unknown SDK error");
        assert!(hint.contains("vendor error list"));
    }

    #[test]
    fn test_library_load_code_is_described() {
        let diag = diagnose(LIBRARY_LOAD_FAILED);
        assert_eq!(diag.code, LIBRARY_LOAD_FAILED);
        assert!(diag.hint.contains("ACS_SDK_LIB_DIR"));
    }

    #[test]
    fn test_display() {
        assert_eq!(SdkErrorCode::UserLocked.to_string(), "UserLocked");
        assert_eq!(SdkErrorCode::Unknown(4242).to_string(), "Unknown(4242)");
    }
}
