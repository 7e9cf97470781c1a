//! Configuration for the device integration layer
//!
//! Every field has a documented default, so an empty configuration file is a
//! valid one. Sections are validated independently: a broken `discovery`
//! section disables discovery but leaves sessions and ingestion running.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use acs_core::RegisteredDevice;
use serde::{Deserialize, Serialize};

use crate::discovery::DiscoveryStrategy;
use crate::error::{SdkError, SdkResult};

/// Environment variable holding extra native library directories
pub const LIB_DIR_ENV: &str = "ACS_SDK_LIB_DIR";

/// Top-level configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AcsConfig {
    #[serde(default)]
    pub sdk: SdkConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub connectivity: ConnectivityConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Devices to connect at startup
    #[serde(default)]
    pub devices: Vec<RegisteredDevice>,
}

impl AcsConfig {
    /// Validate every section, returning the failing ones by name
    pub fn section_errors(&self) -> Vec<(&'static str, SdkError)> {
        let checks = [
            ("sdk", self.sdk.validate()),
            ("credentials", self.credentials.validate()),
            ("discovery", self.discovery.validate()),
            ("connectivity", self.connectivity.validate()),
            ("ingest", self.ingest.validate()),
        ];
        checks
            .into_iter()
            .filter_map(|(name, result)| result.err().map(|e| (name, e)))
            .collect()
    }
}

// =============================================================================
// Native SDK
// =============================================================================

/// Which native library implementation to use
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdkBackend {
    /// Vendor library loaded at runtime
    #[default]
    Native,
    /// In-process simulation
    Mock,
}

/// Native library settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SdkConfig {
    #[serde(default)]
    pub backend: SdkBackend,
    /// Directory searched before any other
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_dir: Option<PathBuf>,
    /// Library file name override (defaults to the platform's vendor name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub library_name: Option<String>,
    /// Simulated devices for the mock backend
    #[serde(default)]
    pub mock: MockSdkConfig,
}

impl SdkConfig {
    pub fn validate(&self) -> SdkResult<()> {
        if let Some(name) = &self.library_name {
            if name.trim().is_empty() {
                return Err(SdkError::Configuration(
                    "sdk.library_name must not be empty".into(),
                ));
            }
        }
        Ok(())
    }
}

/// Mock backend configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MockSdkConfig {
    #[serde(default)]
    pub devices: Vec<MockDeviceConfig>,
}

/// A device simulated by the mock backend
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MockDeviceConfig {
    pub ip: IpAddr,
    #[serde(default = "default_device_port")]
    pub port: u16,
    pub serial_number: String,
    #[serde(default = "default_mock_model")]
    pub model: String,
}

fn default_device_port() -> u16 {
    8000
}

fn default_mock_model() -> String {
    "DS-K1T671M".to_string()
}

// =============================================================================
// Credentials
// =============================================================================

/// Device login credentials
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(default = "default_username")]
    pub username: String,
    #[serde(default = "default_password")]
    pub password: String,
}

fn default_username() -> String {
    "admin".to_string()
}

// Vendor factory default
fn default_password() -> String {
    "12345".to_string()
}

impl Default for Credentials {
    fn default() -> Self {
        Self {
            username: default_username(),
            password: default_password(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn validate(&self) -> SdkResult<()> {
        if self.username.is_empty() {
            return Err(SdkError::Configuration(
                "credentials.username must not be empty".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Discovery
// =============================================================================

/// Discovery settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    #[serde(default)]
    pub strategy: DiscoveryStrategy,
    /// Ports probed on every candidate host
    #[serde(default = "default_ports")]
    pub ports: Vec<u16>,
    /// Per-probe timeout in milliseconds
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    /// In-flight probe ceiling
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
    /// Hosts scanned per subnet
    #[serde(default = "default_max_hosts")]
    pub max_hosts_per_subnet: usize,
    /// Smallest prefix length scanned (largest subnet)
    #[serde(default = "default_min_prefix")]
    pub min_prefix_len: u8,
    /// Largest prefix length scanned (smallest subnet)
    #[serde(default = "default_max_prefix")]
    pub max_prefix_len: u8,
    /// Device-info endpoint path
    #[serde(default = "default_info_path")]
    pub info_path: String,
    /// Host used to open a throwaway session for broadcast discovery
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bootstrap: Option<BootstrapHost>,
}

/// Bootstrap host for broadcast discovery
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapHost {
    pub ip: IpAddr,
    #[serde(default = "default_device_port")]
    pub port: u16,
}

fn default_ports() -> Vec<u16> {
    vec![80, 443, 8000]
}

fn default_probe_timeout() -> u64 {
    1500
}

fn default_max_concurrency() -> usize {
    64
}

fn default_max_hosts() -> usize {
    256
}

fn default_min_prefix() -> u8 {
    16
}

fn default_max_prefix() -> u8 {
    30
}

fn default_info_path() -> String {
    "/ISAPI/System/deviceInfo".to_string()
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            strategy: DiscoveryStrategy::default(),
            ports: default_ports(),
            probe_timeout_ms: default_probe_timeout(),
            max_concurrency: default_max_concurrency(),
            max_hosts_per_subnet: default_max_hosts(),
            min_prefix_len: default_min_prefix(),
            max_prefix_len: default_max_prefix(),
            info_path: default_info_path(),
            bootstrap: None,
        }
    }
}

impl DiscoveryConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.ports.is_empty() || self.ports.contains(&0) {
            return Err(SdkError::Configuration(
                "discovery.ports must list at least one non-zero port".into(),
            ));
        }
        if self.probe_timeout_ms == 0 {
            return Err(SdkError::Configuration(
                "discovery.probe_timeout_ms must be positive".into(),
            ));
        }
        if self.max_concurrency == 0 || self.max_hosts_per_subnet == 0 {
            return Err(SdkError::Configuration(
                "discovery.max_concurrency and max_hosts_per_subnet must be positive".into(),
            ));
        }
        if self.min_prefix_len > self.max_prefix_len || self.max_prefix_len > 30 {
            return Err(SdkError::Configuration(format!(
                "discovery prefix range /{}../{} is invalid",
                self.min_prefix_len, self.max_prefix_len
            )));
        }
        if !self.info_path.starts_with('/') {
            return Err(SdkError::Configuration(
                "discovery.info_path must start with '/'".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Connectivity
// =============================================================================

/// Staleness settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectivityConfig {
    #[serde(default = "default_stale_threshold")]
    pub stale_threshold_secs: u64,
}

fn default_stale_threshold() -> u64 {
    10
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            stale_threshold_secs: default_stale_threshold(),
        }
    }
}

impl ConnectivityConfig {
    pub fn stale_threshold(&self) -> Duration {
        Duration::from_secs(self.stale_threshold_secs)
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.stale_threshold_secs == 0 {
            return Err(SdkError::Configuration(
                "connectivity.stale_threshold_secs must be positive".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Event ingestion
// =============================================================================

/// Ingestion loop settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Tick period in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// How far back the first pull of a new session reaches
    #[serde(default = "default_initial_lookback")]
    pub initial_lookback_secs: u64,
    /// "No data yet" answers tolerated per stream
    #[serde(default = "default_max_wait_retries")]
    pub max_wait_retries: u32,
    /// Pause between "no data yet" answers in milliseconds
    #[serde(default = "default_wait_backoff")]
    pub wait_backoff_ms: u64,
    /// Records drained per stream before it is closed
    #[serde(default = "default_max_records")]
    pub max_records_per_pull: usize,
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_initial_lookback() -> u64 {
    30
}

fn default_max_wait_retries() -> u32 {
    5
}

fn default_wait_backoff() -> u64 {
    200
}

fn default_max_records() -> usize {
    512
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval(),
            initial_lookback_secs: default_initial_lookback(),
            max_wait_retries: default_max_wait_retries(),
            wait_backoff_ms: default_wait_backoff(),
            max_records_per_pull: default_max_records(),
        }
    }
}

impl IngestConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn initial_lookback(&self) -> Duration {
        Duration::from_secs(self.initial_lookback_secs)
    }

    pub fn wait_backoff(&self) -> Duration {
        Duration::from_millis(self.wait_backoff_ms)
    }

    pub fn validate(&self) -> SdkResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(SdkError::Configuration(
                "ingest.poll_interval_ms must be positive".into(),
            ));
        }
        if self.max_records_per_pull == 0 {
            return Err(SdkError::Configuration(
                "ingest.max_records_per_pull must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AcsConfig::default();
        assert_eq!(config.sdk.backend, SdkBackend::Native);
        assert_eq!(config.credentials.username, "admin");
        assert_eq!(config.credentials.password, "12345");
        assert_eq!(config.discovery.ports, vec![80, 443, 8000]);
        assert_eq!(config.discovery.strategy, DiscoveryStrategy::ActiveProbe);
        assert_eq!(config.discovery.probe_timeout(), Duration::from_millis(1500));
        assert_eq!(config.discovery.max_concurrency, 64);
        assert_eq!(config.discovery.max_hosts_per_subnet, 256);
        assert_eq!(config.connectivity.stale_threshold(), Duration::from_secs(10));
        assert_eq!(config.ingest.poll_interval(), Duration::from_secs(2));
        assert!(config.section_errors().is_empty());
    }

    #[test]
    fn test_password_redacted() {
        let creds = Credentials {
            username: "operator".into(),
            password: "hunter2".into(),
        };
        let debug = format!("{:?}", creds);
        assert!(debug.contains("operator"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{
            "sdk": { "backend": "mock" },
            "discovery": { "strategy": "broadcast", "ports": [8000] },
            "devices": [ { "id": "AC-01", "ip": "10.0.0.5", "port": 8000 } ]
        }"#;
        let config: AcsConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.sdk.backend, SdkBackend::Mock);
        assert_eq!(config.discovery.strategy, DiscoveryStrategy::VendorBroadcast);
        assert_eq!(config.discovery.ports, vec![8000]);
        assert_eq!(config.discovery.max_concurrency, 64);
        assert_eq!(config.devices.len(), 1);
        assert_eq!(config.credentials.username, "admin");
    }

    #[test]
    fn test_invalid_section_is_reported_alone() {
        let mut config = AcsConfig::default();
        config.discovery.ports.clear();

        let errors = config.section_errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].0, "discovery");
        assert!(matches!(errors[0].1, SdkError::Configuration(_)));
    }

    #[test]
    fn test_prefix_range_validation() {
        let config = DiscoveryConfig {
            min_prefix_len: 24,
            max_prefix_len: 20,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = DiscoveryConfig {
            max_prefix_len: 31,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_interval_rejected() {
        let config = IngestConfig {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
