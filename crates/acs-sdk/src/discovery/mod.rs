//! Device discovery
//!
//! Two independently selectable strategies:
//! - active probing: HTTP device-info requests to every host of every
//!   eligible local subnet, bounded by a concurrency throttle
//! - vendor broadcast: the native search call, issued through live sessions or
//!   a throwaway bootstrap session
//!
//! Both return devices deduplicated by `ip:port` and ordered by `ip`, then
//! `port`. Discovery is best-effort: unmet preconditions and failures yield an
//! empty list, never an error.

mod broadcast;
pub mod probe;
pub mod subnet;

pub use probe::{DeviceInfo, DeviceProber, HttpProber, ProbeOutcome};
pub use subnet::{InterfaceSource, Ipv4Subnet, LocalInterface, SystemInterfaces};

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;
use std::sync::Arc;

use acs_core::{DeviceSession, DiscoveredDevice, DiscoverySource};
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::DiscoveryConfig;
use crate::gateway::SdkGateway;

/// Which discovery strategy to run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiscoveryStrategy {
    /// HTTP probing of local subnets
    #[default]
    #[serde(rename = "probe")]
    ActiveProbe,
    /// Native broadcast search through a session
    #[serde(rename = "broadcast")]
    VendorBroadcast,
}

impl fmt::Display for DiscoveryStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ActiveProbe => write!(f, "probe"),
            Self::VendorBroadcast => write!(f, "broadcast"),
        }
    }
}

impl FromStr for DiscoveryStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "probe" => Ok(Self::ActiveProbe),
            "broadcast" => Ok(Self::VendorBroadcast),
            other => Err(format!(
                "unknown discovery strategy '{}' (expected 'probe' or 'broadcast')",
                other
            )),
        }
    }
}

/// Runs discovery with either strategy
pub struct DiscoveryEngine {
    config: DiscoveryConfig,
    interfaces: Arc<dyn InterfaceSource>,
    prober: Option<Arc<dyn DeviceProber>>,
    gateway: SdkGateway,
}

impl DiscoveryEngine {
    /// Engine over the host's interfaces and an HTTP prober
    pub fn new(config: DiscoveryConfig, gateway: SdkGateway) -> Self {
        let prober: Option<Arc<dyn DeviceProber>> = match HttpProber::new(&config) {
            Ok(prober) => Some(Arc::new(prober)),
            Err(e) => {
                warn!(error = %e, "Active probing unavailable");
                None
            }
        };
        Self {
            config,
            interfaces: Arc::new(SystemInterfaces),
            prober,
            gateway,
        }
    }

    /// Engine with injected interface source and prober
    pub fn with_parts(
        config: DiscoveryConfig,
        interfaces: Arc<dyn InterfaceSource>,
        prober: Arc<dyn DeviceProber>,
        gateway: SdkGateway,
    ) -> Self {
        Self {
            config,
            interfaces,
            prober: Some(prober),
            gateway,
        }
    }

    pub fn config(&self) -> &DiscoveryConfig {
        &self.config
    }

    /// Run one strategy
    ///
    /// `sessions` are the live sessions broadcast discovery may search through.
    #[instrument(skip(self, sessions, cancel))]
    pub async fn discover(
        &self,
        strategy: DiscoveryStrategy,
        sessions: &[DeviceSession],
        cancel: &CancellationToken,
    ) -> Vec<DiscoveredDevice> {
        if let Err(e) = self.config.validate() {
            warn!(error = %e, "Discovery disabled by configuration");
            return Vec::new();
        }

        let devices = match strategy {
            DiscoveryStrategy::ActiveProbe => self.probe_subnets(cancel).await,
            DiscoveryStrategy::VendorBroadcast => {
                let handles = sessions.iter().map(|s| s.handle).collect();
                match broadcast::search(&self.gateway, handles, self.config.bootstrap, cancel).await {
                    Ok(devices) => devices,
                    Err(e) => {
                        warn!(error = %e, "Broadcast discovery failed");
                        Vec::new()
                    }
                }
            }
        };

        let devices = dedup_devices(devices);
        info!(strategy = %strategy, found = devices.len(), "Discovery finished");
        devices
    }

    /// Every `host:port` active probing would contact
    pub fn probe_targets(&self) -> Vec<(IpAddr, u16)> {
        let interfaces = self.interfaces.ipv4_interfaces();
        let subnets = subnet::eligible_subnets(
            &interfaces,
            self.config.min_prefix_len,
            self.config.max_prefix_len,
        );
        let hosts = subnet::scan_hosts(&interfaces, &subnets, self.config.max_hosts_per_subnet);

        hosts
            .into_iter()
            .flat_map(|host| {
                self.config
                    .ports
                    .iter()
                    .map(move |&port| (IpAddr::V4(host), port))
            })
            .collect()
    }

    async fn probe_subnets(&self, cancel: &CancellationToken) -> Vec<DiscoveredDevice> {
        let Some(prober) = self.prober.clone() else {
            return Vec::new();
        };
        let targets = self.probe_targets();
        if targets.is_empty() {
            info!("No eligible subnets to probe");
            return Vec::new();
        }
        debug!(targets = targets.len(), "Probing local subnets");

        let throttle = Arc::new(Semaphore::new(self.config.max_concurrency));
        let timeout = self.config.probe_timeout();
        let mut set = JoinSet::new();

        for (ip, port) in targets {
            let prober = prober.clone();
            let throttle = throttle.clone();
            let cancel = cancel.clone();
            set.spawn(async move {
                let _permit = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return None,
                    permit = throttle.acquire_owned() => permit.ok()?,
                };
                match tokio::time::timeout(timeout, prober.probe(ip, port)).await {
                    Ok(Ok(outcome)) => to_discovered(ip, port, outcome),
                    Ok(Err(e)) => {
                        debug!(error = %e, "Probe failed");
                        None
                    }
                    Err(_) => {
                        debug!(ip = %ip, port, "Probe timed out");
                        None
                    }
                }
            });
        }

        let mut found = Vec::new();
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("Discovery cancelled, aborting outstanding probes");
                    set.abort_all();
                    break;
                }
                next = set.join_next() => match next {
                    Some(Ok(Some(device))) => found.push(device),
                    Some(_) => {}
                    None => break,
                },
            }
        }
        found
    }
}

fn to_discovered(ip: IpAddr, port: u16, outcome: ProbeOutcome) -> Option<DiscoveredDevice> {
    let synthesized = DiscoveredDevice::synthesized_id(ip, port);
    match outcome {
        ProbeOutcome::NotDevice => None,
        ProbeOutcome::AuthRequired => Some(DiscoveredDevice {
            id: synthesized.clone(),
            name: synthesized,
            ip,
            port,
            model: None,
            auth_required: true,
            source: DiscoverySource::Probe,
        }),
        ProbeOutcome::Device(info) => Some(DiscoveredDevice {
            id: info.serial_number.unwrap_or_else(|| synthesized.clone()),
            name: info
                .name
                .or_else(|| info.model.clone())
                .unwrap_or(synthesized),
            ip,
            port,
            model: info.model,
            auth_required: false,
            source: DiscoverySource::Probe,
        }),
    }
}

/// First entry per `ip:port`, ordered by `ip` then `port`
pub fn dedup_devices(devices: impl IntoIterator<Item = DiscoveredDevice>) -> Vec<DiscoveredDevice> {
    let mut seen = HashSet::new();
    let mut unique: Vec<DiscoveredDevice> = devices
        .into_iter()
        .filter(|d| seen.insert(d.endpoint()))
        .collect();
    unique.sort_by_key(|d| d.endpoint());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AcsConfig;
    use crate::error::SdkResult;
    use crate::native::{MockCall, MockDeviceSpec, MockLoader, MockSdk};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::net::Ipv4Addr;
    use std::time::Duration;

    struct StaticInterfaces(Vec<LocalInterface>);

    impl InterfaceSource for StaticInterfaces {
        fn ipv4_interfaces(&self) -> Vec<LocalInterface> {
            self.0.clone()
        }
    }

    /// Answers as a device on `devices`, records every probe
    #[derive(Default)]
    struct RecordingProber {
        devices: Vec<(IpAddr, u16)>,
        unauthorized: Vec<(IpAddr, u16)>,
        slow: Vec<(IpAddr, u16)>,
        probed: Mutex<Vec<(IpAddr, u16)>>,
    }

    #[async_trait]
    impl DeviceProber for RecordingProber {
        async fn probe(&self, ip: IpAddr, port: u16) -> SdkResult<ProbeOutcome> {
            self.probed.lock().push((ip, port));
            if self.slow.contains(&(ip, port)) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            if self.unauthorized.contains(&(ip, port)) {
                return Ok(ProbeOutcome::AuthRequired);
            }
            if self.devices.contains(&(ip, port)) {
                return Ok(ProbeOutcome::Device(DeviceInfo {
                    serial_number: Some(format!("SN-{}", ip)),
                    model: Some("DS-K1T671M".into()),
                    name: None,
                }));
            }
            Ok(ProbeOutcome::NotDevice)
        }
    }

    fn iface(addr: &str, prefix_len: u8) -> LocalInterface {
        LocalInterface {
            name: "eth0".into(),
            addr: addr.parse().unwrap(),
            prefix_len,
            is_loopback: false,
        }
    }

    fn mock_gateway() -> (SdkGateway, Arc<MockSdk>) {
        let sdk = Arc::new(MockSdk::new());
        let gateway = SdkGateway::new(Arc::new(MockLoader::new(sdk.clone())), &AcsConfig::default());
        (gateway, sdk)
    }

    fn engine(
        config: DiscoveryConfig,
        interfaces: Vec<LocalInterface>,
        prober: Arc<RecordingProber>,
    ) -> DiscoveryEngine {
        let (gateway, _) = mock_gateway();
        DiscoveryEngine::with_parts(config, Arc::new(StaticInterfaces(interfaces)), prober, gateway)
    }

    fn device(ip: &str, port: u16, name: &str) -> DiscoveredDevice {
        let ip: IpAddr = ip.parse().unwrap();
        DiscoveredDevice {
            id: DiscoveredDevice::synthesized_id(ip, port),
            name: name.into(),
            ip,
            port,
            model: None,
            auth_required: false,
            source: DiscoverySource::Probe,
        }
    }

    #[test]
    fn test_dedup_first_wins_and_sorts() {
        let devices = dedup_devices(vec![
            device("10.0.0.9", 80, "later"),
            device("10.0.0.5", 8000, "first"),
            device("10.0.0.5", 8000, "second"),
            device("10.0.0.5", 80, "port 80"),
        ]);

        let names: Vec<&str> = devices.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["port 80", "first", "later"]);
    }

    #[test]
    fn test_strategy_parse() {
        assert_eq!("probe".parse::<DiscoveryStrategy>().unwrap(), DiscoveryStrategy::ActiveProbe);
        assert_eq!(
            "Broadcast".parse::<DiscoveryStrategy>().unwrap(),
            DiscoveryStrategy::VendorBroadcast
        );
        assert!("mdns".parse::<DiscoveryStrategy>().is_err());
    }

    #[tokio::test]
    async fn test_slash_30_probes_only_peer() {
        let prober = Arc::new(RecordingProber::default());
        let engine = engine(
            DiscoveryConfig::default(),
            vec![iface("192.168.50.1", 30)],
            prober.clone(),
        );

        let found = engine
            .discover(DiscoveryStrategy::ActiveProbe, &[], &CancellationToken::new())
            .await;
        assert!(found.is_empty());

        let peer = IpAddr::V4(Ipv4Addr::new(192, 168, 50, 2));
        let mut probed = prober.probed.lock().clone();
        probed.sort();
        assert_eq!(probed, vec![(peer, 80), (peer, 443), (peer, 8000)]);
    }

    #[tokio::test]
    async fn test_probe_reports_devices_and_auth_required() {
        let a: IpAddr = "10.0.0.2".parse().unwrap();
        let b: IpAddr = "10.0.0.3".parse().unwrap();
        let prober = Arc::new(RecordingProber {
            devices: vec![(a, 8000)],
            unauthorized: vec![(b, 80)],
            ..Default::default()
        });
        let engine = engine(DiscoveryConfig::default(), vec![iface("10.0.0.1", 29)], prober);

        let found = engine
            .discover(DiscoveryStrategy::ActiveProbe, &[], &CancellationToken::new())
            .await;

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].ip, a);
        assert_eq!(found[0].id, "SN-10.0.0.2");
        assert_eq!(found[0].name, "DS-K1T671M");
        assert!(!found[0].auth_required);
        assert_eq!(found[1].id, "10.0.0.3:80");
        assert!(found[1].auth_required);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_probe_does_not_fail_scan() {
        let a: IpAddr = "10.0.0.2".parse().unwrap();
        let slow: IpAddr = "10.0.0.3".parse().unwrap();
        let prober = Arc::new(RecordingProber {
            devices: vec![(a, 80), (slow, 80)],
            slow: vec![(slow, 80)],
            ..Default::default()
        });
        let config = DiscoveryConfig {
            ports: vec![80],
            ..Default::default()
        };
        let engine = engine(config, vec![iface("10.0.0.1", 29)], prober);

        let found = engine
            .discover(DiscoveryStrategy::ActiveProbe, &[], &CancellationToken::new())
            .await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].ip, a);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_stops_scan() {
        let slow: IpAddr = "10.0.0.2".parse().unwrap();
        let prober = Arc::new(RecordingProber {
            slow: vec![(slow, 80)],
            ..Default::default()
        });
        let config = DiscoveryConfig {
            ports: vec![80],
            probe_timeout_ms: 120_000,
            ..Default::default()
        };
        let engine = engine(config, vec![iface("10.0.0.1", 29)], prober);

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let found = engine
            .discover(DiscoveryStrategy::ActiveProbe, &[], &cancel)
            .await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_yields_empty() {
        let prober = Arc::new(RecordingProber::default());
        let config = DiscoveryConfig {
            ports: vec![],
            ..Default::default()
        };
        let engine = engine(config, vec![iface("10.0.0.1", 24)], prober.clone());

        let found = engine
            .discover(DiscoveryStrategy::ActiveProbe, &[], &CancellationToken::new())
            .await;
        assert!(found.is_empty());
        assert!(prober.probed.lock().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_without_session_or_bootstrap_is_empty() {
        let prober = Arc::new(RecordingProber::default());
        let engine = engine(DiscoveryConfig::default(), vec![], prober);
        let found = engine
            .discover(DiscoveryStrategy::VendorBroadcast, &[], &CancellationToken::new())
            .await;
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_bootstrap_session_is_closed() {
        let (gateway, sdk) = mock_gateway();
        let bootstrap_ip: IpAddr = "10.0.0.5".parse().unwrap();
        sdk.add_device(MockDeviceSpec::new(bootstrap_ip, 8000, "SN-5"));
        sdk.add_device(MockDeviceSpec::new("10.0.0.7".parse().unwrap(), 8000, "SN-7").with_name("Side door"));

        let config = DiscoveryConfig {
            strategy: DiscoveryStrategy::VendorBroadcast,
            bootstrap: Some(crate::config::BootstrapHost {
                ip: bootstrap_ip,
                port: 8000,
            }),
            ..Default::default()
        };
        let engine = DiscoveryEngine::with_parts(
            config,
            Arc::new(StaticInterfaces(vec![])),
            Arc::new(RecordingProber::default()),
            gateway,
        );

        let found = engine
            .discover(DiscoveryStrategy::VendorBroadcast, &[], &CancellationToken::new())
            .await;

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].id, "SN-5");
        assert_eq!(found[1].name, "Side door");
        assert_eq!(found[1].source, DiscoverySource::Broadcast);
        assert_eq!(sdk.open_sessions(), 0);
        assert_eq!(sdk.count_calls(|c| matches!(c, MockCall::Logout { .. })), 1);
    }

    #[tokio::test]
    async fn test_broadcast_failure_still_closes_bootstrap() {
        let (gateway, sdk) = mock_gateway();
        let bootstrap_ip: IpAddr = "10.0.0.5".parse().unwrap();
        sdk.add_device(MockDeviceSpec::new(bootstrap_ip, 8000, "SN-5"));
        sdk.set_search_fails(true);

        let config = DiscoveryConfig {
            bootstrap: Some(crate::config::BootstrapHost {
                ip: bootstrap_ip,
                port: 8000,
            }),
            ..Default::default()
        };
        let engine = DiscoveryEngine::with_parts(
            config,
            Arc::new(StaticInterfaces(vec![])),
            Arc::new(RecordingProber::default()),
            gateway,
        );

        let found = engine
            .discover(DiscoveryStrategy::VendorBroadcast, &[], &CancellationToken::new())
            .await;
        assert!(found.is_empty());
        assert_eq!(sdk.open_sessions(), 0);
    }
}
