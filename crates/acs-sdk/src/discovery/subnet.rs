//! Local subnet enumeration for active probing

use std::collections::HashSet;
use std::net::Ipv4Addr;

use tracing::{debug, warn};

/// An IPv4 address bound to a local interface
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalInterface {
    pub name: String,
    pub addr: Ipv4Addr,
    pub prefix_len: u8,
    pub is_loopback: bool,
}

impl LocalInterface {
    pub fn subnet(&self) -> Ipv4Subnet {
        Ipv4Subnet::new(self.addr, self.prefix_len)
    }
}

/// Source of local interface addresses
pub trait InterfaceSource: Send + Sync {
    fn ipv4_interfaces(&self) -> Vec<LocalInterface>;
}

/// Interfaces of this host, read with `if-addrs`
///
/// Only interfaces that currently hold an address are reported, which
/// excludes interfaces that are administratively down.
pub struct SystemInterfaces;

impl InterfaceSource for SystemInterfaces {
    fn ipv4_interfaces(&self) -> Vec<LocalInterface> {
        let interfaces = match if_addrs::get_if_addrs() {
            Ok(interfaces) => interfaces,
            Err(e) => {
                warn!(error = %e, "Failed to enumerate network interfaces");
                return Vec::new();
            }
        };

        interfaces
            .into_iter()
            .filter_map(|iface| {
                let is_loopback = iface.is_loopback();
                match iface.addr {
                    if_addrs::IfAddr::V4(v4) => Some(LocalInterface {
                        name: iface.name,
                        addr: v4.ip,
                        prefix_len: u32::from(v4.netmask).count_ones() as u8,
                        is_loopback,
                    }),
                    if_addrs::IfAddr::V6(_) => None,
                }
            })
            .collect()
    }
}

/// An IPv4 network seen from one local address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ipv4Subnet {
    pub local: Ipv4Addr,
    pub prefix_len: u8,
}

impl Ipv4Subnet {
    pub fn new(local: Ipv4Addr, prefix_len: u8) -> Self {
        Self {
            local,
            prefix_len: prefix_len.min(32),
        }
    }

    fn mask(&self) -> u32 {
        match self.prefix_len {
            0 => 0,
            n => u32::MAX << (32 - u32::from(n)),
        }
    }

    pub fn network(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.local) & self.mask())
    }

    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.local) | !self.mask())
    }

    /// Host addresses, without network, broadcast and the local address
    pub fn hosts(&self, limit: usize) -> Vec<Ipv4Addr> {
        self.host_iter().take(limit).collect()
    }

    fn host_iter(&self) -> impl Iterator<Item = Ipv4Addr> {
        let local = u32::from(self.local);
        let range = if self.prefix_len >= 31 {
            1..=0
        } else {
            (u32::from(self.network()) + 1)..=(u32::from(self.broadcast()) - 1)
        };
        range.filter(move |&addr| addr != local).map(Ipv4Addr::from)
    }
}

/// Subnets worth scanning, one per distinct network
pub fn eligible_subnets(
    interfaces: &[LocalInterface],
    min_prefix_len: u8,
    max_prefix_len: u8,
) -> Vec<Ipv4Subnet> {
    let mut subnets: Vec<Ipv4Subnet> = Vec::new();
    for iface in interfaces {
        if iface.is_loopback || iface.addr.is_loopback() || iface.addr.is_link_local() {
            continue;
        }
        if iface.prefix_len < min_prefix_len || iface.prefix_len > max_prefix_len {
            debug!(
                interface = %iface.name,
                prefix_len = iface.prefix_len,
                "Skipping subnet outside scan range"
            );
            continue;
        }
        let subnet = iface.subnet();
        if !subnets
            .iter()
            .any(|s| s.network() == subnet.network() && s.prefix_len == subnet.prefix_len)
        {
            subnets.push(subnet);
        }
    }
    subnets
}

/// Hosts to scan across all subnets, excluding every local address
pub fn scan_hosts(
    interfaces: &[LocalInterface],
    subnets: &[Ipv4Subnet],
    max_hosts_per_subnet: usize,
) -> Vec<Ipv4Addr> {
    let locals: HashSet<Ipv4Addr> = interfaces.iter().map(|i| i.addr).collect();
    let mut seen = HashSet::new();
    let mut hosts = Vec::new();
    for subnet in subnets {
        hosts.extend(
            subnet
                .host_iter()
                .filter(|h| !locals.contains(h))
                .filter(|h| seen.insert(*h))
                .take(max_hosts_per_subnet),
        );
    }
    hosts
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn iface(addr: &str, prefix_len: u8) -> LocalInterface {
        LocalInterface {
            name: "eth0".into(),
            addr: addr.parse().unwrap(),
            prefix_len,
            is_loopback: false,
        }
    }

    #[test]
    fn test_network_and_broadcast() {
        let subnet = Ipv4Subnet::new("192.168.1.77".parse().unwrap(), 24);
        assert_eq!(subnet.network(), Ipv4Addr::new(192, 168, 1, 0));
        assert_eq!(subnet.broadcast(), Ipv4Addr::new(192, 168, 1, 255));
    }

    #[test]
    fn test_slash_30_excludes_network_broadcast_and_self() {
        let subnet = Ipv4Subnet::new("10.0.0.1".parse().unwrap(), 30);
        let hosts = subnet.hosts(256);
        assert_eq!(hosts, vec![Ipv4Addr::new(10, 0, 0, 2)]);
    }

    #[test]
    fn test_host_cap() {
        let subnet = Ipv4Subnet::new("10.1.0.1".parse().unwrap(), 16);
        let hosts = subnet.hosts(256);
        assert_eq!(hosts.len(), 256);
        assert_eq!(hosts[0], Ipv4Addr::new(10, 1, 0, 2));
        assert!(!hosts.contains(&Ipv4Addr::new(10, 1, 0, 0)));
    }

    #[rstest]
    #[case(15, false)]
    #[case(16, true)]
    #[case(24, true)]
    #[case(30, true)]
    #[case(31, false)]
    #[case(32, false)]
    fn test_prefix_eligibility(#[case] prefix_len: u8, #[case] eligible: bool) {
        let subnets = eligible_subnets(&[iface("10.0.0.1", prefix_len)], 16, 30);
        assert_eq!(!subnets.is_empty(), eligible);
    }

    #[test]
    fn test_loopback_and_link_local_skipped() {
        let mut lo = iface("127.0.0.1", 24);
        lo.is_loopback = true;
        let link_local = iface("169.254.10.1", 16);
        assert!(eligible_subnets(&[lo, link_local], 16, 30).is_empty());
    }

    #[test]
    fn test_same_network_scanned_once() {
        let interfaces = [iface("10.0.0.1", 29), iface("10.0.0.2", 29)];
        let subnets = eligible_subnets(&interfaces, 16, 30);
        assert_eq!(subnets.len(), 1);

        let hosts = scan_hosts(&interfaces, &subnets, 256);
        // .0 network, .7 broadcast, .1 and .2 local
        assert_eq!(hosts.len(), 4);
        assert!(!hosts.contains(&Ipv4Addr::new(10, 0, 0, 1)));
        assert!(!hosts.contains(&Ipv4Addr::new(10, 0, 0, 2)));
    }

    #[test]
    fn test_scan_hosts_respects_cap() {
        let interfaces = [iface("10.2.0.1", 24)];
        let subnets = eligible_subnets(&interfaces, 16, 30);
        assert_eq!(scan_hosts(&interfaces, &subnets, 10).len(), 10);
    }
}
