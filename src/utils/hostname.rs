//! Hostname resolution with graceful degradation.
//!
//! Resolution never fails: when no resolver knows an address, the address itself is returned.

use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, ToSocketAddrs};

pub const UNKNOWN_HOSTNAME: &str = "hostname_unknown";
pub const UNKNOWN_IP: &str = "ipaddress_unknown";

/// Maps an address or identifier to a human-readable host name.
pub trait HostnameResolver: Send + Sync {
    fn resolve(&self, address: &str) -> Option<String>;
}

/// Best-known name for `address`, or `address` unchanged.
pub fn resolve_hostname(resolver: &dyn HostnameResolver, address: &str) -> String {
    resolver
        .resolve(address)
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| address.to_string())
}

/// Addresses and ids seen before, e.g. from the `clients` table.
///
/// Collect from `(address, hostname)` pairs; a later pair wins on a shared address.
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    names: HashMap<String, String>,
}

impl KnownHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, address: &str, hostname: &str) {
        self.names.insert(address.to_string(), hostname.to_string());
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl<A: Into<String>, H: Into<String>> FromIterator<(A, H)> for KnownHosts {
    fn from_iter<I: IntoIterator<Item = (A, H)>>(pairs: I) -> Self {
        Self {
            names: pairs
                .into_iter()
                .map(|(address, hostname)| (address.into(), hostname.into()))
                .collect(),
        }
    }
}

impl HostnameResolver for KnownHosts {
    fn resolve(&self, address: &str) -> Option<String> {
        self.names.get(address).cloned()
    }
}

/// Loopback and this machine's own addresses resolve to this machine's hostname.
#[derive(Debug, Clone)]
pub struct LocalHost {
    hostname: String,
    addresses: HashSet<String>,
}

impl LocalHost {
    pub fn new(hostname: &str, addresses: impl IntoIterator<Item = String>) -> Self {
        Self {
            hostname: hostname.to_string(),
            addresses: addresses.into_iter().collect(),
        }
    }

    pub fn detect() -> Self {
        let hostname = local_hostname();
        let addresses = local_addresses(&hostname)
            .into_iter()
            .map(|ip| ip.to_string())
            .collect::<Vec<_>>();
        Self::new(&hostname, addresses)
    }
}

impl HostnameResolver for LocalHost {
    fn resolve(&self, address: &str) -> Option<String> {
        let loopback = address == "localhost"
            || address
                .parse::<IpAddr>()
                .map(|ip| ip.is_loopback())
                .unwrap_or(false);
        if loopback || self.addresses.contains(address) {
            Some(self.hostname.clone())
        } else {
            None
        }
    }
}

/// Tries each resolver in order; the first answer wins.
#[derive(Default)]
pub struct Resolvers {
    chain: Vec<Box<dyn HostnameResolver>>,
}

impl Resolvers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, resolver: impl HostnameResolver + 'static) -> Self {
        self.chain.push(Box::new(resolver));
        self
    }
}

impl HostnameResolver for Resolvers {
    fn resolve(&self, address: &str) -> Option<String> {
        self.chain.iter().find_map(|r| r.resolve(address))
    }
}

/// Client address behind a proxy: first `X-Forwarded-For` entry, else the peer.
pub fn forwarded_client_ip(forwarded_for: Option<&str>, peer: &str) -> String {
    forwarded_for
        .and_then(|header| header.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .unwrap_or(peer)
        .to_string()
}

pub fn local_hostname() -> String {
    hostname::get()
        .ok()
        .and_then(|h| h.into_string().ok())
        .unwrap_or_else(|| UNKNOWN_HOSTNAME.to_string())
}

/// First IPv4 address this machine's hostname resolves to.
pub fn local_ip_address() -> String {
    let addresses = local_addresses(&local_hostname());
    addresses
        .iter()
        .find(|ip| ip.is_ipv4())
        .or_else(|| addresses.first())
        .map(IpAddr::to_string)
        .unwrap_or_else(|| UNKNOWN_IP.to_string())
}

fn local_addresses(hostname: &str) -> Vec<IpAddr> {
    (hostname, 0)
        .to_socket_addrs()
        .map(|addrs| addrs.map(|a| a.ip()).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unresolvable_address_is_returned_unchanged() {
        let resolver = KnownHosts::new();
        assert_eq!(resolve_hostname(&resolver, "10.9.8.7"), "10.9.8.7");
        assert_eq!(resolve_hostname(&resolver, ""), "");
    }

    #[test]
    fn known_hosts_collect_from_pairs() {
        let hosts: KnownHosts = [
            ("10.0.0.4", "rig-01"),
            ("10.0.0.6", "rig-02"),
            ("10.0.0.4", "rig-03"),
        ]
        .into_iter()
        .collect();
        assert_eq!(hosts.len(), 2);
        assert_eq!(resolve_hostname(&hosts, "10.0.0.4"), "rig-03");
        assert_eq!(resolve_hostname(&hosts, "10.0.0.6"), "rig-02");
        assert_eq!(resolve_hostname(&hosts, "10.0.0.5"), "10.0.0.5");
    }

    #[test]
    fn chain_falls_through_to_local_host() {
        let mut hosts = KnownHosts::new();
        hosts.insert("10.0.0.4", "rig-01");
        let chain = Resolvers::new()
            .with(hosts)
            .with(LocalHost::new("server-a", vec!["192.168.1.20".to_string()]));
        assert_eq!(resolve_hostname(&chain, "10.0.0.4"), "rig-01");
        assert_eq!(resolve_hostname(&chain, "127.0.0.1"), "server-a");
        assert_eq!(resolve_hostname(&chain, "::1"), "server-a");
        assert_eq!(resolve_hostname(&chain, "192.168.1.20"), "server-a");
        assert_eq!(resolve_hostname(&chain, "172.16.0.1"), "172.16.0.1");
    }

    #[test]
    fn forwarded_for_takes_first_entry() {
        assert_eq!(
            forwarded_client_ip(Some(" 203.0.113.9 , 10.0.0.1"), "10.0.0.1"),
            "203.0.113.9"
        );
        assert_eq!(forwarded_client_ip(None, "10.0.0.1"), "10.0.0.1");
        assert_eq!(forwarded_client_ip(Some(""), "10.0.0.1"), "10.0.0.1");
    }

    #[test]
    fn local_identity_is_never_empty() {
        assert!(!local_hostname().is_empty());
        assert!(!local_ip_address().is_empty());
    }
}
