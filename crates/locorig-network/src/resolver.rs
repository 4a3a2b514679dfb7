//! Local address discovery
//!
//! The hub needs the machine's own IPv4 addresses to reject self ids in
//! target lists and to publish `local_ids`. Detection sits behind a trait so
//! tests and fixed deployments can pin the answer.

use async_trait::async_trait;
use std::io;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tokio::net::{lookup_host, UdpSocket};
use tracing::trace;

/// Source of the local machine's IPv4 addresses
#[async_trait]
pub trait AddressResolver: Send + Sync {
    /// Current local addresses. On error the previous answer is cleared.
    async fn local_addresses(&self) -> io::Result<Vec<Ipv4Addr>>;
}

/// Detects the outbound interface address of the host.
///
/// Connecting a UDP socket selects a route without sending anything; the
/// socket's local address is then the interface address for that route.
/// Hosts without a route to the target (an isolated rig LAN has no
/// gateway) fall back to resolving their own host name.
#[derive(Debug, Clone)]
pub struct SystemResolver {
    probe: SocketAddr,
}

impl SystemResolver {
    /// Resolver routing towards a public address
    pub fn new() -> Self {
        Self::with_probe(SocketAddr::from(([8, 8, 8, 8], 80)))
    }

    /// Resolver routing towards `probe`
    pub fn with_probe(probe: SocketAddr) -> Self {
        Self { probe }
    }

    async fn route_address(&self) -> io::Result<Vec<Ipv4Addr>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        socket.connect(self.probe).await?;
        match socket.local_addr()? {
            SocketAddr::V4(addr) if !addr.ip().is_unspecified() => Ok(vec![*addr.ip()]),
            other => Err(io::Error::new(
                io::ErrorKind::AddrNotAvailable,
                format!("no IPv4 route, local address {other}"),
            )),
        }
    }
}

impl Default for SystemResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AddressResolver for SystemResolver {
    async fn local_addresses(&self) -> io::Result<Vec<Ipv4Addr>> {
        match self.route_address().await {
            Ok(addresses) => Ok(addresses),
            Err(e) => {
                trace!(error = %e, probe = %self.probe, "No route, resolving host name");
                let host = host_name().await;
                addresses_of(&host).await
            }
        }
    }
}

/// This machine's host name, `localhost` when it cannot be read
async fn host_name() -> String {
    if let Ok(name) = std::env::var("HOSTNAME") {
        if !name.trim().is_empty() {
            return name.trim().to_string();
        }
    }
    match tokio::fs::read_to_string("/etc/hostname").await {
        Ok(name) if !name.trim().is_empty() => name.trim().to_string(),
        _ => "localhost".to_string(),
    }
}

/// IPv4 addresses `host` resolves to, non-loopback ones first.
///
/// Loopback addresses are only returned when nothing else resolves.
pub async fn addresses_of(host: &str) -> io::Result<Vec<Ipv4Addr>> {
    let mut addresses: Vec<Ipv4Addr> = Vec::new();
    for addr in lookup_host((host, 0)).await? {
        if let IpAddr::V4(ip) = addr.ip() {
            if !ip.is_unspecified() && !addresses.contains(&ip) {
                addresses.push(ip);
            }
        }
    }
    if addresses.iter().any(|ip| !ip.is_loopback()) {
        addresses.retain(|ip| !ip.is_loopback());
    }
    if addresses.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::AddrNotAvailable,
            format!("{host} has no IPv4 address"),
        ));
    }
    Ok(addresses)
}

/// Fixed address list
#[derive(Debug, Clone, Default)]
pub struct StaticResolver {
    addresses: Vec<Ipv4Addr>,
}

impl StaticResolver {
    /// Resolver that always answers `addresses`
    pub fn new(addresses: Vec<Ipv4Addr>) -> Self {
        Self { addresses }
    }
}

#[async_trait]
impl AddressResolver for StaticResolver {
    async fn local_addresses(&self) -> io::Result<Vec<Ipv4Addr>> {
        Ok(self.addresses.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver() {
        let resolver = StaticResolver::new(vec![Ipv4Addr::new(10, 0, 0, 5)]);
        assert_eq!(
            resolver.local_addresses().await.unwrap(),
            vec![Ipv4Addr::new(10, 0, 0, 5)]
        );
    }

    #[tokio::test]
    async fn test_system_resolver_loopback_probe() {
        let resolver = SystemResolver::with_probe(SocketAddr::from(([127, 0, 0, 1], 9)));
        let addresses = resolver.local_addresses().await.unwrap();
        assert_eq!(addresses, vec![Ipv4Addr::LOCALHOST]);
    }

    #[tokio::test]
    async fn test_addresses_of_localhost() {
        let addresses = addresses_of("localhost").await.unwrap();
        assert!(addresses.contains(&Ipv4Addr::LOCALHOST));
    }

    #[tokio::test]
    async fn test_addresses_of_unknown_host() {
        assert!(addresses_of("no-such-host.invalid").await.is_err());
    }
}
