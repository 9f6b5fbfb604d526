//! # Local Addresses
//!
//! The endpoints a node advertises when it listens on a wildcard address.
//!
//! Only the interface that carries outbound traffic is announced, not every
//! local interface. Discovery dials the first announced address.

use shared_types::Address;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// Whether `host` is a wildcard bind address.
pub fn is_unspecified(host: &str) -> bool {
    host.parse::<IpAddr>().is_ok_and(|ip| ip.is_unspecified())
}

/// The address of the interface used for outbound traffic, falling back to
/// loopback when there is no route.
///
/// Connecting a UDP socket only selects a route; nothing is sent.
pub fn primary_ip() -> IpAddr {
    UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
        .and_then(|socket| {
            socket.connect((Ipv4Addr::new(192, 0, 2, 1), 9))?;
            socket.local_addr()
        })
        .map(|addr| addr.ip())
        .ok()
        .filter(|ip| !ip.is_unspecified())
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST))
}

/// Addresses to announce for a listener bound to `host:port`.
pub fn advertised(host: &str, port: u16) -> Vec<Address> {
    if is_unspecified(host) {
        vec![Address::new(primary_ip().to_string(), port)]
    } else {
        vec![Address::new(host, port)]
    }
}
