//! Host address discovery for registry advertisement.

use std::net::{IpAddr, Ipv4Addr, UdpSocket};

use crate::error::{Result, SedgeError};

// One destination per RFC1918 block. Routing toward a block makes the
// kernel pick the interface that serves it, surfacing the LAN address
// bound to that interface when one exists.
const PRIVATE_PROBES: [Ipv4Addr; 3] = [
    Ipv4Addr::new(192, 168, 255, 255),
    Ipv4Addr::new(10, 255, 255, 255),
    Ipv4Addr::new(172, 31, 255, 255),
];

/// Return the machine's preferred local IPv4 address.
///
/// An RFC1918 address is preferred: each private block is probed with a
/// connectionless UDP socket and the first source address the routing
/// table picks inside the block wins. When no interface carries a private
/// address, the address of the default outbound route is used instead.
/// Loopback is never returned, so a worker cannot advertise an address
/// peers are unable to dial.
pub fn local_ip() -> Result<Ipv4Addr> {
    for target in PRIVATE_PROBES {
        if let Some(ip) = source_toward(target) {
            if is_rfc1918(ip) {
                return Ok(ip);
            }
        }
    }
    match source_toward(Ipv4Addr::new(8, 8, 8, 8)) {
        Some(ip) => Ok(ip),
        None => Err(SedgeError::transport("no available local IPv4 address")),
    }
}

/// The source address the routing table selects for `target`. Opens a
/// connectionless UDP socket; no packet is sent.
fn source_toward(target: Ipv4Addr) -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((target, 80)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_loopback() && !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}

/// RFC1918 private-range check: 10.0.0.0/8, 172.16.0.0/12, 192.168.0.0/16.
pub fn is_rfc1918(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets[0] {
        10 => true,
        172 => (16..=31).contains(&octets[1]),
        192 => octets[1] == 168,
        _ => false,
    }
}
