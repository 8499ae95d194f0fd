//! Network endpoint type.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, SocketAddrV4};

/// A UDP endpoint (IP address + port).
///
/// Thin wrapper around [`SocketAddr`]. Destination endpoints may carry the
/// invalid sentinel ([`Endpoint::INVALID`]): configuration uses it to mark a
/// route as disabled, and the send path silently drops traffic for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

/// IP component of the invalid-address sentinel.
pub const INVALID_IP: Ipv4Addr = Ipv4Addr::UNSPECIFIED;

/// Port component of the invalid-address sentinel.
pub const INVALID_PORT: u16 = 0;

impl Endpoint {
    /// The invalid-address sentinel. Sending to it is a silent drop.
    pub const INVALID: Self = Self::new_v4(0, 0, 0, 0, INVALID_PORT);

    /// Creates an IPv4 endpoint.
    #[must_use]
    pub const fn new_v4(a: u8, b: u8, c: u8, d: u8, port: u16) -> Self {
        Self(SocketAddr::V4(SocketAddrV4::new(
            Ipv4Addr::new(a, b, c, d),
            port,
        )))
    }

    /// Creates a localhost endpoint on the given port.
    #[must_use]
    pub const fn localhost(port: u16) -> Self {
        Self::new_v4(127, 0, 0, 1, port)
    }

    /// Creates an endpoint bound to all interfaces on the given port.
    #[must_use]
    pub const fn any(port: u16) -> Self {
        Self::new_v4(0, 0, 0, 0, port)
    }

    /// True when either the address or the port is the invalid sentinel,
    /// i.e. the destination is configured as disabled.
    #[must_use]
    pub fn is_invalid(&self) -> bool {
        let ip_invalid = match self.0.ip() {
            IpAddr::V4(v4) => v4 == INVALID_IP,
            IpAddr::V6(v6) => v6.is_unspecified(),
        };
        ip_invalid || self.0.port() == INVALID_PORT
    }

    /// Returns the IP address.
    #[must_use]
    pub const fn ip(&self) -> IpAddr {
        self.0.ip()
    }

    /// Returns the port.
    #[must_use]
    pub const fn port(&self) -> u16 {
        self.0.port()
    }

    /// Returns the underlying [`SocketAddr`].
    #[must_use]
    pub const fn as_socket_addr(&self) -> SocketAddr {
        self.0
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(ep: Endpoint) -> Self {
        ep.0
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
