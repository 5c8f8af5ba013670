//! Textual endpoint encoding (§6).
//!
//! spec.md treats the bit-exact textual form of IPv4/IPv6 endpoints as an external collaborator,
//! specified only by its shape: `A.B.C.D:PORT` for IPv4, `[<ipv6-canonical>]:PORT` with RFC 5952
//! compression for IPv6, parsing rejecting leading/trailing whitespace, missing IPv6 brackets,
//! and non-digit ports. `std::net::SocketAddr`'s own `Display`/`FromStr` already implement
//! exactly this, so `Endpoint` is a thin newtype rather than a hand-rolled parser — the
//! Rust-native form of the same boundary.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

/// A parsed network endpoint, displaying and parsing in the textual form spec.md section 6
/// describes (RFC 5952 canonical IPv6, bracketed, with a decimal port).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint(SocketAddr);

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Endpoint {
        Endpoint(addr)
    }

    pub fn socket_addr(self) -> SocketAddr {
        self.0
    }

    pub fn is_ipv4(self) -> bool {
        self.0.is_ipv4()
    }

    pub fn is_ipv6(self) -> bool {
        self.0.is_ipv6()
    }

    pub fn port(self) -> u16 {
        self.0.port()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Endpoint {
        Endpoint(addr)
    }
}

impl From<Endpoint> for SocketAddr {
    fn from(endpoint: Endpoint) -> SocketAddr {
        endpoint.0
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl FromStr for Endpoint {
    type Err = std::net::AddrParseError;

    fn from_str(s: &str) -> Result<Endpoint, Self::Err> {
        // `SocketAddr::from_str` already rejects leading/trailing whitespace, requires brackets
        // around an IPv6 host, and requires an all-digit port; it is the strict parser spec.md
        // section 6 describes.
        s.parse().map(Endpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ipv6_round_trip_uses_rfc5952_compression() {
        // Scenario from §8.6.
        let endpoint: Endpoint =
            "[2001:0db8:85a3:0000:0000:8a2e:0370:7334]:443".parse().unwrap();
        assert_eq!(endpoint.to_string(), "[2001:db8:85a3::8a2e:370:7334]:443");
    }

    #[test]
    fn ipv4_round_trip() {
        let endpoint: Endpoint = "192.168.1.1:8080".parse().unwrap();
        assert_eq!(endpoint.to_string(), "192.168.1.1:8080");
    }

    #[test]
    fn rejects_leading_whitespace() {
        assert!(" 127.0.0.1:80".parse::<Endpoint>().is_err());
    }

    #[test]
    fn rejects_missing_ipv6_brackets() {
        assert!("2001:db8::1:443".parse::<Endpoint>().is_err());
    }

    #[test]
    fn rejects_non_digit_port() {
        assert!("127.0.0.1:http".parse::<Endpoint>().is_err());
    }
}
