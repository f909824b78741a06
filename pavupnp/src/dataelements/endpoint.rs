//! Endpoint réseau (hôte + port).

use std::fmt;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use super::DataElementError;

/// Un couple hôte/port tel qu'il apparaît dans les headers `HOST` et
/// les URLs de callback. L'hôte peut être un littéral IP ou un nom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// L'adresse IP, si l'hôte en est une.
    pub fn ip(&self) -> Option<IpAddr> {
        self.host.trim_matches(|c| c == '[' || c == ']').parse().ok()
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        match addr {
            SocketAddr::V4(v4) => Endpoint::new(v4.ip().to_string(), v4.port()),
            SocketAddr::V6(v6) => Endpoint::new(format!("[{}]", v6.ip()), v6.port()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = DataElementError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let err = || DataElementError::InvalidEndpoint(s.to_string());

        // forme IPv6 entre crochets : [::1]:8080
        if let Some(rest) = s.strip_prefix('[') {
            let (host, after) = rest.split_once(']').ok_or_else(err)?;
            let port = after.strip_prefix(':').ok_or_else(err)?;
            let port: u16 = port.parse().map_err(|_| err())?;
            return Ok(Endpoint::new(format!("[{}]", host), port));
        }

        let (host, port) = s.rsplit_once(':').ok_or_else(err)?;
        if host.is_empty() {
            return Err(err());
        }
        let port: u16 = port.parse().map_err(|_| err())?;
        Ok(Endpoint::new(host, port))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ipv4() {
        let ep: Endpoint = "192.168.1.10:1900".parse().unwrap();
        assert_eq!(ep.host(), "192.168.1.10");
        assert_eq!(ep.port(), 1900);
        assert!(ep.ip().is_some());
    }

    #[test]
    fn test_parse_hostname() {
        let ep: Endpoint = "renderer.local:8080".parse().unwrap();
        assert_eq!(ep.host(), "renderer.local");
        assert!(ep.ip().is_none());
    }

    #[test]
    fn test_parse_ipv6() {
        let ep: Endpoint = "[fe80::1]:1900".parse().unwrap();
        assert_eq!(ep.host(), "[fe80::1]");
        assert_eq!(ep.port(), 1900);
        assert!(ep.ip().is_some());
    }

    #[test]
    fn test_parse_invalid() {
        assert!("192.168.1.10".parse::<Endpoint>().is_err());
        assert!(":1900".parse::<Endpoint>().is_err());
        assert!("host:notaport".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_display_roundtrip() {
        let ep: Endpoint = "239.255.255.250:1900".parse().unwrap();
        assert_eq!(ep.to_string(), "239.255.255.250:1900");
    }
}
