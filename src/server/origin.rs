//! Trusted-subnet check shared by the REST middleware and gRPC interceptors.

use ip_network::IpNetwork;
use std::net::IpAddr;
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum OriginError {
    #[error("request carries no origin address")]
    Missing,

    #[error("malformed origin address '{0}'")]
    Malformed(String),

    #[error("origin {0} is outside the trusted subnet")]
    Untrusted(IpAddr),
}

/// Accepts every origin when no subnet is configured.
#[derive(Debug, Clone, Default)]
pub struct OriginGuard {
    network: Option<IpNetwork>,
}

impl OriginGuard {
    pub fn new(network: Option<IpNetwork>) -> Self {
        Self { network }
    }

    pub fn is_enabled(&self) -> bool {
        self.network.is_some()
    }

    /// Checks the declared `real_ip` if present, else the transport peer.
    pub fn check(&self, real_ip: Option<&str>, peer: Option<IpAddr>) -> Result<(), OriginError> {
        let Some(network) = &self.network else {
            return Ok(());
        };
        let origin = match real_ip.map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => raw
                .parse::<IpAddr>()
                .map_err(|_| OriginError::Malformed(raw.to_string()))?,
            None => peer.ok_or(OriginError::Missing)?,
        }
        .to_canonical();

        if network.contains(origin) {
            Ok(())
        } else {
            Err(OriginError::Untrusted(origin))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guard(cidr: &str) -> OriginGuard {
        OriginGuard::new(Some(cidr.parse().unwrap()))
    }

    #[test]
    fn test_unset_accepts_everything() {
        let guard = OriginGuard::default();
        assert!(!guard.is_enabled());
        assert!(guard.check(None, None).is_ok());
        assert!(guard.check(Some("not-an-ip"), None).is_ok());
    }

    #[test]
    fn test_inside_and_outside() {
        let guard = guard("192.168.1.0/24");
        assert!(guard.check(Some("192.168.1.17"), None).is_ok());
        assert_eq!(
            guard.check(Some("10.0.0.1"), None),
            Err(OriginError::Untrusted("10.0.0.1".parse().unwrap()))
        );
        assert!(matches!(
            guard.check(Some("garbage"), None),
            Err(OriginError::Malformed(_))
        ));
        assert_eq!(guard.check(None, None), Err(OriginError::Missing));
    }

    #[test]
    fn test_falls_back_to_peer() {
        let guard = guard("127.0.0.0/8");
        assert!(guard.check(None, Some("127.0.0.1".parse().unwrap())).is_ok());
        // IPv4-mapped IPv6 peers are matched as IPv4
        assert!(guard
            .check(None, Some("::ffff:127.0.0.1".parse().unwrap()))
            .is_ok());
        assert!(guard.check(None, Some("8.8.8.8".parse().unwrap())).is_err());
    }
}
