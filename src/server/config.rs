//! Effective server configuration.

use ip_network::{IpNetwork, Ipv4Network, Ipv6Network};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

use crate::cli::ServerArgs;
use crate::config::{check_key_file, load_file, ConfigError};

pub const DEFAULT_LISTEN_ADDR: &str = "localhost:8080";
pub const DEFAULT_GRPC_ADDR: &str = "127.0.0.1:8083";
pub const DEFAULT_STORE_INTERVAL: u64 = 300;
pub const DEFAULT_STORAGE_PATH: &str = "./tmp/metrics-db.json";

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "./metric-server.yaml",
    "./metric-server.yml",
    "./metric-server.json",
    "./metric-server.toml",
];

/// Server settings after merging CLI, environment, file and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub address: String,
    pub grpc_address: String,
    /// Seconds between snapshot flushes; 0 writes on every update.
    pub store_interval: u64,
    pub file_storage_path: Option<PathBuf>,
    pub restore: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_dsn: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub crypto_key: Option<PathBuf>,
    pub trusted_subnet: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_LISTEN_ADDR.to_string(),
            grpc_address: DEFAULT_GRPC_ADDR.to_string(),
            store_interval: DEFAULT_STORE_INTERVAL,
            file_storage_path: Some(PathBuf::from(DEFAULT_STORAGE_PATH)),
            restore: true,
            database_dsn: None,
            key: String::new(),
            crypto_key: None,
            trusted_subnet: None,
        }
    }
}

impl ServerConfig {
    /// Resolves configuration: CLI/env (if provided) > config file > default.
    pub fn resolve(args: &ServerArgs) -> Result<Self, ConfigError> {
        let mut config: ServerConfig = load_file(args.config.as_deref(), DEFAULT_CONFIG_FILES)?;

        if let Some(address) = &args.address {
            config.address = address.clone();
        }
        if let Some(address) = &args.grpc_address {
            config.grpc_address = address.clone();
        }
        if let Some(interval) = args.store_interval {
            config.store_interval = interval;
        }
        if let Some(path) = &args.file_storage_path {
            config.file_storage_path = Some(path.clone());
        }
        if let Some(restore) = args.restore {
            config.restore = restore;
        }
        if let Some(dsn) = &args.database_dsn {
            config.database_dsn = Some(dsn.clone());
        }
        if let Some(key) = &args.key {
            config.key = key.clone();
        }
        if let Some(path) = &args.crypto_key {
            config.crypto_key = Some(path.clone());
        }
        if let Some(subnet) = &args.trusted_subnet {
            config.trusted_subnet = Some(subnet.clone());
        }

        Ok(config)
    }

    /// Parsed trusted subnet, `None` when unset or empty.
    pub fn trusted_network(&self) -> Result<Option<IpNetwork>, ConfigError> {
        match self.trusted_subnet.as_deref().map(str::trim) {
            None | Some("") => Ok(None),
            Some(cidr) => parse_cidr(cidr).map(Some).map_err(|reason| {
                ConfigError::Invalid(format!("trusted_subnet '{}' is not a CIDR: {}", cidr, reason))
            }),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::Invalid("listen address must not be empty".into()));
        }
        if self.grpc_address.is_empty() {
            return Err(ConfigError::Invalid("grpc_address must not be empty".into()));
        }
        self.trusted_network()?;
        check_key_file("crypto key", self.crypto_key.as_deref())
    }
}

/// Parses `addr/prefix`, clearing any host bits set in `addr`.
fn parse_cidr(cidr: &str) -> Result<IpNetwork, String> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| "missing prefix length".to_string())?;
    let addr: IpAddr = addr.parse().map_err(|e: std::net::AddrParseError| e.to_string())?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| format!("invalid prefix length '{}'", prefix))?;
    match addr {
        IpAddr::V4(ip) => Ipv4Network::new_truncate(ip, prefix)
            .map(IpNetwork::V4)
            .map_err(|e| e.to_string()),
        IpAddr::V6(ip) => Ipv6Network::new_truncate(ip, prefix)
            .map(IpNetwork::V6)
            .map_err(|e| e.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServerConfig::resolve(&ServerArgs {
            config: Some("/dev/null.yaml".into()),
            ..Default::default()
        });
        // An explicit but missing file is an error
        assert!(config.is_err());

        let config = ServerConfig::default();
        assert_eq!(config.store_interval, 300);
        assert!(config.restore);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_cli_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("server.yaml");
        std::fs::write(&path, "store_interval: 10\nrestore: false\n").unwrap();

        let args = ServerArgs {
            config: Some(path),
            store_interval: Some(0),
            trusted_subnet: Some("10.0.0.0/8".into()),
            ..Default::default()
        };
        let config = ServerConfig::resolve(&args).unwrap();
        assert_eq!(config.store_interval, 0);
        assert!(!config.restore);
        assert!(config.trusted_network().unwrap().is_some());
    }

    #[test]
    fn test_invalid_subnet() {
        let config = ServerConfig {
            trusted_subnet: Some("10.0.0.300/8".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = ServerConfig {
            trusted_subnet: Some(String::new()),
            ..Default::default()
        };
        assert_eq!(config.trusted_network().unwrap(), None);

        for bad in ["10.0.0.0", "10.0.0.0/33", "10.0.0.0/x"] {
            let config = ServerConfig {
                trusted_subnet: Some(bad.into()),
                ..Default::default()
            };
            assert!(config.validate().is_err(), "{} accepted", bad);
        }
    }

    #[test]
    fn test_subnet_host_bits_are_masked() {
        let config = ServerConfig {
            trusted_subnet: Some("192.168.1.5/24".into()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
        let network = config.trusted_network().unwrap().unwrap();
        assert_eq!(network, "192.168.1.0/24".parse::<IpNetwork>().unwrap());
        assert!(network.contains("192.168.1.200".parse::<IpAddr>().unwrap()));
        assert!(!network.contains("192.168.2.1".parse::<IpAddr>().unwrap()));

        let config = ServerConfig {
            trusted_subnet: Some("2001:db8::1/32".into()),
            ..Default::default()
        };
        let network = config.trusted_network().unwrap().unwrap();
        assert_eq!(network, "2001:db8::/32".parse::<IpNetwork>().unwrap());
    }
}
