//! Effective agent configuration.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::cli::AgentArgs;
use crate::config::{check_key_file, load_file, ConfigError};

pub const DEFAULT_SERVER_ADDR: &str = "localhost:8080";
pub const DEFAULT_GRPC_ADDR: &str = "127.0.0.1:8083";
pub const DEFAULT_POLL_INTERVAL: u64 = 2;
pub const DEFAULT_REPORT_INTERVAL: u64 = 10;
pub const DEFAULT_RATE_LIMIT: usize = 1;

const DEFAULT_CONFIG_FILES: &[&str] = &[
    "./metric-agent.yaml",
    "./metric-agent.yml",
    "./metric-agent.json",
    "./metric-agent.toml",
];

/// Transport used by the delivery workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Grpc,
}

/// Agent settings after merging CLI, environment, file and defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub address: String,
    pub grpc_address: String,
    pub protocol: Protocol,
    /// Seconds between samples.
    pub poll_interval: u64,
    /// Seconds between report cycles.
    pub report_interval: u64,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub key: String,
    pub rate_limit: usize,
    pub crypto_key: Option<PathBuf>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            address: DEFAULT_SERVER_ADDR.to_string(),
            grpc_address: DEFAULT_GRPC_ADDR.to_string(),
            protocol: Protocol::Http,
            poll_interval: DEFAULT_POLL_INTERVAL,
            report_interval: DEFAULT_REPORT_INTERVAL,
            key: String::new(),
            rate_limit: DEFAULT_RATE_LIMIT,
            crypto_key: None,
        }
    }
}

impl AgentConfig {
    pub fn poll_period(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn report_period(&self) -> Duration {
        Duration::from_secs(self.report_interval)
    }

    /// Resolves configuration: CLI/env (if provided) > config file > default.
    pub fn resolve(args: &AgentArgs) -> Result<Self, ConfigError> {
        let mut config: AgentConfig = load_file(args.config.as_deref(), DEFAULT_CONFIG_FILES)?;

        if let Some(address) = &args.address {
            config.address = address.clone();
        }
        if let Some(address) = &args.grpc_address {
            config.grpc_address = address.clone();
        }
        if let Some(protocol) = args.protocol {
            config.protocol = protocol;
        }
        if let Some(poll) = args.poll_interval {
            config.poll_interval = poll;
        }
        if let Some(report) = args.report_interval {
            config.report_interval = report;
        }
        if let Some(key) = &args.key {
            config.key = key.clone();
        }
        if let Some(limit) = args.rate_limit {
            config.rate_limit = limit;
        }
        if let Some(path) = &args.crypto_key {
            config.crypto_key = Some(path.clone());
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.address.is_empty() {
            return Err(ConfigError::Invalid("server address must not be empty".into()));
        }
        if self.protocol == Protocol::Grpc && self.grpc_address.is_empty() {
            return Err(ConfigError::Invalid(
                "protocol is grpc but grpc_address is empty".into(),
            ));
        }
        if self.poll_interval == 0 || self.report_interval == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval and report_interval must be positive".into(),
            ));
        }
        if self.report_interval < self.poll_interval {
            return Err(ConfigError::Invalid(format!(
                "report_interval ({}s) must not be shorter than poll_interval ({}s)",
                self.report_interval, self.poll_interval
            )));
        }
        if self.rate_limit == 0 {
            return Err(ConfigError::Invalid("rate_limit must be at least 1".into()));
        }
        check_key_file("crypto key", self.crypto_key.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_cli_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.json");
        fs::write(
            &path,
            r#"{"address":"file:1","poll_interval":5,"report_interval":20,"protocol":"grpc"}"#,
        )
        .unwrap();

        let args = AgentArgs {
            config: Some(path),
            address: Some("cli:2".into()),
            rate_limit: Some(4),
            ..Default::default()
        };
        let config = AgentConfig::resolve(&args).unwrap();
        assert_eq!(config.address, "cli:2");
        assert_eq!(config.poll_interval, 5);
        assert_eq!(config.report_interval, 20);
        assert_eq!(config.protocol, Protocol::Grpc);
        assert_eq!(config.rate_limit, 4);
        assert_eq!(config.grpc_address, DEFAULT_GRPC_ADDR);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = AgentConfig::default();
        assert!(config.validate().is_ok());

        config.report_interval = 1;
        assert!(config.validate().is_err());

        config = AgentConfig {
            rate_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        config = AgentConfig {
            crypto_key: Some("/nonexistent/key.pem".into()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
