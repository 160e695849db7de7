//! CLI arguments for the metric-agent and metric-server binaries.
//!
//! Every setting can also come from an environment variable; clap resolves
//! flag > environment, and the config modules then fall back to the config
//! file and finally to defaults.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::agent::config::Protocol;

/// Log level options for CLI parsing
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

/// Configuration format options for output
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum ConfigFormat {
    #[default]
    Yaml,
    Json,
    Toml,
}

/// Agent CLI arguments
#[derive(Parser, Debug, Default)]
#[command(
    name = "metric-agent",
    about = "Samples runtime and host metrics and reports them to a metric-server",
    version
)]
pub struct AgentArgs {
    /// REST address of the metric server (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// gRPC address of the metric server (host:port)
    #[arg(short = 'g', long, env = "GRPC_ADDRESS")]
    pub grpc_address: Option<String>,

    /// Transport used to deliver batches
    #[arg(long, value_enum, env = "PROTOCOL")]
    pub protocol: Option<Protocol>,

    /// Poll interval in seconds
    #[arg(short = 'p', long, env = "POLL_INTERVAL")]
    pub poll_interval: Option<u64>,

    /// Report interval in seconds
    #[arg(short = 'r', long, env = "REPORT_INTERVAL")]
    pub report_interval: Option<u64>,

    /// Shared secret for HMAC-SHA256 request signing
    #[arg(short = 'k', long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Number of concurrent delivery workers
    #[arg(short = 'l', long, env = "RATE_LIMIT")]
    pub rate_limit: Option<usize>,

    /// Path to the server's RSA public key (PEM)
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

/// Server CLI arguments
#[derive(Parser, Debug, Default)]
#[command(
    name = "metric-server",
    about = "Collects metric batches over REST and gRPC and stores the aggregate",
    version
)]
pub struct ServerArgs {
    /// REST listen address (host:port)
    #[arg(short = 'a', long, env = "ADDRESS")]
    pub address: Option<String>,

    /// gRPC listen address (host:port)
    #[arg(short = 'g', long, env = "GRPC_ADDRESS")]
    pub grpc_address: Option<String>,

    /// Snapshot flush interval in seconds (0 = write on every update)
    #[arg(short = 'i', long, env = "STORE_INTERVAL")]
    pub store_interval: Option<u64>,

    /// Snapshot file path (empty = memory only)
    #[arg(short = 'f', long, env = "FILE_STORAGE_PATH")]
    pub file_storage_path: Option<PathBuf>,

    /// Restore the snapshot file at startup
    #[arg(short = 'r', long, env = "RESTORE")]
    pub restore: Option<bool>,

    /// PostgreSQL connection string; selects the relational store
    #[arg(short = 'd', long, env = "DATABASE_DSN", hide_env_values = true)]
    pub database_dsn: Option<String>,

    /// Shared secret for HMAC-SHA256 request verification
    #[arg(short = 'k', long, env = "KEY", hide_env_values = true)]
    pub key: Option<String>,

    /// Path to the RSA private key (PEM) used to decrypt batches
    #[arg(long, env = "CRYPTO_KEY")]
    pub crypto_key: Option<PathBuf>,

    /// Trusted agent subnet in CIDR notation
    #[arg(short = 't', long, env = "TRUSTED_SUBNET")]
    pub trusted_subnet: Option<String>,

    /// Config file (YAML/JSON/TOML)
    #[arg(short = 'c', long, env = "CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(long, value_enum, default_value = "info")]
    pub log_level: LogLevel,

    /// Print effective merged config and exit
    #[arg(long)]
    pub show_config: bool,

    /// Output format for --show-config
    #[arg(long, value_enum, default_value = "yaml")]
    pub config_format: ConfigFormat,

    /// Validate config and exit (return code 1 on error)
    #[arg(long)]
    pub check_config: bool,
}

