//! metric-track: runtime telemetry agent and aggregating server.
//!
//! The agent samples process and host metrics on a poll period and ships
//! them to the server on a report period through a bounded worker pool. The
//! server accepts batches over REST and gRPC, runs them through the same
//! security checks (gzip, HMAC-SHA256 integrity, trusted subnet) and
//! aggregates them into a pluggable store.
//!
//! # Modules
//!
//! - [`model`]: wire metric, update command and stored record
//! - [`codec`]: compression, signing and RSA confidentiality
//! - [`collector`]: procfs-backed snapshot source
//! - [`agent`]: sampler, dispatcher and delivery transports
//! - [`server`]: aggregator, stores, REST and gRPC bindings
//! - [`rpc`]: protobuf messages and generated service stubs

pub mod agent;
pub mod cli;
pub mod codec;
pub mod collector;
pub mod config;
pub mod logging;
pub mod model;
pub mod rpc;
pub mod server;
pub mod signal;

pub use model::{Metric, MetricKind, MetricRecord, MetricUpdate, MetricValue};
