//! gRPC surface of the metric service.
//!
//! Messages live in [`proto`]; client and server stubs are generated at
//! build time for the `metric.Metrics` service.

pub mod proto;

mod generated {
    include!(concat!(env!("OUT_DIR"), "/metric.Metrics.rs"));
}

pub use generated::metrics_client::MetricsClient;
pub use generated::metrics_server::{Metrics, MetricsServer};

/// Metadata key carrying the hex HMAC of the encoded request message.
pub const SIGNATURE_METADATA: &str = "hashsha256";

/// Metadata key carrying the caller's own address for the origin check.
pub const REAL_IP_METADATA: &str = "x-real-ip";
