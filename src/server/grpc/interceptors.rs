//! Per-call checks run at the start of every gRPC method.
//!
//! tonic interceptors only see metadata, while the integrity tag covers the
//! encoded request message, so the checks run as an explicit chain inside
//! each method instead.

use prost::Message;
use std::net::IpAddr;
use tonic::metadata::MetadataMap;
use tonic::{Request, Status};
use tracing::warn;

use crate::codec::{is_unsigned, Signer};
use crate::rpc::{REAL_IP_METADATA, SIGNATURE_METADATA};
use crate::server::origin::OriginGuard;

/// What a check may inspect about one call.
pub struct CallContext<'a> {
    pub method: &'static str,
    pub metadata: &'a MetadataMap,
    pub peer: Option<IpAddr>,
    /// Protobuf encoding of the request message.
    pub message: &'a [u8],
}

impl CallContext<'_> {
    fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.to_str().ok())
    }
}

pub trait CallCheck: Send + Sync {
    fn check(&self, call: &CallContext<'_>) -> Result<(), Status>;
}

/// Rejects callers outside the trusted subnet.
pub struct SubnetInterceptor {
    guard: OriginGuard,
}

impl SubnetInterceptor {
    pub fn new(guard: OriginGuard) -> Self {
        Self { guard }
    }
}

impl CallCheck for SubnetInterceptor {
    fn check(&self, call: &CallContext<'_>) -> Result<(), Status> {
        self.guard
            .check(call.metadata_str(REAL_IP_METADATA), call.peer)
            .map_err(|e| {
                warn!("Rejected {}: {}", call.method, e);
                Status::permission_denied(e.to_string())
            })
    }
}

/// Verifies the `hashsha256` tag over the encoded request.
pub struct HmacInterceptor {
    signer: Option<Signer>,
}

impl HmacInterceptor {
    pub fn new(signer: Option<Signer>) -> Self {
        Self { signer }
    }
}

impl CallCheck for HmacInterceptor {
    fn check(&self, call: &CallContext<'_>) -> Result<(), Status> {
        let Some(signer) = &self.signer else {
            return Ok(());
        };
        let tag = call.metadata_str(SIGNATURE_METADATA);
        if is_unsigned(tag) {
            return Ok(());
        }
        signer
            .verify(call.message, tag.unwrap_or_default())
            .map_err(|e| {
                warn!("Rejected {}: {}", call.method, e);
                Status::permission_denied(e.to_string())
            })
    }
}

/// Checks applied in insertion order; the first failure wins.
#[derive(Default)]
pub struct CheckChain {
    checks: Vec<Box<dyn CallCheck>>,
}

impl CheckChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, check: impl CallCheck + 'static) -> Self {
        self.checks.push(Box::new(check));
        self
    }

    pub fn run<T: Message>(&self, method: &'static str, request: &Request<T>) -> Result<(), Status> {
        if self.checks.is_empty() {
            return Ok(());
        }
        let message = request.get_ref().encode_to_vec();
        let call = CallContext {
            method,
            metadata: request.metadata(),
            peer: request.remote_addr().map(|addr| addr.ip()),
            message: &message,
        };
        self.checks.iter().try_for_each(|check| check.check(&call))
    }
}
