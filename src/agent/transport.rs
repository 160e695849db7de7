//! Delivery of metric batches to the server over REST or gRPC.

use async_trait::async_trait;
use prost::Message;
use reqwest::header::{ACCEPT_ENCODING, CONTENT_ENCODING, CONTENT_TYPE};
use std::net::{IpAddr, UdpSocket};
use std::time::Duration;
use thiserror::Error;
use tonic::codec::CompressionEncoding;
use tonic::metadata::MetadataValue;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, instrument};

use crate::codec::{CodecError, Sealer, Signer, GZIP, REAL_IP_HEADER, SIGNATURE_HEADER};
use crate::model::Metric;
use crate::rpc::proto::{self, UpdatesRequest};
use crate::rpc::{MetricsClient, REAL_IP_METADATA, SIGNATURE_METADATA};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors raised while delivering one batch. Never retried.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server answered with status {0}")]
    Status(u16),

    #[error("invalid server address '{0}'")]
    Address(String),

    #[error("rpc call failed: {0}")]
    Rpc(#[from] tonic::Status),

    #[error("server rejected batch: {0}")]
    Rejected(String),
}

/// A client able to deliver one batch to the server.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, batch: &[Metric]) -> Result<(), TransportError>;
}

/// Address of the local interface used to reach `target`.
///
/// Connecting a UDP socket sends nothing; it only resolves the route.
pub fn outbound_ip(target: &str) -> Option<IpAddr> {
    let socket = UdpSocket::bind(("0.0.0.0", 0)).ok()?;
    socket.connect(target).ok()?;
    socket.local_addr().ok().map(|addr| addr.ip())
}

fn with_scheme(address: &str) -> String {
    if address.starts_with("http://") || address.starts_with("https://") {
        address.to_string()
    } else {
        format!("http://{}", address)
    }
}

/// `POST /updates/` with the full security codec applied.
pub struct RestClient {
    http: reqwest::Client,
    url: String,
    sealer: Sealer,
    real_ip: Option<IpAddr>,
}

impl RestClient {
    pub fn new(address: &str, sealer: Sealer) -> Result<Self, TransportError> {
        if address.is_empty() {
            return Err(TransportError::Address(address.to_string()));
        }
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let base = with_scheme(address);
        let host = base
            .split_once("://")
            .map(|(_, rest)| rest.trim_end_matches('/'))
            .unwrap_or(address);
        let real_ip = outbound_ip(host);
        debug!("REST transport to {} (origin {:?})", base, real_ip);

        Ok(Self {
            http,
            url: format!("{}/updates/", base.trim_end_matches('/')),
            sealer,
            real_ip,
        })
    }
}

#[async_trait]
impl Transport for RestClient {
    #[instrument(skip_all, fields(metrics = batch.len()))]
    async fn send(&self, batch: &[Metric]) -> Result<(), TransportError> {
        let envelope = self.sealer.seal(batch)?;

        let mut request = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, "application/json")
            .header(CONTENT_ENCODING, GZIP)
            .header(ACCEPT_ENCODING, GZIP);
        if let Some(signature) = envelope.signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        if let Some(ip) = self.real_ip {
            request = request.header(REAL_IP_HEADER, ip.to_string());
        }

        let response = request.body(envelope.body).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(())
    }
}

/// `metric.Metrics/Updates` with gzip message compression.
///
/// The integrity tag covers the protobuf encoding of the request message.
pub struct RpcClient {
    client: MetricsClient<Channel>,
    signer: Option<Signer>,
    real_ip: Option<IpAddr>,
}

impl RpcClient {
    /// Builds a lazily connecting client; the first call dials the server.
    pub fn new(address: &str, signer: Option<Signer>) -> Result<Self, TransportError> {
        let endpoint = Endpoint::from_shared(with_scheme(address))
            .map_err(|_| TransportError::Address(address.to_string()))?
            .timeout(REQUEST_TIMEOUT)
            .connect_timeout(REQUEST_TIMEOUT);
        let client = MetricsClient::new(endpoint.connect_lazy())
            .send_compressed(CompressionEncoding::Gzip)
            .accept_compressed(CompressionEncoding::Gzip);

        Ok(Self {
            client,
            signer,
            real_ip: outbound_ip(address),
        })
    }
}

#[async_trait]
impl Transport for RpcClient {
    #[instrument(skip_all, fields(metrics = batch.len()))]
    async fn send(&self, batch: &[Metric]) -> Result<(), TransportError> {
        let message = UpdatesRequest {
            metrics: batch.iter().map(proto::Metric::from).collect(),
        };
        let signature = self
            .signer
            .as_ref()
            .map(|signer| signer.sign(&message.encode_to_vec()));

        let mut request = tonic::Request::new(message);
        if let Some(signature) = signature {
            let value = MetadataValue::try_from(signature)
                .map_err(|e| TransportError::Rejected(e.to_string()))?;
            request.metadata_mut().insert(SIGNATURE_METADATA, value);
        }
        if let Some(ip) = self.real_ip {
            if let Ok(value) = MetadataValue::try_from(ip.to_string()) {
                request.metadata_mut().insert(REAL_IP_METADATA, value);
            }
        }

        let mut client = self.client.clone();
        let response = client.updates(request).await?.into_inner();
        if !response.error.is_empty() {
            return Err(TransportError::Rejected(response.error));
        }
        Ok(())
    }
}
