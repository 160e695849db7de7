//! Wire security codec for metric batches.
//!
//! The sending side runs `serialize -> encrypt -> compress` and signs the
//! resulting bytes; the receiving side verifies the tag before anything else
//! and then runs `decompress -> decrypt -> deserialize`. Encryption and
//! signing are optional and controlled by the presence of key material.

pub mod compress;
pub mod crypto;
pub mod sign;

use thiserror::Error;
use tracing::instrument;

use crate::model::Metric;

pub use compress::{accepts_gzip, compress, decompress, GZIP, MAX_DECOMPRESSED_BYTES};
pub use crypto::{PrivateKey, PublicKey};
pub use sign::{is_unsigned, Signer, NO_SIGNATURE, SIGNATURE_HEADER};

/// Header in which a sender declares its own address for the origin check.
pub const REAL_IP_HEADER: &str = "X-Real-IP";

/// Errors raised by the codec layers.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("compression failed: {0}")]
    Compression(#[source] std::io::Error),

    #[error("decompressed body exceeds {0} bytes")]
    TooLarge(usize),

    #[error("integrity check failed")]
    BadSignature,

    #[error("key material error: {0}")]
    Key(String),

    #[error("encryption failed: {0}")]
    Encryption(String),

    #[error("decryption failed: {0}")]
    Decryption(String),

    #[error("malformed batch: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// A batch ready to be put on the wire.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Compressed (and possibly encrypted) body bytes.
    pub body: Vec<u8>,
    /// Hex HMAC over `body`, when a secret is configured.
    pub signature: Option<String>,
}

/// Sending half of the codec.
#[derive(Debug, Clone, Default)]
pub struct Sealer {
    signer: Option<Signer>,
    public_key: Option<PublicKey>,
}

impl Sealer {
    pub fn new(signer: Option<Signer>, public_key: Option<PublicKey>) -> Self {
        Self { signer, public_key }
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    #[instrument(skip_all, fields(metrics = batch.len()))]
    pub fn seal(&self, batch: &[Metric]) -> Result<Envelope, CodecError> {
        let json = serde_json::to_vec(batch)?;
        let plain = match &self.public_key {
            Some(key) => key.encrypt(&json)?,
            None => json,
        };
        let body = compress(&plain)?;
        let signature = self.signer.as_ref().map(|s| s.sign(&body));
        Ok(Envelope { body, signature })
    }
}

/// Receiving half of the codec.
#[derive(Debug, Clone, Default)]
pub struct Opener {
    signer: Option<Signer>,
    private_key: Option<PrivateKey>,
}

impl Opener {
    pub fn new(signer: Option<Signer>, private_key: Option<PrivateKey>) -> Self {
        Self {
            signer,
            private_key,
        }
    }

    pub fn signer(&self) -> Option<&Signer> {
        self.signer.as_ref()
    }

    /// Checks the integrity tag over the exact wire bytes.
    ///
    /// An unsigned request passes (explicit opt-out), as does any request
    /// when this side holds no secret.
    pub fn verify(&self, wire: &[u8], signature: Option<&str>) -> Result<(), CodecError> {
        match (&self.signer, signature) {
            (Some(signer), Some(tag)) if !is_unsigned(Some(tag)) => signer.verify(wire, tag),
            _ => Ok(()),
        }
    }

    /// Decrypts an already decompressed body, if a private key is configured.
    pub fn decrypt(&self, body: Vec<u8>) -> Result<Vec<u8>, CodecError> {
        match &self.private_key {
            Some(key) => key.decrypt(&body),
            None => Ok(body),
        }
    }

    /// Full receive path for a batch taken straight off the wire.
    #[instrument(skip_all, fields(bytes = wire.len()))]
    pub fn open(&self, wire: &[u8], signature: Option<&str>) -> Result<Vec<Metric>, CodecError> {
        self.verify(wire, signature)?;
        let plain = self.decrypt(decompress(wire)?)?;
        Ok(serde_json::from_slice(&plain)?)
    }
}
