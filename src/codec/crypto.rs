//! RSA PKCS#1 v1.5 confidentiality layer.
//!
//! Payloads longer than one RSA block are split into `k - 11` byte chunks
//! (`k` being the modulus size in bytes); each chunk encrypts to exactly `k`
//! bytes and the blocks are concatenated on the wire.

use rsa::pkcs1::{DecodeRsaPrivateKey, DecodeRsaPublicKey};
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use std::fs;
use std::path::Path;
use tracing::debug;

use super::CodecError;

/// PKCS#1 v1.5 padding overhead per block.
const PKCS1_PADDING: usize = 11;

/// Public half used by the agent.
#[derive(Debug, Clone)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

/// Private half used by the server.
#[derive(Clone)]
pub struct PrivateKey {
    inner: RsaPrivateKey,
}

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey {{ bits: {} }}", self.inner.size() * 8)
    }
}

fn read_pem(path: &Path) -> Result<String, CodecError> {
    fs::read_to_string(path).map_err(|e| CodecError::Key(format!("{}: {}", path.display(), e)))
}

impl PublicKey {
    /// Parses a PKCS#1 (`RSA PUBLIC KEY`) or SPKI (`PUBLIC KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, CodecError> {
        let inner = RsaPublicKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPublicKey::from_public_key_pem(pem))
            .map_err(|e| CodecError::Key(format!("invalid public key: {}", e)))?;
        Ok(Self { inner })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let key = Self::from_pem(&read_pem(path)?)?;
        debug!("Loaded {}-bit public key from {}", key.inner.size() * 8, path.display());
        Ok(key)
    }

    pub fn encrypt(&self, plain: &[u8]) -> Result<Vec<u8>, CodecError> {
        let block = self.inner.size();
        let chunk = block - PKCS1_PADDING;
        let mut rng = rand::thread_rng();
        let mut out = Vec::with_capacity(plain.len().div_ceil(chunk).max(1) * block);

        // An empty payload still produces one block so the peer sees a valid message.
        let chunks: Vec<&[u8]> = if plain.is_empty() {
            vec![plain]
        } else {
            plain.chunks(chunk).collect()
        };
        for part in chunks {
            let sealed = self
                .inner
                .encrypt(&mut rng, Pkcs1v15Encrypt, part)
                .map_err(|e| CodecError::Encryption(e.to_string()))?;
            out.extend_from_slice(&sealed);
        }
        Ok(out)
    }
}

impl From<RsaPublicKey> for PublicKey {
    fn from(inner: RsaPublicKey) -> Self {
        Self { inner }
    }
}

impl PrivateKey {
    /// Parses a PKCS#1 (`RSA PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) PEM document.
    pub fn from_pem(pem: &str) -> Result<Self, CodecError> {
        let inner = RsaPrivateKey::from_pkcs1_pem(pem)
            .or_else(|_| RsaPrivateKey::from_pkcs8_pem(pem))
            .map_err(|e| CodecError::Key(format!("invalid private key: {}", e)))?;
        Ok(Self { inner })
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, CodecError> {
        let path = path.as_ref();
        let key = Self::from_pem(&read_pem(path)?)?;
        debug!("Loaded {}-bit private key from {}", key.inner.size() * 8, path.display());
        Ok(key)
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.inner.to_public_key(),
        }
    }

    pub fn decrypt(&self, sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        let block = self.inner.size();
        if sealed.is_empty() || sealed.len() % block != 0 {
            return Err(CodecError::Decryption(format!(
                "ciphertext length {} is not a multiple of the {}-byte block",
                sealed.len(),
                block
            )));
        }

        let mut out = Vec::with_capacity(sealed.len());
        for part in sealed.chunks(block) {
            let plain = self
                .inner
                .decrypt(Pkcs1v15Encrypt, part)
                .map_err(|e| CodecError::Decryption(e.to_string()))?;
            out.extend_from_slice(&plain);
        }
        Ok(out)
    }
}

impl From<RsaPrivateKey> for PrivateKey {
    fn from(inner: RsaPrivateKey) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs1::{EncodeRsaPrivateKey, EncodeRsaPublicKey, LineEnding};

    fn test_key() -> PrivateKey {
        let mut rng = rand::thread_rng();
        PrivateKey::from(RsaPrivateKey::new(&mut rng, 1024).unwrap())
    }

    #[test]
    fn test_encrypt_decrypt_multi_block() {
        let key = test_key();
        let public = key.public_key();

        // 1024-bit key -> 117 bytes of plaintext per block
        let plain: Vec<u8> = (0..400u32).map(|i| (i % 251) as u8).collect();
        let sealed = public.encrypt(&plain).unwrap();
        assert_eq!(sealed.len(), 4 * 128);
        assert_eq!(key.decrypt(&sealed).unwrap(), plain);
    }

    #[test]
    fn test_empty_payload() {
        let key = test_key();
        let sealed = key.public_key().encrypt(b"").unwrap();
        assert_eq!(sealed.len(), 128);
        assert!(key.decrypt(&sealed).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_ciphertext_rejected() {
        let key = test_key();
        let sealed = key.public_key().encrypt(b"hello").unwrap();
        assert!(key.decrypt(&sealed[..sealed.len() - 1]).is_err());
    }

    #[test]
    fn test_pem_files() {
        let mut rng = rand::thread_rng();
        let raw = RsaPrivateKey::new(&mut rng, 1024).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let private_path = dir.path().join("private.pem");
        let public_path = dir.path().join("public.pem");
        fs::write(&private_path, raw.to_pkcs1_pem(LineEnding::LF).unwrap().as_bytes()).unwrap();
        fs::write(
            &public_path,
            raw.to_public_key().to_pkcs1_pem(LineEnding::LF).unwrap(),
        )
        .unwrap();

        let private = PrivateKey::from_file(&private_path).unwrap();
        let public = PublicKey::from_file(&public_path).unwrap();
        let sealed = public.encrypt(b"[]").unwrap();
        assert_eq!(private.decrypt(&sealed).unwrap(), b"[]");

        assert!(PublicKey::from_file(dir.path().join("missing.pem")).is_err());
        assert!(PrivateKey::from_pem("not a key").is_err());
    }
}
