//! HMAC-SHA256 integrity tags over wire bytes.

use hmac::{Hmac, Mac};
use sha2::Sha256;

use super::CodecError;

type HmacSha256 = Hmac<Sha256>;

/// Header (REST) and metadata key (gRPC, lowercased) carrying the tag.
pub const SIGNATURE_HEADER: &str = "HashSHA256";

/// Sentinel value meaning "this request is deliberately unsigned".
pub const NO_SIGNATURE: &str = "none";

/// Signs and verifies byte strings with a shared secret.
#[derive(Clone)]
pub struct Signer {
    mac: HmacSha256,
}

impl std::fmt::Debug for Signer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Signer { key: <redacted> }")
    }
}

impl Signer {
    /// Returns `None` for an empty secret, which disables signing.
    pub fn new(secret: &str) -> Option<Self> {
        if secret.is_empty() {
            return None;
        }
        let mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes()).ok()?;
        Some(Self { mac })
    }

    /// Lowercase hex HMAC of `data`.
    pub fn sign(&self, data: &[u8]) -> String {
        let mut mac = self.mac.clone();
        mac.update(data);
        hex::encode(mac.finalize().into_bytes())
    }

    /// Checks `signature` against `data` in constant time.
    pub fn verify(&self, data: &[u8], signature: &str) -> Result<(), CodecError> {
        let expected = hex::decode(signature.trim()).map_err(|_| CodecError::BadSignature)?;
        let mut mac = self.mac.clone();
        mac.update(data);
        mac.verify_slice(&expected)
            .map_err(|_| CodecError::BadSignature)
    }
}

/// True when the peer opted out of signing: header missing, empty or `none`.
pub fn is_unsigned(header: Option<&str>) -> bool {
    match header.map(str::trim) {
        None => true,
        Some(value) => value.is_empty() || value.eq_ignore_ascii_case(NO_SIGNATURE),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let signer = Signer::new("secret").unwrap();
        let tag = signer.sign(b"payload");
        assert_eq!(tag.len(), 64);
        assert!(signer.verify(b"payload", &tag).is_ok());
        assert!(signer.verify(b"payload!", &tag).is_err());
        assert!(Signer::new("other").unwrap().verify(b"payload", &tag).is_err());
        assert!(signer.verify(b"payload", "zz-not-hex").is_err());
    }

    #[test]
    fn test_known_vector() {
        // RFC 4231 test case 2
        let signer = Signer::new("Jefe").unwrap();
        assert_eq!(
            signer.sign(b"what do ya want for nothing?"),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_every_single_bit_flip_is_rejected() {
        let signer = Signer::new("k").unwrap();
        let data = b"abc".to_vec();
        let tag = signer.sign(&data);
        for byte in 0..data.len() {
            for bit in 0..8 {
                let mut mutated = data.clone();
                mutated[byte] ^= 1 << bit;
                assert!(signer.verify(&mutated, &tag).is_err());
            }
        }
    }

    #[test]
    fn test_unsigned_markers() {
        assert!(is_unsigned(None));
        assert!(is_unsigned(Some("")));
        assert!(is_unsigned(Some("none")));
        assert!(!is_unsigned(Some("abcdef")));
        assert!(Signer::new("").is_none());
    }
}
