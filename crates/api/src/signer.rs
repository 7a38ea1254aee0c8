// Path: crates/api/src/signer.rs

//! Abstract interface for a signing authority.
//!
//! This allows the settlement executor to use either a local file-backed key
//! (for development) or a remote, cryptographically isolated backend (cloud
//! KMS, HSM) without knowing which it is talking to. Backends are free to
//! hash the message internally before signing; the contract is "produce a
//! signature over `message` using the key identified by `key_id`".

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use m2m_types::error::SigningError;

/// A pluggable signing backend, addressed by opaque key-id strings.
#[async_trait]
pub trait SignerBackend: Send + Sync {
    /// Signs `message` with the key identified by `key_id`.
    async fn sign(&self, message: &[u8], key_id: &str) -> Result<Vec<u8>, SigningError>;

    /// Returns the DER-encoded public key for `key_id`.
    ///
    /// Backends that hand out PEM should run their output through
    /// [`der_from_pem`] so callers always see raw DER.
    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>, SigningError>;

    /// Creates a new key version and returns the identifier the caller must
    /// use from now on.
    async fn rotate_key(&self, key_id: &str) -> Result<String, SigningError>;
}

/// Strips PEM armor from a key blob, returning the base64-decoded DER body.
///
/// Input that does not look like PEM is returned unchanged, so backends can
/// call this unconditionally on whatever their remote hands back.
pub fn der_from_pem(blob: &[u8]) -> Result<Vec<u8>, SigningError> {
    let text = match std::str::from_utf8(blob) {
        Ok(t) if t.trim_start().starts_with("-----BEGIN") => t,
        _ => return Ok(blob.to_vec()),
    };
    let body: String = text
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    B64.decode(body.trim())
        .map_err(|e| SigningError::Backend(format!("invalid PEM body: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pem_armor_is_stripped() {
        let der = vec![0x30, 0x82, 0x01, 0x0a, 0xFF];
        let pem = format!(
            "-----BEGIN PUBLIC KEY-----\n{}\n-----END PUBLIC KEY-----\n",
            B64.encode(&der)
        );
        assert_eq!(der_from_pem(pem.as_bytes()).unwrap(), der);
    }

    #[test]
    fn raw_der_passes_through() {
        let der = vec![0x30, 0x03, 0x01, 0x02, 0x03];
        assert_eq!(der_from_pem(&der).unwrap(), der);
    }

    #[test]
    fn corrupt_pem_body_errors() {
        let pem = b"-----BEGIN PUBLIC KEY-----\n!!!not base64!!!\n-----END PUBLIC KEY-----\n";
        assert!(der_from_pem(pem).is_err());
    }
}
