// Path: crates/signer/src/lib.rs
#![forbid(unsafe_code)]

//! # m2m Local Signer
//!
//! A file-backed [`SignerBackend`] for development and single-operator
//! deployments. Keys are raw secp256k1 secrets stored hex-encoded, one file
//! per key id, under a key directory. Remote backends (cloud KMS, HSM) live
//! behind the same trait in their own services.
//!
//! Key rotation is versioned in the id itself: rotating `settlement` yields
//! `settlement#v2`, then `settlement#v3`, each with fresh key material. Old
//! versions stay loadable so proofs signed before the rotation remain
//! verifiable against their public key.

use alloy_primitives::{keccak256, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use async_trait::async_trait;
use k256::pkcs8::EncodePublicKey;
use m2m_api::SignerBackend;
use m2m_types::error::SigningError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

/// File-backed signing backend holding secp256k1 keys in memory.
pub struct LocalKeySigner {
    keys: RwLock<HashMap<String, PrivateKeySigner>>,
    /// Where rotated keys are persisted; `None` keeps them memory-only.
    key_dir: Option<PathBuf>,
}

impl LocalKeySigner {
    /// Creates an empty, memory-only backend.
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
            key_dir: None,
        }
    }

    /// Loads every `*.key` file under `dir` (hex-encoded 32-byte secrets);
    /// the file stem becomes the key id.
    pub fn from_dir(dir: impl Into<PathBuf>) -> Result<Self, SigningError> {
        let dir = dir.into();
        let mut keys = HashMap::new();
        let entries = std::fs::read_dir(&dir)
            .map_err(|e| SigningError::BackendUnavailable(format!("key dir unreadable: {}", e)))?;
        for entry in entries {
            let path = entry
                .map_err(|e| SigningError::BackendUnavailable(format!("key dir walk: {}", e)))?
                .path();
            if path.extension().and_then(|e| e.to_str()) != Some("key") {
                continue;
            }
            let Some(key_id) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let signer = load_key_file(&path)?;
            keys.insert(key_id.to_string(), signer);
        }
        if keys.is_empty() {
            tracing::warn!(target: "signer", dir = %dir.display(), "key directory holds no keys");
        }
        Ok(Self {
            keys: RwLock::new(keys),
            key_dir: Some(dir),
        })
    }

    /// Inserts a key under `key_id`, replacing any previous material.
    pub fn insert(&self, key_id: &str, signer: PrivateKeySigner) {
        let mut keys = self.keys.write().unwrap_or_else(|e| e.into_inner());
        keys.insert(key_id.to_string(), signer);
    }

    /// Generates and registers a fresh key under `key_id`.
    pub fn generate(&self, key_id: &str) -> Result<(), SigningError> {
        let signer = PrivateKeySigner::random();
        self.persist(key_id, &signer)?;
        self.insert(key_id, signer);
        Ok(())
    }

    fn persist(&self, key_id: &str, signer: &PrivateKeySigner) -> Result<(), SigningError> {
        let Some(dir) = &self.key_dir else {
            return Ok(());
        };
        let path = dir.join(format!("{}.key", key_id));
        let encoded = hex::encode(signer.credential().to_bytes());
        std::fs::write(&path, encoded)
            .map_err(|e| SigningError::Backend(format!("failed to persist key: {}", e)))
    }

    fn with_key<T>(
        &self,
        key_id: &str,
        f: impl FnOnce(&PrivateKeySigner) -> Result<T, SigningError>,
    ) -> Result<T, SigningError> {
        let keys = self.keys.read().unwrap_or_else(|e| e.into_inner());
        let signer = keys
            .get(key_id)
            .ok_or_else(|| SigningError::EmptyResult(key_id.to_string()))?;
        f(signer)
    }
}

impl Default for LocalKeySigner {
    fn default() -> Self {
        Self::new()
    }
}

fn load_key_file(path: &std::path::Path) -> Result<PrivateKeySigner, SigningError> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| SigningError::BackendUnavailable(format!("key file unreadable: {}", e)))?;
    let raw = hex::decode(text.trim())
        .map_err(|e| SigningError::Backend(format!("key file is not hex: {}", e)))?;
    PrivateKeySigner::from_slice(&raw)
        .map_err(|e| SigningError::Backend(format!("invalid secp256k1 secret: {}", e)))
}

/// Splits `base#vN` into its base and version; a bare id is version 1.
fn split_version(key_id: &str) -> (&str, u32) {
    if let Some((base, version)) = key_id.rsplit_once("#v") {
        if let Ok(n) = version.parse::<u32>() {
            return (base, n);
        }
    }
    (key_id, 1)
}

#[async_trait]
impl SignerBackend for LocalKeySigner {
    async fn sign(&self, message: &[u8], key_id: &str) -> Result<Vec<u8>, SigningError> {
        // A 32-byte message is taken as a prehashed digest; anything else is
        // hashed here. Either way the signature covers a keccak-256 digest.
        let digest = if message.len() == 32 {
            B256::from_slice(message)
        } else {
            keccak256(message)
        };
        self.with_key(key_id, |signer| {
            let signature = signer
                .sign_hash_sync(&digest)
                .map_err(|e| SigningError::Backend(format!("sign failed: {}", e)))?;
            Ok(signature.as_bytes().to_vec())
        })
    }

    async fn public_key(&self, key_id: &str) -> Result<Vec<u8>, SigningError> {
        self.with_key(key_id, |signer| {
            let der = signer
                .credential()
                .verifying_key()
                .to_public_key_der()
                .map_err(|e| SigningError::Backend(format!("DER encoding failed: {}", e)))?;
            Ok(der.as_bytes().to_vec())
        })
    }

    async fn rotate_key(&self, key_id: &str) -> Result<String, SigningError> {
        // Rotating requires the current version to exist; rotating a key the
        // backend has never seen is a caller bug, not a fresh enrollment.
        self.with_key(key_id, |_| Ok(()))?;
        let (base, version) = split_version(key_id);
        let new_id = format!("{}#v{}", base, version + 1);
        let signer = PrivateKeySigner::random();
        self.persist(&new_id, &signer)?;
        self.insert(&new_id, signer);
        tracing::info!(target: "signer", from = key_id, to = %new_id, "rotated signing key");
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::Address;

    fn backend_with(key_id: &str) -> LocalKeySigner {
        let backend = LocalKeySigner::new();
        backend.generate(key_id).unwrap();
        backend
    }

    #[tokio::test]
    async fn signs_prehashed_digests() {
        let backend = backend_with("settlement");
        let digest = keccak256(b"proof body");
        let signature = backend.sign(digest.as_slice(), "settlement").await.unwrap();
        assert_eq!(signature.len(), 65);

        // Same digest, same key, same signature (ECDSA here is deterministic).
        let again = backend.sign(digest.as_slice(), "settlement").await.unwrap();
        assert_eq!(signature, again);
    }

    #[tokio::test]
    async fn unknown_key_is_empty_result() {
        let backend = LocalKeySigner::new();
        let err = backend.sign(b"anything", "missing").await.unwrap_err();
        assert!(matches!(err, SigningError::EmptyResult(_)));
    }

    #[tokio::test]
    async fn public_key_is_der() {
        let backend = backend_with("settlement");
        let der = backend.public_key("settlement").await.unwrap();
        // DER SubjectPublicKeyInfo starts with a SEQUENCE tag.
        assert_eq!(der[0], 0x30);
        assert!(der.len() > 65);
    }

    #[tokio::test]
    async fn rotation_versions_the_id() {
        let backend = backend_with("settlement");
        let v2 = backend.rotate_key("settlement").await.unwrap();
        assert_eq!(v2, "settlement#v2");
        let v3 = backend.rotate_key(&v2).await.unwrap();
        assert_eq!(v3, "settlement#v3");

        // All versions stay usable, with distinct key material.
        let digest = keccak256(b"same digest");
        let s1 = backend.sign(digest.as_slice(), "settlement").await.unwrap();
        let s3 = backend.sign(digest.as_slice(), &v3).await.unwrap();
        assert_ne!(s1, s3);

        let err = backend.rotate_key("never-seen").await.unwrap_err();
        assert!(matches!(err, SigningError::EmptyResult(_)));
    }

    #[tokio::test]
    async fn keys_roundtrip_through_dir() {
        let dir = tempfile::tempdir().unwrap();
        {
            let backend = LocalKeySigner::from_dir(dir.path()).unwrap();
            backend.generate("settlement").unwrap();
            backend.rotate_key("settlement").await.unwrap();
        }
        let reloaded = LocalKeySigner::from_dir(dir.path()).unwrap();
        let digest = keccak256(b"persisted");
        assert!(reloaded.sign(digest.as_slice(), "settlement").await.is_ok());
        assert!(reloaded
            .sign(digest.as_slice(), "settlement#v2")
            .await
            .is_ok());
    }

    #[test]
    fn version_splitting() {
        assert_eq!(split_version("k"), ("k", 1));
        assert_eq!(split_version("k#v7"), ("k", 7));
        assert_eq!(split_version("k#vx"), ("k#vx", 1));
    }

    #[tokio::test]
    async fn signature_recovers_signer_address() {
        let signer = PrivateKeySigner::random();
        let expected: Address = signer.address();
        let backend = LocalKeySigner::new();
        backend.insert("k", signer);

        let digest = keccak256(b"recoverable");
        let raw = backend.sign(digest.as_slice(), "k").await.unwrap();
        let signature = alloy_primitives::Signature::try_from(raw.as_slice()).unwrap();
        let recovered = signature.recover_address_from_prehash(&digest).unwrap();
        assert_eq!(recovered, expected);
    }
}
