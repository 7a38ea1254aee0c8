// Path: crates/test_utils/src/mock_signer.rs

//! A scriptable in-memory signing backend.

use alloy_primitives::keccak256;
use async_trait::async_trait;
use m2m_api::SignerBackend;
use m2m_types::error::SigningError;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Scriptable [`SignerBackend`] double producing deterministic signatures.
#[derive(Default)]
pub struct MockSigner {
    fail_next: AtomicU32,
    deny: AtomicBool,
    sign_calls: AtomicU32,
}

impl MockSigner {
    /// Creates a signer that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `n` sign calls fail with a transient backend error.
    pub fn fail_next(&self, n: u32) {
        self.fail_next.store(n, Ordering::SeqCst);
    }

    /// Makes every call fail with a permission error.
    pub fn deny(&self) {
        self.deny.store(true, Ordering::SeqCst);
    }

    /// How many sign calls were made, including failed ones.
    pub fn sign_calls(&self) -> u32 {
        self.sign_calls.load(Ordering::SeqCst)
    }

    /// The signature this mock produces for `message`.
    pub fn expected_signature(message: &[u8]) -> Vec<u8> {
        let digest = keccak256(message);
        let mut signature = Vec::with_capacity(65);
        signature.extend_from_slice(digest.as_slice());
        signature.extend_from_slice(digest.as_slice());
        signature.push(0x1b);
        signature
    }
}

#[async_trait]
impl SignerBackend for MockSigner {
    async fn sign(&self, message: &[u8], key_id: &str) -> Result<Vec<u8>, SigningError> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny.load(Ordering::SeqCst) {
            return Err(SigningError::PermissionDenied(key_id.to_string()));
        }
        let failing = self.fail_next.load(Ordering::SeqCst);
        if failing > 0 {
            self.fail_next.store(failing - 1, Ordering::SeqCst);
            return Err(SigningError::BackendUnavailable("scripted outage".into()));
        }
        Ok(Self::expected_signature(message))
    }

    async fn public_key(&self, _key_id: &str) -> Result<Vec<u8>, SigningError> {
        Ok(vec![0x30, 0x00])
    }

    async fn rotate_key(&self, key_id: &str) -> Result<String, SigningError> {
        Ok(format!("{}#v2", key_id))
    }
}
