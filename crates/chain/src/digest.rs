// Path: crates/chain/src/digest.rs

//! Canonical balance-proof digest.
//!
//! The channel registry verifies proofs against an EIP-712 typed hash. The
//! layout here must match the contract byte-for-byte:
//!
//! ```text
//! domain_separator = keccak256(
//!     keccak256("EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)")
//!  || keccak256("m2m-channels") || keccak256("1")
//!  || uint256(chain_id) || uint256(registry_address) )
//! hash_struct = keccak256(
//!     keccak256("BalanceProof(bytes32 channelId,uint64 nonce,uint256 transferredAmount,address tokenAddress)")
//!  || channel_id || uint256(nonce) || uint256(transferred) || uint256(token) )
//! digest = keccak256(0x19 || 0x01 || domain_separator || hash_struct)
//! ```

use alloy_primitives::{keccak256, Address, B256, U256};
use m2m_types::channel::ChannelId;

const DOMAIN_TYPE: &[u8] =
    b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const PROOF_TYPE: &[u8] =
    b"BalanceProof(bytes32 channelId,uint64 nonce,uint256 transferredAmount,address tokenAddress)";
const DOMAIN_NAME: &[u8] = b"m2m-channels";
const DOMAIN_VERSION: &[u8] = b"1";

/// Left-pads a 20-byte address into an ABI word.
fn address_word(addr: Address) -> [u8; 32] {
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(addr.as_slice());
    word
}

/// The EIP-712 domain separator binding digests to one registry deployment.
pub fn domain_separator(chain_id: u64, registry: Address) -> B256 {
    let mut preimage = Vec::with_capacity(5 * 32);
    preimage.extend_from_slice(keccak256(DOMAIN_TYPE).as_slice());
    preimage.extend_from_slice(keccak256(DOMAIN_NAME).as_slice());
    preimage.extend_from_slice(keccak256(DOMAIN_VERSION).as_slice());
    preimage.extend_from_slice(&U256::from(chain_id).to_be_bytes::<32>());
    preimage.extend_from_slice(&address_word(registry));
    keccak256(&preimage)
}

/// The digest the settlement executor signs and the registry verifies.
pub fn balance_proof_digest(
    chain_id: u64,
    registry: Address,
    channel_id: ChannelId,
    nonce: u64,
    transferred_amount: U256,
    token: Address,
) -> B256 {
    let mut struct_preimage = Vec::with_capacity(5 * 32);
    struct_preimage.extend_from_slice(keccak256(PROOF_TYPE).as_slice());
    struct_preimage.extend_from_slice(channel_id.as_slice());
    struct_preimage.extend_from_slice(&U256::from(nonce).to_be_bytes::<32>());
    struct_preimage.extend_from_slice(&transferred_amount.to_be_bytes::<32>());
    struct_preimage.extend_from_slice(&address_word(token));
    let hash_struct = keccak256(&struct_preimage);

    let mut preimage = Vec::with_capacity(2 + 2 * 32);
    preimage.extend_from_slice(&[0x19, 0x01]);
    preimage.extend_from_slice(domain_separator(chain_id, registry).as_slice());
    preimage.extend_from_slice(hash_struct.as_slice());
    keccak256(&preimage)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (u64, Address, ChannelId, u64, U256, Address) {
        (
            31337,
            Address::repeat_byte(0xAA),
            B256::repeat_byte(0x11),
            1,
            U256::from(1000u64),
            Address::repeat_byte(0xBB),
        )
    }

    #[test]
    fn digest_is_deterministic() {
        let (chain, reg, ch, nonce, amount, token) = sample();
        let a = balance_proof_digest(chain, reg, ch, nonce, amount, token);
        let b = balance_proof_digest(chain, reg, ch, nonce, amount, token);
        assert_eq!(a, b);
    }

    #[test]
    fn digest_binds_every_field() {
        let (chain, reg, ch, nonce, amount, token) = sample();
        let base = balance_proof_digest(chain, reg, ch, nonce, amount, token);

        assert_ne!(
            base,
            balance_proof_digest(chain + 1, reg, ch, nonce, amount, token)
        );
        assert_ne!(
            base,
            balance_proof_digest(chain, Address::repeat_byte(0xAC), ch, nonce, amount, token)
        );
        assert_ne!(
            base,
            balance_proof_digest(chain, reg, B256::repeat_byte(0x12), nonce, amount, token)
        );
        assert_ne!(
            base,
            balance_proof_digest(chain, reg, ch, nonce + 1, amount, token)
        );
        assert_ne!(
            base,
            balance_proof_digest(chain, reg, ch, nonce, amount + U256::from(1u64), token)
        );
        assert_ne!(
            base,
            balance_proof_digest(chain, reg, ch, nonce, amount, Address::repeat_byte(0xBC))
        );
    }

    #[test]
    fn domain_separator_is_independent_of_proof_fields() {
        let (chain, reg, ..) = sample();
        assert_eq!(domain_separator(chain, reg), domain_separator(chain, reg));
        assert_ne!(domain_separator(chain, reg), domain_separator(chain + 1, reg));
    }
}
