//! Proof hashing shared by the verifier and the miner.
//!
//! The proof message is the packed 116-byte concatenation
//! `identity[20] || be32(nonce) || be32(epoch) || be32(domain_id)`, hashed with Keccak-256.
//! Any change here changes which proofs are valid; the miner must call exactly these functions.

use crate::{DomainId, EpochNumber, Hash32, Identity, Nonce, Target, U256};
use sha2::Sha256;
use sha3::{Digest, Keccak256};

/// Length of the packed proof message.
pub const PROOF_MESSAGE_LEN: usize = 20 + 32 + 32 + 32;

/// Big-endian 32-byte encoding of a 256-bit word.
pub fn be_word(value: &U256) -> [u8; 32] {
    let mut out = [0u8; 32];
    value.to_big_endian(&mut out);
    out
}

/// Build the packed proof message.
pub fn proof_message(
    identity: &Identity,
    nonce: &Nonce,
    epoch: EpochNumber,
    domain_id: &DomainId,
) -> [u8; PROOF_MESSAGE_LEN] {
    let mut msg = [0u8; PROOF_MESSAGE_LEN];
    msg[..20].copy_from_slice(identity.as_bytes());
    msg[20..52].copy_from_slice(&be_word(nonce));
    msg[52..84].copy_from_slice(&be_word(&U256::from(epoch)));
    msg[84..].copy_from_slice(&be_word(domain_id));
    msg
}

/// Keccak-256 of a byte slice.
pub fn keccak256(data: &[u8]) -> Hash32 {
    let mut hasher = Keccak256::new();
    hasher.update(data);
    Hash32(hasher.finalize().into())
}

/// Digest of a proof message.
pub fn proof_hash(
    identity: &Identity,
    nonce: &Nonce,
    epoch: EpochNumber,
    domain_id: &DomainId,
) -> Hash32 {
    keccak256(&proof_message(identity, nonce, epoch, domain_id))
}

/// True iff the proof digest, read as a big-endian integer, is strictly below `target`.
pub fn meets_target(
    identity: &Identity,
    nonce: &Nonce,
    epoch: EpochNumber,
    domain_id: &DomainId,
    target: &Target,
) -> bool {
    proof_hash(identity, nonce, epoch, domain_id).to_u256() < *target
}

/// Compute a domain-separated SHA-256 hash: `H(domain || data)`.
pub fn sha256_domain(domain: &[u8], data: &[u8]) -> Hash32 {
    let mut hasher = Sha256::new();
    hasher.update(domain);
    hasher.update(data);
    Hash32(hasher.finalize().into())
}
