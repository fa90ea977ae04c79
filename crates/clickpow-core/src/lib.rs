//! clickpow core: a proof-of-work gated token emission engine.
//!
//! The engine is a pure, deterministic state machine. Time is supplied by the caller on every
//! mutating call; token movements are delegated to a [`ledger::TokenLedger`] and achievement
//! ownership to a [`bonus::AchievementRegistry`]. The matching client-side miner lives in
//! [`miner`] and shares the proof packing in [`hash`] byte for byte with the verifier.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

pub mod attestation;
pub mod bonus;
pub mod config;
pub mod difficulty;
pub mod distributor;
pub mod engine;
pub mod events;
pub mod hash;
pub mod invariants;
pub mod ledger;
pub mod limits;
pub mod math;
pub mod metrics;
pub mod miner;
pub mod queries;
pub mod state;
pub mod store;
pub mod verifier;

pub use primitive_types::U256;

pub use config::GameConfig;
pub use engine::Engine;
pub use events::GameEvent;

/// Proof nonce (a full 256-bit word in the hashed message).
pub type Nonce = U256;

/// Difficulty target: a proof is valid iff `hash < target`.
pub type Target = U256;

/// Deployment/network binding mixed into every proof hash.
pub type DomainId = U256;

/// Token amount in base units.
pub type Amount = u128;

/// 1-indexed epoch number.
pub type EpochNumber = u64;

/// 32-byte hash newtype used for proof digests and snapshot commitments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    /// Interpret the digest as a big-endian unsigned 256-bit integer.
    pub fn to_u256(&self) -> U256 {
        U256::from_big_endian(&self.0)
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

/// 20-byte participant identity (the submitter address).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Identity(pub [u8; 20]);

impl Identity {
    pub const ZERO: Identity = Identity([0u8; 20]);

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({self})")
    }
}

impl FromStr for Identity {
    type Err = ClickpowError;

    fn from_str(s: &str) -> Result<Self> {
        let raw = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(raw)
            .map_err(|e| ClickpowError::InvalidInput(format!("identity is not hex: {e}")))?;
        if bytes.len() != 20 {
            return Err(ClickpowError::InvalidInput(format!(
                "identity must be 20 bytes, got {}",
                bytes.len()
            )));
        }
        let mut out = [0u8; 20];
        out.copy_from_slice(&bytes);
        Ok(Identity(out))
    }
}

impl Serialize for Identity {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Identity {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Parse a 256-bit value from `0x`-prefixed hex or plain decimal text.
pub fn parse_u256(s: &str) -> Result<U256> {
    let s = s.trim();
    if let Some(raw) = s.strip_prefix("0x") {
        if raw.is_empty() || raw.len() > 64 {
            return Err(ClickpowError::InvalidInput(format!(
                "hex word must be 1..=64 digits, got {}",
                raw.len()
            )));
        }
        let padded = format!("{raw:0>64}");
        let bytes = hex::decode(padded)
            .map_err(|e| ClickpowError::InvalidInput(format!("invalid hex word: {e}")))?;
        return Ok(U256::from_big_endian(&bytes));
    }
    U256::from_dec_str(s)
        .map_err(|e| ClickpowError::InvalidInput(format!("invalid decimal word: {e:?}")))
}

/// Unified error type for clickpow core operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ClickpowError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // Authorization errors
    #[error("Unauthorized: {caller} is not the game owner")]
    Unauthorized { caller: Identity },

    // Lifecycle preconditions
    #[error("Game already started")]
    GameAlreadyStarted,

    #[error("Game not started")]
    GameNotStarted,

    #[error("Game has ended")]
    GameHasEnded,

    #[error("Game not over: ends at {ends_at}")]
    GameNotOver { ends_at: u64 },

    #[error("Epoch {epoch} not over: ends at {ends_at}")]
    EpochNotOver { epoch: EpochNumber, ends_at: u64 },

    #[error("Epoch {epoch} already finalized")]
    EpochAlreadyFinalized { epoch: EpochNumber },

    #[error("Unknown epoch {epoch}")]
    UnknownEpoch { epoch: EpochNumber },

    #[error("Bonus tiers are frozen once the game has started")]
    TiersFrozen,

    // Submission validation
    #[error("Batch too small: {len} < {min}")]
    BatchTooSmall { len: usize, min: usize },

    #[error("Batch too large: {len} > {max}")]
    BatchTooLarge { len: usize, max: usize },

    #[error("No valid proofs in batch")]
    NoValidProofs,

    // Funding
    #[error("Insufficient custody balance: need {required}, have {available}")]
    InsufficientCustody { required: Amount, available: Amount },

    // Difficulty source
    #[error("Difficulty unavailable: {0}")]
    DifficultyUnavailable(String),

    // Input / arithmetic
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bounded value exceeded: {0}")]
    BoundedValueExceeded(String),

    // Cryptographic errors
    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Signature invalid: {0}")]
    SignatureInvalid(String),

    // Collaborators
    #[error("Ledger error: {0}")]
    LedgerError(String),

    #[error("Invariant violated: {0}")]
    InvariantViolation(&'static str),

    #[error("Storage error: {0}")]
    StorageError(String),
}

pub type Result<T> = std::result::Result<T, ClickpowError>;
