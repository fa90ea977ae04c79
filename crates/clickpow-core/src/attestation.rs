//! Signed difficulty feed.
//!
//! An attester publishes `(domain_id, epoch, target, expires_at)` signed with ed25519 over a
//! domain-separated SHA-256 digest. The [`AttestedProvider`] accepts only correctly signed values for
//! its own domain, never rolls back to an older epoch, and fails closed once the value expires.
//!
//! # Security
//!
//! - Keys should be loaded from secure storage; never log or expose the seed
//! - Seed buffers are zeroized after use

use crate::difficulty::DifficultyProvider;
use crate::hash::{be_word, sha256_domain};
use crate::limits::{max_target, min_target};
use crate::{ClickpowError, DomainId, EpochNumber, Hash32, Result, Target};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};
use zeroize::Zeroize;

/// Domain separation tag for attestation digests.
pub const ATTESTATION_DOMAIN_V1: &[u8] = b"CLICKPOW_DIFFICULTY_ATTESTATION_V1";

/// A signed, expiring difficulty target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyAttestation {
    pub domain_id: DomainId,
    pub epoch: EpochNumber,
    pub target: Target,
    pub expires_at: u64,
    pub signature: Vec<u8>,
}

impl DifficultyAttestation {
    /// Digest covered by the signature.
    pub fn signing_digest(&self) -> Hash32 {
        attestation_digest(&self.domain_id, self.epoch, &self.target, self.expires_at)
    }

    pub fn is_fresh(&self, now: u64) -> bool {
        now < self.expires_at
    }
}

fn attestation_digest(
    domain_id: &DomainId,
    epoch: EpochNumber,
    target: &Target,
    expires_at: u64,
) -> Hash32 {
    let mut buf = Vec::with_capacity(32 + 8 + 32 + 8);
    buf.extend_from_slice(&be_word(domain_id));
    buf.extend_from_slice(&epoch.to_be_bytes());
    buf.extend_from_slice(&be_word(target));
    buf.extend_from_slice(&expires_at.to_be_bytes());
    sha256_domain(ATTESTATION_DOMAIN_V1, &buf)
}

fn decode_key32(hex_str: &str, what: &str) -> Result<[u8; 32]> {
    let mut bytes = hex::decode(hex_str)
        .map_err(|e| ClickpowError::CryptoError(format!("Invalid {what} hex: {e}")))?;
    if bytes.len() != 32 {
        bytes.zeroize();
        return Err(ClickpowError::CryptoError(format!(
            "{what} must be exactly 32 bytes"
        )));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    bytes.zeroize();
    Ok(out)
}

/// Signs difficulty attestations (attester side).
#[derive(Clone)]
pub struct AttestationSigner {
    signing_key: SigningKey,
}

impl AttestationSigner {
    /// Generate a new random keypair (testing and ephemeral attesters).
    pub fn generate() -> Self {
        Self {
            signing_key: SigningKey::generate(&mut OsRng),
        }
    }

    pub fn from_seed(seed: &[u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(seed),
        }
    }

    /// Load from a hex-encoded 32-byte seed.
    pub fn from_hex(hex_seed: &str) -> Result<Self> {
        let mut seed = decode_key32(hex_seed, "seed")?;
        let signer = Self::from_seed(&seed);
        seed.zeroize();
        Ok(signer)
    }

    pub fn verifying_key_hex(&self) -> String {
        hex::encode(self.signing_key.verifying_key().to_bytes())
    }

    pub fn sign(
        &self,
        domain_id: DomainId,
        epoch: EpochNumber,
        target: Target,
        expires_at: u64,
    ) -> DifficultyAttestation {
        let digest = attestation_digest(&domain_id, epoch, &target, expires_at);
        let signature = self.signing_key.sign(&digest.0);
        DifficultyAttestation {
            domain_id,
            epoch,
            target,
            expires_at,
            signature: signature.to_bytes().to_vec(),
        }
    }
}

/// Difficulty provider backed by a signed, expiring target.
pub struct AttestedProvider {
    verifying_key: VerifyingKey,
    domain_id: DomainId,
    current: Option<DifficultyAttestation>,
}

impl AttestedProvider {
    pub fn new(verifying_key: VerifyingKey, domain_id: DomainId) -> Self {
        Self {
            verifying_key,
            domain_id,
            current: None,
        }
    }

    pub fn from_hex(verifying_key_hex: &str, domain_id: DomainId) -> Result<Self> {
        let bytes = decode_key32(verifying_key_hex, "verifying key")?;
        let verifying_key = VerifyingKey::from_bytes(&bytes)
            .map_err(|e| ClickpowError::CryptoError(format!("Invalid verifying key: {e}")))?;
        Ok(Self::new(verifying_key, domain_id))
    }

    pub fn current(&self) -> Option<&DifficultyAttestation> {
        self.current.as_ref()
    }

    /// Check signature, domain and bounds without installing.
    pub fn verify(&self, att: &DifficultyAttestation) -> Result<()> {
        if att.domain_id != self.domain_id {
            return Err(ClickpowError::SignatureInvalid(
                "attestation for a different domain".into(),
            ));
        }
        if att.target < min_target() || att.target > max_target() {
            return Err(ClickpowError::BoundedValueExceeded(
                "attested target outside [MIN_TARGET, MAX_TARGET]".into(),
            ));
        }
        let sig_bytes: [u8; 64] = att.signature.as_slice().try_into().map_err(|_| {
            ClickpowError::SignatureInvalid("signature must be 64 bytes".into())
        })?;
        let signature = Signature::from_bytes(&sig_bytes);
        self.verifying_key
            .verify(&att.signing_digest().0, &signature)
            .map_err(|e| ClickpowError::SignatureInvalid(e.to_string()))
    }
}

impl DifficultyProvider for AttestedProvider {
    fn name(&self) -> &'static str {
        "attested"
    }

    /// The attested target, only for the epoch it was signed for and only until it expires.
    fn target_at(&self, _recorded: Target, epoch: EpochNumber, now: u64) -> Result<Target> {
        match &self.current {
            Some(att) if att.epoch != epoch => Err(ClickpowError::DifficultyUnavailable(format!(
                "attestation is for epoch {}, mining epoch {epoch}",
                att.epoch
            ))),
            Some(att) if att.is_fresh(now) => Ok(att.target),
            Some(att) => Err(ClickpowError::DifficultyUnavailable(format!(
                "attestation for epoch {} expired at {}",
                att.epoch, att.expires_at
            ))),
            None => Err(ClickpowError::DifficultyUnavailable(
                "no attestation installed".into(),
            )),
        }
    }

    fn retarget(
        &self,
        recorded: Target,
        epoch: EpochNumber,
        _actual_clicks: u64,
        _target_clicks: u64,
        now: u64,
    ) -> Result<Target> {
        match &self.current {
            Some(att) if att.epoch > epoch && att.is_fresh(now) => Ok(att.target),
            _ => {
                warn!(epoch, "no fresh attestation for a later epoch at finalize; keeping target");
                Ok(recorded)
            }
        }
    }

    #[instrument(skip(self, attestation), fields(epoch = attestation.epoch))]
    fn install_attestation(&mut self, attestation: DifficultyAttestation) -> Result<()> {
        self.verify(&attestation)?;
        if let Some(prev) = &self.current {
            if attestation.epoch < prev.epoch {
                return Err(ClickpowError::InvalidInput(format!(
                    "attestation epoch {} older than installed {}",
                    attestation.epoch, prev.epoch
                )));
            }
        }
        debug!(attested_target = %attestation.target, expires_at = attestation.expires_at, "installed difficulty attestation");
        self.current = Some(attestation);
        Ok(())
    }
}
