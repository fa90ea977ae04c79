//! Difficulty retargeting.
//!
//! [`retarget`] is the single-step rule applied when an epoch closes:
//! - zero clicks: `min(old * 4, MAX_TARGET)` (death-spiral guard)
//! - otherwise: `clamp(old * target_clicks / actual, MIN_TARGET, MAX_TARGET)`, floor division
//!
//! Where the target comes from is pluggable through [`DifficultyProvider`]: the on-chain adjuster
//! applies [`retarget`]; the attested provider (see [`crate::attestation`]) follows a signed feed.

use crate::attestation::DifficultyAttestation;
use crate::limits::{max_target, min_target, ZERO_CLICK_EASING_FACTOR};
use crate::{ClickpowError, EpochNumber, Result, Target, U256};
use primitive_types::U512;

/// Compute the next target from the previous one and the epoch's click totals.
pub fn retarget(old: Target, actual_clicks: u64, target_clicks: u64) -> Target {
    let max = max_target();
    let min = min_target();
    if actual_clicks == 0 {
        return old
            .saturating_mul(U256::from(ZERO_CLICK_EASING_FACTOR))
            .min(max);
    }
    let scaled: U512 = old.full_mul(U256::from(target_clicks)) / U512::from(actual_clicks);
    let next = U256::try_from(scaled).unwrap_or(max);
    next.clamp(min, max)
}

/// Source of the difficulty target.
pub trait DifficultyProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Target proofs for `epoch` are checked against at `now`, given the recorded one.
    fn target_at(&self, recorded: Target, epoch: EpochNumber, now: u64) -> Result<Target>;

    /// Target to record when `epoch` closes with `actual_clicks`.
    fn retarget(
        &self,
        recorded: Target,
        epoch: EpochNumber,
        actual_clicks: u64,
        target_clicks: u64,
        now: u64,
    ) -> Result<Target>;

    /// Install a newer signed target. Only attested providers accept this.
    fn install_attestation(&mut self, _attestation: DifficultyAttestation) -> Result<()> {
        Err(ClickpowError::InvalidInput(format!(
            "{} difficulty does not accept attestations",
            self.name()
        )))
    }
}

/// Retargets from observed clicks.
#[derive(Clone, Copy, Debug, Default)]
pub struct OnChainAdjuster;

impl DifficultyProvider for OnChainAdjuster {
    fn name(&self) -> &'static str {
        "on_chain"
    }

    fn target_at(&self, recorded: Target, _epoch: EpochNumber, _now: u64) -> Result<Target> {
        Ok(recorded)
    }

    fn retarget(
        &self,
        recorded: Target,
        _epoch: EpochNumber,
        actual_clicks: u64,
        target_clicks: u64,
        _now: u64,
    ) -> Result<Target> {
        Ok(retarget(recorded, actual_clicks, target_clicks))
    }
}
