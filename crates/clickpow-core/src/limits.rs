//! Protocol constants and hard bounds.
//!
//! These are fixed by the protocol; deployment-tunable values live in [`crate::config`].

use crate::U256;

/// Smallest accepted batch length (array length, not valid count).
pub const MIN_BATCH: usize = 50;

/// Largest accepted batch length.
pub const MAX_BATCH: usize = 500;

/// Epoch duration bounds in seconds (1 hour .. 7 days).
pub const MIN_EPOCH_DURATION_SECS: u64 = 3_600;
pub const MAX_EPOCH_DURATION_SECS: u64 = 604_800;

/// Seconds per day; target clicks and emission are quoted per day and pro-rated.
pub const SECONDS_PER_DAY: u64 = 86_400;

/// Daily-equivalent click target used for retargeting.
pub const TARGET_CLICKS_PER_DAY: u64 = 1_000_000;

/// Basis-point denominator.
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Per-submission outflow cap as a fraction of the remaining pool (10%).
pub const MAX_PAYOUT_PER_TX_BPS: u16 = 1_000;

/// Per-tier bonus cap (20%).
pub const MAX_TIER_BONUS_BPS: u16 = 2_000;

/// Aggregate bonus cap (50%).
pub const MAX_TOTAL_BONUS_BPS: u16 = 5_000;

/// Death-spiral easing factor applied after a zero-click epoch.
pub const ZERO_CLICK_EASING_FACTOR: u64 = 4;

/// Upper bound on configured epoch count.
pub const MAX_TOTAL_EPOCHS: u64 = 10_000;

/// Lowest (hardest) difficulty target.
pub fn min_target() -> U256 {
    U256::from(1_000u64)
}

/// Highest (easiest) difficulty target: `(2^256 - 1) / 2`.
pub fn max_target() -> U256 {
    U256::MAX >> 1u32
}

/// Click target for an epoch of `epoch_duration_secs`: `floor(1_000_000 * d / 86_400)`.
pub fn target_clicks_per_epoch(epoch_duration_secs: u64) -> u64 {
    ((TARGET_CLICKS_PER_DAY as u128 * epoch_duration_secs as u128) / SECONDS_PER_DAY as u128)
        as u64
}
