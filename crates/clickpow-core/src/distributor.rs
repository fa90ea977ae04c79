//! Reward and burn distribution.
//!
//! All functions here are pure: they take the relevant slice of state and return amounts. The
//! engine applies them to [`crate::state::GameState`] and turns them into ledger movements.
//!
//! Conservation: every amount that leaves the pool is either paid to an identity or burned, and a
//! single submission never takes more than `min(pool * 10%, budget - distributed)`.

use crate::limits::{BPS_DENOMINATOR, MAX_PAYOUT_PER_TX_BPS, SECONDS_PER_DAY};
use crate::math::{add, clamp_pair, floor_bps, mul_div_floor, mul_mul_div_floor, split_half, Bps};
use crate::{Amount, Result};

/// Emission budget for one epoch, pro-rated from the daily rate.
///
/// `floor(pool * daily_bps * duration / (86_400 * 10_000))`
pub fn emission_budget(pool: Amount, daily_bps: Bps, epoch_duration_secs: u64) -> Result<Amount> {
    mul_mul_div_floor(
        pool,
        daily_bps.as_u128(),
        epoch_duration_secs as u128,
        SECONDS_PER_DAY as u128 * BPS_DENOMINATOR as u128,
    )
}

/// Emission per valid click: `floor(budget / target_clicks)`.
pub fn per_click(budget: Amount, target_clicks: u64) -> Amount {
    if target_clicks == 0 {
        return 0;
    }
    budget / target_clicks as u128
}

/// Largest outflow a single submission may cause against the current pool.
pub fn per_submission_cap(pool: Amount) -> Result<Amount> {
    mul_div_floor(
        pool,
        MAX_PAYOUT_PER_TX_BPS as u128,
        BPS_DENOMINATOR as u128,
    )
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SubmissionPayout {
    /// `valid_clicks * per_click` before splitting.
    pub gross: Amount,
    /// Paid to the submitter (their half plus bonus, after clamping).
    pub earned: Amount,
    /// Sent to the burn sink (after clamping).
    pub burned: Amount,
    /// Bonus portion included in `earned` before clamping.
    pub bonus: Amount,
    /// Whether the outflow limit reduced the payout.
    pub clamped: bool,
}

impl SubmissionPayout {
    pub fn outflow(&self) -> Amount {
        self.earned + self.burned
    }
}

/// Payout for one accepted batch.
///
/// `remaining_budget` is `emission_budget - distributed` for the epoch. Exceeding the limit scales
/// both sides down proportionally; it is never an error.
pub fn submission_payout(
    valid_clicks: u64,
    per_click: Amount,
    bonus_bps: Bps,
    pool: Amount,
    remaining_budget: Amount,
) -> Result<SubmissionPayout> {
    let gross = mul_div_floor(per_click, valid_clicks as u128, 1)?;
    let (user_share, burn_share) = split_half(gross);
    let bonus = floor_bps(user_share, bonus_bps)?;
    let earned = add(user_share, bonus)?;

    let limit = per_submission_cap(pool)?.min(remaining_budget);
    let (earned_out, burned_out) = clamp_pair(earned, burn_share, limit)?;
    let clamped = earned_out != earned || burned_out != burn_share;

    Ok(SubmissionPayout {
        gross,
        earned: earned_out,
        burned: burned_out,
        bonus,
        clamped,
    })
}

/// Amounts settled when an epoch is finalized.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EpochSettlement {
    /// Unspent emission budget, burned.
    pub burned_unused: Amount,
    /// Winner's half of the winner bonus.
    pub winner_bonus: Amount,
    /// Burned half of the winner bonus.
    pub winner_bonus_burned: Amount,
    /// Keeper incentive paid to whoever finalized.
    pub finalizer_reward: Amount,
}

impl EpochSettlement {
    pub fn total_burned(&self) -> Amount {
        self.burned_unused + self.winner_bonus_burned
    }

    pub fn total_outflow(&self) -> Amount {
        self.burned_unused + self.winner_bonus + self.winner_bonus_burned + self.finalizer_reward
    }
}

/// Settlement for an epoch with `budget` of which `distributed` was already paid out.
///
/// Order: burn the unspent budget, then draw the winner bonus (only if there is a winner), then the
/// finalizer reward. Each draw is bounded by what is left in the pool.
pub fn epoch_settlement(
    budget: Amount,
    distributed: Amount,
    pool: Amount,
    has_winner: bool,
    winner_bonus_bps: Bps,
    finalizer_reward_bps: Bps,
) -> Result<EpochSettlement> {
    let burned_unused = budget.saturating_sub(distributed).min(pool);
    let mut remaining = pool - burned_unused;

    let (winner_bonus, winner_bonus_burned) = if has_winner {
        let gross = floor_bps(budget, winner_bonus_bps)?.min(remaining);
        remaining -= gross;
        split_half(gross)
    } else {
        (0, 0)
    };

    let finalizer_reward = floor_bps(budget, finalizer_reward_bps)?.min(remaining);

    Ok(EpochSettlement {
        burned_unused,
        winner_bonus,
        winner_bonus_burned,
        finalizer_reward,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const TOKEN: Amount = 1_000_000_000_000_000_000;
    const POOL: Amount = 100_000_000 * TOKEN;

    fn bps(v: u16) -> Bps {
        Bps::new(v).unwrap()
    }

    #[test]
    fn daily_budget_is_two_percent() {
        assert_eq!(emission_budget(POOL, bps(200), 86_400).unwrap(), 2_000_000 * TOKEN);
        assert_eq!(emission_budget(POOL, bps(200), 3_600).unwrap(), 2_000_000 * TOKEN / 24);
    }

    #[test]
    fn fifty_clicks_split_evenly() {
        let budget = emission_budget(POOL, bps(200), 86_400).unwrap();
        let pc = per_click(budget, 1_000_000);
        assert_eq!(pc, 2 * TOKEN);
        let p = submission_payout(50, pc, Bps::ZERO, POOL, budget).unwrap();
        assert_eq!(p.gross, 100 * TOKEN);
        assert_eq!(p.earned, 50 * TOKEN);
        assert_eq!(p.burned, 50 * TOKEN);
        assert!(!p.clamped);
    }

    #[test]
    fn bonus_raises_only_the_user_half() {
        let p = submission_payout(10, 100, bps(5_000), POOL, POOL).unwrap();
        assert_eq!(p.burned, 500);
        assert_eq!(p.bonus, 250);
        assert_eq!(p.earned, 750);
    }

    #[test]
    fn payout_is_clamped_to_remaining_budget() {
        let p = submission_payout(100, 10, Bps::ZERO, POOL, 300).unwrap();
        assert!(p.clamped);
        assert_eq!(p.outflow(), 300);
        assert_eq!(p.earned, 150);
    }

    #[test]
    fn payout_is_clamped_to_tenth_of_pool() {
        let p = submission_payout(100, 10, Bps::ZERO, 1_000, 1_000).unwrap();
        assert!(p.clamped);
        assert_eq!(p.outflow(), 100);
    }

    #[test]
    fn exhausted_budget_pays_nothing() {
        let p = submission_payout(100, 10, Bps::ZERO, POOL, 0).unwrap();
        assert_eq!(p.outflow(), 0);
    }

    #[test]
    fn empty_epoch_burns_whole_budget_and_pays_no_winner() {
        let s = epoch_settlement(1_000, 0, 10_000, false, bps(1_000), bps(10)).unwrap();
        assert_eq!(s.burned_unused, 1_000);
        assert_eq!(s.winner_bonus, 0);
        assert_eq!(s.winner_bonus_burned, 0);
        assert_eq!(s.finalizer_reward, 1);
    }

    #[test]
    fn winner_bonus_is_split_half_and_half() {
        let s = epoch_settlement(10_000, 4_000, 1_000_000, true, bps(1_000), bps(10)).unwrap();
        assert_eq!(s.burned_unused, 6_000);
        assert_eq!(s.winner_bonus, 500);
        assert_eq!(s.winner_bonus_burned, 500);
        assert_eq!(s.finalizer_reward, 10);
    }

    #[test]
    fn settlement_never_exceeds_pool() {
        let s = epoch_settlement(10_000, 0, 10_050, true, bps(1_000), bps(10)).unwrap();
        assert_eq!(s.total_outflow(), 10_050);
        assert_eq!(s.winner_bonus + s.winner_bonus_burned, 50);
        assert_eq!(s.finalizer_reward, 0);
    }

    proptest! {
        #[test]
        fn submission_outflow_is_bounded(
            clicks in 1u64..=500,
            pc in 0u128..1u128 << 80,
            bonus in 0u16..=5_000,
            pool in 0u128..1u128 << 100,
            remaining in 0u128..1u128 << 100,
        ) {
            let p = submission_payout(clicks, pc, bps(bonus), pool, remaining).unwrap();
            prop_assert!(p.outflow() <= pool / 10);
            prop_assert!(p.outflow() <= remaining);
            prop_assert!(p.outflow() <= p.gross + p.bonus);
        }

        #[test]
        fn settlement_outflow_is_bounded_by_pool(
            budget in 0u128..1u128 << 100,
            distributed in 0u128..1u128 << 100,
            pool in 0u128..1u128 << 100,
            winner in any::<bool>(),
        ) {
            let s = epoch_settlement(budget, distributed, pool, winner, bps(1_000), bps(10)).unwrap();
            prop_assert!(s.total_outflow() <= pool);
            if !winner {
                prop_assert_eq!(s.winner_bonus + s.winner_bonus_burned, 0);
            }
        }
    }
}
