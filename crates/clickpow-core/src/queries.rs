//! Read-only query surface.
//!
//! Queries never mutate state. Values that depend on time take `now` explicitly so they agree with
//! what a submission at the same instant would see.

use crate::bonus::{AchievementRegistry, BonusTier};
use crate::distributor::{emission_budget, per_click};
use crate::engine::{effective_epoch, epoch_end, Engine};
use crate::hash;
use crate::ledger::TokenLedger;
use crate::math::Bps;
use crate::state::{Phase, UserLifetimeStat};
use crate::{Amount, EpochNumber, Identity, Nonce, Result, Target};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameStats {
    pub phase: Phase,
    pub token_pool: Amount,
    pub game_start_time: u64,
    pub game_end_time: u64,
    pub current_epoch: EpochNumber,
    pub total_epochs: u64,
    pub epoch_duration_secs: u64,
    pub difficulty_target: Target,
    pub total_clicks: u64,
    pub total_earned: Amount,
    pub total_burned: Amount,
    pub participants: u64,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CurrentEpochInfo {
    pub epoch: EpochNumber,
    pub start_time: u64,
    pub end_time: u64,
    pub total_clicks: u64,
    pub participant_count: u64,
    pub leader: Option<Identity>,
    pub leader_clicks: u64,
    /// Assigned budget, or what would be assigned if the epoch were touched now.
    pub emission_budget: Amount,
    pub emission_per_click: Amount,
    pub distributed: Amount,
    pub difficulty_target: Target,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEpochStatsWithRank {
    pub clicks: u64,
    pub participated: bool,
    /// `1 + number of participants with strictly more clicks`; `0` if absent.
    pub rank: u64,
}

impl<L: TokenLedger, R: AchievementRegistry> Engine<L, R> {
    pub fn get_game_stats(&self) -> GameStats {
        let s = self.state();
        GameStats {
            phase: s.phase,
            token_pool: s.token_pool,
            game_start_time: s.game_start_time,
            game_end_time: s.game_end_time,
            current_epoch: s.current_epoch,
            total_epochs: self.config().total_epochs,
            epoch_duration_secs: self.config().epoch_duration_secs,
            difficulty_target: s.difficulty_target,
            total_clicks: s.total_clicks,
            total_earned: s.total_earned,
            total_burned: s.total_burned,
            participants: s.users.values().filter(|u| u.total_clicks > 0).count() as u64,
        }
    }

    /// Information about the effective epoch at `now`. `None` before start.
    pub fn get_current_epoch_info(&self, now: u64) -> Result<Option<CurrentEpochInfo>> {
        let s = self.state();
        let epoch = effective_epoch(self.config(), s, now);
        if epoch == 0 {
            return Ok(None);
        }
        let rec = s.epoch(epoch).cloned().unwrap_or_default();
        let budget = match rec.emission_budget {
            Some(b) => b,
            None => emission_budget(
                s.token_pool,
                self.config().daily_emission_bps,
                self.config().epoch_duration_secs,
            )?,
        };
        Ok(Some(CurrentEpochInfo {
            epoch,
            start_time: self.config().epoch_start(s.game_start_time, epoch),
            end_time: epoch_end(self.config(), s, epoch),
            total_clicks: rec.total_clicks,
            participant_count: rec.participant_count,
            leader: rec.leader,
            leader_clicks: rec.leader_clicks,
            emission_budget: budget,
            emission_per_click: per_click(budget, self.config().target_clicks()),
            distributed: rec.distributed,
            difficulty_target: s.difficulty_target,
        }))
    }

    pub fn get_user_lifetime_stats(&self, user: &Identity) -> UserLifetimeStat {
        self.state().users.get(user).copied().unwrap_or_default()
    }

    pub fn get_user_epoch_stats_with_rank(
        &self,
        epoch: EpochNumber,
        user: &Identity,
    ) -> UserEpochStatsWithRank {
        let Some(rec) = self.state().epoch(epoch) else {
            return UserEpochStatsWithRank::default();
        };
        let Some(stat) = rec.users.get(user) else {
            return UserEpochStatsWithRank::default();
        };
        let ahead = rec
            .users
            .values()
            .filter(|other| other.clicks > stat.clicks)
            .count() as u64;
        UserEpochStatsWithRank {
            clicks: stat.clicks,
            participated: stat.participated,
            rank: ahead + 1,
        }
    }

    /// Whether `nonce` would be accepted for `(submitter, epoch)` against the target in force at
    /// `now`. Fails closed (`false`) when the difficulty source is unavailable or the epoch is
    /// already finalized.
    pub fn is_valid_proof(
        &self,
        submitter: &Identity,
        nonce: &Nonce,
        epoch: EpochNumber,
        now: u64,
    ) -> bool {
        if self.state().epoch(epoch).is_some_and(|r| r.finalized) {
            return false;
        }
        let Ok(target) = self
            .difficulty()
            .target_at(self.state().difficulty_target, epoch, now)
        else {
            return false;
        };
        hash::meets_target(submitter, nonce, epoch, &self.config().domain_id, &target)
            && !self.state().consumed.contains(submitter, nonce, epoch)
    }

    pub fn get_bonus_tiers(&self) -> Vec<BonusTier> {
        self.state().bonus_tiers.tiers()
    }

    pub fn calculate_bonus(&self, user: &Identity) -> Bps {
        self.state()
            .bonus_tiers
            .calculate(user, self.achievements())
    }
}
