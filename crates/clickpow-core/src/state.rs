//! Owned, serializable game state.

use crate::bonus::BonusTable;
use crate::verifier::{ConsumedProofs, ProofKey};
use crate::{Amount, EpochNumber, Identity, Target};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle phase of a game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    NotStarted,
    Running,
    Ended,
}

/// Per-(epoch, submitter) statistics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEpochStat {
    pub clicks: u64,
    pub participated: bool,
}

/// Per-submitter lifetime statistics. Never reset.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserLifetimeStat {
    pub total_clicks: u64,
    pub total_earned: Amount,
    pub total_burned: Amount,
    pub epochs_won: u64,
}

/// One epoch's record.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EpochRecord {
    pub total_clicks: u64,
    pub participant_count: u64,
    pub leader: Option<Identity>,
    pub leader_clicks: u64,
    /// Snapshotted from the pool the first time the epoch is touched.
    pub emission_budget: Option<Amount>,
    /// Amount of the budget already paid out (reward + burn) by submissions.
    pub distributed: Amount,
    pub finalized: bool,
    pub winner: Option<Identity>,
    pub winner_clicks: u64,
    pub users: BTreeMap<Identity, UserEpochStat>,
}

impl EpochRecord {
    pub fn unspent_budget(&self) -> Amount {
        self.emission_budget
            .unwrap_or(0)
            .saturating_sub(self.distributed)
    }

    /// Copy of every field except the per-user map.
    pub(crate) fn summary(&self) -> EpochRecord {
        EpochRecord {
            total_clicks: self.total_clicks,
            participant_count: self.participant_count,
            leader: self.leader,
            leader_clicks: self.leader_clicks,
            emission_budget: self.emission_budget,
            distributed: self.distributed,
            finalized: self.finalized,
            winner: self.winner,
            winner_clicks: self.winner_clicks,
            users: BTreeMap::new(),
        }
    }
}

/// Complete mutable state of one game.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameState {
    pub phase: Phase,
    pub token_pool: Amount,
    pub game_start_time: u64,
    pub game_end_time: u64,
    pub current_epoch: EpochNumber,
    pub difficulty_target: Target,
    pub epochs: BTreeMap<EpochNumber, EpochRecord>,
    pub users: BTreeMap<Identity, UserLifetimeStat>,
    pub consumed: ConsumedProofs,
    pub bonus_tiers: BonusTable,
    pub total_clicks: u64,
    pub total_earned: Amount,
    pub total_burned: Amount,
}

impl GameState {
    /// Initial state before `start`.
    pub fn init(initial_difficulty: Target) -> Self {
        Self {
            phase: Phase::NotStarted,
            token_pool: 0,
            game_start_time: 0,
            game_end_time: 0,
            current_epoch: 0,
            difficulty_target: initial_difficulty,
            epochs: BTreeMap::new(),
            users: BTreeMap::new(),
            consumed: ConsumedProofs::new(),
            bonus_tiers: BonusTable::new(),
            total_clicks: 0,
            total_earned: 0,
            total_burned: 0,
        }
    }

    pub fn started(&self) -> bool {
        self.phase != Phase::NotStarted
    }

    pub fn ended(&self) -> bool {
        self.phase == Phase::Ended
    }

    pub fn epoch(&self, epoch: EpochNumber) -> Option<&EpochRecord> {
        self.epochs.get(&epoch)
    }

    pub(crate) fn epoch_mut(&mut self, epoch: EpochNumber) -> &mut EpochRecord {
        self.epochs.entry(epoch).or_default()
    }

    pub(crate) fn user_mut(&mut self, id: &Identity) -> &mut UserLifetimeStat {
        self.users.entry(*id).or_default()
    }

    pub(crate) fn scalars(&self) -> Scalars {
        Scalars {
            phase: self.phase,
            token_pool: self.token_pool,
            game_start_time: self.game_start_time,
            game_end_time: self.game_end_time,
            current_epoch: self.current_epoch,
            difficulty_target: self.difficulty_target,
            total_clicks: self.total_clicks,
            total_earned: self.total_earned,
            total_burned: self.total_burned,
        }
    }

    fn restore_scalars(&mut self, s: Scalars) {
        self.phase = s.phase;
        self.token_pool = s.token_pool;
        self.game_start_time = s.game_start_time;
        self.game_end_time = s.game_end_time;
        self.current_epoch = s.current_epoch;
        self.difficulty_target = s.difficulty_target;
        self.total_clicks = s.total_clicks;
        self.total_earned = s.total_earned;
        self.total_burned = s.total_burned;
    }
}

/// Fixed-size fields of [`GameState`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Scalars {
    pub phase: Phase,
    pub token_pool: Amount,
    pub game_start_time: u64,
    pub game_end_time: u64,
    pub current_epoch: EpochNumber,
    pub difficulty_target: Target,
    pub total_clicks: u64,
    pub total_earned: Amount,
    pub total_burned: Amount,
}

/// Undo log of one transition.
///
/// Records the prior value of every record on first touch, so both rollback and the invariant
/// check scale with what the transition changed, not with the history of the game. Bonus tiers are
/// not covered: transitions never write them.
#[derive(Debug)]
pub(crate) struct Journal {
    scalars: Scalars,
    epochs: BTreeMap<EpochNumber, Option<EpochRecord>>,
    epoch_users: BTreeMap<(EpochNumber, Identity), Option<UserEpochStat>>,
    users: BTreeMap<Identity, Option<UserLifetimeStat>>,
    proofs: Vec<ProofKey>,
}

impl Journal {
    pub(crate) fn begin(state: &GameState) -> Self {
        Self {
            scalars: state.scalars(),
            epochs: BTreeMap::new(),
            epoch_users: BTreeMap::new(),
            users: BTreeMap::new(),
            proofs: Vec::new(),
        }
    }

    /// Scalars as they were before the transition.
    pub(crate) fn scalars(&self) -> &Scalars {
        &self.scalars
    }

    pub(crate) fn epoch_mut<'a>(
        &mut self,
        state: &'a mut GameState,
        epoch: EpochNumber,
    ) -> &'a mut EpochRecord {
        self.epochs
            .entry(epoch)
            .or_insert_with(|| state.epochs.get(&epoch).map(EpochRecord::summary));
        state.epoch_mut(epoch)
    }

    pub(crate) fn epoch_user_mut<'a>(
        &mut self,
        state: &'a mut GameState,
        epoch: EpochNumber,
        id: &Identity,
    ) -> &'a mut UserEpochStat {
        self.epoch_users
            .entry((epoch, *id))
            .or_insert_with(|| state.epochs.get(&epoch).and_then(|r| r.users.get(id).copied()));
        self.epoch_mut(state, epoch).users.entry(*id).or_default()
    }

    pub(crate) fn user_mut<'a>(
        &mut self,
        state: &'a mut GameState,
        id: &Identity,
    ) -> &'a mut UserLifetimeStat {
        self.users
            .entry(*id)
            .or_insert_with(|| state.users.get(id).copied());
        state.user_mut(id)
    }

    pub(crate) fn record_proofs(&mut self, keys: impl IntoIterator<Item = ProofKey>) {
        self.proofs.extend(keys);
    }

    /// Touched epochs with their summary before the transition (`None` if newly created).
    pub(crate) fn touched_epochs(&self) -> impl Iterator<Item = (EpochNumber, Option<&EpochRecord>)> {
        self.epochs.iter().map(|(n, r)| (*n, r.as_ref()))
    }

    pub(crate) fn touched_users(
        &self,
    ) -> impl Iterator<Item = (&Identity, Option<&UserLifetimeStat>)> {
        self.users.iter().map(|(id, u)| (id, u.as_ref()))
    }

    /// Put every touched record of `state` back to its prior value.
    pub(crate) fn rollback(self, state: &mut GameState) {
        for (id, prev) in self.users {
            match prev {
                Some(stat) => {
                    state.users.insert(id, stat);
                }
                None => {
                    state.users.remove(&id);
                }
            }
        }
        for ((epoch, id), prev) in self.epoch_users {
            let Some(rec) = state.epochs.get_mut(&epoch) else {
                continue;
            };
            match prev {
                Some(stat) => {
                    rec.users.insert(id, stat);
                }
                None => {
                    rec.users.remove(&id);
                }
            }
        }
        for (epoch, prev) in self.epochs {
            match prev {
                Some(summary) => {
                    if let Some(rec) = state.epochs.get_mut(&epoch) {
                        let users = std::mem::take(&mut rec.users);
                        *rec = EpochRecord { users, ..summary };
                    }
                }
                None => {
                    state.epochs.remove(&epoch);
                }
            }
        }
        for key in &self.proofs {
            state.consumed.remove(key);
        }
        state.restore_scalars(self.scalars);
    }
}
