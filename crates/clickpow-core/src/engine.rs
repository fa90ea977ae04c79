//! Game engine: epoch lifecycle, submissions and settlement.
//!
//! Every mutating call follows the same shape:
//! 1. check preconditions against the committed state
//! 2. run the transition on a journaled draft, collecting ledger [`Movement`]s and [`GameEvent`]s
//! 3. check invariants on the records the draft touched and that custody covers the outflow
//! 4. apply the movements and keep the draft; any failure replays the journal backwards
//!
//! Any `Err` therefore leaves the game exactly as it was. The cost of a call follows the size of
//! the batch and the number of epochs it settles, not the length of the game: the draft owns the
//! state instead of copying it, and proofs of finalized epochs are pruned after commit.

use crate::attestation::{AttestedProvider, DifficultyAttestation};
use crate::bonus::{AchievementRegistry, AchievementTier, NoAchievements};
use crate::config::{DifficultyMode, GameConfig};
use crate::difficulty::{DifficultyProvider, OnChainAdjuster};
use crate::distributor::{emission_budget, epoch_settlement, per_click, submission_payout};
use crate::events::GameEvent;
use crate::invariants::{check_invariants, check_transition};
use crate::ledger::{apply_movements, Movement, TokenLedger};
use crate::limits::{MAX_BATCH, MIN_BATCH};
use crate::math::{add, sub};
use crate::metrics::EngineMetrics;
use crate::state::{EpochRecord, GameState, Journal, Phase, UserEpochStat, UserLifetimeStat};
use crate::verifier::{BatchVerification, ProofKey};
use crate::{Amount, ClickpowError, EpochNumber, Identity, Nonce, Result, Target};
use tracing::{debug, info, instrument, warn};

/// Result of an accepted submission.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Epoch the clicks were credited to.
    pub epoch: EpochNumber,
    pub valid_clicks: u64,
    pub above_target: usize,
    pub replayed: usize,
    pub earned: Amount,
    pub burned: Amount,
    /// Every event of the transition, including catch-up finalizations.
    pub events: Vec<GameEvent>,
}

/// `max(current_epoch, min(total_epochs, (now - start) / duration + 1))`; `0` before start.
pub fn effective_epoch(config: &GameConfig, state: &GameState, now: u64) -> EpochNumber {
    if !state.started() {
        return 0;
    }
    state
        .current_epoch
        .max(config.time_epoch(state.game_start_time, now))
}

/// Timestamp at which `epoch` is over.
pub fn epoch_end(config: &GameConfig, state: &GameState, epoch: EpochNumber) -> u64 {
    config
        .epoch_start(state.game_start_time, epoch)
        .saturating_add(config.epoch_duration_secs)
}

/// State under transition. Record writes go through the journal so they can be undone.
struct Draft {
    state: GameState,
    journal: Journal,
    movements: Vec<Movement>,
    events: Vec<GameEvent>,
}

impl Draft {
    fn begin(state: GameState) -> Self {
        let journal = Journal::begin(&state);
        Self {
            state,
            journal,
            movements: Vec::new(),
            events: Vec::new(),
        }
    }

    fn rollback(self) -> GameState {
        let Draft {
            mut state, journal, ..
        } = self;
        journal.rollback(&mut state);
        state
    }

    fn epoch_mut(&mut self, epoch: EpochNumber) -> &mut EpochRecord {
        self.journal.epoch_mut(&mut self.state, epoch)
    }

    fn epoch_user_mut(&mut self, epoch: EpochNumber, id: &Identity) -> &mut UserEpochStat {
        self.journal.epoch_user_mut(&mut self.state, epoch, id)
    }

    fn user_mut(&mut self, id: &Identity) -> &mut UserLifetimeStat {
        self.journal.user_mut(&mut self.state, id)
    }

    fn accept_batch(
        &mut self,
        submitter: &Identity,
        nonces: &[Nonce],
        epoch: EpochNumber,
        config: &GameConfig,
        target: &Target,
    ) -> BatchVerification {
        let verification =
            self.state
                .consumed
                .accept_batch(submitter, nonces, epoch, &config.domain_id, target);
        self.journal
            .record_proofs(verification.accepted.iter().map(|nonce| ProofKey {
                submitter: *submitter,
                nonce: *nonce,
                epoch,
            }));
        verification
    }

    fn transfer(&mut self, to: Identity, amount: Amount) {
        if amount > 0 {
            self.movements.push(Movement::Transfer { to, amount });
        }
    }

    fn burn(&mut self, amount: Amount) {
        if amount > 0 {
            self.movements.push(Movement::Burn { amount });
        }
    }
}

fn provider_for(config: &GameConfig) -> Result<Box<dyn DifficultyProvider>> {
    Ok(match &config.difficulty {
        DifficultyMode::OnChain => Box::new(OnChainAdjuster),
        DifficultyMode::Attested { verifying_key_hex } => Box::new(AttestedProvider::from_hex(
            verifying_key_hex,
            config.domain_id,
        )?),
    })
}

/// The click economy engine.
pub struct Engine<L: TokenLedger, R: AchievementRegistry = NoAchievements> {
    config: GameConfig,
    state: GameState,
    ledger: L,
    achievements: R,
    difficulty: Box<dyn DifficultyProvider>,
    metrics: EngineMetrics,
    events: Vec<GameEvent>,
}

impl<L: TokenLedger, R: AchievementRegistry> Engine<L, R> {
    /// Validate `config` and create a game that has not started yet.
    pub fn new(config: GameConfig, ledger: L, achievements: R) -> Result<Self> {
        config.validate()?;
        let state = GameState::init(config.initial_difficulty);
        Self::assemble(config, state, ledger, achievements)
    }

    /// Rebuild an engine around previously persisted state.
    pub fn from_state(config: GameConfig, state: GameState, ledger: L, achievements: R) -> Result<Self> {
        config.validate()?;
        check_invariants(&state, config.total_epochs, state.token_pool, state.phase)?;
        Self::assemble(config, state, ledger, achievements)
    }

    fn assemble(config: GameConfig, state: GameState, ledger: L, achievements: R) -> Result<Self> {
        let difficulty = provider_for(&config)?;
        let metrics = EngineMetrics::new();
        metrics.current_epoch.set(state.current_epoch);
        Ok(Self {
            config,
            state,
            ledger,
            achievements,
            difficulty,
            metrics,
            events: Vec::new(),
        })
    }

    /// Replace the difficulty source chosen from the configuration.
    pub fn with_difficulty_provider(mut self, provider: Box<dyn DifficultyProvider>) -> Self {
        self.difficulty = provider;
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn state(&self) -> &GameState {
        &self.state
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Direct ledger access for funding and inspection; the engine never caches balances.
    pub fn ledger_mut(&mut self) -> &mut L {
        &mut self.ledger
    }

    pub fn achievements(&self) -> &R {
        &self.achievements
    }

    pub fn difficulty(&self) -> &dyn DifficultyProvider {
        self.difficulty.as_ref()
    }

    pub fn metrics(&self) -> &EngineMetrics {
        &self.metrics
    }

    /// Take all events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<GameEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn effective_epoch(&self, now: u64) -> EpochNumber {
        effective_epoch(&self.config, &self.state, now)
    }

    fn ensure_owner(&self, caller: &Identity) -> Result<()> {
        if *caller != self.config.owner {
            return Err(ClickpowError::Unauthorized { caller: *caller });
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Configuration
    // -------------------------------------------------------------------------

    /// Set one bonus tier (`0` removes it). Owner only, before start.
    #[instrument(skip(self), fields(caller = %caller))]
    pub fn set_bonus_tier(
        &mut self,
        caller: &Identity,
        tier: AchievementTier,
        bonus_bps: u16,
    ) -> Result<()> {
        self.set_bonus_tiers(caller, &[(tier, bonus_bps)])
    }

    /// Set several tiers at once; either all apply or none do.
    #[instrument(skip(self, tiers), fields(caller = %caller, count = tiers.len()))]
    pub fn set_bonus_tiers(
        &mut self,
        caller: &Identity,
        tiers: &[(AchievementTier, u16)],
    ) -> Result<()> {
        self.ensure_owner(caller)?;
        if self.state.started() {
            return Err(ClickpowError::TiersFrozen);
        }
        let mut table = self.state.bonus_tiers.clone();
        for (tier, bps) in tiers {
            table.set(*tier, *bps)?;
        }
        self.state.bonus_tiers = table;
        debug!(tiers = self.state.bonus_tiers.len(), "bonus tiers updated");
        Ok(())
    }

    /// Install a signed difficulty value. The signature is the authority, so any caller may relay.
    pub fn install_attestation(&mut self, attestation: DifficultyAttestation) -> Result<()> {
        self.difficulty.install_attestation(attestation)
    }

    // -------------------------------------------------------------------------
    // Lifecycle
    // -------------------------------------------------------------------------

    /// Start the game with a pool already held by custody.
    #[instrument(skip(self), fields(caller = %caller))]
    pub fn start(&mut self, caller: &Identity, pool: Amount, now: u64) -> Result<GameEvent> {
        self.ensure_owner(caller)?;
        if self.state.started() {
            return Err(ClickpowError::GameAlreadyStarted);
        }
        if pool == 0 {
            return Err(ClickpowError::InvalidInput("pool must be non-zero".into()));
        }
        let available = self.ledger.balance_of(&self.config.custody);
        if available < pool {
            return Err(ClickpowError::InsufficientCustody {
                required: pool,
                available,
            });
        }
        let duration = self
            .config
            .epoch_duration_secs
            .checked_mul(self.config.total_epochs)
            .ok_or_else(|| ClickpowError::BoundedValueExceeded("game duration".into()))?;
        let end_time = now
            .checked_add(duration)
            .ok_or_else(|| ClickpowError::BoundedValueExceeded("game end time".into()))?;

        let event = GameEvent::GameStarted {
            token_pool: pool,
            start_time: now,
            end_time,
        };
        self.transact(|this, draft| {
            draft.state.phase = Phase::Running;
            draft.state.token_pool = pool;
            draft.state.game_start_time = now;
            draft.state.game_end_time = end_time;
            draft.state.current_epoch = 1;
            draft.state.difficulty_target = this.config.initial_difficulty;
            draft.events.push(event.clone());
            Ok(())
        })?;
        info!(pool, start = now, end = end_time, "game started");
        Ok(event)
    }

    /// Submit a batch of nonces for the effective epoch at `now`.
    #[instrument(skip(self, nonces), fields(submitter = %submitter, batch = nonces.len()))]
    pub fn submit(
        &mut self,
        submitter: &Identity,
        nonces: &[Nonce],
        now: u64,
    ) -> Result<SubmitOutcome> {
        let result = self.try_submit(submitter, nonces, now);
        match &result {
            Ok(outcome) => {
                self.metrics.submissions_accepted.inc();
                self.metrics.clicks_total.inc_by(outcome.valid_clicks);
                self.metrics
                    .proofs_rejected
                    .inc_by((outcome.above_target + outcome.replayed) as u64);
            }
            Err(e) => {
                self.metrics.submissions_rejected.inc();
                debug!(error = %e, "submission rejected");
            }
        }
        result
    }

    fn try_submit(
        &mut self,
        submitter: &Identity,
        nonces: &[Nonce],
        now: u64,
    ) -> Result<SubmitOutcome> {
        if !self.state.started() {
            return Err(ClickpowError::GameNotStarted);
        }
        if self.state.ended() || now >= self.state.game_end_time {
            return Err(ClickpowError::GameHasEnded);
        }
        if nonces.len() < MIN_BATCH {
            return Err(ClickpowError::BatchTooSmall {
                len: nonces.len(),
                min: MIN_BATCH,
            });
        }
        if nonces.len() > MAX_BATCH {
            return Err(ClickpowError::BatchTooLarge {
                len: nonces.len(),
                max: MAX_BATCH,
            });
        }

        let (mut outcome, events) =
            self.transact(|this, draft| this.submit_into(draft, submitter, nonces, now))?;
        outcome.events = events;
        debug!(
            epoch = outcome.epoch,
            valid = outcome.valid_clicks,
            above_target = outcome.above_target,
            replayed = outcome.replayed,
            earned = outcome.earned,
            burned = outcome.burned,
            "batch accepted"
        );
        Ok(outcome)
    }

    /// Finalize `epoch` (and any earlier open epoch first). Anyone may call once it is over.
    #[instrument(skip(self), fields(caller = %caller))]
    pub fn finalize(
        &mut self,
        caller: &Identity,
        epoch: EpochNumber,
        now: u64,
    ) -> Result<Vec<GameEvent>> {
        if !self.state.started() {
            return Err(ClickpowError::GameNotStarted);
        }
        if epoch == 0 || epoch > self.config.total_epochs {
            return Err(ClickpowError::UnknownEpoch { epoch });
        }
        let ends_at = epoch_end(&self.config, &self.state, epoch);
        if now < ends_at {
            return Err(ClickpowError::EpochNotOver { epoch, ends_at });
        }
        if self.state.epoch(epoch).is_some_and(|r| r.finalized) {
            return Err(ClickpowError::EpochAlreadyFinalized { epoch });
        }

        let ((), events) = self.transact(|this, draft| {
            this.catch_up(draft, epoch, caller, now)?;
            this.finalize_into(draft, epoch, caller, now)?;
            draft.state.current_epoch = draft
                .state
                .current_epoch
                .max((epoch + 1).min(this.config.total_epochs));
            Ok(())
        })?;
        Ok(events)
    }

    /// End the game: settle every open epoch and burn what is left of the pool.
    ///
    /// Calling it again after the game ended is a no-op returning no events.
    #[instrument(skip(self), fields(caller = %caller))]
    pub fn end(&mut self, caller: &Identity, now: u64) -> Result<Vec<GameEvent>> {
        if !self.state.started() {
            return Err(ClickpowError::GameNotStarted);
        }
        if self.state.ended() {
            return Ok(Vec::new());
        }
        if now < self.state.game_end_time {
            return Err(ClickpowError::GameNotOver {
                ends_at: self.state.game_end_time,
            });
        }

        let (remaining, events) = self.transact(|this, draft| {
            let total = this.config.total_epochs;
            this.catch_up(draft, total + 1, caller, now)?;
            draft.state.current_epoch = total;

            let remaining = draft.state.token_pool;
            draft.state.token_pool = 0;
            draft.state.total_burned = add(draft.state.total_burned, remaining)?;
            draft.state.phase = Phase::Ended;
            draft.burn(remaining);
            draft.events.push(GameEvent::GameEnded { burned: remaining });
            Ok(remaining)
        })?;
        info!(burned = remaining, "game ended");
        Ok(events)
    }

    // -------------------------------------------------------------------------
    // Transition helpers (operate on a draft only)
    // -------------------------------------------------------------------------

    fn submit_into(
        &self,
        draft: &mut Draft,
        submitter: &Identity,
        nonces: &[Nonce],
        now: u64,
    ) -> Result<SubmitOutcome> {
        let epoch = effective_epoch(&self.config, &draft.state, now);
        self.catch_up(draft, epoch, submitter, now)?;

        let target = self
            .difficulty
            .target_at(draft.state.difficulty_target, epoch, now)?;
        let verification = draft.accept_batch(submitter, nonces, epoch, &self.config, &target);
        let valid = verification.valid_count();
        if valid == 0 {
            return Err(ClickpowError::NoValidProofs);
        }

        // Clicks.
        let (first_click, user_clicks) = {
            let stat = draft.epoch_user_mut(epoch, submitter);
            let first = !stat.participated;
            stat.participated = true;
            stat.clicks += valid;
            (first, stat.clicks)
        };
        {
            let rec = draft.epoch_mut(epoch);
            if first_click {
                rec.participant_count += 1;
            }
            rec.total_clicks += valid;
            if user_clicks > rec.leader_clicks {
                rec.leader = Some(*submitter);
                rec.leader_clicks = user_clicks;
            }
        }
        draft.state.total_clicks += valid;
        draft.user_mut(submitter).total_clicks += valid;

        // Payout.
        let budget = self.ensure_budget(draft, epoch)?;
        let distributed = draft.state.epoch(epoch).map(|r| r.distributed).unwrap_or(0);
        let bonus_bps = draft
            .state
            .bonus_tiers
            .calculate(submitter, &self.achievements);
        let payout = submission_payout(
            valid,
            per_click(budget, self.config.target_clicks()),
            bonus_bps,
            draft.state.token_pool,
            budget.saturating_sub(distributed),
        )?;
        if payout.clamped {
            warn!(epoch, gross = payout.gross, paid = payout.outflow(), "payout clamped");
            self.metrics.payouts_clamped.inc();
        }

        draft.state.token_pool = sub(draft.state.token_pool, payout.outflow())?;
        let rec = draft.epoch_mut(epoch);
        rec.distributed = add(rec.distributed, payout.outflow())?;
        let user = draft.user_mut(submitter);
        user.total_earned = add(user.total_earned, payout.earned)?;
        user.total_burned = add(user.total_burned, payout.burned)?;
        draft.state.total_earned = add(draft.state.total_earned, payout.earned)?;
        draft.state.total_burned = add(draft.state.total_burned, payout.burned)?;

        draft.transfer(*submitter, payout.earned);
        draft.burn(payout.burned);
        draft.events.push(GameEvent::Clicked {
            submitter: *submitter,
            epoch,
            valid_clicks: valid,
            earned: payout.earned,
            burned: payout.burned,
        });

        Ok(SubmitOutcome {
            epoch,
            valid_clicks: valid,
            above_target: verification.above_target,
            replayed: verification.replayed,
            earned: payout.earned,
            burned: payout.burned,
            events: Vec::new(),
        })
    }

    /// Finalize every open epoch in `[current_epoch, up_to)` in order and advance to `up_to`
    /// (bounded by the last epoch).
    fn catch_up(
        &self,
        draft: &mut Draft,
        up_to: EpochNumber,
        finalizer: &Identity,
        now: u64,
    ) -> Result<()> {
        let from = draft.state.current_epoch.max(1);
        for epoch in from..up_to {
            if !draft.state.epoch(epoch).is_some_and(|r| r.finalized) {
                self.finalize_into(draft, epoch, finalizer, now)?;
            }
        }
        if up_to <= self.config.total_epochs {
            draft.state.current_epoch = draft.state.current_epoch.max(up_to);
        }
        Ok(())
    }

    /// Snapshot the epoch's emission budget from the current pool the first time it is needed.
    fn ensure_budget(&self, draft: &mut Draft, epoch: EpochNumber) -> Result<Amount> {
        if let Some(budget) = draft.state.epoch(epoch).and_then(|r| r.emission_budget) {
            return Ok(budget);
        }
        let budget = emission_budget(
            draft.state.token_pool,
            self.config.daily_emission_bps,
            self.config.epoch_duration_secs,
        )?;
        draft.epoch_mut(epoch).emission_budget = Some(budget);
        Ok(budget)
    }

    fn finalize_into(
        &self,
        draft: &mut Draft,
        epoch: EpochNumber,
        finalizer: &Identity,
        now: u64,
    ) -> Result<()> {
        let budget = self.ensure_budget(draft, epoch)?;
        let rec = draft
            .state
            .epoch(epoch)
            .map(EpochRecord::summary)
            .unwrap_or_default();

        let old_target = draft.state.difficulty_target;
        let new_target = self.difficulty.retarget(
            old_target,
            epoch,
            rec.total_clicks,
            self.config.target_clicks(),
            now,
        )?;
        draft.state.difficulty_target = new_target;
        draft.events.push(GameEvent::DifficultyAdjusted {
            epoch,
            old_target,
            new_target,
        });

        let settlement = epoch_settlement(
            budget,
            rec.distributed,
            draft.state.token_pool,
            rec.leader.is_some(),
            self.config.winner_bonus_bps,
            self.config.finalizer_reward_bps,
        )?;
        draft.state.token_pool = sub(draft.state.token_pool, settlement.total_outflow())?;
        draft.state.total_burned = add(draft.state.total_burned, settlement.total_burned())?;
        draft.state.total_earned = add(
            draft.state.total_earned,
            settlement.winner_bonus + settlement.finalizer_reward,
        )?;

        draft.burn(settlement.burned_unused);
        if let Some(winner) = rec.leader {
            let stat = draft.user_mut(&winner);
            stat.epochs_won += 1;
            stat.total_earned = add(stat.total_earned, settlement.winner_bonus)?;
            stat.total_burned = add(stat.total_burned, settlement.winner_bonus_burned)?;
            draft.transfer(winner, settlement.winner_bonus);
            draft.burn(settlement.winner_bonus_burned);
        }
        if settlement.finalizer_reward > 0 {
            let stat = draft.user_mut(finalizer);
            stat.total_earned = add(stat.total_earned, settlement.finalizer_reward)?;
            draft.transfer(*finalizer, settlement.finalizer_reward);
        }

        let rec_mut = draft.epoch_mut(epoch);
        rec_mut.finalized = true;
        rec_mut.winner = rec.leader;
        rec_mut.winner_clicks = rec.leader_clicks;

        draft.events.push(GameEvent::EpochFinalized {
            epoch,
            winner: rec.leader,
            winner_clicks: rec.leader_clicks,
            finalizer: *finalizer,
            winner_bonus: settlement.winner_bonus,
            burned: settlement.total_burned(),
            finalizer_reward: settlement.finalizer_reward,
        });
        info!(
            epoch,
            clicks = rec.total_clicks,
            winner = ?rec.leader,
            burned_unused = settlement.burned_unused,
            old_target = %old_target,
            new_target = %new_target,
            "epoch finalized"
        );
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Commit
    // -------------------------------------------------------------------------

    /// Run `step` on a draft that owns the state, then commit it or roll it back.
    fn transact<T>(
        &mut self,
        step: impl FnOnce(&Self, &mut Draft) -> Result<T>,
    ) -> Result<(T, Vec<GameEvent>)> {
        let placeholder = GameState::init(self.config.initial_difficulty);
        let mut draft = Draft::begin(std::mem::replace(&mut self.state, placeholder));
        let value = match step(&*self, &mut draft) {
            Ok(value) => value,
            Err(e) => {
                self.state = draft.rollback();
                return Err(e);
            }
        };
        let events = self.commit(draft)?;
        Ok((value, events))
    }

    fn precheck(&self, draft: &Draft) -> Result<()> {
        check_transition(&draft.state, &draft.journal, self.config.total_epochs)?;
        let outflow = draft
            .movements
            .iter()
            .try_fold(0u128, |acc, m| add(acc, m.amount()))?;
        let available = self.ledger.balance_of(&self.config.custody);
        if outflow > available {
            return Err(ClickpowError::InsufficientCustody {
                required: outflow,
                available,
            });
        }
        Ok(())
    }

    fn commit(&mut self, draft: Draft) -> Result<Vec<GameEvent>> {
        if let Err(e) = self.precheck(&draft) {
            self.state = draft.rollback();
            return Err(e);
        }
        if let Err(e) = apply_movements(&mut self.ledger, &draft.movements) {
            warn!(error = %e, "ledger rejected movements; state restored");
            self.state = draft.rollback();
            return Err(e);
        }

        let Draft { state, events, .. } = draft;
        self.state = state;

        for ev in &events {
            match ev {
                GameEvent::Clicked { earned, burned, .. } => {
                    self.metrics.tokens_earned.add(*earned);
                    self.metrics.tokens_burned.add(*burned);
                }
                GameEvent::EpochFinalized {
                    epoch,
                    winner_bonus,
                    burned,
                    finalizer_reward,
                    ..
                } => {
                    let pruned = self.state.consumed.prune_epoch(*epoch);
                    debug!(epoch, pruned, "dropped consumed proofs of finalized epoch");
                    self.metrics.epochs_finalized.inc();
                    self.metrics.tokens_earned.add(winner_bonus + finalizer_reward);
                    self.metrics.tokens_burned.add(*burned);
                }
                GameEvent::GameEnded { burned } => self.metrics.tokens_burned.add(*burned),
                GameEvent::GameStarted { .. } | GameEvent::DifficultyAdjusted { .. } => {}
            }
        }
        self.metrics.current_epoch.set(self.state.current_epoch);
        self.events.extend(events.iter().cloned());
        Ok(events)
    }
}
