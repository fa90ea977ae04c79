//! State invariants checked after every transition, before anything is committed.

use crate::limits::{max_target, min_target};
use crate::state::{EpochRecord, GameState, Journal, Phase};
use crate::{ClickpowError, EpochNumber};

/// Stable identifiers for engine invariants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InvariantId {
    /// Sum of epoch click totals disagrees with the sum of lifetime user clicks.
    ClickSumsAgree,

    /// Difficulty target left `[MIN_TARGET, MAX_TARGET]`.
    DifficultyInBounds,

    /// Token pool grew while the game was running.
    PoolNonIncreasing,

    /// An epoch distributed more than its emission budget.
    BudgetRespected,

    /// `current_epoch` outside `1..=total_epochs` after start.
    EpochInRange,

    /// An ended game still holds tokens in its pool.
    EndedPoolEmpty,
}

impl InvariantId {
    pub fn as_str(self) -> &'static str {
        match self {
            InvariantId::ClickSumsAgree => "epoch click totals must equal user click totals",
            InvariantId::DifficultyInBounds => "difficulty target out of bounds",
            InvariantId::PoolNonIncreasing => "token pool increased after start",
            InvariantId::BudgetRespected => "epoch distributed more than its budget",
            InvariantId::EpochInRange => "current epoch out of range",
            InvariantId::EndedPoolEmpty => "ended game has a non-zero pool",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InvariantViolation {
    pub id: InvariantId,
    pub details: String,
}

impl InvariantViolation {
    pub fn new(id: InvariantId, details: impl Into<String>) -> Self {
        Self {
            id,
            details: details.into(),
        }
    }
}

impl std::fmt::Display for InvariantViolation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.id, self.details)
    }
}

impl std::error::Error for InvariantViolation {}

impl From<InvariantViolation> for ClickpowError {
    fn from(v: InvariantViolation) -> Self {
        ClickpowError::InvariantViolation(v.id.as_str())
    }
}

/// Check every invariant of `next`, given the pool before the transition.
///
/// Walks the whole state; used when adopting persisted state. Transitions go through
/// [`check_transition`].
pub fn check_invariants(
    next: &GameState,
    total_epochs: u64,
    prev_pool: u128,
    prev_phase: Phase,
) -> std::result::Result<(), InvariantViolation> {
    let epoch_clicks: u128 = next.epochs.values().map(|e| e.total_clicks as u128).sum();
    let user_clicks: u128 = next.users.values().map(|u| u.total_clicks as u128).sum();
    if epoch_clicks != user_clicks || epoch_clicks != next.total_clicks as u128 {
        return Err(InvariantViolation::new(
            InvariantId::ClickSumsAgree,
            format!(
                "epochs={epoch_clicks} users={user_clicks} total={}",
                next.total_clicks
            ),
        ));
    }
    for (n, e) in &next.epochs {
        check_budget(*n, e)?;
    }
    check_scalars(next, total_epochs, prev_pool, prev_phase)
}

/// Check a transition from a state that satisfied [`check_invariants`], looking only at the
/// records `journal` says it touched.
pub(crate) fn check_transition(
    next: &GameState,
    journal: &Journal,
    total_epochs: u64,
) -> std::result::Result<(), InvariantViolation> {
    let prev = journal.scalars();

    let mut epoch_delta: i128 = 0;
    for (n, before) in journal.touched_epochs() {
        let after = next.epoch(n);
        epoch_delta += after.map_or(0, |e| e.total_clicks as i128)
            - before.map_or(0, |e| e.total_clicks as i128);
        if let Some(e) = after {
            check_budget(n, e)?;
        }
    }
    let user_delta: i128 = journal
        .touched_users()
        .map(|(id, before)| {
            next.users.get(id).map_or(0, |u| u.total_clicks as i128)
                - before.map_or(0, |u| u.total_clicks as i128)
        })
        .sum();
    let total_delta = next.total_clicks as i128 - prev.total_clicks as i128;
    if epoch_delta != total_delta || user_delta != total_delta {
        return Err(InvariantViolation::new(
            InvariantId::ClickSumsAgree,
            format!("delta epochs={epoch_delta} users={user_delta} total={total_delta}"),
        ));
    }

    check_scalars(next, total_epochs, prev.token_pool, prev.phase)
}

fn check_budget(n: EpochNumber, e: &EpochRecord) -> std::result::Result<(), InvariantViolation> {
    if e.distributed > e.emission_budget.unwrap_or(0) {
        return Err(InvariantViolation::new(
            InvariantId::BudgetRespected,
            format!("epoch {n}: distributed={} budget={:?}", e.distributed, e.emission_budget),
        ));
    }
    Ok(())
}

fn check_scalars(
    next: &GameState,
    total_epochs: u64,
    prev_pool: u128,
    prev_phase: Phase,
) -> std::result::Result<(), InvariantViolation> {
    if next.difficulty_target < min_target() || next.difficulty_target > max_target() {
        return Err(InvariantViolation::new(
            InvariantId::DifficultyInBounds,
            format!("target={}", next.difficulty_target),
        ));
    }

    if prev_phase != Phase::NotStarted && next.token_pool > prev_pool {
        return Err(InvariantViolation::new(
            InvariantId::PoolNonIncreasing,
            format!("{prev_pool} -> {}", next.token_pool),
        ));
    }

    if next.started() && (next.current_epoch == 0 || next.current_epoch > total_epochs) {
        return Err(InvariantViolation::new(
            InvariantId::EpochInRange,
            format!("current_epoch={} total={total_epochs}", next.current_epoch),
        ));
    }

    if next.phase == Phase::Ended && next.token_pool != 0 {
        return Err(InvariantViolation::new(
            InvariantId::EndedPoolEmpty,
            format!("pool={}", next.token_pool),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Identity;

    fn running() -> GameState {
        let mut s = GameState::init(max_target());
        s.phase = Phase::Running;
        s.current_epoch = 1;
        s.token_pool = 1_000;
        s
    }

    #[test]
    fn fresh_state_holds() {
        let s = GameState::init(max_target());
        assert!(check_invariants(&s, 90, 0, Phase::NotStarted).is_ok());
    }

    #[test]
    fn click_mismatch_is_detected() {
        let mut s = running();
        s.epoch_mut(1).total_clicks = 5;
        s.total_clicks = 5;
        let err = check_invariants(&s, 90, 1_000, Phase::Running).unwrap_err();
        assert_eq!(err.id, InvariantId::ClickSumsAgree);

        s.user_mut(&Identity([1; 20])).total_clicks = 5;
        assert!(check_invariants(&s, 90, 1_000, Phase::Running).is_ok());
    }

    #[test]
    fn pool_growth_is_detected() {
        let s = running();
        let err = check_invariants(&s, 90, 999, Phase::Running).unwrap_err();
        assert_eq!(err.id, InvariantId::PoolNonIncreasing);
        // Funding at start is not growth.
        assert!(check_invariants(&s, 90, 0, Phase::NotStarted).is_ok());
    }

    #[test]
    fn overspent_budget_is_detected() {
        let mut s = running();
        let e = s.epoch_mut(1);
        e.emission_budget = Some(10);
        e.distributed = 11;
        let err = check_invariants(&s, 90, 1_000, Phase::Running).unwrap_err();
        assert_eq!(err.id, InvariantId::BudgetRespected);
    }

    #[test]
    fn transition_checks_click_deltas() {
        let mut s = running();
        let alice = Identity([1; 20]);

        let mut j = Journal::begin(&s);
        j.epoch_mut(&mut s, 1).total_clicks += 7;
        s.total_clicks += 7;
        let err = check_transition(&s, &j, 90).unwrap_err();
        assert_eq!(err.id, InvariantId::ClickSumsAgree);

        j.user_mut(&mut s, &alice).total_clicks += 7;
        assert!(check_transition(&s, &j, 90).is_ok());
    }

    #[test]
    fn transition_checks_touched_budgets_and_pool() {
        let mut s = running();
        let mut j = Journal::begin(&s);
        let e = j.epoch_mut(&mut s, 1);
        e.emission_budget = Some(10);
        e.distributed = 11;
        let err = check_transition(&s, &j, 90).unwrap_err();
        assert_eq!(err.id, InvariantId::BudgetRespected);

        let mut s = running();
        let j = Journal::begin(&s);
        s.token_pool += 1;
        let err = check_transition(&s, &j, 90).unwrap_err();
        assert_eq!(err.id, InvariantId::PoolNonIncreasing);
    }

    #[test]
    fn violations_map_to_core_error() {
        let v = InvariantViolation::new(InvariantId::DifficultyInBounds, "x");
        assert_eq!(
            ClickpowError::from(v),
            ClickpowError::InvariantViolation("difficulty target out of bounds")
        );
    }
}
