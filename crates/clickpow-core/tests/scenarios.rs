//! End-to-end game scenarios against the in-memory ledger.

use clickpow_core::attestation::AttestationSigner;
use clickpow_core::bonus::{AchievementTier, StaticAchievements};
use clickpow_core::difficulty::DifficultyProvider;
use clickpow_core::engine::Engine;
use clickpow_core::hash;
use clickpow_core::ledger::{InMemoryLedger, TokenLedger};
use clickpow_core::limits::{max_target, MAX_BATCH, MIN_BATCH};
use clickpow_core::miner::{mine_batch, random_nonce, MiningJob};
use clickpow_core::{
    Amount, ClickpowError, EpochNumber, GameConfig, GameEvent, Identity, Nonce, Result, Target,
    U256,
};
use proptest::prelude::*;
use std::sync::atomic::AtomicBool;

const TOKEN: Amount = 1_000_000_000_000_000_000;
const POOL: Amount = 100_000_000 * TOKEN;
const DAY: u64 = 86_400;
const T0: u64 = 1_700_000_000;

const OWNER: Identity = Identity([0x0A; 20]);
const CUSTODY: Identity = Identity([0xC0; 20]);
const ALICE: Identity = Identity([0xA1; 20]);
const BOB: Identity = Identity([0xB0; 20]);

type Game = Engine<InMemoryLedger, StaticAchievements>;

fn config(initial_difficulty: Target) -> GameConfig {
    GameConfig::builder()
        .owner(OWNER)
        .custody(CUSTODY)
        .epoch_duration_secs(DAY)
        .total_epochs(90)
        .initial_difficulty(initial_difficulty)
        .build()
        .unwrap()
}

fn funded_ledger() -> InMemoryLedger {
    let mut ledger = InMemoryLedger::new(CUSTODY);
    ledger.mint(CUSTODY, POOL).unwrap();
    ledger
}

fn game_with(config: GameConfig) -> Game {
    let mut g = Engine::new(config, funded_ledger(), StaticAchievements::new()).unwrap();
    g.start(&OWNER, POOL, T0).unwrap();
    g
}

/// Game from the reference scenario: 100M tokens, 90 daily epochs, target `(2^256 - 1) / 1000`.
fn reference_game() -> Game {
    game_with(config(U256::MAX / U256::from(1_000u64)))
}

/// Same economics with an easy target so batches are cheap to mine.
fn easy_game() -> Game {
    game_with(config(max_target()))
}

fn mine_for(g: &Game, who: Identity, epoch: EpochNumber, count: usize) -> Vec<Nonce> {
    let job = MiningJob {
        identity: who,
        epoch,
        domain_id: g.config().domain_id,
        target: g.state().difficulty_target,
    };
    let cancel = AtomicBool::new(false);
    mine_batch(&job, count, random_nonce(), g.config().miner.yield_every, &cancel).unwrap()
}

fn finalized(events: &[GameEvent], epoch: EpochNumber) -> Option<&GameEvent> {
    events
        .iter()
        .find(|e| matches!(e, GameEvent::EpochFinalized { epoch: n, .. } if *n == epoch))
}

fn assert_conserved(g: &Game) {
    let l = g.ledger();
    let paid: Amount = [ALICE, BOB, OWNER].iter().map(|id| l.balance_of(id)).sum();
    assert_eq!(l.balance_of(&CUSTODY), g.state().token_pool);
    assert_eq!(l.balance_of(&CUSTODY) + paid + l.total_burned(), POOL);
}

#[test]
fn fifty_valid_nonces_earn_and_burn_evenly() {
    let mut g = reference_game();
    let nonces = mine_for(&g, ALICE, 1, 50);
    let out = g.submit(&ALICE, &nonces, T0 + 60).unwrap();

    let clicked = out
        .events
        .iter()
        .find_map(|e| match e {
            GameEvent::Clicked {
                valid_clicks,
                earned,
                burned,
                ..
            } => Some((*valid_clicks, *earned, *burned)),
            _ => None,
        })
        .unwrap();
    let (valid, earned, burned) = clicked;
    assert_eq!(valid, 50);
    assert!(earned > 0);
    assert!(burned > 0);
    assert!(earned.abs_diff(burned) <= 1);
    // 2% daily of 100M over 1M target clicks is 2 tokens per click.
    assert_eq!(earned + burned, 100 * TOKEN);
    assert_conserved(&g);
}

#[test]
fn batch_length_is_bounded() {
    let mut g = easy_game();
    let small: Vec<Nonce> = (0..MIN_BATCH as u64 - 1).map(U256::from).collect();
    let large: Vec<Nonce> = (0..MAX_BATCH as u64 + 1).map(U256::from).collect();
    assert_eq!(
        g.submit(&ALICE, &small, T0 + 1).unwrap_err(),
        ClickpowError::BatchTooSmall { len: 49, min: 50 }
    );
    assert_eq!(
        g.submit(&ALICE, &large, T0 + 1).unwrap_err(),
        ClickpowError::BatchTooLarge { len: 501, max: 500 }
    );
    assert_eq!(g.state().total_clicks, 0);
}

#[test]
fn most_clicks_leads_and_wins() {
    let mut g = easy_game();
    let a = mine_for(&g, ALICE, 1, 50);
    let b = mine_for(&g, BOB, 1, 60);
    g.submit(&ALICE, &a, T0 + 10).unwrap();
    g.submit(&BOB, &b, T0 + 20).unwrap();
    assert_eq!(g.state().epoch(1).unwrap().leader, Some(BOB));

    assert_eq!(g.get_user_epoch_stats_with_rank(1, &BOB).rank, 1);
    assert_eq!(g.get_user_epoch_stats_with_rank(1, &ALICE).rank, 2);

    let bob_before = g.ledger().balance_of(&BOB);
    let events = g.finalize(&OWNER, 1, T0 + DAY).unwrap();
    match finalized(&events, 1) {
        Some(GameEvent::EpochFinalized {
            winner,
            winner_clicks,
            winner_bonus,
            ..
        }) => {
            assert_eq!(*winner, Some(BOB));
            assert_eq!(*winner_clicks, 60);
            assert!(*winner_bonus > 0);
            assert_eq!(g.ledger().balance_of(&BOB), bob_before + winner_bonus);
        }
        other => panic!("missing finalize event: {other:?}"),
    }
    assert_eq!(g.get_user_lifetime_stats(&BOB).epochs_won, 1);
    assert_eq!(g.get_user_lifetime_stats(&ALICE).epochs_won, 0);
    assert_conserved(&g);
}

#[test]
fn equal_clicks_keep_first_leader() {
    let mut g = easy_game();
    let a = mine_for(&g, ALICE, 1, 50);
    let b = mine_for(&g, BOB, 1, 50);
    g.submit(&ALICE, &a, T0 + 10).unwrap();
    g.submit(&BOB, &b, T0 + 20).unwrap();
    assert_eq!(g.state().epoch(1).unwrap().leader, Some(ALICE));
}

#[test]
fn empty_epoch_burns_whole_budget() {
    let mut g = reference_game();
    let old_target = g.state().difficulty_target;
    let burned_before = g.ledger().total_burned();

    let events = g.finalize(&BOB, 1, T0 + DAY).unwrap();
    let budget = 2_000_000 * TOKEN;
    match finalized(&events, 1) {
        Some(GameEvent::EpochFinalized {
            winner,
            winner_clicks,
            winner_bonus,
            burned,
            finalizer_reward,
            ..
        }) => {
            assert_eq!(*winner, None);
            assert_eq!(*winner_clicks, 0);
            assert_eq!(*winner_bonus, 0);
            assert_eq!(*burned, budget);
            assert_eq!(*finalizer_reward, budget / 1_000);
        }
        other => panic!("missing finalize event: {other:?}"),
    }
    assert_eq!(g.ledger().total_burned() - burned_before, budget);
    assert_eq!(g.ledger().balance_of(&BOB), budget / 1_000);

    // Zero clicks eases difficulty by four.
    let expected = (old_target * U256::from(4u64)).min(max_target());
    assert_eq!(g.state().difficulty_target, expected);
    assert!(events.iter().any(|e| matches!(
        e,
        GameEvent::DifficultyAdjusted { epoch: 1, old_target: o, new_target: n }
            if *o == old_target && *n == expected
    )));
    assert_conserved(&g);
}

#[test]
fn finalizing_twice_is_rejected() {
    let mut g = easy_game();
    g.finalize(&ALICE, 1, T0 + DAY).unwrap();
    assert_eq!(
        g.finalize(&ALICE, 1, T0 + DAY + 5).unwrap_err(),
        ClickpowError::EpochAlreadyFinalized { epoch: 1 }
    );
}

#[test]
fn resubmitting_accepted_nonces_yields_nothing() {
    let mut g = easy_game();
    let a = mine_for(&g, ALICE, 1, 50);
    g.submit(&ALICE, &a, T0 + 10).unwrap();
    let before = g.state().clone();
    assert_eq!(
        g.submit(&ALICE, &a, T0 + 11).unwrap_err(),
        ClickpowError::NoValidProofs
    );
    assert_eq!(g.state(), &before);
}

#[test]
fn accepted_proofs_hash_below_target() {
    let mut g = reference_game();
    let target = g.state().difficulty_target;
    let mut batch = mine_for(&g, ALICE, 1, 50);
    // Mix in nonces that are (almost certainly) invalid.
    batch.extend((0..20u64).map(|i| U256::MAX - U256::from(i)));
    let out = g.submit(&ALICE, &batch, T0 + 1).unwrap();
    let expected = batch
        .iter()
        .filter(|n| hash::meets_target(&ALICE, n, 1, &g.config().domain_id, &target))
        .count() as u64;
    assert_eq!(out.valid_clicks, expected);
    assert_eq!(out.above_target as u64, batch.len() as u64 - expected);
    for n in &batch {
        assert_eq!(
            g.state().consumed.contains(&ALICE, n, 1),
            hash::meets_target(&ALICE, n, 1, &g.config().domain_id, &target)
        );
    }
}

#[test]
fn cross_identity_replay_follows_hash_rule() {
    let mut g = reference_game();
    let a = mine_for(&g, ALICE, 1, 50);
    g.submit(&ALICE, &a, T0 + 1).unwrap();

    // Alice's proofs only count for Bob where they independently hash below target for him.
    let bob_valid = a
        .iter()
        .filter(|n| g.is_valid_proof(&BOB, n, 1, T0 + 2))
        .count() as u64;
    match g.submit(&BOB, &a, T0 + 2) {
        Ok(out) => assert_eq!(out.valid_clicks, bob_valid),
        Err(e) => {
            assert_eq!(e, ClickpowError::NoValidProofs);
            assert_eq!(bob_valid, 0);
        }
    }
    assert!(bob_valid < 50);
}

#[test]
fn click_totals_agree_across_epochs() {
    let mut g = easy_game();
    let a1 = mine_for(&g, ALICE, 1, 70);
    g.submit(&ALICE, &a1, T0 + 1).unwrap();
    let b2 = mine_for(&g, BOB, 2, 80);
    let out = g.submit(&BOB, &b2, T0 + DAY + 1).unwrap();
    assert_eq!(out.epoch, 2);
    assert!(finalized(&out.events, 1).is_some());

    let s = g.state();
    let by_epoch: u64 = s.epochs.values().map(|e| e.total_clicks).sum();
    let by_user: u64 = s.users.values().map(|u| u.total_clicks).sum();
    assert_eq!(by_epoch, 150);
    assert_eq!(by_user, 150);
    assert_eq!(g.get_game_stats().total_clicks, 150);
    assert_conserved(&g);
}

#[test]
fn skipped_epochs_are_finalized_in_order_by_the_submitter() {
    let mut g = easy_game();
    let nonces = mine_for(&g, ALICE, 4, 50);
    let out = g.submit(&ALICE, &nonces, T0 + 3 * DAY + 1).unwrap();
    let order: Vec<EpochNumber> = out
        .events
        .iter()
        .filter_map(|e| match e {
            GameEvent::EpochFinalized {
                epoch, finalizer, ..
            } => {
                assert_eq!(*finalizer, ALICE);
                Some(*epoch)
            }
            _ => None,
        })
        .collect();
    assert_eq!(order, vec![1, 2, 3]);
    assert_eq!(g.state().current_epoch, 4);
}

#[test]
fn end_burns_the_rest_and_is_idempotent() {
    let mut g = game_with(
        GameConfig::builder()
            .owner(OWNER)
            .custody(CUSTODY)
            .total_epochs(3)
            .initial_difficulty(max_target())
            .build()
            .unwrap(),
    );
    let a = mine_for(&g, ALICE, 1, 50);
    g.submit(&ALICE, &a, T0 + 1).unwrap();
    assert!(matches!(
        g.end(&BOB, T0 + 2 * DAY),
        Err(ClickpowError::GameNotOver { .. })
    ));
    let events = g.end(&BOB, T0 + 3 * DAY).unwrap();
    assert!(matches!(events.last(), Some(GameEvent::GameEnded { burned }) if *burned > 0));
    assert_eq!(g.state().token_pool, 0);
    assert_eq!(g.ledger().balance_of(&CUSTODY), 0);
    assert!(g.end(&BOB, T0 + 4 * DAY).unwrap().is_empty());
    assert_eq!(
        g.submit(&ALICE, &a, T0 + 4 * DAY).unwrap_err(),
        ClickpowError::GameHasEnded
    );
    assert_conserved(&g);
}

#[test]
fn bonus_raises_submitter_share_only() {
    let mut g = Engine::new(config(max_target()), funded_ledger(), StaticAchievements::new())
        .unwrap();
    g.set_bonus_tier(&OWNER, AchievementTier::Streak(7), 2_000)
        .unwrap();
    g.achievements().grant(ALICE, AchievementTier::Streak(7));
    g.start(&OWNER, POOL, T0).unwrap();

    let a = mine_for(&g, ALICE, 1, 50);
    let out = g.submit(&ALICE, &a, T0 + 1).unwrap();
    assert_eq!(out.burned, 50 * TOKEN);
    assert_eq!(out.earned, 60 * TOKEN);
    assert_eq!(g.calculate_bonus(&ALICE).get(), 2_000);
    assert_eq!(g.calculate_bonus(&BOB).get(), 0);
}

#[test]
fn attested_difficulty_fails_closed_when_stale() {
    let signer = AttestationSigner::generate();
    let cfg = GameConfig::builder()
        .owner(OWNER)
        .custody(CUSTODY)
        .initial_difficulty(max_target())
        .attested_difficulty(signer.verifying_key_hex())
        .build()
        .unwrap();
    let mut g = game_with(cfg);
    let nonces: Vec<Nonce> = (0..50u64).map(U256::from).collect();

    assert!(matches!(
        g.submit(&ALICE, &nonces, T0 + 1),
        Err(ClickpowError::DifficultyUnavailable(_))
    ));
    assert_eq!(g.state().total_clicks, 0);

    g.install_attestation(signer.sign(U256::one(), 1, max_target(), T0 + 100))
        .unwrap();
    let out = g.submit(&ALICE, &nonces, T0 + 50).unwrap();
    assert!(out.valid_clicks > 0);

    assert!(matches!(
        g.submit(&ALICE, &nonces, T0 + 100),
        Err(ClickpowError::DifficultyUnavailable(_))
    ));

    // A stale feed keeps the recorded target at finalize.
    let recorded = g.state().difficulty_target;
    g.finalize(&BOB, 1, T0 + DAY).unwrap();
    assert_eq!(g.state().difficulty_target, recorded);
}

/// Accepts every hash; isolates accounting from mining.
struct AcceptAll;

impl DifficultyProvider for AcceptAll {
    fn name(&self) -> &'static str {
        "accept_all"
    }

    fn target_at(&self, _recorded: Target, _epoch: EpochNumber, _now: u64) -> Result<Target> {
        Ok(U256::MAX)
    }

    fn retarget(
        &self,
        recorded: Target,
        _epoch: EpochNumber,
        _actual: u64,
        _target: u64,
        _now: u64,
    ) -> Result<Target> {
        Ok(recorded)
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn tokens_are_conserved_across_random_play(
        plays in prop::collection::vec((any::<bool>(), 50usize..=120, 0u64..3 * DAY), 1..12),
    ) {
        let cfg = GameConfig::builder()
            .owner(OWNER)
            .custody(CUSTODY)
            .total_epochs(3)
            .initial_difficulty(max_target())
            .build()
            .unwrap();
        let mut g = Engine::new(cfg, funded_ledger(), StaticAchievements::new())
            .unwrap()
            .with_difficulty_provider(Box::new(AcceptAll));
        g.start(&OWNER, POOL, T0).unwrap();

        let mut sorted = plays.clone();
        sorted.sort_by_key(|p| p.2);
        let mut next = 0u64;
        for (alice, len, offset) in sorted {
            let who = if alice { ALICE } else { BOB };
            let batch: Vec<Nonce> = (next..next + len as u64).map(U256::from).collect();
            next += len as u64;
            let out = g.submit(&who, &batch, T0 + offset).unwrap();
            prop_assert_eq!(out.valid_clicks, len as u64);
            assert_conserved(&g);
        }
        g.end(&OWNER, T0 + 3 * DAY).unwrap();
        assert_conserved(&g);
        prop_assert_eq!(g.state().token_pool, 0);

        let s = g.state();
        let by_epoch: u64 = s.epochs.values().map(|e| e.total_clicks).sum();
        let by_user: u64 = s.users.values().map(|u| u.total_clicks).sum();
        prop_assert_eq!(by_epoch, by_user);
        let wins: u64 = s.users.values().map(|u| u.epochs_won).sum();
        let with_winner = s.epochs.values().filter(|e| e.winner.is_some()).count() as u64;
        prop_assert_eq!(wins, with_winner);
    }
}
