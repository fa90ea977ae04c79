//! Proof verification and anti-replay bookkeeping.
//!
//! A proof is a `(submitter, nonce, epoch)` triple whose packed hash (see [`crate::hash`]) falls
//! below the current target. Each triple is accepted at most once. Cross-submitter reuse fails the
//! hash check itself because the submitter is part of the hashed message, so the consumed set only
//! has to guard same-submitter resubmission.
//!
//! The set is indexed by epoch. Once an epoch is finalized nothing can be credited to it again, so
//! its entries are dropped wholesale with [`ConsumedProofs::prune_epoch`].

use crate::hash;
use crate::{DomainId, EpochNumber, Identity, Nonce, Target};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Key of a consumed proof.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProofKey {
    pub submitter: Identity,
    pub nonce: Nonce,
    pub epoch: EpochNumber,
}

/// Why a single nonce was not counted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProofRejection {
    /// Hash did not fall below the target.
    AboveTarget,
    /// The triple was already accepted (possibly earlier in the same batch).
    AlreadyConsumed,
}

/// Outcome of filtering a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchVerification {
    pub accepted: Vec<Nonce>,
    pub above_target: usize,
    pub replayed: usize,
}

impl BatchVerification {
    pub fn valid_count(&self) -> u64 {
        self.accepted.len() as u64
    }
}

/// Set of consumed proofs, grouped by epoch.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumedProofs {
    by_epoch: BTreeMap<EpochNumber, BTreeSet<(Identity, Nonce)>>,
}

impl ConsumedProofs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, submitter: &Identity, nonce: &Nonce, epoch: EpochNumber) -> bool {
        self.by_epoch
            .get(&epoch)
            .is_some_and(|set| set.contains(&(*submitter, *nonce)))
    }

    pub fn len(&self) -> usize {
        self.by_epoch.values().map(BTreeSet::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_epoch.is_empty()
    }

    /// Number of proofs consumed in `epoch`.
    pub fn len_in(&self, epoch: EpochNumber) -> usize {
        self.by_epoch.get(&epoch).map_or(0, BTreeSet::len)
    }

    /// Forget every proof of `epoch`. Returns how many were dropped.
    pub fn prune_epoch(&mut self, epoch: EpochNumber) -> usize {
        self.by_epoch.remove(&epoch).map_or(0, |set| set.len())
    }

    /// Undo a single acceptance.
    pub(crate) fn remove(&mut self, key: &ProofKey) -> bool {
        let Some(set) = self.by_epoch.get_mut(&key.epoch) else {
            return false;
        };
        let removed = set.remove(&(key.submitter, key.nonce));
        if set.is_empty() {
            self.by_epoch.remove(&key.epoch);
        }
        removed
    }

    /// Check a single proof without consuming it.
    pub fn check(
        &self,
        submitter: &Identity,
        nonce: &Nonce,
        epoch: EpochNumber,
        domain_id: &DomainId,
        target: &Target,
    ) -> Result<(), ProofRejection> {
        if !hash::meets_target(submitter, nonce, epoch, domain_id, target) {
            return Err(ProofRejection::AboveTarget);
        }
        if self.contains(submitter, nonce, epoch) {
            return Err(ProofRejection::AlreadyConsumed);
        }
        Ok(())
    }

    /// Check a proof and consume it on success.
    pub fn accept(
        &mut self,
        submitter: &Identity,
        nonce: &Nonce,
        epoch: EpochNumber,
        domain_id: &DomainId,
        target: &Target,
    ) -> Result<(), ProofRejection> {
        self.check(submitter, nonce, epoch, domain_id, target)?;
        self.by_epoch
            .entry(epoch)
            .or_default()
            .insert((*submitter, *nonce));
        Ok(())
    }

    /// Filter a batch, consuming every accepted proof.
    ///
    /// Callers that need all-or-nothing semantics run this against a working copy and discard it
    /// on failure.
    pub fn accept_batch(
        &mut self,
        submitter: &Identity,
        nonces: &[Nonce],
        epoch: EpochNumber,
        domain_id: &DomainId,
        target: &Target,
    ) -> BatchVerification {
        let mut out = BatchVerification::default();
        for nonce in nonces {
            match self.accept(submitter, nonce, epoch, domain_id, target) {
                Ok(()) => out.accepted.push(*nonce),
                Err(ProofRejection::AboveTarget) => out.above_target += 1,
                Err(ProofRejection::AlreadyConsumed) => out.replayed += 1,
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::max_target;
    use crate::U256;

    fn find_valid(id: &Identity, epoch: EpochNumber, domain: &DomainId, target: &Target) -> Nonce {
        let mut n = U256::zero();
        while !hash::meets_target(id, &n, epoch, domain, target) {
            n = n + U256::one();
        }
        n
    }

    #[test]
    fn valid_proof_is_accepted_once() {
        let mut set = ConsumedProofs::new();
        let id = Identity([1; 20]);
        let d = U256::from(1u64);
        let t = max_target();
        let n = find_valid(&id, 1, &d, &t);

        assert_eq!(set.accept(&id, &n, 1, &d, &t), Ok(()));
        assert_eq!(
            set.accept(&id, &n, 1, &d, &t),
            Err(ProofRejection::AlreadyConsumed)
        );
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn same_nonce_in_next_epoch_is_a_new_proof() {
        let mut set = ConsumedProofs::new();
        let id = Identity([1; 20]);
        let d = U256::from(1u64);
        let n = U256::from(7u64);
        // Target of MAX accepts every hash, isolating the replay rule.
        assert!(set.accept(&id, &n, 1, &d, &U256::MAX).is_ok());
        assert!(set.accept(&id, &n, 2, &d, &U256::MAX).is_ok());
    }

    #[test]
    fn zero_target_rejects_everything() {
        let set = ConsumedProofs::new();
        let id = Identity([3; 20]);
        assert_eq!(
            set.check(&id, &U256::one(), 1, &U256::one(), &U256::zero()),
            Err(ProofRejection::AboveTarget)
        );
    }

    #[test]
    fn cross_identity_replay_fails_hash_check() {
        let a = Identity([0xA; 20]);
        let b = Identity([0xB; 20]);
        let d = U256::from(5u64);
        // A tight target makes an accidental double hit negligible.
        let t = U256::MAX >> 12u32;
        let n = find_valid(&a, 1, &d, &t);
        let set = ConsumedProofs::new();
        assert!(set.check(&a, &n, 1, &d, &t).is_ok());
        if !hash::meets_target(&b, &n, 1, &d, &t) {
            assert_eq!(set.check(&b, &n, 1, &d, &t), Err(ProofRejection::AboveTarget));
        }
    }

    #[test]
    fn batch_counts_duplicates_once() {
        let mut set = ConsumedProofs::new();
        let id = Identity([4; 20]);
        let d = U256::one();
        let nonces = vec![U256::from(1u64), U256::from(1u64), U256::from(2u64)];
        let out = set.accept_batch(&id, &nonces, 1, &d, &U256::MAX);
        assert_eq!(out.valid_count(), 2);
        assert_eq!(out.replayed, 1);
        assert_eq!(out.above_target, 0);
    }

    #[test]
    fn pruning_an_epoch_keeps_the_others() {
        let mut set = ConsumedProofs::new();
        let id = Identity([5; 20]);
        let d = U256::one();
        set.accept_batch(&id, &[U256::from(1u64), U256::from(2u64)], 1, &d, &U256::MAX);
        set.accept(&id, &U256::from(1u64), 2, &d, &U256::MAX).unwrap();
        assert_eq!(set.len(), 3);

        assert_eq!(set.prune_epoch(1), 2);
        assert_eq!(set.len(), 1);
        assert!(!set.contains(&id, &U256::from(1u64), 1));
        assert!(set.contains(&id, &U256::from(1u64), 2));
        assert_eq!(set.prune_epoch(1), 0);
    }

    #[test]
    fn removing_the_last_proof_drops_the_epoch() {
        let mut set = ConsumedProofs::new();
        let id = Identity([6; 20]);
        set.accept(&id, &U256::from(9u64), 4, &U256::one(), &U256::MAX)
            .unwrap();
        let key = ProofKey {
            submitter: id,
            nonce: U256::from(9u64),
            epoch: 4,
        };
        assert!(set.remove(&key));
        assert_eq!(set, ConsumedProofs::new());
        assert!(!set.remove(&key));
    }
}
