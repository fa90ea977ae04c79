//! Client-side nonce search.
//!
//! The miner hashes exactly the message the verifier hashes ([`crate::hash::proof_hash`]), so any
//! nonce it reports is accepted by [`crate::verifier::ConsumedProofs`] for the same job, as long as
//! it has not been consumed yet.
//!
//! Workers start at random offsets, check a shared stop flag and yield every `yield_every`
//! attempts so a host scheduler stays responsive. Dropping or cancelling a search loses nothing but
//! work: pending nonces are advisory until the engine accepts them.

use crate::hash::proof_hash;
use crate::limits::MAX_BATCH;
use crate::verifier::ConsumedProofs;
use crate::{DomainId, EpochNumber, Hash32, Identity, Nonce, Target, U256};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Read-only inputs of a search.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningJob {
    pub identity: Identity,
    pub epoch: EpochNumber,
    pub domain_id: DomainId,
    pub target: Target,
}

impl MiningJob {
    /// Hash of `nonce` under this job, and whether it meets the target.
    pub fn try_nonce(&self, nonce: &Nonce) -> (Hash32, bool) {
        let h = proof_hash(&self.identity, nonce, self.epoch, &self.domain_id);
        let ok = h.to_u256() < self.target;
        (h, ok)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MinedProof {
    pub nonce: Nonce,
    pub hash: Hash32,
    /// Attempts made by the worker that found it.
    pub attempts: u64,
}

/// Uniformly random 256-bit starting nonce.
pub fn random_nonce() -> Nonce {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    U256::from_big_endian(&bytes)
}

/// Sequential searcher over `start, start + 1, ...` (wrapping).
#[derive(Clone, Debug)]
pub struct Miner {
    job: MiningJob,
    next: Nonce,
    attempts: u64,
}

impl Miner {
    /// Miner starting at a random nonce.
    pub fn new(job: MiningJob) -> Self {
        Self::starting_at(job, random_nonce())
    }

    pub fn starting_at(job: MiningJob, start: Nonce) -> Self {
        Self {
            job,
            next: start,
            attempts: 0,
        }
    }

    pub fn job(&self) -> &MiningJob {
        &self.job
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Try at most `budget` nonces.
    pub fn run_slice(&mut self, budget: u64) -> Option<MinedProof> {
        for _ in 0..budget {
            let nonce = self.next;
            self.next = nonce.overflowing_add(U256::one()).0;
            self.attempts += 1;
            let (hash, ok) = self.job.try_nonce(&nonce);
            if ok {
                return Some(MinedProof {
                    nonce,
                    hash,
                    attempts: self.attempts,
                });
            }
        }
        None
    }

    /// Search until a proof is found or `should_stop` returns true.
    pub fn mine_until(
        &mut self,
        yield_every: u64,
        should_stop: impl Fn() -> bool,
    ) -> Option<MinedProof> {
        let slice = yield_every.max(1);
        loop {
            if should_stop() {
                return None;
            }
            if let Some(found) = self.run_slice(slice) {
                return Some(found);
            }
            std::thread::yield_now();
        }
    }

    /// Search until a proof is found or `cancel` is set.
    pub fn mine(&mut self, yield_every: u64, cancel: &AtomicBool) -> Option<MinedProof> {
        self.mine_until(yield_every, || cancel.load(Ordering::Relaxed))
    }
}

/// Search with `threads` workers from disjoint random offsets; first proof wins.
pub fn mine_parallel(
    job: &MiningJob,
    threads: usize,
    yield_every: u64,
    cancel: &AtomicBool,
) -> Option<MinedProof> {
    let threads = threads.max(1);
    let found = AtomicBool::new(false);
    let base = random_nonce();
    let stride = U256::MAX / U256::from(threads);

    let result = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..threads)
            .map(|i| {
                let start = base.overflowing_add(stride * U256::from(i)).0;
                let found = &found;
                let job = *job;
                scope.spawn(move || {
                    let mut miner = Miner::starting_at(job, start);
                    let hit = miner.mine_until(yield_every, || {
                        found.load(Ordering::Relaxed) || cancel.load(Ordering::Relaxed)
                    });
                    if hit.is_some() {
                        found.store(true, Ordering::Relaxed);
                    }
                    hit
                })
            })
            .collect();
        handles
            .into_iter()
            .filter_map(|h| h.join().ok().flatten())
            .next()
    });
    debug!(threads, found = result.is_some(), "parallel search finished");
    result
}

/// Collect `count` distinct valid nonces, scanning sequentially from `start`.
///
/// Yields every `yield_every` attempts like [`Miner::mine`]. Returns `None` if `cancel` is set
/// before the batch is complete.
pub fn mine_batch(
    job: &MiningJob,
    count: usize,
    start: Nonce,
    yield_every: u64,
    cancel: &AtomicBool,
) -> Option<Vec<Nonce>> {
    let mut miner = Miner::starting_at(*job, start);
    let mut out = Vec::with_capacity(count);
    while out.len() < count {
        let found = miner.mine(yield_every, cancel)?;
        out.push(found.nonce);
    }
    Some(out)
}

/// Client-side queue of mined but not yet accepted nonces for one `(identity, epoch)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingBatch {
    pub identity: Identity,
    pub epoch: EpochNumber,
    nonces: Vec<Nonce>,
}

impl PendingBatch {
    pub fn new(identity: Identity, epoch: EpochNumber) -> Self {
        Self {
            identity,
            epoch,
            nonces: Vec::new(),
        }
    }

    /// Queue a nonce; duplicates are ignored.
    pub fn push(&mut self, nonce: Nonce) -> bool {
        if self.nonces.contains(&nonce) {
            return false;
        }
        self.nonces.push(nonce);
        true
    }

    pub fn len(&self) -> usize {
        self.nonces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nonces.is_empty()
    }

    pub fn nonces(&self) -> &[Nonce] {
        &self.nonces
    }

    /// Drop everything the engine already consumed, and everything if the engine moved past this
    /// batch's epoch. Returns how many nonces were dropped.
    pub fn reconcile(&mut self, consumed: &ConsumedProofs, current_epoch: EpochNumber) -> usize {
        let before = self.nonces.len();
        if current_epoch != self.epoch {
            self.nonces.clear();
        } else {
            let (id, epoch) = (self.identity, self.epoch);
            self.nonces.retain(|n| !consumed.contains(&id, n, epoch));
        }
        before - self.nonces.len()
    }

    /// Remove up to `MAX_BATCH` nonces for submission.
    pub fn take_batch(&mut self) -> Vec<Nonce> {
        let n = self.nonces.len().min(MAX_BATCH);
        self.nonces.drain(..n).collect()
    }
}
