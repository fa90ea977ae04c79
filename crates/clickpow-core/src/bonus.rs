//! Achievement-gated reward bonuses.
//!
//! Each configured tier grants `bonus_bps` to holders of the matching achievement. Per-tier bonuses
//! are capped at 20% when configured and the sum across owned tiers is capped at 50%.

use crate::limits::{MAX_TIER_BONUS_BPS, MAX_TOTAL_BONUS_BPS};
use crate::math::Bps;
use crate::{ClickpowError, Identity, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::RwLock;

/// Achievement categories, each carrying its numeric threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "threshold")]
pub enum AchievementTier {
    /// Lifetime personal click milestone.
    Personal(u64),
    /// Consecutive-day participation streak.
    Streak(u32),
    /// Global click index reached first by the holder.
    GlobalUnique(u64),
    /// Unlisted achievement identified by number.
    Hidden(u32),
}

impl fmt::Display for AchievementTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AchievementTier::Personal(n) => write!(f, "personal:{n}"),
            AchievementTier::Streak(n) => write!(f, "streak:{n}"),
            AchievementTier::GlobalUnique(n) => write!(f, "global:{n}"),
            AchievementTier::Hidden(n) => write!(f, "hidden:{n}"),
        }
    }
}

/// A configured bonus tier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BonusTier {
    pub tier: AchievementTier,
    pub bonus_bps: Bps,
}

/// Ownership predicate for achievements (granted elsewhere, read-only here).
pub trait AchievementRegistry {
    fn owns_achievement(&self, identity: &Identity, tier: &AchievementTier) -> bool;
}

/// Configured tiers, keyed by achievement.
///
/// Serialized as a list of [`BonusTier`] so that it can live inside JSON snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<BonusTier>", into = "Vec<BonusTier>")]
pub struct BonusTable {
    tiers: BTreeMap<AchievementTier, Bps>,
}

impl From<Vec<BonusTier>> for BonusTable {
    fn from(list: Vec<BonusTier>) -> Self {
        Self {
            tiers: list.into_iter().map(|t| (t.tier, t.bonus_bps)).collect(),
        }
    }
}

impl From<BonusTable> for Vec<BonusTier> {
    fn from(table: BonusTable) -> Self {
        table.tiers()
    }
}

impl BonusTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set (or with `0` remove) a tier's bonus. Values above 20% are rejected.
    pub fn set(&mut self, tier: AchievementTier, bonus_bps: u16) -> Result<()> {
        if bonus_bps > MAX_TIER_BONUS_BPS {
            return Err(ClickpowError::InvalidInput(format!(
                "tier {tier} bonus {bonus_bps} bps exceeds {MAX_TIER_BONUS_BPS}"
            )));
        }
        if bonus_bps == 0 {
            self.tiers.remove(&tier);
        } else {
            self.tiers.insert(tier, Bps::new(bonus_bps)?);
        }
        Ok(())
    }

    pub fn get(&self, tier: &AchievementTier) -> Option<Bps> {
        self.tiers.get(tier).copied()
    }

    pub fn len(&self) -> usize {
        self.tiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiers.is_empty()
    }

    pub fn tiers(&self) -> Vec<BonusTier> {
        self.tiers
            .iter()
            .map(|(tier, bps)| BonusTier {
                tier: *tier,
                bonus_bps: *bps,
            })
            .collect()
    }

    /// Total bonus for `identity`: sum over owned tiers, capped at 50%.
    pub fn calculate(&self, identity: &Identity, registry: &dyn AchievementRegistry) -> Bps {
        let sum: u32 = self
            .tiers
            .iter()
            .filter(|(tier, _)| registry.owns_achievement(identity, tier))
            .map(|(_, bps)| bps.get() as u32)
            .sum();
        let capped = sum.min(MAX_TOTAL_BONUS_BPS as u32) as u16;
        // `capped <= 5_000` so this cannot fail.
        Bps::new(capped).unwrap_or(Bps::ZERO)
    }
}

/// Registry that grants nothing.
pub struct NoAchievements;

impl AchievementRegistry for NoAchievements {
    fn owns_achievement(&self, _identity: &Identity, _tier: &AchievementTier) -> bool {
        false
    }
}

/// In-memory achievement registry.
#[derive(Default)]
pub struct StaticAchievements {
    owned: RwLock<BTreeSet<(Identity, AchievementTier)>>,
}

impl StaticAchievements {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant(&self, identity: Identity, tier: AchievementTier) {
        if let Ok(mut owned) = self.owned.write() {
            owned.insert((identity, tier));
        }
    }

    pub fn revoke(&self, identity: &Identity, tier: &AchievementTier) {
        if let Ok(mut owned) = self.owned.write() {
            owned.remove(&(*identity, *tier));
        }
    }
}

impl AchievementRegistry for StaticAchievements {
    fn owns_achievement(&self, identity: &Identity, tier: &AchievementTier) -> bool {
        self.owned
            .read()
            .map(|owned| owned.contains(&(*identity, *tier)))
            .unwrap_or(false)
    }
}
