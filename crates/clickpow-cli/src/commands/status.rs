//! `clickpow status` command implementation

use anyhow::{Context, Result};
use clickpow_core::bonus::NoAchievements;
use clickpow_core::ledger::InMemoryLedger;
use clickpow_core::{store, Engine};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use super::parse_identity;

pub fn run(snapshot: PathBuf, user: Option<String>, now: Option<u64>) -> Result<()> {
    let snap = store::load(&snapshot)
        .with_context(|| format!("Failed to load snapshot {}", snapshot.display()))?;
    let commitment = snap.commitment()?;
    // Queries never touch the ledger, so an empty one is enough to inspect the state.
    let ledger = InMemoryLedger::new(snap.config.custody);
    let engine = Engine::from_snapshot(snap, ledger, NoAchievements)?;

    let now = match now {
        Some(t) => t,
        None => SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("System clock before unix epoch")?
            .as_secs(),
    };

    let mut out = serde_json::json!({
        "commitment": commitment.to_string(),
        "game": engine.get_game_stats(),
        "current_epoch": engine.get_current_epoch_info(now)?,
        "bonus_tiers": engine.get_bonus_tiers(),
    });

    if let Some(user) = user {
        let id = parse_identity(&user)?;
        let epoch = engine.effective_epoch(now);
        out["user"] = serde_json::json!({
            "identity": id,
            "lifetime": engine.get_user_lifetime_stats(&id),
            "epoch": engine.get_user_epoch_stats_with_rank(epoch, &id),
        });
    }

    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}
