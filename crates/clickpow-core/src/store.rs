//! Game persistence.
//!
//! A snapshot is the configuration plus the full [`GameState`], serialized as JSON. The file also
//! carries a SHA-256 commitment over the snapshot bytes; loading recomputes it and refuses a file
//! whose contents do not match.

use crate::bonus::AchievementRegistry;
use crate::engine::Engine;
use crate::hash::sha256_domain;
use crate::ledger::TokenLedger;
use crate::state::GameState;
use crate::{ClickpowError, GameConfig, Hash32, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

/// Domain separation tag for snapshot commitments.
pub const SNAPSHOT_DOMAIN_V1: &[u8] = b"CLICKPOW_SNAPSHOT_V1";

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameSnapshot {
    pub config: GameConfig,
    pub state: GameState,
}

impl GameSnapshot {
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| ClickpowError::StorageError(e.to_string()))
    }

    /// Commitment over the serialized snapshot.
    pub fn commitment(&self) -> Result<Hash32> {
        Ok(sha256_domain(SNAPSHOT_DOMAIN_V1, &self.to_bytes()?))
    }
}

#[derive(Serialize, Deserialize)]
struct SnapshotFile {
    commitment: String,
    snapshot: GameSnapshot,
}

/// Write `snapshot` to `path` and return its commitment.
pub fn save(path: &Path, snapshot: &GameSnapshot) -> Result<Hash32> {
    let commitment = snapshot.commitment()?;
    let file = SnapshotFile {
        commitment: hex::encode(commitment.0),
        snapshot: snapshot.clone(),
    };
    let bytes = serde_json::to_vec_pretty(&file)
        .map_err(|e| ClickpowError::StorageError(e.to_string()))?;
    std::fs::write(path, bytes)
        .map_err(|e| ClickpowError::StorageError(format!("write {}: {e}", path.display())))?;
    info!(path = %path.display(), commitment = %commitment, "snapshot saved");
    Ok(commitment)
}

/// Read a snapshot from `path`, verifying its commitment.
pub fn load(path: &Path) -> Result<GameSnapshot> {
    let bytes = std::fs::read(path)
        .map_err(|e| ClickpowError::StorageError(format!("read {}: {e}", path.display())))?;
    let file: SnapshotFile =
        serde_json::from_slice(&bytes).map_err(|e| ClickpowError::StorageError(e.to_string()))?;
    let expected = hex::encode(file.snapshot.commitment()?.0);
    if expected != file.commitment {
        return Err(ClickpowError::StorageError(format!(
            "snapshot commitment mismatch: file says {}, contents hash to {expected}",
            file.commitment
        )));
    }
    Ok(file.snapshot)
}

impl<L: TokenLedger, R: AchievementRegistry> Engine<L, R> {
    pub fn snapshot(&self) -> GameSnapshot {
        GameSnapshot {
            config: self.config().clone(),
            state: self.state().clone(),
        }
    }

    /// Rebuild an engine from a snapshot. Installed attestations are not part of the snapshot.
    pub fn from_snapshot(snapshot: GameSnapshot, ledger: L, achievements: R) -> Result<Self> {
        Engine::from_state(snapshot.config, snapshot.state, ledger, achievements)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bonus::NoAchievements;
    use crate::ledger::InMemoryLedger;
    use crate::limits::max_target;
    use crate::Identity;

    const OWNER: Identity = Identity([0x0A; 20]);
    const CUSTODY: Identity = Identity([0xC0; 20]);

    fn started_engine() -> Engine<InMemoryLedger> {
        let config = GameConfig::builder()
            .owner(OWNER)
            .custody(CUSTODY)
            .total_epochs(4)
            .initial_difficulty(max_target())
            .build()
            .unwrap();
        let mut ledger = InMemoryLedger::new(CUSTODY);
        ledger.mint(CUSTODY, 5_000_000).unwrap();
        let mut e = Engine::new(config, ledger, NoAchievements).unwrap();
        e.start(&OWNER, 5_000_000, 1_000).unwrap();
        e.finalize(&OWNER, 1, 1_000 + 86_400).unwrap();
        e
    }

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("clickpow-{}-{name}.json", std::process::id()))
    }

    #[test]
    fn snapshot_round_trips_through_disk() {
        let e = started_engine();
        let path = temp_path("roundtrip");
        let c = save(&path, &e.snapshot()).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.state, *e.state());
        assert_eq!(loaded.commitment().unwrap(), c);

        let restored =
            Engine::from_snapshot(loaded, e.ledger().clone(), NoAchievements).unwrap();
        assert_eq!(restored.state(), e.state());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn tampered_snapshot_is_rejected() {
        let e = started_engine();
        let path = temp_path("tamper");
        save(&path, &e.snapshot()).unwrap();
        let mut file: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        file["snapshot"]["state"]["total_clicks"] = serde_json::json!(7);
        std::fs::write(&path, serde_json::to_vec(&file).unwrap()).unwrap();
        assert!(matches!(load(&path), Err(ClickpowError::StorageError(_))));
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn missing_file_is_a_storage_error() {
        assert!(matches!(
            load(Path::new("/nonexistent/clickpow.json")),
            Err(ClickpowError::StorageError(_))
        ));
    }
}
