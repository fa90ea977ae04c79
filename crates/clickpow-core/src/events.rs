//! Events emitted by engine transitions, consumed by indexers.

use crate::{Amount, EpochNumber, Identity, Target};
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum GameEvent {
    GameStarted {
        token_pool: Amount,
        start_time: u64,
        end_time: u64,
    },
    Clicked {
        submitter: Identity,
        epoch: EpochNumber,
        valid_clicks: u64,
        earned: Amount,
        burned: Amount,
    },
    EpochFinalized {
        epoch: EpochNumber,
        winner: Option<Identity>,
        winner_clicks: u64,
        finalizer: Identity,
        /// Winner's half of the winner bonus.
        winner_bonus: Amount,
        /// Unspent budget plus the burned half of the winner bonus.
        burned: Amount,
        finalizer_reward: Amount,
    },
    DifficultyAdjusted {
        epoch: EpochNumber,
        old_target: Target,
        new_target: Target,
    },
    GameEnded {
        burned: Amount,
    },
}

impl GameEvent {
    /// Short event name for logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            GameEvent::GameStarted { .. } => "game_started",
            GameEvent::Clicked { .. } => "clicked",
            GameEvent::EpochFinalized { .. } => "epoch_finalized",
            GameEvent::DifficultyAdjusted { .. } => "difficulty_adjusted",
            GameEvent::GameEnded { .. } => "game_ended",
        }
    }
}
