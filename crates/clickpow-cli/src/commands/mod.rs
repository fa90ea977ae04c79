//! CLI command implementations

pub mod attest;
pub mod hash;
pub mod mine;
pub mod status;
pub mod verify;

use anyhow::{Context, Result};
use clickpow_core::{parse_u256, GameConfig, Identity, Target, U256};
use std::path::PathBuf;

/// Load the game config from a JSON file, or from the environment when no path is given.
pub fn load_config(path: Option<PathBuf>) -> Result<GameConfig> {
    match path {
        Some(path) => {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read config {}", path.display()))?;
            let config: GameConfig = serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse config {}", path.display()))?;
            config.validate()?;
            Ok(config)
        }
        None => GameConfig::from_env().context("Failed to load config from environment"),
    }
}

pub fn parse_identity(s: &str) -> Result<Identity> {
    s.parse::<Identity>()
        .with_context(|| format!("Invalid identity: {s}"))
}

pub fn parse_word(s: &str, what: &str) -> Result<U256> {
    parse_u256(s).with_context(|| format!("Invalid {what}: {s}"))
}

/// Explicit target, or the configured initial difficulty.
pub fn resolve_target(target: Option<String>, config: &GameConfig) -> Result<Target> {
    match target {
        Some(t) => parse_word(&t, "target"),
        None => Ok(config.initial_difficulty),
    }
}
