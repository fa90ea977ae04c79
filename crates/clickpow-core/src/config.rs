//! Configuration for a clickpow game.
//!
//! Every check runs in [`GameConfig::validate`] before any state exists, so a bad configuration
//! can never produce a half-built game.
//!
//! # Configuration Sources
//!
//! - Environment variables (prefixed with `CLICKPOW_`)
//! - JSON files (via serde)
//! - Programmatic defaults and the builder
//!
//! # Example
//!
//! ```rust,ignore
//! use clickpow_core::config::GameConfig;
//!
//! let config = GameConfig::builder()
//!     .epoch_duration_secs(86_400)
//!     .total_epochs(90)
//!     .build()?;
//! ```

use crate::limits::{
    max_target, min_target, target_clicks_per_epoch, BPS_DENOMINATOR, MAX_EPOCH_DURATION_SECS,
    MAX_TOTAL_EPOCHS, MIN_EPOCH_DURATION_SECS, SECONDS_PER_DAY,
};
use crate::math::Bps;
use crate::{parse_u256, ClickpowError, DomainId, Identity, Result, Target, U256};
use serde::{Deserialize, Serialize};

/// Where the difficulty target comes from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DifficultyMode {
    /// Retarget from observed clicks at every finalize.
    OnChain,
    /// Use a signed, expiring target published by an attester.
    Attested {
        /// Hex-encoded ed25519 verifying key (32 bytes = 64 hex chars).
        verifying_key_hex: String,
    },
}

impl Default for DifficultyMode {
    fn default() -> Self {
        DifficultyMode::OnChain
    }
}

/// Miner tuning.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Worker threads for parallel search.
    pub threads: usize,

    /// Attempts between cooperative yields.
    pub yield_every: u64,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            threads: 1,
            yield_every: 1_000,
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// JSON output format.
    pub json_output: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            json_output: false,
        }
    }
}

/// Complete game configuration. Set once, before `start`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameConfig {
    /// Epoch length in seconds (3600..=604800).
    pub epoch_duration_secs: u64,

    /// Number of epochs in the game.
    pub total_epochs: u64,

    /// Difficulty target at epoch 1.
    pub initial_difficulty: Target,

    /// Deployment binding mixed into every proof hash.
    pub domain_id: DomainId,

    /// Only identity allowed to configure and start the game.
    pub owner: Identity,

    /// Ledger account holding the pre-funded pool.
    pub custody: Identity,

    /// Share of the pool emitted per day, pro-rated to the epoch length.
    pub daily_emission_bps: Bps,

    /// Epoch-winner bonus as a share of the epoch's emission budget.
    pub winner_bonus_bps: Bps,

    /// Keeper incentive for finalizing an epoch, as a share of its emission budget.
    pub finalizer_reward_bps: Bps,

    /// Difficulty source.
    #[serde(default)]
    pub difficulty: DifficultyMode,

    #[serde(default)]
    pub miner: MinerConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            epoch_duration_secs: 86_400,
            total_epochs: 90,
            initial_difficulty: U256::MAX / U256::from(1_000u64),
            domain_id: U256::one(),
            owner: Identity::ZERO,
            custody: Identity([0xC0; 20]),
            daily_emission_bps: Bps::new(200).unwrap_or(Bps::ZERO),
            winner_bonus_bps: Bps::new(1_000).unwrap_or(Bps::ZERO),
            finalizer_reward_bps: Bps::new(10).unwrap_or(Bps::ZERO),
            difficulty: DifficultyMode::OnChain,
            miner: MinerConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GameConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GameConfigBuilder {
        GameConfigBuilder::default()
    }

    /// Load configuration from environment variables on top of the defaults.
    ///
    /// Looks for variables prefixed with `CLICKPOW_`:
    /// - `CLICKPOW_EPOCH_DURATION_SECS`
    /// - `CLICKPOW_TOTAL_EPOCHS`
    /// - `CLICKPOW_INITIAL_DIFFICULTY` - hex (`0x..`) or decimal
    /// - `CLICKPOW_DOMAIN_ID` - hex (`0x..`) or decimal
    /// - `CLICKPOW_OWNER`, `CLICKPOW_CUSTODY` - 20-byte hex identities
    /// - `CLICKPOW_DAILY_EMISSION_BPS`
    /// - `CLICKPOW_ATTESTER_KEY_HEX` - switches to attested difficulty
    /// - `CLICKPOW_MINER_THREADS`
    /// - `CLICKPOW_LOG_LEVEL`
    /// - `CLICKPOW_LOG_JSON` - `true` for JSON log lines
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(v) = std::env::var("CLICKPOW_EPOCH_DURATION_SECS") {
            config.epoch_duration_secs = parse_env("CLICKPOW_EPOCH_DURATION_SECS", &v)?;
        }

        if let Ok(v) = std::env::var("CLICKPOW_TOTAL_EPOCHS") {
            config.total_epochs = parse_env("CLICKPOW_TOTAL_EPOCHS", &v)?;
        }

        if let Ok(v) = std::env::var("CLICKPOW_INITIAL_DIFFICULTY") {
            config.initial_difficulty = parse_u256(&v).map_err(|e| {
                ClickpowError::ConfigError(format!("Invalid CLICKPOW_INITIAL_DIFFICULTY: {}", e))
            })?;
        }

        if let Ok(v) = std::env::var("CLICKPOW_DOMAIN_ID") {
            config.domain_id = parse_u256(&v).map_err(|e| {
                ClickpowError::ConfigError(format!("Invalid CLICKPOW_DOMAIN_ID: {}", e))
            })?;
        }

        if let Ok(v) = std::env::var("CLICKPOW_OWNER") {
            config.owner = v.parse().map_err(|e| {
                ClickpowError::ConfigError(format!("Invalid CLICKPOW_OWNER: {}", e))
            })?;
        }

        if let Ok(v) = std::env::var("CLICKPOW_CUSTODY") {
            config.custody = v.parse().map_err(|e| {
                ClickpowError::ConfigError(format!("Invalid CLICKPOW_CUSTODY: {}", e))
            })?;
        }

        if let Ok(v) = std::env::var("CLICKPOW_DAILY_EMISSION_BPS") {
            let raw: u16 = parse_env("CLICKPOW_DAILY_EMISSION_BPS", &v)?;
            config.daily_emission_bps = Bps::new(raw)
                .map_err(|e| ClickpowError::ConfigError(format!("Invalid CLICKPOW_DAILY_EMISSION_BPS: {}", e)))?;
        }

        if let Ok(key) = std::env::var("CLICKPOW_ATTESTER_KEY_HEX") {
            config.difficulty = DifficultyMode::Attested {
                verifying_key_hex: key,
            };
        }

        if let Ok(v) = std::env::var("CLICKPOW_MINER_THREADS") {
            config.miner.threads = parse_env("CLICKPOW_MINER_THREADS", &v)?;
        }

        if let Ok(level) = std::env::var("CLICKPOW_LOG_LEVEL") {
            config.logging.level = level;
        }

        if let Ok(v) = std::env::var("CLICKPOW_LOG_JSON") {
            config.logging.json_output = parse_env("CLICKPOW_LOG_JSON", &v)?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        if self.epoch_duration_secs < MIN_EPOCH_DURATION_SECS
            || self.epoch_duration_secs > MAX_EPOCH_DURATION_SECS
        {
            return Err(ClickpowError::ConfigError(format!(
                "epoch_duration_secs must be between {} and {}",
                MIN_EPOCH_DURATION_SECS, MAX_EPOCH_DURATION_SECS
            )));
        }

        if self.total_epochs == 0 || self.total_epochs > MAX_TOTAL_EPOCHS {
            return Err(ClickpowError::ConfigError(format!(
                "total_epochs must be between 1 and {}",
                MAX_TOTAL_EPOCHS
            )));
        }

        if self.initial_difficulty < min_target() || self.initial_difficulty > max_target() {
            return Err(ClickpowError::ConfigError(
                "initial_difficulty must be within [1000, (2^256-1)/2]".into(),
            ));
        }

        if self.daily_emission_bps == Bps::ZERO {
            return Err(ClickpowError::ConfigError(
                "daily_emission_bps must be greater than 0".into(),
            ));
        }

        // Per-epoch emission is pro-rated from the daily rate and may not exceed the whole pool.
        let per_epoch_scaled =
            self.daily_emission_bps.get() as u128 * self.epoch_duration_secs as u128;
        if per_epoch_scaled > BPS_DENOMINATOR as u128 * SECONDS_PER_DAY as u128 {
            return Err(ClickpowError::ConfigError(format!(
                "daily_emission_bps {} over {}s epochs emits more than the pool per epoch",
                self.daily_emission_bps.get(),
                self.epoch_duration_secs
            )));
        }

        if target_clicks_per_epoch(self.epoch_duration_secs) == 0 {
            return Err(ClickpowError::ConfigError(
                "epoch too short for a non-zero click target".into(),
            ));
        }

        if let DifficultyMode::Attested { ref verifying_key_hex } = self.difficulty {
            if verifying_key_hex.len() != 64 {
                return Err(ClickpowError::ConfigError(
                    "verifying_key_hex must be 64 hex characters (32 bytes)".into(),
                ));
            }
            if hex::decode(verifying_key_hex).is_err() {
                return Err(ClickpowError::ConfigError(
                    "verifying_key_hex is not valid hex".into(),
                ));
            }
        }

        if !LOG_LEVELS.contains(&self.logging.level.to_ascii_lowercase().as_str()) {
            return Err(ClickpowError::ConfigError(format!(
                "log level must be one of {}",
                LOG_LEVELS.join(", ")
            )));
        }

        if self.miner.threads == 0 || self.miner.yield_every == 0 {
            return Err(ClickpowError::ConfigError(
                "miner threads and yield_every must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Start of epoch `epoch` relative to a game start time.
    pub fn epoch_start(&self, game_start_time: u64, epoch: u64) -> u64 {
        game_start_time.saturating_add(epoch.saturating_sub(1).saturating_mul(self.epoch_duration_secs))
    }

    /// Clicks per epoch the retargeting aims for.
    pub fn target_clicks(&self) -> u64 {
        target_clicks_per_epoch(self.epoch_duration_secs)
    }

    /// `min(total_epochs, floor((now - start) / duration) + 1)`; `1` before the start time.
    pub fn time_epoch(&self, game_start_time: u64, now: u64) -> u64 {
        let elapsed = now.saturating_sub(game_start_time);
        (elapsed / self.epoch_duration_secs + 1).min(self.total_epochs)
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| ClickpowError::ConfigError(format!("Invalid {}: {}", name, e)))
}

/// Builder for GameConfig.
#[derive(Default)]
pub struct GameConfigBuilder {
    config: GameConfig,
}

impl GameConfigBuilder {
    pub fn epoch_duration_secs(mut self, secs: u64) -> Self {
        self.config.epoch_duration_secs = secs;
        self
    }

    pub fn total_epochs(mut self, epochs: u64) -> Self {
        self.config.total_epochs = epochs;
        self
    }

    pub fn initial_difficulty(mut self, target: Target) -> Self {
        self.config.initial_difficulty = target;
        self
    }

    pub fn domain_id(mut self, domain_id: DomainId) -> Self {
        self.config.domain_id = domain_id;
        self
    }

    pub fn owner(mut self, owner: Identity) -> Self {
        self.config.owner = owner;
        self
    }

    pub fn custody(mut self, custody: Identity) -> Self {
        self.config.custody = custody;
        self
    }

    /// Set emission rate; out-of-range values are caught by `build`.
    pub fn daily_emission_bps(mut self, bps: u16) -> Self {
        self.config.daily_emission_bps = Bps::new(bps).unwrap_or(Bps::ZERO);
        self
    }

    pub fn winner_bonus_bps(mut self, bps: Bps) -> Self {
        self.config.winner_bonus_bps = bps;
        self
    }

    pub fn finalizer_reward_bps(mut self, bps: Bps) -> Self {
        self.config.finalizer_reward_bps = bps;
        self
    }

    /// Use a signed difficulty feed verified with this ed25519 key.
    pub fn attested_difficulty(mut self, verifying_key_hex: impl Into<String>) -> Self {
        self.config.difficulty = DifficultyMode::Attested {
            verifying_key_hex: verifying_key_hex.into(),
        };
        self
    }

    pub fn miner_threads(mut self, threads: usize) -> Self {
        self.config.miner.threads = threads;
        self
    }

    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn log_json(mut self, json: bool) -> Self {
        self.config.logging.json_output = json;
        self
    }

    /// Build and validate the configuration.
    pub fn build(self) -> Result<GameConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
