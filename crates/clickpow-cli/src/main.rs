//! clickpow CLI - proof-of-work click economy tools
//!
//! Mine and check proofs, inspect persisted games, and sign difficulty attestations.

use anyhow::Result;
use clap::{Parser, Subcommand};
use clickpow_core::config::LoggingConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

/// clickpow: proof-of-work gated token emission
///
/// Proofs are Keccak-256 hashes of `identity || nonce || epoch || domain_id` that fall below the
/// current difficulty target.
#[derive(Parser)]
#[command(name = "clickpow")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output (overrides the configured log level)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Game config file (JSON); defaults to CLICKPOW_* environment variables
    #[arg(short, long, global = true, env = "CLICKPOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search for valid nonces
    Mine {
        /// Submitter identity (20-byte hex)
        #[arg(short, long)]
        identity: String,

        /// Epoch the proofs are for
        #[arg(short, long)]
        epoch: u64,

        /// Difficulty target (hex or decimal); defaults to the configured initial difficulty
        #[arg(short, long)]
        target: Option<String>,

        /// Number of distinct nonces to find
        #[arg(short = 'n', long, default_value_t = 50)]
        count: usize,

        /// Worker threads; defaults to the configured miner threads
        #[arg(long)]
        threads: Option<usize>,

        /// Output format (json, human)
        #[arg(short, long, default_value = "json")]
        format: String,
    },

    /// Check a single nonce against a target
    Verify {
        #[arg(short, long)]
        identity: String,

        #[arg(short, long)]
        nonce: String,

        #[arg(short, long)]
        epoch: u64,

        /// Difficulty target (hex or decimal); defaults to the configured initial difficulty
        #[arg(short, long)]
        target: Option<String>,
    },

    /// Print the packed proof message and its hash
    Hash {
        #[arg(short, long)]
        identity: String,

        #[arg(short, long)]
        nonce: String,

        #[arg(short, long)]
        epoch: u64,
    },

    /// Show stats from a saved game snapshot
    Status {
        /// Snapshot file (JSON)
        #[arg(short, long)]
        snapshot: PathBuf,

        /// Also show lifetime and current-epoch stats for this identity
        #[arg(short, long)]
        user: Option<String>,

        /// Unix time to evaluate the current epoch at; defaults to now
        #[arg(long)]
        now: Option<u64>,
    },

    /// Sign a difficulty attestation
    Attest {
        /// Attester ed25519 seed (32-byte hex)
        #[arg(long, env = "CLICKPOW_ATTESTER_SEED", hide_env_values = true)]
        seed: String,

        #[arg(short, long)]
        epoch: u64,

        /// Attested target (hex or decimal)
        #[arg(short, long)]
        target: String,

        /// Unix time after which the attestation is stale
        #[arg(long)]
        expires_at: u64,

        /// Output file; prints to stdout when omitted
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// `-v` wins over the configured level.
fn log_level(logging: &LoggingConfig, verbose: bool) -> &str {
    if verbose {
        "debug"
    } else {
        &logging.level
    }
}

fn init_logging(logging: &LoggingConfig, verbose: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(log_level(logging, verbose)))
        .with_writer(std::io::stderr);
    if logging.json_output {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = commands::load_config(cli.config)?;
    init_logging(&config.logging, cli.verbose);

    match cli.command {
        Commands::Mine {
            identity,
            epoch,
            target,
            count,
            threads,
            format,
        } => commands::mine::run(identity, epoch, target, count, threads, format, &config),
        Commands::Verify {
            identity,
            nonce,
            epoch,
            target,
        } => commands::verify::run(identity, nonce, epoch, target, &config),
        Commands::Hash {
            identity,
            nonce,
            epoch,
        } => commands::hash::run(identity, nonce, epoch, &config),
        Commands::Status {
            snapshot,
            user,
            now,
        } => commands::status::run(snapshot, user, now),
        Commands::Attest {
            seed,
            epoch,
            target,
            expires_at,
            output,
        } => commands::attest::run(seed, epoch, target, expires_at, output, &config),
    }
}
