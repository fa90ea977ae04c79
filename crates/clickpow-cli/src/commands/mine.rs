//! `clickpow mine` command implementation

use anyhow::{bail, Result};
use clickpow_core::miner::{mine_parallel, MiningJob, PendingBatch};
use clickpow_core::GameConfig;
use serde::Serialize;
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use tracing::info;

use super::{parse_identity, resolve_target};

#[derive(Serialize)]
struct MineOutput {
    job: MiningJob,
    nonces: Vec<String>,
    elapsed_ms: u128,
}

pub fn run(
    identity: String,
    epoch: u64,
    target: Option<String>,
    count: usize,
    threads: Option<usize>,
    format: String,
    config: &GameConfig,
) -> Result<()> {
    if count == 0 {
        bail!("count must be greater than 0");
    }
    let job = MiningJob {
        identity: parse_identity(&identity)?,
        epoch,
        domain_id: config.domain_id,
        target: resolve_target(target, config)?,
    };
    let threads = threads.unwrap_or(config.miner.threads);
    let cancel = AtomicBool::new(false);
    let started = Instant::now();

    info!(threads, count, target = %job.target, "mining");
    let mut pending = PendingBatch::new(job.identity, epoch);
    while pending.len() < count {
        match mine_parallel(&job, threads, config.miner.yield_every, &cancel) {
            Some(found) => {
                pending.push(found.nonce);
            }
            None => bail!("mining cancelled"),
        }
    }
    let elapsed_ms = started.elapsed().as_millis();

    match format.as_str() {
        "json" => {
            let out = MineOutput {
                job,
                nonces: pending
                    .nonces()
                    .iter()
                    .map(|n| format!("{n:#x}"))
                    .collect(),
                elapsed_ms,
            };
            println!("{}", serde_json::to_string_pretty(&out)?);
        }
        "human" => {
            println!("Found {} nonces in {} ms", pending.len(), elapsed_ms);
            for n in pending.nonces() {
                println!("  {n:#x}");
            }
        }
        other => bail!("Unknown format: {other} (expected json or human)"),
    }
    Ok(())
}
