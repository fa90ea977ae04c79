//! `clickpow verify` command implementation

use anyhow::{bail, Result};
use clickpow_core::hash::proof_hash;
use clickpow_core::GameConfig;

use super::{parse_identity, parse_word, resolve_target};

pub fn run(
    identity: String,
    nonce: String,
    epoch: u64,
    target: Option<String>,
    config: &GameConfig,
) -> Result<()> {
    let identity = parse_identity(&identity)?;
    let nonce = parse_word(&nonce, "nonce")?;
    let target = resolve_target(target, config)?;

    let h = proof_hash(&identity, &nonce, epoch, &config.domain_id);
    println!("hash:   {h}");
    println!("target: {target:#x}");
    if h.to_u256() < target {
        println!("valid");
        Ok(())
    } else {
        bail!("proof hash is not below the target")
    }
}
