//! `clickpow hash` command implementation

use anyhow::Result;
use clickpow_core::hash::{keccak256, proof_message};
use clickpow_core::GameConfig;

use super::{parse_identity, parse_word};

pub fn run(
    identity: String,
    nonce: String,
    epoch: u64,
    config: &GameConfig,
) -> Result<()> {
    let identity = parse_identity(&identity)?;
    let nonce = parse_word(&nonce, "nonce")?;

    let message = proof_message(&identity, &nonce, epoch, &config.domain_id);
    println!("message: 0x{}", hex::encode(message));
    println!("hash:    {}", keccak256(&message));
    Ok(())
}
