//! `clickpow attest` command implementation

use anyhow::{Context, Result};
use clickpow_core::attestation::{AttestationSigner, AttestedProvider};
use clickpow_core::GameConfig;
use std::path::PathBuf;
use tracing::info;

use super::parse_word;

pub fn run(
    seed: String,
    epoch: u64,
    target: String,
    expires_at: u64,
    output: Option<PathBuf>,
    config: &GameConfig,
) -> Result<()> {
    let signer = AttestationSigner::from_hex(&seed).context("Invalid attester seed")?;
    let target = parse_word(&target, "target")?;

    let attestation = signer.sign(config.domain_id, epoch, target, expires_at);
    // Refuse to emit something the engine would reject.
    AttestedProvider::from_hex(&signer.verifying_key_hex(), config.domain_id)?
        .verify(&attestation)
        .context("Attestation does not verify")?;

    let json = serde_json::to_string_pretty(&serde_json::json!({
        "verifying_key": signer.verifying_key_hex(),
        "attestation": attestation,
    }))?;
    match output {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            info!(path = %path.display(), epoch, "attestation written");
        }
        None => println!("{json}"),
    }
    Ok(())
}
