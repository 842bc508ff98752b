//! `remit sign` - Sign a mandate with a subscriber key.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Args;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use ed25519_dalek::SigningKey;
use remit_core::{sign_mandate, subscriber_address};
use std::fs;
use std::path::PathBuf;

use crate::commands::load_mandate;

#[derive(Args, Debug)]
pub struct SignArgs {
    /// Mandate JSON file
    #[arg(long)]
    pub mandate: PathBuf,

    /// Subscriber private key (PKCS#8 PEM)
    #[arg(long)]
    pub key: PathBuf,

    /// Write the base64 signature here instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn cmd_sign(args: SignArgs) -> i32 {
    match run_sign(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_sign(args: SignArgs) -> Result<()> {
    let mandate = load_mandate(&args.mandate)?;

    let pem = fs::read_to_string(&args.key)
        .with_context(|| format!("failed to read key file: {}", args.key.display()))?;
    let key = SigningKey::from_pkcs8_pem(&pem)
        .map_err(|e| anyhow::anyhow!("failed to parse PKCS#8 private key: {e}"))?;

    let signer = subscriber_address(&key.verifying_key());
    if signer != mandate.subscriber {
        anyhow::bail!(
            "key does not match the mandate subscriber: key is {signer}, mandate commits to {}",
            mandate.subscriber
        );
    }

    let signature = BASE64.encode(sign_mandate(&mandate, &key));

    match args.out {
        Some(path) => {
            fs::write(&path, &signature)
                .with_context(|| format!("failed to write signature: {}", path.display()))?;
            println!("signature: {}", path.display());
        }
        None => println!("{signature}"),
    }

    Ok(())
}
