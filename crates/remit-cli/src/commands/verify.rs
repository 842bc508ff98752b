//! `remit verify` - Verify a mandate signature.
//!
//! Exit codes: 0 = valid, 4 = signature does not verify, 1 = unreadable
//! input.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use clap::Args;
use remit_core::verify_mandate_signature;
use std::fs;
use std::path::PathBuf;

use crate::commands::load_mandate;

#[derive(Args, Debug)]
pub struct VerifyArgs {
    /// Mandate JSON file
    #[arg(long)]
    pub mandate: PathBuf,

    /// Base64 signature file
    #[arg(long)]
    pub signature: PathBuf,
}

pub fn cmd_verify(args: VerifyArgs) -> i32 {
    match run_verify(args) {
        Ok(true) => {
            println!("signature OK");
            0
        }
        Ok(false) => {
            eprintln!("signature does not verify against the mandate subscriber");
            4
        }
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_verify(args: VerifyArgs) -> Result<bool> {
    let mandate = load_mandate(&args.mandate)?;

    let encoded = fs::read_to_string(&args.signature)
        .with_context(|| format!("failed to read signature file: {}", args.signature.display()))?;
    let signature = BASE64
        .decode(encoded.trim())
        .context("signature file is not valid base64")?;

    Ok(verify_mandate_signature(
        &mandate.digest(),
        &signature,
        &mandate.subscriber,
    ))
}
