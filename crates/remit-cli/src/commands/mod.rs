//! `remit` command dispatch.

pub mod balance;
pub mod digest;
pub mod keygen;
pub mod sign;
pub mod simulate;
pub mod verify;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use remit_core::Mandate;
use std::fs;
use std::path::Path;

#[derive(Parser, Debug)]
#[command(
    name = "remit",
    version,
    about = "Offline tooling for recurring-payment mandates"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Generate an ed25519 subscriber keypair
    Keygen(keygen::KeygenArgs),
    /// Print the digest a subscriber signs for a mandate
    Digest(digest::DigestArgs),
    /// Sign a mandate with a subscriber key
    Sign(sign::SignArgs),
    /// Verify a mandate signature
    Verify(verify::VerifyArgs),
    /// Query balances from a checkpoint database
    Balance(balance::BalanceArgs),
    /// Replay the reference settlement flow in memory
    Simulate(simulate::SimulateArgs),
}

pub fn dispatch(cli: Cli) -> i32 {
    match cli.command {
        Command::Keygen(args) => keygen::cmd_keygen(args),
        Command::Digest(args) => digest::cmd_digest(args),
        Command::Sign(args) => sign::cmd_sign(args),
        Command::Verify(args) => verify::cmd_verify(args),
        Command::Balance(args) => balance::cmd_balance(args),
        Command::Simulate(args) => simulate::cmd_simulate(args),
    }
}

/// Load and structurally validate a mandate JSON file.
pub(crate) fn load_mandate(path: &Path) -> Result<Mandate> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read mandate file: {}", path.display()))?;
    let mandate: Mandate = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse mandate file: {}", path.display()))?;
    mandate
        .validate()
        .with_context(|| format!("invalid mandate: {}", path.display()))?;
    Ok(mandate)
}
