//! `remit balance` - Query balances from a checkpoint database.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use remit_core::{Address, CheckpointStore, VirtualBalanceLedger};
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct BalanceArgs {
    /// Checkpoint database file
    #[arg(long)]
    pub db: PathBuf,

    /// Subscriber address (64 hex characters)
    #[arg(long)]
    pub subscriber: Address,

    /// Evaluate at this RFC 3339 instant instead of the current time
    #[arg(long)]
    pub at: Option<DateTime<Utc>>,

    /// Grace period used for honor-window reporting
    #[arg(long, default_value_t = 0)]
    pub grace_period_seconds: i64,
}

pub fn cmd_balance(args: BalanceArgs) -> i32 {
    match run_balance(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_balance(args: BalanceArgs) -> Result<()> {
    let store = CheckpointStore::open(&args.db)
        .with_context(|| format!("failed to open checkpoint database: {}", args.db.display()))?;
    let ledger = VirtualBalanceLedger::new(store, args.grace_period_seconds);

    let now = args.at.unwrap_or_else(Utc::now);
    let balance = ledger.balance_of(&args.subscriber, now)?;
    let total = ledger.total_active(now)?;

    println!("at:           {}", now.to_rfc3339());
    println!("subscriber:   {}", args.subscriber);
    println!("balance:      {balance}");
    println!("total active: {total}");

    Ok(())
}
