//! `remit simulate` - Replay the reference settlement flow in memory.
//!
//! Builds a fresh subscriber key, a mandate paying 10 tokens every 2
//! seconds, and an in-memory ledger, then replays the canonical lifecycle
//! with a simulated clock: settle, reject the replay, decay, re-settle
//! with the same signature, decay again. Each expectation is checked as
//! the flow runs, so the command doubles as a smoke test of a deployment's
//! engine build.

use anyhow::{ensure, Result};
use chrono::{Duration, Utc};
use clap::Args;
use ed25519_dalek::SigningKey;
use remit_core::{
    sign_mandate, subscriber_address, Address, CheckpointStore, EngineConfig, Mandate,
    MemoryTokenLedger, SettlementEngine, SettlementError, TokenId, TokenLedger,
};

#[derive(Args, Debug)]
pub struct SimulateArgs {
    /// Reimburse an executor address for each settlement
    #[arg(long)]
    pub with_executor: bool,
}

pub fn cmd_simulate(args: SimulateArgs) -> i32 {
    match run_simulate(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_simulate(args: SimulateArgs) -> Result<()> {
    let key = SigningKey::generate(&mut rand::thread_rng());
    let subscriber = subscriber_address(&key.verifying_key());
    let recipient = Address::from_bytes([0x22; 32]);
    let executor = Address::from_bytes([0x77; 32]);
    let token = TokenId::from_bytes([0xda; 32]);

    let mandate = Mandate {
        subscriber,
        recipient,
        token,
        amount: 10,
        period_seconds: 2,
        execution_fee_price: 1,
        nonce: 0,
    };
    let signature = sign_mandate(&mandate, &key);

    let mut ledger = MemoryTokenLedger::new();
    ledger.mint(subscriber, token, 1_000);
    ledger.approve(subscriber, token, 1_000);

    let config = EngineConfig {
        grace_period_seconds: 1,
        executor: args.with_executor.then_some(executor),
        ..EngineConfig::default()
    };
    let mut engine = SettlementEngine::new(CheckpointStore::memory()?, ledger, config);

    let t0 = Utc::now();
    println!("mandate:    {}", mandate.digest());
    println!("subscriber: {subscriber}");

    // t=0: first settlement.
    let receipt = engine.execute_settlement(&mandate, &signature, t0)?;
    println!("\n[t=0s] settled: {}", serde_json::to_string_pretty(&receipt)?);
    ensure!(engine.balance_of(&subscriber, t0)? == 10, "balance after settlement");
    ensure!(engine.total_active(t0)? == 10, "total after settlement");

    // t=0.5s: replay is rejected without charging.
    let replay = engine.execute_settlement(&mandate, &signature, t0 + Duration::milliseconds(500));
    match replay {
        Err(SettlementError::NotYetEligible { eligible_at }) => {
            println!("[t=0.5s] replay rejected, next window opens at {eligible_at}");
        }
        other => anyhow::bail!("replay must be rejected as not-yet-eligible, got {other:?}"),
    }

    // t=5.5s: balance has decayed.
    let later = t0 + Duration::milliseconds(5_500);
    ensure!(engine.balance_of(&subscriber, later)? == 0, "balance after decay");
    ensure!(engine.total_active(later)? == 0, "total after decay");
    println!("[t=5.5s] balance decayed to 0");

    // t=5.5s: the same signed mandate settles again.
    let receipt = engine.execute_settlement(&mandate, &signature, later)?;
    println!("[t=5.5s] re-settled, settlement #{}", receipt.settlement_count);
    ensure!(engine.balance_of(&subscriber, later)? == 10, "balance after re-settlement");

    // t=11s: decayed again.
    let end = t0 + Duration::seconds(11);
    ensure!(engine.balance_of(&subscriber, end)? == 0, "balance after second decay");
    println!("[t=11s] balance decayed to 0");

    if args.with_executor {
        let paid = engine.ledger().balance_of(&executor, &token);
        ensure!(paid == 2, "executor fee across two settlements");
        println!("executor reimbursed {paid} across two settlements");
    }

    println!("\nflow complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simulation_flow_holds() {
        run_simulate(SimulateArgs {
            with_executor: false,
        })
        .unwrap();
    }

    #[test]
    fn test_simulation_flow_with_executor_holds() {
        run_simulate(SimulateArgs {
            with_executor: true,
        })
        .unwrap();
    }
}
