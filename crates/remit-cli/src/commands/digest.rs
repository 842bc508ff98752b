//! `remit digest` - Print the digest a subscriber signs for a mandate.

use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use crate::commands::load_mandate;

#[derive(Args, Debug)]
pub struct DigestArgs {
    /// Mandate JSON file
    #[arg(long)]
    pub mandate: PathBuf,
}

pub fn cmd_digest(args: DigestArgs) -> i32 {
    match run_digest(args) {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("error: {e:#}");
            1
        }
    }
}

fn run_digest(args: DigestArgs) -> Result<()> {
    let mandate = load_mandate(&args.mandate)?;
    println!("{}", mandate.digest());
    Ok(())
}
