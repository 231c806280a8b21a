/// `kiln ledger` command implementation
///
/// Inspects or resets the cache ledger backing a variant's target
/// environment.
use anyhow::Result;

use super::{load_context, resolve_ledger_path};
use crate::cli::{LedgerCommand, LedgerRefArgs};
use crate::ledger::{CacheLedger, StepStatus};

pub fn run(command: LedgerCommand) -> Result<()> {
    match command {
        LedgerCommand::List(args) => list(&args),
        LedgerCommand::Clean(args) => clean(&args),
    }
}

fn open(args: &LedgerRefArgs) -> Result<CacheLedger> {
    let context = load_context(&args.common)?;
    let path = resolve_ledger_path(
        args.ledger.as_deref(),
        &context.config,
        &context.descriptor,
        args.target,
    );
    Ok(CacheLedger::load(&path)?)
}

fn list(args: &LedgerRefArgs) -> Result<()> {
    let ledger = open(args)?;

    println!("Ledger: {}", ledger.path().display());
    if ledger.is_empty() {
        println!("  (empty)");
        return Ok(());
    }

    for (cache_key, entry) in ledger.entries() {
        let status = match entry.status {
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
        };
        println!(
            "  {cache_key}  {status:9}  {}  {}",
            entry.timestamp.format("%Y-%m-%d %H:%M:%S"),
            entry.step_id
        );
    }

    Ok(())
}

fn clean(args: &LedgerRefArgs) -> Result<()> {
    let mut ledger = open(args)?;
    let removed = ledger.len();
    ledger.clear()?;
    println!("Removed {removed} entries from {}", ledger.path().display());
    Ok(())
}
