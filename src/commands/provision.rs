/// `kiln provision` command implementation
///
/// Executes the plan for a descriptor against the chosen target backend,
/// consulting and updating the cache ledger. Exit is non-zero when a step
/// fails; the partially completed ledger stays on disk for the next run.
use std::path::Path;
use std::time::Duration;

use anyhow::Result;

use super::{load_context, resolve_ledger_path};
use crate::cli::{ProvisionArgs, TargetKind};
use crate::errors::EngineError;
use crate::exec::{execute, ExecuteOptions, LocalEnvironment, ScriptEnvironment};
use crate::ledger::CacheLedger;

pub fn run(args: &ProvisionArgs) -> Result<()> {
    let context = load_context(&args.common)?;

    let ledger_path = resolve_ledger_path(
        args.ledger.as_deref(),
        &context.config,
        &context.descriptor,
        args.target,
    );
    let mut ledger = CacheLedger::load(&ledger_path)?;
    tracing::debug!(ledger = %ledger_path.display(), "ledger loaded");

    let step_timeout = args
        .step_timeout
        .or(context.config.provision.step_timeout_secs)
        .map(Duration::from_secs);
    let options = ExecuteOptions {
        step_timeout,
        cancel: None,
    };

    let report = match args.target {
        TargetKind::Local => {
            let mut target = LocalEnvironment::new();
            execute(&context.plan, &mut ledger, &mut target, &options)?
        }
        TargetKind::Script => {
            let mut target = ScriptEnvironment::new();
            let report = execute(&context.plan, &mut ledger, &mut target, &options)?;
            if report.success() {
                let out = Path::new(&args.script_out);
                target.write_to(out)?;
                println!("Wrote {}", out.display());
            }
            report
        }
    };

    println!(
        "{} executed, {} skipped in {:.1}s",
        report.executed.len(),
        report.skipped.len(),
        report.duration.as_secs_f64()
    );
    for id in &report.executed {
        println!("  executed: {id}");
    }
    for id in &report.skipped {
        println!("  skipped:  {id}");
    }

    if let Some(failure) = &report.failure {
        return Err(EngineError::StepExecutionFailure {
            id: failure.id.clone(),
            action: failure.action.clone(),
            message: failure.error.clone(),
        }
        .into());
    }

    Ok(())
}
