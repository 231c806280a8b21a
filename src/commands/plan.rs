/// `kiln plan` command implementation
///
/// Prints the ordered step sequence a descriptor expands into, without
/// executing anything.
use anyhow::Result;

use super::load_context;
use crate::cli::PlanArgs;

pub fn run(args: PlanArgs) -> Result<()> {
    let context = load_context(&args.common)?;

    for (index, step) in context.plan.steps.iter().enumerate() {
        println!("{:3}. {} [{}]", index + 1, step.id, step.action.name());
        if args.verbose {
            println!("     cache_key: {}", step.cache_key);
            if !step.inputs.is_empty() {
                let inputs: Vec<&str> = step.inputs.iter().map(|i| i.as_str()).collect();
                println!("     inputs: {}", inputs.join(", "));
            }
        }
    }

    Ok(())
}
