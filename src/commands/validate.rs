/// `kiln validate` command implementation
///
/// Checks a variant descriptor against the compatibility table without
/// touching any environment or ledger.
use anyhow::Result;

use super::load_context;
use crate::cli::ValidateArgs;

pub fn run(args: ValidateArgs) -> Result<()> {
    let context = load_context(&args.common)?;

    println!(
        "OK: {} ({} steps)",
        context.descriptor.base_image,
        context.plan.len()
    );
    println!("  accelerator: {}", context.descriptor.accelerator);
    println!(
        "  interpreter: {} python {}",
        context.descriptor.interpreter.distribution, context.descriptor.interpreter.version
    );
    for (name, constraint) in &context.descriptor.frameworks {
        println!("  framework: {name} {constraint}");
    }

    Ok(())
}
