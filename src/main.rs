mod cli;
mod commands;
mod compat;
mod config;
mod errors;
mod exec;
mod ledger;
mod logging;
mod plan;
mod variant;
mod xdg;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

fn main() -> Result<()> {
    // Initialize structured logging
    logging::init();

    // Parse CLI arguments
    let cli = Cli::parse();

    // Dispatch to appropriate command handler
    match cli.command {
        Commands::Validate(args) => commands::validate::run(args),
        Commands::Plan(args) => commands::plan::run(args),
        Commands::Provision(args) => commands::provision::run(&args),
        Commands::Ledger(args) => commands::ledger::run(args.command),
        Commands::Init(args) => commands::init::run(args),
    }
}
