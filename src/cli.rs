use clap::{Parser, Subcommand, ValueEnum};

/// Kiln - Declarative environment provisioning engine
///
/// Kiln expands a variant descriptor (base image, accelerator profile,
/// interpreter, frameworks, notebook front end) into an ordered, cacheable
/// step sequence and executes it against a target environment.
#[derive(Parser, Debug)]
#[command(name = "kiln")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Declarative environment provisioning engine", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Common arguments shared across plan-consuming commands
#[derive(Parser, Debug, Clone)]
pub struct CommonArgs {
    /// Variant descriptor file (TOML)
    #[arg(short = 'd', long, env = "KILN_DESCRIPTOR")]
    pub descriptor: String,

    /// Config file path
    #[arg(short = 'c', long, env = "KILN_CONFIG")]
    pub config: Option<String>,

    /// Compatibility table path (overrides config)
    #[arg(long, env = "KILN_COMPAT_TABLE")]
    pub compat_table: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate a variant descriptor against the compatibility table
    Validate(ValidateArgs),

    /// Show the ordered step sequence for a variant descriptor
    Plan(PlanArgs),

    /// Execute the plan for a variant descriptor
    Provision(ProvisionArgs),

    /// Inspect or reset a cache ledger
    Ledger(LedgerArgs),

    /// Write starter kiln.toml and compat.toml files
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub common: CommonArgs,
}

#[derive(Parser, Debug)]
pub struct PlanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Also print cache keys and dependency edges
    #[arg(long)]
    pub verbose: bool,
}

/// Execution backend for a provisioning run
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// Run steps as processes on this machine
    Local,
    /// Record steps as a POSIX shell script
    Script,
}

#[derive(Parser, Debug)]
pub struct ProvisionArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Ledger file path (defaults to one file per target under the
    /// ledger directory)
    #[arg(long, env = "KILN_LEDGER")]
    pub ledger: Option<String>,

    /// Target environment backend
    #[arg(long, value_enum, default_value = "local")]
    pub target: TargetKind,

    /// Output path for the generated script (script target only)
    #[arg(long, default_value = "provision.sh")]
    pub script_out: String,

    /// Per-step timeout in seconds (overrides config)
    #[arg(long)]
    pub step_timeout: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct LedgerArgs {
    #[command(subcommand)]
    pub command: LedgerCommand,
}

#[derive(Subcommand, Debug)]
pub enum LedgerCommand {
    /// List ledger entries for a variant's target environment
    List(LedgerRefArgs),

    /// Remove every entry from the ledger
    Clean(LedgerRefArgs),
}

#[derive(Parser, Debug)]
pub struct LedgerRefArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Ledger file path (defaults as for `kiln provision`)
    #[arg(long, env = "KILN_LEDGER")]
    pub ledger: Option<String>,

    /// Target backend the ledger belongs to
    #[arg(long, value_enum, default_value = "local")]
    pub target: TargetKind,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Directory to write starter files into
    #[arg(long, default_value = ".")]
    pub dir: String,

    /// Overwrite existing files
    #[arg(long)]
    pub force: bool,
}
