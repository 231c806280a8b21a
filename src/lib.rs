// Library interface for Kiln
// This allows integration tests and external code to use Kiln's modules

pub mod compat;
pub mod config;
pub mod errors;
pub mod exec;
pub mod ledger;
pub mod logging;
pub mod plan;
pub mod variant;
pub mod xdg;

// Re-export commonly used types
pub use compat::CompatTable;
pub use errors::EngineError;
pub use exec::{execute, ExecuteOptions, ExecutionReport};
pub use ledger::CacheLedger;
pub use plan::{build_plan, Plan, Step, StepAction, StepId};
pub use variant::VariantDescriptor;
