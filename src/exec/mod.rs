pub mod environment;
pub mod executor;

pub use environment::{ExecOutcome, LocalEnvironment, ScriptEnvironment, TargetEnvironment};
pub use executor::{execute, CancelToken, ExecuteOptions, ExecutionReport, StepFailure};
