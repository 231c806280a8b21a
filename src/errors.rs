//! Engine error taxonomy.
//!
//! Validation errors (`IncompatibleConfiguration`) are raised before any
//! step is constructed; `CyclicDependency` indicates a malformed extension
//! graph; `StepExecutionFailure` halts a run; `LedgerIoFailure` aborts a
//! run before any step executes.

use std::path::PathBuf;

use thiserror::Error;

use crate::plan::StepId;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("incompatible configuration: {0}")]
    IncompatibleConfiguration(String),

    #[error("cyclic dependency involving step '{0}'")]
    CyclicDependency(StepId),

    #[error("step '{id}' ({action}) failed: {message}")]
    StepExecutionFailure {
        id: StepId,
        action: String,
        message: String,
    },

    #[error("ledger I/O failure at {path}: {message}")]
    LedgerIoFailure { path: PathBuf, message: String },
}
