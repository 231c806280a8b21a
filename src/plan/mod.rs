//! Plan and step types.
//!
//! A plan is an ordered sequence of steps realizing one variant descriptor.
//! Steps are immutable once in a plan; the executor consumes them strictly
//! in order.

pub mod builder;
pub mod cache_key;

pub use builder::{build_plan, ExtensionStep};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::variant::Distribution;

/// Stable step identifier, unique within a plan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepId(String);

impl StepId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl AsRef<str> for StepId {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// One atomic provisioning action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepAction {
    /// Bootstrap the package manager into the target environment.
    InstallPackageManager {
        distribution: Distribution,
        prefix: String,
    },

    /// Create the interpreter environment packages are installed into.
    CreateInterpreterEnv {
        distribution: Distribution,
        env_name: String,
        python_version: String,
    },

    /// Install a package set into the interpreter environment. Conda
    /// install when a channel is given, pip otherwise.
    InstallPackages {
        distribution: Distribution,
        env_name: String,
        packages: Vec<String>,
        channel: Option<String>,
    },

    /// Write a configuration file into the target environment.
    WriteConfigFile { path: String, contents: String },

    /// Run a raw command. Non-idempotent unless the step declares
    /// otherwise.
    RunCommand { program: String, args: Vec<String> },
}

impl StepAction {
    /// Stable action name used in cache keys, logs, and reports.
    pub fn name(&self) -> &'static str {
        match self {
            StepAction::InstallPackageManager { .. } => "install_package_manager",
            StepAction::CreateInterpreterEnv { .. } => "create_interpreter_env",
            StepAction::InstallPackages { .. } => "install_packages",
            StepAction::WriteConfigFile { .. } => "write_config_file",
            StepAction::RunCommand { .. } => "run_command",
        }
    }
}

/// One atomic, cacheable provisioning step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: StepId,

    pub action: StepAction,

    /// Dependency step ids that must complete first.
    pub inputs: Vec<StepId>,

    /// Deterministic digest of the action parameters composed with the
    /// closure of ancestor cache keys. Two steps with identical cache_key
    /// and action are interchangeable.
    pub cache_key: String,

    /// Whether a completed ledger entry allows skipping this step.
    pub idempotent: bool,
}

/// Ordered step sequence realizing one variant descriptor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    pub fn step(&self, id: &StepId) -> Option<&Step> {
        self.steps.iter().find(|s| &s.id == id)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }
}
