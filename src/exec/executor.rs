//! Plan executor.
//!
//! Runs steps strictly in order against a target environment, skipping
//! idempotent steps whose cache key is already completed in the ledger,
//! and halting on the first failure. Later steps may assume the side
//! effects of earlier ones, so there is no continuation past a failed
//! step and no parallel execution within one plan.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use serde::Serialize;

use super::environment::TargetEnvironment;
use crate::errors::EngineError;
use crate::ledger::{CacheLedger, StepStatus};
use crate::plan::{Plan, Step, StepAction, StepId};

/// Cooperative cancellation flag, checked between steps only. Actions are
/// atomic from the executor's perspective.
pub type CancelToken = Arc<AtomicBool>;

#[derive(Debug, Default, Clone)]
pub struct ExecuteOptions {
    /// Per-step timeout; a timeout is a failure that halts the run.
    pub step_timeout: Option<Duration>,

    pub cancel: Option<CancelToken>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StepFailure {
    pub id: StepId,
    pub action: String,
    pub error: String,
}

/// Outcome of one provisioning run.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionReport {
    pub executed: Vec<StepId>,
    pub skipped: Vec<StepId>,
    pub failure: Option<StepFailure>,
    #[serde(skip)]
    pub duration: Duration,
}

impl ExecutionReport {
    pub fn success(&self) -> bool {
        self.failure.is_none()
    }
}

/// A rendered action fragment handed to the target environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invocation {
    Exec { program: String, args: Vec<String> },
    WriteFile { path: String, contents: String },
}

/// Execute a plan against a target environment.
///
/// The only `Err` path is ledger I/O; step failures come back inside the
/// report so the caller can inspect the partial run. The ledger is flushed
/// after every step, including the failing one.
pub fn execute(
    plan: &Plan,
    ledger: &mut CacheLedger,
    target: &mut dyn TargetEnvironment,
    options: &ExecuteOptions,
) -> Result<ExecutionReport, EngineError> {
    let start = Instant::now();

    // Entries not reachable from this plan belong to some other descriptor
    // revision; drop them before anything can resurrect stale state.
    let reachable: HashSet<String> = plan.steps.iter().map(|s| s.cache_key.clone()).collect();
    let pruned = ledger.prune(&reachable)?;
    if pruned > 0 {
        tracing::info!(pruned, "pruned unreachable ledger entries");
    }

    let mut executed = Vec::new();
    let mut skipped = Vec::new();
    let mut failure = None;

    for step in &plan.steps {
        if step.idempotent && ledger.is_completed(&step.cache_key) {
            tracing::info!(step = %step.id, cache_key = %step.cache_key, "skipped (cached)");
            skipped.push(step.id.clone());
            continue;
        }

        // Checked after the cache so cancellation never demotes a completed
        // entry; only a step that would actually execute is marked failed.
        if cancelled(options) {
            ledger.set(&step.cache_key, &step.id, StepStatus::Failed)?;
            tracing::warn!(step = %step.id, "run cancelled");
            failure = Some(StepFailure {
                id: step.id.clone(),
                action: step.action.name().to_string(),
                error: "cancelled before execution".to_string(),
            });
            break;
        }

        tracing::info!(step = %step.id, action = step.action.name(), "executing");

        match run_step(step, target, options.step_timeout) {
            Ok(()) => {
                ledger.set(&step.cache_key, &step.id, StepStatus::Completed)?;
                executed.push(step.id.clone());
            }
            Err(err) => {
                ledger.set(&step.cache_key, &step.id, StepStatus::Failed)?;
                tracing::error!(step = %step.id, error = %format!("{err:#}"), "step failed");
                failure = Some(StepFailure {
                    id: step.id.clone(),
                    action: step.action.name().to_string(),
                    error: format!("{err:#}"),
                });
                break;
            }
        }
    }

    Ok(ExecutionReport {
        executed,
        skipped,
        failure,
        duration: start.elapsed(),
    })
}

fn cancelled(options: &ExecuteOptions) -> bool {
    options
        .cancel
        .as_ref()
        .map(|token| token.load(Ordering::Relaxed))
        .unwrap_or(false)
}

fn run_step(
    step: &Step,
    target: &mut dyn TargetEnvironment,
    timeout: Option<Duration>,
) -> Result<()> {
    for invocation in render(&step.action) {
        match invocation {
            Invocation::Exec { program, args } => {
                let outcome = target.exec(&program, &args, timeout)?;
                if outcome.exit_code != 0 {
                    let stderr = String::from_utf8_lossy(&outcome.stderr);
                    anyhow::bail!(
                        "'{program}' exited with code {}{}",
                        outcome.exit_code,
                        if stderr.trim().is_empty() {
                            String::new()
                        } else {
                            format!(": {}", stderr.trim())
                        }
                    );
                }
            }
            Invocation::WriteFile { path, contents } => {
                target.write_file(&path, &contents)?;
            }
        }
    }
    Ok(())
}

/// Render an action into the invocations that realize it.
pub fn render(action: &StepAction) -> Vec<Invocation> {
    match action {
        StepAction::InstallPackageManager {
            distribution,
            prefix,
        } => {
            let install = format!(
                "curl -fsSL {url} -o /tmp/kiln-installer.sh && \
                 sh /tmp/kiln-installer.sh -b -p {prefix} && \
                 ln -sf {prefix}/bin/{bin} /usr/local/bin/{bin}",
                url = distribution.installer_url(),
                bin = distribution.binary(),
            );
            vec![Invocation::Exec {
                program: "sh".to_string(),
                args: vec!["-c".to_string(), install],
            }]
        }
        StepAction::CreateInterpreterEnv {
            distribution,
            env_name,
            python_version,
        } => vec![Invocation::Exec {
            program: distribution.binary().to_string(),
            args: vec![
                "create".to_string(),
                "-y".to_string(),
                "-n".to_string(),
                env_name.clone(),
                format!("python={python_version}"),
            ],
        }],
        StepAction::InstallPackages {
            distribution,
            env_name,
            packages,
            channel,
        } => {
            let mut args = match channel {
                Some(channel) => vec![
                    "install".to_string(),
                    "-y".to_string(),
                    "-n".to_string(),
                    env_name.clone(),
                    "-c".to_string(),
                    channel.clone(),
                ],
                None => vec![
                    "run".to_string(),
                    "-n".to_string(),
                    env_name.clone(),
                    "pip".to_string(),
                    "install".to_string(),
                    "--no-input".to_string(),
                ],
            };
            args.extend(packages.iter().cloned());
            vec![Invocation::Exec {
                program: distribution.binary().to_string(),
                args,
            }]
        }
        StepAction::WriteConfigFile { path, contents } => vec![Invocation::WriteFile {
            path: path.clone(),
            contents: contents.clone(),
        }],
        StepAction::RunCommand { program, args } => vec![Invocation::Exec {
            program: program.clone(),
            args: args.clone(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variant::Distribution;

    fn exec_args(action: &StepAction) -> Vec<String> {
        match render(action).remove(0) {
            Invocation::Exec { args, .. } => args,
            other => panic!("expected exec invocation, got {other:?}"),
        }
    }

    #[test]
    fn test_render_conda_install_uses_channel() {
        let args = exec_args(&StepAction::InstallPackages {
            distribution: Distribution::Mamba,
            env_name: "kiln".to_string(),
            packages: vec!["cudatoolkit=11.2".to_string()],
            channel: Some("nvidia".to_string()),
        });
        assert_eq!(args[0], "install");
        assert!(args.contains(&"-c".to_string()));
        assert!(args.contains(&"nvidia".to_string()));
        assert!(args.contains(&"cudatoolkit=11.2".to_string()));
    }

    #[test]
    fn test_render_pip_install_without_channel() {
        let args = exec_args(&StepAction::InstallPackages {
            distribution: Distribution::Conda,
            env_name: "kiln".to_string(),
            packages: vec!["tensorflow==2.9.*".to_string()],
            channel: None,
        });
        assert_eq!(args[0], "run");
        assert!(args.contains(&"pip".to_string()));
        assert!(args.contains(&"tensorflow==2.9.*".to_string()));
    }

    #[test]
    fn test_render_config_write() {
        let invocations = render(&StepAction::WriteConfigFile {
            path: "/etc/demo.conf".to_string(),
            contents: "key = value\n".to_string(),
        });
        assert_eq!(
            invocations,
            vec![Invocation::WriteFile {
                path: "/etc/demo.conf".to_string(),
                contents: "key = value\n".to_string(),
            }]
        );
    }
}
