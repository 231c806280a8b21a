//! Target environments.
//!
//! A target environment is "a place where step actions execute": the
//! executor renders each action into process executions and file writes
//! and hands them to whichever backend the caller picked. `LocalEnvironment`
//! runs them on this machine; `ScriptEnvironment` records them as a POSIX
//! shell script for feeding into a container build.

use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};

/// Result of one process execution in a target environment.
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    pub exit_code: i32,
    pub duration: Duration,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// Abstraction over a place where step actions execute.
///
/// Implementations are free to run, record, or forward invocations; the
/// executor only observes exit codes.
pub trait TargetEnvironment: Send {
    /// Human-readable backend name ("local", "script", ...). Participates
    /// in the default ledger path so backends never share ledger files.
    fn name(&self) -> &str;

    /// Execute a program with arguments, optionally bounded by a timeout.
    fn exec(
        &mut self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecOutcome>;

    /// Write a file (creating parent directories) inside the environment.
    fn write_file(&mut self, path: &str, contents: &str) -> Result<()>;
}

/// Runs invocations as child processes on the local machine.
pub struct LocalEnvironment;

impl LocalEnvironment {
    pub fn new() -> Self {
        Self
    }

    /// Expand a leading `~/` against the current home directory.
    fn expand_path(path: &str) -> PathBuf {
        if let Some(rest) = path.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(rest);
            }
        }
        PathBuf::from(path)
    }

    /// Drain a child pipe on its own thread. The child can fill the OS
    /// pipe buffer long before it exits, so output must be consumed while
    /// the parent waits or both sides block.
    fn drain_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> thread::JoinHandle<Vec<u8>> {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            if let Some(mut pipe) = pipe {
                let _ = pipe.read_to_end(&mut buffer);
            }
            buffer
        })
    }

    #[cfg(unix)]
    fn wait_with_timeout(
        child: &mut std::process::Child,
        timeout: Duration,
    ) -> Result<(std::process::ExitStatus, bool)> {
        use std::os::unix::process::ExitStatusExt;

        let start = Instant::now();

        loop {
            match child.try_wait()? {
                Some(status) => return Ok((status, false)),
                None => {
                    if start.elapsed() >= timeout {
                        child.kill()?;
                        child.wait()?; // Reap zombie
                        return Ok((
                            std::process::ExitStatus::from_raw(128 + 9), // SIGKILL
                            true,
                        ));
                    }
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }

    #[cfg(not(unix))]
    fn wait_with_timeout(
        child: &mut std::process::Child,
        timeout: Duration,
    ) -> Result<(std::process::ExitStatus, bool)> {
        let start = Instant::now();

        loop {
            match child.try_wait()? {
                Some(status) => return Ok((status, false)),
                None => {
                    if start.elapsed() >= timeout {
                        child.kill()?;
                        let status = child.wait()?;
                        return Ok((status, true));
                    }
                    thread::sleep(Duration::from_millis(100));
                }
            }
        }
    }
}

impl Default for LocalEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetEnvironment for LocalEnvironment {
    fn name(&self) -> &str {
        "local"
    }

    fn exec(
        &mut self,
        program: &str,
        args: &[String],
        timeout: Option<Duration>,
    ) -> Result<ExecOutcome> {
        let start = Instant::now();

        // Resolve from PATH; fall back to the name as given.
        let resolved = which::which(program).unwrap_or_else(|_| PathBuf::from(program));

        let mut cmd = Command::new(&resolved);
        cmd.args(args);
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn: {}", resolved.display()))?;

        // Drain both pipes while waiting; the readers finish once the
        // child exits (or is killed) and its pipe ends close.
        let stdout_reader = Self::drain_pipe(child.stdout.take());
        let stderr_reader = Self::drain_pipe(child.stderr.take());

        let (status, timed_out) = if let Some(timeout) = timeout {
            Self::wait_with_timeout(&mut child, timeout)?
        } else {
            let status = child.wait().context("Failed to wait for child process")?;
            (status, false)
        };

        let stdout = stdout_reader
            .join()
            .map_err(|_| anyhow::anyhow!("stdout reader panicked"))?;
        let stderr = stderr_reader
            .join()
            .map_err(|_| anyhow::anyhow!("stderr reader panicked"))?;

        let duration = start.elapsed();

        if timed_out {
            anyhow::bail!(
                "'{program}' timed out after {:.0}s",
                duration.as_secs_f64()
            );
        }

        Ok(ExecOutcome {
            exit_code: status.code().unwrap_or(-1),
            duration,
            stdout,
            stderr,
        })
    }

    fn write_file(&mut self, path: &str, contents: &str) -> Result<()> {
        let expanded = Self::expand_path(path);
        if let Some(parent) = expanded.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }
        fs::write(&expanded, contents)
            .with_context(|| format!("Failed to write: {}", expanded.display()))
    }
}

/// Records invocations as a POSIX shell script instead of executing them.
pub struct ScriptEnvironment {
    lines: Vec<String>,
}

impl ScriptEnvironment {
    pub fn new() -> Self {
        Self {
            lines: vec!["#!/bin/sh".to_string(), "set -eu".to_string()],
        }
    }

    /// The accumulated script, newline-terminated.
    pub fn script(&self) -> String {
        let mut script = self.lines.join("\n");
        script.push('\n');
        script
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        fs::write(path, self.script())
            .with_context(|| format!("Failed to write script: {}", path.display()))
    }
}

impl Default for ScriptEnvironment {
    fn default() -> Self {
        Self::new()
    }
}

impl TargetEnvironment for ScriptEnvironment {
    fn name(&self) -> &str {
        "script"
    }

    fn exec(
        &mut self,
        program: &str,
        args: &[String],
        _timeout: Option<Duration>,
    ) -> Result<ExecOutcome> {
        let mut line = shell_quote(program);
        for arg in args {
            line.push(' ');
            line.push_str(&shell_quote(arg));
        }
        self.lines.push(line);

        Ok(ExecOutcome {
            exit_code: 0,
            duration: Duration::ZERO,
            stdout: Vec::new(),
            stderr: Vec::new(),
        })
    }

    fn write_file(&mut self, path: &str, contents: &str) -> Result<()> {
        if let Some(parent) = Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                self.lines
                    .push(format!("mkdir -p {}", shell_quote(&parent.to_string_lossy())));
            }
        }
        // Heredoc delimiter chosen to never appear in generated configs.
        self.lines.push(format!("cat > {} <<'KILN_EOF'", shell_quote(path)));
        self.lines.push(contents.trim_end_matches('\n').to_string());
        self.lines.push("KILN_EOF".to_string());
        Ok(())
    }
}

fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./=:~".contains(c));
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r#"'\''"#))
    }
}
