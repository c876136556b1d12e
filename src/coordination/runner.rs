//! Process runner.
//!
//! Launches an agent executable with a hard wall-clock timeout and converts
//! everything that can go wrong into an [`Outcome`]. Nothing ever panics or
//! errors across this boundary: a missing executable, a non-zero exit, and a
//! timeout all come back as data for the workflow loop to fold into events.

use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, warn};

use super::types::AgentDefinition;

/// Byte budget for captured output, bounding event payload size.
pub const DEFAULT_OUTPUT_BUDGET: usize = 1000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutcomeStatus {
    Success,
    Failed { exit_code: i32 },
    TimedOut,
    LaunchFailed { reason: String },
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: OutcomeStatus,
    pub stdout_excerpt: String,
    pub stderr_excerpt: String,
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }

    /// One-line failure description for event payloads and logs.
    pub fn failure_reason(&self, max_runtime_secs: u64) -> String {
        match &self.status {
            OutcomeStatus::Success => String::new(),
            OutcomeStatus::Failed { exit_code } => {
                format!("exit code {exit_code}")
            }
            OutcomeStatus::TimedOut => format!("timeout after {max_runtime_secs}s"),
            OutcomeStatus::LaunchFailed { reason } => format!("could not start: {reason}"),
        }
    }
}

/// Seam between the workflow loop and real child processes, so tests can
/// substitute a recording fake.
#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(&self, definition: &AgentDefinition, args: &[String], cwd: &Path) -> Outcome;
}

#[derive(Debug, Clone)]
pub struct ProcessRunner {
    pub output_budget: usize,
}

impl ProcessRunner {
    pub fn new(output_budget: usize) -> Self {
        Self { output_budget }
    }
}

impl Default for ProcessRunner {
    fn default() -> Self {
        Self::new(DEFAULT_OUTPUT_BUDGET)
    }
}

#[async_trait]
impl AgentLauncher for ProcessRunner {
    async fn launch(&self, definition: &AgentDefinition, args: &[String], cwd: &Path) -> Outcome {
        let mut command = Command::new(&definition.program);
        command
            .args(&definition.args)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(
            agent_id = %definition.id,
            program = %definition.program,
            max_runtime_secs = definition.max_runtime_secs,
            "Launching agent process"
        );

        let child = match command.spawn() {
            Ok(child) => child,
            Err(err) => {
                warn!(agent_id = %definition.id, error = %err, "Agent launch failed");
                return Outcome {
                    status: OutcomeStatus::LaunchFailed {
                        reason: err.to_string(),
                    },
                    stdout_excerpt: String::new(),
                    stderr_excerpt: String::new(),
                };
            }
        };

        match tokio::time::timeout(definition.max_runtime(), child.wait_with_output()).await {
            Ok(Ok(output)) => {
                let status = if output.status.success() {
                    OutcomeStatus::Success
                } else {
                    OutcomeStatus::Failed {
                        exit_code: output.status.code().unwrap_or(-1),
                    }
                };
                Outcome {
                    status,
                    stdout_excerpt: excerpt(&output.stdout, self.output_budget),
                    stderr_excerpt: excerpt(&output.stderr, self.output_budget),
                }
            }
            Ok(Err(err)) => Outcome {
                status: OutcomeStatus::LaunchFailed {
                    reason: err.to_string(),
                },
                stdout_excerpt: String::new(),
                stderr_excerpt: String::new(),
            },
            // Dropping the wait future kills the child via kill_on_drop.
            Err(_) => {
                warn!(
                    agent_id = %definition.id,
                    max_runtime_secs = definition.max_runtime_secs,
                    "Agent process timed out"
                );
                Outcome {
                    status: OutcomeStatus::TimedOut,
                    stdout_excerpt: String::new(),
                    stderr_excerpt: String::new(),
                }
            }
        }
    }
}

fn excerpt(bytes: &[u8], budget: usize) -> String {
    let end = bytes.len().min(budget);
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(program: &str, args: &[&str], max_runtime_secs: u64) -> AgentDefinition {
        AgentDefinition {
            id: "test".to_string(),
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
            description: String::new(),
            dependencies: vec![],
            locks: vec![],
            max_runtime_secs,
            max_retries: 0,
        }
    }

    #[tokio::test]
    async fn missing_executable_becomes_launch_failed() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .launch(
                &definition("/nonexistent/agent-binary", &[], 5),
                &[],
                Path::new("."),
            )
            .await;
        assert!(matches!(outcome.status, OutcomeStatus::LaunchFailed { .. }));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn exit_code_and_output_are_captured() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .launch(
                &definition("/bin/sh", &["-c", "echo out; echo err >&2; exit 3"], 5),
                &[],
                Path::new("."),
            )
            .await;
        assert_eq!(outcome.status, OutcomeStatus::Failed { exit_code: 3 });
        assert!(outcome.stdout_excerpt.contains("out"));
        assert!(outcome.stderr_excerpt.contains("err"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn runaway_process_times_out() {
        let runner = ProcessRunner::default();
        let outcome = runner
            .launch(
                &definition("/bin/sh", &["-c", "sleep 30"], 1),
                &[],
                Path::new("."),
            )
            .await;
        assert_eq!(outcome.status, OutcomeStatus::TimedOut);
    }

    #[test]
    fn excerpt_respects_budget() {
        let text = "x".repeat(5000);
        assert_eq!(excerpt(text.as_bytes(), 1000).len(), 1000);
    }
}
