use std::process::Stdio;
use std::time::Duration;

use serde::Serialize;
use tokio::process::Command;
use tracing::debug;

/// Result of running a single command line to completion.
#[derive(Debug, Serialize)]
pub struct ExecOutcome {
    pub success: bool,
    /// Accumulated stdout; kept even when the command fails so partial
    /// output before a failing command is not lost.
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl ExecOutcome {
    fn failure(error: String) -> Self {
        Self {
            success: false,
            output: String::new(),
            error: Some(error),
            exit_code: None,
        }
    }
}

fn shell_invocation(shell: &str, command_line: &str) -> Command {
    let mut cmd = Command::new(shell);
    if cfg!(windows) {
        cmd.arg("/C");
    } else {
        cmd.arg("-c");
    }
    cmd.arg(command_line);
    cmd
}

/// Run one shell command line to completion, bounded by `limit`. A timeout
/// force-kills the process via kill_on_drop.
pub async fn run_command(shell: &str, command_line: &str, limit: Duration) -> ExecOutcome {
    debug!("one-shot exec: {:?}", command_line);

    let mut cmd = shell_invocation(shell, command_line);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let child = match cmd.spawn() {
        Ok(child) => child,
        Err(err) => return ExecOutcome::failure(format!("failed to spawn {}: {}", shell, err)),
    };

    match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(Ok(output)) => {
            let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
            let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
            let exit_code = output.status.code();
            if output.status.success() {
                ExecOutcome {
                    success: true,
                    output: stdout,
                    error: None,
                    exit_code,
                }
            } else {
                let error = if stderr.is_empty() {
                    match exit_code {
                        Some(code) => format!("command exited with status {}", code),
                        None => "command terminated by signal".to_string(),
                    }
                } else {
                    stderr
                };
                ExecOutcome {
                    success: false,
                    output: stdout,
                    error: Some(error),
                    exit_code,
                }
            }
        }
        Ok(Err(err)) => ExecOutcome::failure(format!("failed to collect output: {}", err)),
        Err(_) => ExecOutcome::failure(format!("command timed out after {}s", limit.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pty::default_shell;

    #[tokio::test]
    async fn echo_round_trip() {
        let outcome = run_command(&default_shell(None), "echo hello", Duration::from_secs(10)).await;
        assert!(outcome.success);
        assert_eq!(outcome.output, "hello\n");
        assert_eq!(outcome.exit_code, Some(0));
        assert!(outcome.error.is_none());
    }

    #[tokio::test]
    async fn non_zero_exit_reports_failure_with_partial_output() {
        let outcome = run_command(
            &default_shell(None),
            "echo partial && exit 1",
            Duration::from_secs(10),
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(outcome.output, "partial\n");
        assert_eq!(outcome.exit_code, Some(1));
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn stderr_is_captured_as_the_error() {
        let outcome = run_command(
            &default_shell(None),
            "echo oops 1>&2; exit 2",
            Duration::from_secs(10),
        )
        .await;
        assert!(!outcome.success);
        assert_eq!(outcome.exit_code, Some(2));
        assert_eq!(outcome.error.as_deref(), Some("oops\n"));
    }

    #[tokio::test]
    async fn hung_commands_are_killed_after_the_limit() {
        let outcome = run_command(&default_shell(None), "sleep 30", Duration::from_secs(1)).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("timed out"));
        assert!(outcome.exit_code.is_none());
    }

    #[tokio::test]
    async fn missing_shell_is_a_spawn_failure() {
        let outcome =
            run_command("/nonexistent/shell-binary", "echo hi", Duration::from_secs(5)).await;
        assert!(!outcome.success);
        assert!(outcome.error.unwrap().contains("failed to spawn"));
        assert!(outcome.exit_code.is_none());
    }
}
