//! Verification runner for caller-declared checks.
//!
//! After the scheduler drains, the union of every task's test commands runs
//! sequentially against the integration workspace. This is evidence
//! gathering, not gating: output and exit codes are recorded verbatim into
//! one combined log, failures are never fatal, and nothing is retried.

use std::path::PathBuf;

use tokio::process::Command;

use crate::core::task::Task;
use crate::run::RunContext;
use crate::{clog, clog_warn, Result};

/// Outcome of one check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub command: String,
    pub exit_code: i32,
}

/// All checks plus the combined log they were captured into.
#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub log: PathBuf,
    pub checks: Vec<CheckResult>,
}

impl VerifyReport {
    pub fn all_passed(&self) -> bool {
        self.checks.iter().all(|c| c.exit_code == 0)
    }
}

/// Deduplicated union of every task's test commands, first occurrence wins,
/// task order preserved.
pub fn dedup_commands<'a>(tasks: impl IntoIterator<Item = &'a Task>) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut commands = Vec::new();
    for task in tasks {
        for cmd in &task.test_commands {
            if !cmd.is_empty() && seen.insert(cmd.clone()) {
                commands.push(cmd.clone());
            }
        }
    }
    commands
}

/// Run `commands` sequentially in the integration workspace, appending each
/// transcript to `logs/tests.txt`.
///
/// Commands are whitespace-split into executable and arguments; there is no
/// shell interpretation. A command that cannot be spawned at all is recorded
/// with exit code -1 rather than aborting the run.
pub async fn run_checks(ctx: &RunContext, commands: &[String]) -> Result<VerifyReport> {
    let mut lines: Vec<String> = Vec::new();
    let mut checks = Vec::new();

    for cmd in commands {
        let mut parts = cmd.split_whitespace();
        let Some(program) = parts.next() else {
            continue;
        };
        lines.push(format!("$ {}", cmd));

        let spawned = Command::new(program)
            .args(parts)
            .current_dir(&ctx.integration_dir)
            .output()
            .await;

        let exit_code = match spawned {
            Ok(output) => {
                lines.push(String::from_utf8_lossy(&output.stdout).to_string());
                lines.push(String::from_utf8_lossy(&output.stderr).to_string());
                output.status.code().unwrap_or(-1)
            }
            Err(e) => {
                clog_warn!("Check {:?} could not be spawned: {}", cmd, e);
                lines.push(format!("failed to spawn: {}", e));
                -1
            }
        };
        lines.push(format!("[exit={}]", exit_code));
        lines.push("-".repeat(40));

        checks.push(CheckResult {
            command: cmd.clone(),
            exit_code,
        });
    }

    let log = ctx.tests_log();
    tokio::fs::write(&log, lines.join("\n")).await?;
    clog!(
        "Verification: {} check(s) recorded to {}",
        checks.len(),
        log.display()
    );

    Ok(VerifyReport { log, checks })
}
