//! Evidence assembly and review handoff.
//!
//! Once scheduling and verification finish, everything that happened is
//! condensed into one serializable bundle and handed to the reviewer agent,
//! which decides completeness and, when warranted, performs the merge into
//! the primary repository's default branch. That merge is the one
//! destructive action of a run and is delegated entirely: the orchestrator
//! records the reviewer's self-reported outcome without re-verifying it.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::agent::{AgentExec, Role};
use crate::core::task::{Task, TaskId};
use crate::extract;
use crate::orchestration::prompts;
use crate::orchestration::scheduler::SchedulerOutcome;
use crate::run::RunContext;
use crate::{clog, Result};

/// Per-task entry in the evidence bundle.
#[derive(Debug, Clone, Serialize)]
pub struct TaskEvidence {
    pub id: TaskId,
    pub title: String,
    /// "done" | "blocked" | "not-run". "not-run" means the task was never
    /// attempted because a dependency never integrated. Deliberately
    /// distinct from an agent-reported "blocked".
    pub status: String,
    pub summary: String,
    pub patch: Option<String>,
    pub log: Option<String>,
    pub workspace: String,
    pub branch: String,
    pub depends_on: Vec<TaskId>,
}

/// The structured bundle given to the reviewer. Purely derived from the run
/// artifacts; not persisted as authoritative state.
#[derive(Debug, Clone, Serialize)]
pub struct Evidence {
    pub repo_root: String,
    pub main_branch: String,
    pub main_base: String,
    pub integration_dir: String,
    pub integration_branch: String,
    pub tasks: Vec<TaskEvidence>,
    pub tests_log: String,
}

impl Evidence {
    /// Build the bundle from the scheduler outcome, in plan order.
    pub fn assemble(ctx: &RunContext, tasks: &[Task], outcome: &SchedulerOutcome) -> Self {
        let task_entries = tasks
            .iter()
            .map(|task| {
                let result = outcome.results.get(&task.id);
                let status = match result {
                    Some(r) => r.status.as_str().to_string(),
                    None => "not-run".to_string(),
                };
                TaskEvidence {
                    id: task.id.clone(),
                    title: task.title.clone(),
                    status,
                    summary: result.map(|r| r.summary.clone()).unwrap_or_default(),
                    patch: result
                        .and_then(|r| r.patch.as_ref())
                        .map(|p| p.path.display().to_string()),
                    log: result.map(|r| r.log.display().to_string()),
                    workspace: ctx.task_clone_dir(&task.id).display().to_string(),
                    branch: ctx.task_branch(&task.id),
                    depends_on: task.depends_on.clone(),
                }
            })
            .collect();

        Self {
            repo_root: ctx.repo_root.display().to_string(),
            main_branch: ctx.main_branch.clone(),
            main_base: ctx.main_base.clone(),
            integration_dir: ctx.integration_dir.display().to_string(),
            integration_branch: ctx.integration_branch.clone(),
            tasks: task_entries,
            tests_log: ctx.tests_log().display().to_string(),
        }
    }
}

/// Reviewer's merge self-report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MergeReport {
    pub attempted: bool,
    pub status: String,
    pub target_branch: Option<String>,
    pub merged_tasks: Vec<TaskId>,
    pub details: String,
}

/// Reviewer's decision, tolerantly parsed. A reply with no usable JSON
/// yields the default: not done, no merge report.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ReviewOutcome {
    pub done: bool,
    pub reason: String,
    pub merge: Option<MergeReport>,
}

impl ReviewOutcome {
    pub fn parse(output: &str) -> Self {
        extract::extract(output).unwrap_or_default()
    }

    /// Reported merge status, when the reviewer supplied one.
    pub fn merge_status(&self) -> Option<(&str, Option<&str>)> {
        self.merge
            .as_ref()
            .filter(|m| !m.status.is_empty())
            .map(|m| (m.status.as_str(), m.target_branch.as_deref()))
    }
}

/// Hand the evidence to the reviewer agent and collect its decision.
///
/// The reviewer runs unattended against the primary repository root, not a
/// workspace, because the merge it may perform targets the primary line of
/// history.
pub async fn run_review<E: AgentExec>(
    agent: &E,
    ctx: &RunContext,
    user_task: &str,
    evidence: &Evidence,
) -> Result<ReviewOutcome> {
    let evidence_json = serde_json::to_string_pretty(evidence)?;
    let prompt = prompts::reviewer_prompt(user_task, ctx, &evidence_json);

    let reply = agent
        .execute(Role::Reviewer, &prompt, Path::new(&ctx.repo_root))
        .await?;
    tokio::fs::write(ctx.review_log(), &reply.text).await?;

    let outcome = ReviewOutcome::parse(&reply.text);
    clog!(
        "Review finished: done={} reason={:?}",
        outcome.done,
        outcome.reason
    );
    Ok(outcome)
}
