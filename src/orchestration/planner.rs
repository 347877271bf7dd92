//! Planning phase: one planner-agent call producing the task graph.
//!
//! The planner runs read-only against the integration workspace, so the
//! plan reflects the exact snapshot workers will start from. Its output is
//! the only place tasks are created; everything downstream treats them as
//! immutable.

use serde::Deserialize;

use crate::agent::{AgentExec, Role};
use crate::core::task::{RawTask, Task};
use crate::extract;
use crate::orchestration::prompts;
use crate::run::RunContext;
use crate::{clog, clog_warn, Result};

/// The decomposed plan.
#[derive(Debug, Clone)]
pub struct Plan {
    pub goal: String,
    pub tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct RawPlan {
    #[serde(default)]
    goal: String,
    #[serde(default)]
    tasks: Vec<RawTask>,
}

/// Parse planner output into a `Plan`.
///
/// Unlike worker replies there is no tolerant default here: a run cannot
/// proceed without a parsable plan, so extraction failure is an error.
pub fn parse_plan(output: &str) -> Result<Plan> {
    let raw: RawPlan = extract::extract(output)?;
    Ok(Plan {
        goal: raw.goal,
        tasks: raw.tasks.into_iter().map(Task::from_raw).collect(),
    })
}

/// Run the planner agent and persist its artifacts.
///
/// Writes the raw transcript to `logs/planner.txt` and the extracted plan
/// object (pretty-printed) to `plan.json` for audit and replay.
pub async fn run_planner<E: AgentExec>(
    agent: &E,
    ctx: &RunContext,
    user_task: &str,
) -> Result<Plan> {
    let prompt = prompts::planner_prompt(user_task);
    let reply = agent
        .execute(Role::Planner, &prompt, &ctx.integration_dir)
        .await?;
    tokio::fs::write(ctx.planner_log(), &reply.text).await?;

    let value = extract::extract_value(&reply.text)?;
    tokio::fs::write(ctx.plan_path(), serde_json::to_string_pretty(&value)?).await?;

    let plan = parse_plan(&reply.text)?;
    if plan.tasks.is_empty() {
        clog_warn!("Planner produced an empty task list");
    }
    clog!(
        "Plan loaded: {} task(s) for goal {:?}",
        plan.tasks.len(),
        plan.goal
    );
    Ok(plan)
}
