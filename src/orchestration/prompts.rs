//! Prompt templates for the three agent roles.
//!
//! The schemas embedded here are load-bearing: the planner's output is
//! parsed into the task graph, the worker's into a `WorkerReply`, and the
//! reviewer's into a `ReviewOutcome`. Everything else in the replies is
//! tolerated prose.

use crate::core::task::Task;
use crate::run::RunContext;

/// Prompt for the planner: decompose the request into worker-sized tasks.
pub fn planner_prompt(user_task: &str) -> String {
    format!(
        r#"You are the PLANNER.

Goal: decompose the user's request into a small set of subtasks that can be worked on mostly independently.
Important constraints:
- Minimize overlapping files between tasks.
- Make tasks "worker-sized" (1-2 hours of focused work).
- Include dependencies (depends_on) where unavoidable; reference existing task ids only.
- For each task specify a scope list (directories/files), acceptance criteria, and test commands.
- Output MUST be valid JSON only (no markdown).

User request:
{user_task}

Output schema (JSON object):
{{
  "goal": "...",
  "tasks": [
    {{
      "id": "short-id",
      "title": "short title",
      "description": "what to do",
      "scope": ["path/or/dir", "..."],
      "acceptance": ["criterion", "..."],
      "test_commands": ["command", "..."],
      "depends_on": ["id", "..."]
    }}
  ]
}}"#
    )
}

/// Prompt for a worker: one task, end-to-end, committed.
pub fn worker_prompt(task: &Task) -> String {
    let scope = bullet_list(&task.scope, "- (not specified)");
    let acceptance = bullet_list(&task.acceptance, "- (not specified)");
    let tests = bullet_list(&task.test_commands, "- (none specified)");

    format!(
        r#"You are a WORKER agent. You have ONE task and you must finish it end-to-end.

Task ID: {id}
Title: {title}

Description:
{description}

Allowed scope (do not modify files outside this list without stopping and explaining):
{scope}

Acceptance criteria:
{acceptance}

Tests to run (run what makes sense; at minimum run the ones listed if possible):
{tests}

Requirements:
- Make focused, minimal changes.
- Run tests and fix failures you introduced.
- Commit your changes (git add -A && git commit ...) so HEAD contains the completed work.
- End with a clean git status.
- Output MUST be valid JSON only, matching this schema:

{{
  "task_id": "{id}",
  "status": "done" | "blocked",
  "summary": "what you changed",
  "files_changed": ["..."],
  "tests_ran": ["..."],
  "test_results": "pass/fail + notes",
  "notes": "any risks or follow-ups",
  "commit_head": "<sha or null>"
}}"#,
        id = task.id,
        title = task.title,
        description = task.description,
        scope = scope,
        acceptance = acceptance,
        tests = tests,
    )
}

/// Prompt for the reviewer: judge the integrated result and merge if done.
pub fn reviewer_prompt(user_task: &str, ctx: &RunContext, evidence_json: &str) -> String {
    format!(
        r#"You are the REVIEWER.

Review the integrated changes and test log to decide whether the repo now satisfies the user's request.
If the work is complete, merge the integration branch into the default branch in the main repo.

Rules:
- Work in the main repo at: {repo_root}.
- Checkout the target branch ({main_branch}) before merging.
- Merge only work whose task status is "done".
- If a merge conflict occurs, abort the merge and report failure.
- Leave a clean git status at the end.

Suggested review commands:
- git -C {integration_dir} log --oneline --decorate -n 20
- git -C {integration_dir} diff {main_base}..HEAD
- cat {tests_log}

Output MUST be valid JSON only.

User request:
{user_task}

Evidence (JSON):
{evidence_json}

Output schema:
{{
  "done": true/false,
  "reason": "short explanation",
  "merge": {{
    "attempted": true/false,
    "status": "merged" | "skipped" | "failed",
    "target_branch": "branch name",
    "merged_tasks": ["id", "..."],
    "details": "notes"
  }},
  "followups": [
    {{
      "id": "followup-id",
      "title": "...",
      "description": "...",
      "scope": ["..."],
      "acceptance": ["..."],
      "test_commands": ["..."],
      "depends_on": ["..."]
    }}
  ]
}}"#,
        repo_root = ctx.repo_root.display(),
        main_branch = ctx.main_branch,
        integration_dir = ctx.integration_dir.display(),
        main_base = ctx.main_base,
        tests_log = ctx.tests_log().display(),
        user_task = user_task,
        evidence_json = evidence_json,
    )
}

fn bullet_list(items: &[String], empty: &str) -> String {
    if items.is_empty() {
        empty.to_string()
    } else {
        items
            .iter()
            .map(|item| format!("- {}", item))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
