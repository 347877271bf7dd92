//! Task data model for the execution DAG.
//!
//! Tasks are the atomic units of work handed to worker agents. They are
//! created once from the planner's structured output and immutable
//! thereafter; all execution state lives in the scheduler.

use std::path::PathBuf;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::extract;

/// Maximum length of a normalized task id.
const MAX_ID_LEN: usize = 50;

/// Slug-normalized task identifier.
///
/// Planner-supplied ids are normalized so they are safe as directory names,
/// branch names, and log file names: lowercased, restricted to
/// `[a-z0-9._-]`, separator runs collapsed, length-capped.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Normalize an arbitrary string into a task id.
    ///
    /// An input with no usable characters falls back to `"task"`.
    pub fn normalize(raw: &str) -> Self {
        static INVALID: OnceLock<Regex> = OnceLock::new();
        static COLLAPSE: OnceLock<Regex> = OnceLock::new();
        let invalid = INVALID.get_or_init(|| Regex::new(r"[^a-z0-9._-]+").unwrap());
        let collapse = COLLAPSE.get_or_init(|| Regex::new(r"-{2,}").unwrap());

        let lowered = raw.trim().to_lowercase();
        let replaced = invalid.replace_all(&lowered, "-");
        let collapsed = collapse.replace_all(&replaced, "-");
        let trimmed = collapsed.trim_matches('-');

        let mut slug: String = trimmed.chars().take(MAX_ID_LEN).collect();
        if slug.is_empty() {
            slug = "task".to_string();
        }
        Self(slug)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A unit of work from the plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    /// Unique identifier (unique after normalization).
    pub id: TaskId,
    /// Short human-readable title.
    pub title: String,
    /// What to do.
    pub description: String,
    /// Advisory path hints the worker should stay within.
    pub scope: Vec<String>,
    /// Advisory acceptance criteria.
    pub acceptance: Vec<String>,
    /// Ordered shell checks, later deduplicated into the verification set.
    pub test_commands: Vec<String>,
    /// Ids of tasks that must be integrated before this one may start.
    pub depends_on: Vec<TaskId>,
}

/// Planner-output task shape, before normalization. Every field is optional
/// so a sloppy plan still loads; ids fall back to the title.
#[derive(Debug, Deserialize)]
pub struct RawTask {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub scope: Vec<String>,
    #[serde(default)]
    pub acceptance: Vec<String>,
    #[serde(default)]
    pub test_commands: Vec<String>,
    #[serde(default)]
    pub depends_on: Vec<String>,
}

impl Task {
    /// Build a task from the planner's raw shape, normalizing its id and
    /// every dependency reference the same way.
    pub fn from_raw(raw: RawTask) -> Self {
        let fallback = raw.title.clone().unwrap_or_else(|| "task".to_string());
        let id = TaskId::normalize(raw.id.as_deref().unwrap_or(&fallback));
        let title = raw.title.unwrap_or_else(|| id.to_string());
        Self {
            id,
            title,
            description: raw.description,
            scope: raw.scope,
            acceptance: raw.acceptance,
            test_commands: raw.test_commands,
            depends_on: raw
                .depends_on
                .iter()
                .map(|d| TaskId::normalize(d))
                .collect(),
        }
    }
}

/// Agent-reported outcome of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    /// The worker finished the task end-to-end.
    Done,
    /// The worker could not finish.
    Blocked,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Done => "done",
            WorkerStatus::Blocked => "blocked",
        }
    }
}

impl std::fmt::Display for WorkerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The worker's structured self-report, tolerantly parsed from its output.
///
/// Absent or malformed output yields the default: blocked, empty summary,
/// no commit head. A parse failure is never fatal; the patch export may
/// still carry the real result.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkerReply {
    pub status: WorkerStatus,
    pub summary: String,
    pub commit_head: Option<String>,
}

impl Default for WorkerReply {
    fn default() -> Self {
        Self {
            status: WorkerStatus::Blocked,
            summary: String::new(),
            commit_head: None,
        }
    }
}

impl WorkerReply {
    /// Parse the first JSON object out of free-form agent output.
    pub fn parse(output: &str) -> Self {
        extract::extract(output).unwrap_or_default()
    }
}

/// Outcome of running one task. Produced exactly once per launched task and
/// never mutated afterwards.
#[derive(Debug, Clone)]
pub struct WorkerResult {
    pub task_id: TaskId,
    pub status: WorkerStatus,
    pub summary: String,
    /// Advisory, caller-reported head; not independently verified.
    pub commit_head: Option<String>,
    /// The exported patch, when the task produced a change.
    pub patch: Option<crate::patch::Patch>,
    /// Raw agent transcript.
    pub log: PathBuf,
    /// Where the task's private workspace lives.
    pub workspace: PathBuf,
}
