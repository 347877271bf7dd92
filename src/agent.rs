//! Headless agent execution.
//!
//! The orchestrator talks to agents through one narrow boundary: run a
//! role-specific prompt against a working directory and get back free text
//! plus an optional correlation id. The concrete transport is the agent CLI
//! in non-interactive mode (`-p` with JSON output); response shapes vary
//! across CLI versions, so everything is normalized into `AgentReply` here
//! and nowhere else.

use std::future::Future;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::process::Command;

use crate::config::Config;
use crate::{clog_debug, Error, Result};

/// Agent roles and their permission profiles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Read-only filesystem access, asks before acting.
    Planner,
    /// Unrestricted filesystem access, fully unattended.
    Worker,
    /// Unrestricted filesystem access, fully unattended.
    Reviewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Planner => "planner",
            Role::Worker => "worker",
            Role::Reviewer => "reviewer",
        }
    }

    /// CLI flags realizing the role's permission profile.
    fn permission_flags(&self) -> &'static [&'static str] {
        match self {
            Role::Planner => &["--permission-mode", "plan"],
            Role::Worker | Role::Reviewer => &["--dangerously-skip-permissions"],
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Normalized agent response: the raw output text and, when the transport
/// surfaced one, a session id usable for correlation.
#[derive(Debug, Clone)]
pub struct AgentReply {
    pub text: String,
    pub session_id: Option<String>,
}

/// Internal struct for deserializing the CLI's JSON envelope. Fields come
/// and go across versions; everything is optional and reconciled below.
#[derive(Debug, Deserialize)]
struct RawReply {
    subtype: Option<String>,
    result: Option<String>,
    #[serde(default)]
    error: Option<String>,
    session_id: Option<String>,
}

/// The execution seam the scheduler and review stage depend on.
///
/// Production uses `AgentRunner`; tests substitute scripted executors.
pub trait AgentExec: Send + Sync + 'static {
    fn execute(
        &self,
        role: Role,
        prompt: &str,
        cwd: &Path,
    ) -> impl Future<Output = Result<AgentReply>> + Send;
}

/// Runs the configured agent binary in headless mode.
#[derive(Debug, Clone)]
pub struct AgentRunner {
    binary: PathBuf,
    base_args: Vec<String>,
    /// Per-role model overrides, applied as `--model` when set.
    planner_model: Option<String>,
    worker_model: Option<String>,
    reviewer_model: Option<String>,
}

impl AgentRunner {
    /// Build a runner from configuration, resolving the binary via `which`.
    pub fn from_config(config: &Config) -> Result<Self> {
        let mut parts = config.effective_command().split_whitespace();
        let name = parts.next().unwrap_or("claude").to_string();
        let base_args = parts.map(String::from).collect();

        let binary =
            which::which(&name).map_err(|_| Error::AgentNotAvailable(name.clone()))?;
        clog_debug!("AgentRunner binary={}", binary.display());

        Ok(Self {
            binary,
            base_args,
            planner_model: None,
            worker_model: None,
            reviewer_model: None,
        })
    }

    /// Bypass binary resolution; used by tests.
    pub fn with_binary(binary: PathBuf) -> Self {
        Self {
            binary,
            base_args: Vec::new(),
            planner_model: None,
            worker_model: None,
            reviewer_model: None,
        }
    }

    pub fn with_models(
        mut self,
        planner: Option<String>,
        worker: Option<String>,
        reviewer: Option<String>,
    ) -> Self {
        self.planner_model = planner;
        self.worker_model = worker;
        self.reviewer_model = reviewer;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn model_for(&self, role: Role) -> Option<&str> {
        match role {
            Role::Planner => self.planner_model.as_deref(),
            Role::Worker => self.worker_model.as_deref(),
            Role::Reviewer => self.reviewer_model.as_deref(),
        }
    }

    /// Normalize the CLI's output into an `AgentReply`.
    ///
    /// A JSON envelope is preferred; plain text stdout is accepted as-is.
    /// When the process failed and produced nothing useful on stdout, the
    /// stderr text becomes the reply so callers can surface it; soft
    /// failures stay soft at this boundary.
    pub fn normalize(stdout: &str, stderr: &str, success: bool) -> AgentReply {
        if let Ok(raw) = serde_json::from_str::<RawReply>(stdout) {
            let text = match raw.subtype.as_deref() {
                Some("error") => raw.error.or(raw.result).unwrap_or_default(),
                _ => raw.result.or(raw.error).unwrap_or_default(),
            };
            return AgentReply {
                text,
                session_id: raw.session_id,
            };
        }

        let stdout = stdout.trim();
        if stdout.is_empty() && !success {
            return AgentReply {
                text: stderr.trim().to_string(),
                session_id: None,
            };
        }
        AgentReply {
            text: stdout.to_string(),
            session_id: None,
        }
    }
}

impl AgentExec for AgentRunner {
    /// Execute a prompt in the given working directory.
    ///
    /// No timeout is imposed: an agent may legitimately run for a long time,
    /// and the orchestration model has no cancellation. The only hard error
    /// is failing to spawn the process at all.
    async fn execute(&self, role: Role, prompt: &str, cwd: &Path) -> Result<AgentReply> {
        clog_debug!(
            "AgentRunner::execute role={} cwd={}",
            role,
            cwd.display()
        );

        let mut cmd = Command::new(&self.binary);
        cmd.args(&self.base_args)
            .arg("-p")
            .arg(prompt)
            .arg("--output-format")
            .arg("json")
            .args(role.permission_flags());
        if let Some(model) = self.model_for(role) {
            cmd.arg("--model").arg(model);
        }
        cmd.current_dir(cwd);

        let output = cmd.output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        Ok(Self::normalize(&stdout, &stderr, output.status.success()))
    }
}
