//! Run-scoped context and artifact layout.
//!
//! One orchestration run owns a directory tree that every artifact lives
//! under: the integration workspace, per-task clones, exported patches, and
//! agent transcripts. The tree is retained after the run for audit and
//! replay.

use std::path::{Path, PathBuf};

use crate::core::task::TaskId;
use crate::workspace::Workspace;
use crate::{clog, Result};

/// Process-wide state for one orchestration run. Created at run start,
/// read-only for the remainder of the run.
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Root of the primary repository.
    pub repo_root: PathBuf,
    /// Branch the reviewer may merge into.
    pub main_branch: String,
    /// Primary repository head at run start.
    pub main_base: String,
    /// Timestamp identifier for this run.
    pub run_id: String,
    /// Root of the run's artifact tree.
    pub root: PathBuf,
    /// The shared integration workspace.
    pub integration_dir: PathBuf,
    /// Parent directory for per-task clones.
    pub clones_dir: PathBuf,
    /// Exported patch artifacts.
    pub patches_dir: PathBuf,
    /// Agent transcripts and the verification log.
    pub logs_dir: PathBuf,
    /// Branch checked out in the integration workspace.
    pub integration_branch: String,
    /// Integration workspace head at run start.
    pub integration_base: String,
}

impl RunContext {
    /// Build the run tree under `runs_root`, clone the integration workspace
    /// from the primary repository, and pin its branch.
    pub async fn prepare(
        repo_root: &Path,
        main_branch: &str,
        main_base: &str,
        runs_root: &Path,
    ) -> Result<Self> {
        let run_id = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        Self::prepare_with_id(repo_root, main_branch, main_base, runs_root, &run_id).await
    }

    /// As `prepare`, with an explicit run id.
    pub async fn prepare_with_id(
        repo_root: &Path,
        main_branch: &str,
        main_base: &str,
        runs_root: &Path,
        run_id: &str,
    ) -> Result<Self> {
        let root = runs_root.join(run_id);
        let integration_dir = root.join("integration");
        let clones_dir = root.join("clones");
        let patches_dir = root.join("patches");
        let logs_dir = root.join("logs");
        for dir in [&root, &clones_dir, &patches_dir, &logs_dir] {
            tokio::fs::create_dir_all(dir).await?;
        }

        // The integration clone references the primary repository so its
        // object store is shared, and work happens only inside it until the
        // reviewer merges.
        let integration =
            Workspace::clone_referenced(repo_root, repo_root, &integration_dir).await?;
        let integration_base = integration.head().await?;
        let integration_branch = format!("crew/integration-{}", run_id);
        integration
            .checkout_new_branch(&integration_branch, &integration_base)
            .await?;

        clog!(
            "Run {} prepared: integration branch {} at {}",
            run_id,
            integration_branch,
            &integration_base[..12.min(integration_base.len())]
        );

        Ok(Self {
            repo_root: repo_root.to_path_buf(),
            main_branch: main_branch.to_string(),
            main_base: main_base.to_string(),
            run_id: run_id.to_string(),
            root,
            integration_dir,
            clones_dir,
            patches_dir,
            logs_dir,
            integration_branch,
            integration_base,
        })
    }

    /// The shared integration workspace.
    pub fn integration(&self) -> Workspace {
        Workspace::open(&self.integration_dir)
    }

    pub fn plan_path(&self) -> PathBuf {
        self.root.join("plan.json")
    }

    pub fn planner_log(&self) -> PathBuf {
        self.logs_dir.join("planner.txt")
    }

    pub fn worker_log(&self, id: &TaskId) -> PathBuf {
        self.logs_dir.join(format!("worker-{}.txt", id))
    }

    pub fn review_log(&self) -> PathBuf {
        self.logs_dir.join("review.txt")
    }

    pub fn tests_log(&self) -> PathBuf {
        self.logs_dir.join("tests.txt")
    }

    pub fn task_clone_dir(&self, id: &TaskId) -> PathBuf {
        self.clones_dir.join(id.as_str())
    }

    pub fn patch_path(&self, id: &TaskId) -> PathBuf {
        self.patches_dir.join(format!("{}.patch", id))
    }

    pub fn task_branch(&self, id: &TaskId) -> String {
        format!("crew/{}", id)
    }
}
