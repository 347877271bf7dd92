//! Isolated workspace management.
//!
//! Every worker, and the integration staging area, gets its own clone of the
//! repository. Clones are seeded from a source repository at the moment of
//! the call and share object storage against a reference repository where
//! git supports it, so a run with many workers stays cheap on disk.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::git::GitOps;
use crate::util::blocking;
use crate::{clog_debug, Error, Result};

/// An isolated, independently-mutable working copy with its own history
/// pointer.
#[derive(Debug, Clone)]
pub struct Workspace {
    path: PathBuf,
}

impl Workspace {
    /// Wrap an existing working copy.
    pub fn open(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
        }
    }

    /// Clone `source` into `dest`, referencing `reference`'s object store
    /// when possible.
    ///
    /// Tries `--reference-if-able`, then `--reference`, then a plain clone.
    /// Linking is an optimization, never a requirement; only exhausting every
    /// strategy fails, and that failure is fatal to the run.
    pub async fn clone_referenced(source: &Path, reference: &Path, dest: &Path) -> Result<Self> {
        clog_debug!(
            "Workspace::clone_referenced source={} reference={} dest={}",
            source.display(),
            reference.display(),
            dest.display()
        );
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        if dest.exists() {
            tokio::fs::remove_dir_all(dest).await?;
        }

        let attempts: [&[&str]; 3] = [
            &["clone", "--reference-if-able"],
            &["clone", "--reference"],
            &["clone"],
        ];

        let mut last_err = String::new();
        for attempt in attempts {
            let mut cmd = Command::new("git");
            cmd.args(attempt);
            if attempt.len() > 1 {
                cmd.arg(reference);
            }
            cmd.arg(source).arg(dest);

            let output = cmd.output().await?;
            if output.status.success() {
                return Ok(Self::open(dest));
            }
            last_err = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if last_err.is_empty() {
                last_err = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            clog_debug!("clone attempt {:?} failed: {}", attempt, last_err);
        }

        Err(Error::CloneFailed {
            dest: dest.display().to_string(),
            detail: last_err,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current commit id of this workspace.
    pub async fn head(&self) -> Result<String> {
        let path = self.path.clone();
        blocking(move || GitOps::new(&path)?.head_commit()).await
    }

    /// Force-create and check out `branch` pinned at `base_rev`.
    pub async fn checkout_new_branch(&self, branch: &str, base_rev: &str) -> Result<()> {
        let path = self.path.clone();
        let branch = branch.to_string();
        let base_rev = base_rev.to_string();
        blocking(move || GitOps::checkout_branch_at(&path, &branch, &base_rev)).await
    }

    /// Whether the working tree has no uncommitted modifications.
    pub async fn is_clean(&self) -> Result<bool> {
        let path = self.path.clone();
        blocking(move || Ok(!GitOps::new(&path)?.is_dirty()?)).await
    }
}
