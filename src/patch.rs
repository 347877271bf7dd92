//! Patch export and replay between workspaces.
//!
//! A patch is the portable, replayable net change between two points in a
//! workspace's history. Committed work exports as a `format-patch` series so
//! per-commit messages and authorship survive replay; uncommitted work
//! exports as a plain content diff. Application tries a three-way `am`
//! replay first and falls back to a permissive content-level apply with a
//! single synthesized commit.

use std::path::{Path, PathBuf};

use tokio::process::Command;

use crate::git::GitOps;
use crate::util::blocking;
use crate::workspace::Workspace;
use crate::{clog_debug, clog_warn, Error, Result};

/// How a patch artifact was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchKind {
    /// `format-patch` output for a commit range; replayable via `am`.
    Series,
    /// Plain content diff of uncommitted modifications.
    Diff,
}

/// A patch artifact on disk.
#[derive(Debug, Clone)]
pub struct Patch {
    pub path: PathBuf,
    pub kind: PatchKind,
}

async fn git_in(dir: &Path, args: &[&str]) -> Result<std::process::Output> {
    Ok(Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .await?)
}

fn stderr_text(output: &std::process::Output) -> String {
    let err = String::from_utf8_lossy(&output.stderr).trim().to_string();
    if err.is_empty() {
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    } else {
        err
    }
}

/// Export the change `workspace` introduced relative to `base_rev` into
/// `dest`.
///
/// Returns `Ok(None)` when there is nothing to export; a task can
/// legitimately produce no diff.
pub async fn export_change(
    workspace: &Workspace,
    base_rev: &str,
    dest: &Path,
) -> Result<Option<Patch>> {
    let head = workspace.head().await?;

    if head == base_rev {
        // No new commits; there may still be uncommitted modifications.
        let output = git_in(workspace.path(), &["diff"]).await?;
        let diff = String::from_utf8_lossy(&output.stdout).to_string();
        if diff.trim().is_empty() {
            clog_debug!("export_change: no change in {}", workspace.path().display());
            return Ok(None);
        }
        tokio::fs::write(dest, diff).await?;
        return Ok(Some(Patch {
            path: dest.to_path_buf(),
            kind: PatchKind::Diff,
        }));
    }

    let range = format!("{}..{}", base_rev, head);
    let output = git_in(workspace.path(), &["format-patch", "--stdout", &range]).await?;
    if !output.status.success() {
        return Err(Error::Validation(format!(
            "format-patch failed for {}: {}",
            range,
            stderr_text(&output)
        )));
    }
    tokio::fs::write(dest, &output.stdout).await?;
    clog_debug!("export_change: exported {} to {}", range, dest.display());
    Ok(Some(Patch {
        path: dest.to_path_buf(),
        kind: PatchKind::Series,
    }))
}

/// Replay `patch` into `target`.
///
/// Primary strategy is `git am -3`, which preserves the original commit
/// series. On failure the in-progress apply is aborted and a permissive
/// `git apply --3way` runs instead, with the net result committed as a
/// single commit carrying `fallback_message`. If both strategies fail the
/// target is rolled back to its pre-apply head and `Error::PatchApply` is
/// returned; the caller decides whether that is fatal. A failed rollback is
/// always fatal since the target's state is no longer known.
pub async fn apply_change(target: &Workspace, patch: &Patch, fallback_message: &str) -> Result<()> {
    let patch_arg = patch.path.display().to_string();

    let am = git_in(target.path(), &["am", "-3", &patch_arg]).await?;
    if am.status.success() {
        clog_debug!("apply_change: am -3 applied {}", patch_arg);
        return Ok(());
    }
    let am_error = stderr_text(&am);

    // Abort any in-progress am before falling back.
    let _ = git_in(target.path(), &["am", "--abort"]).await;

    let apply = git_in(target.path(), &["apply", "--3way", &patch_arg]).await?;
    if apply.status.success() {
        let workdir = target.path().to_path_buf();
        let message = fallback_message.to_string();
        blocking(move || GitOps::commit_all(&workdir, &message).map(|_| ())).await?;
        clog_warn!(
            "apply_change: am failed for {}, applied via 3way fallback",
            patch_arg
        );
        return Ok(());
    }
    let apply_error = stderr_text(&apply);

    // Both strategies failed: restore the target so the run can continue
    // without this task. A partial --3way apply leaves conflicted content in
    // the working tree.
    let workdir = target.path().to_path_buf();
    blocking(move || GitOps::reset_hard(&workdir)).await?;

    Err(Error::PatchApply {
        patch: patch_arg,
        am_error,
        apply_error,
    })
}
