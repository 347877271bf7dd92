use std::path::{Path, PathBuf};

use git2::{ErrorCode, IndexAddOption, Repository, ResetType, Signature};

use crate::{clog_debug, Error, Result};

pub struct GitOps {
    repo_path: PathBuf,
}

impl GitOps {
    pub fn new(repo_path: &Path) -> Result<Self> {
        clog_debug!("GitOps::new path={}", repo_path.display());
        let _ = Repository::discover(repo_path)?;
        Ok(Self {
            repo_path: repo_path.to_path_buf(),
        })
    }

    /// Discover the repository containing `path` and anchor at its root.
    pub fn discover(path: &Path) -> Result<Self> {
        let repo = Repository::discover(path)?;
        let root = repo
            .workdir()
            .ok_or_else(|| Error::Validation("repository has no working tree".to_string()))?
            .to_path_buf();
        clog_debug!("GitOps::discover root={}", root.display());
        Ok(Self { repo_path: root })
    }

    fn repo(&self) -> Result<Repository> {
        Ok(Repository::discover(&self.repo_path)?)
    }

    pub fn repo_path(&self) -> &Path {
        &self.repo_path
    }

    /// Full commit id the repository currently points at.
    pub fn head_commit(&self) -> Result<String> {
        let repo = self.repo()?;
        let head = repo.head()?;
        let commit = head.peel_to_commit()?;
        Ok(commit.id().to_string())
    }

    /// Check whether the working tree has uncommitted changes to tracked
    /// files. Untracked files do not count: they never reach a clone, so
    /// they cannot skew a worker's base snapshot (and crew's own run tree
    /// lives untracked inside the repository).
    pub fn is_dirty(&self) -> Result<bool> {
        let repo = self.repo()?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(false);
        let statuses = repo.statuses(Some(&mut opts))?;
        Ok(!statuses.is_empty())
    }

    /// Abort unless the working tree is clean. Checked once at run start so
    /// every clone's base snapshot is well-defined for the run's duration.
    pub fn require_clean(&self) -> Result<()> {
        if self.is_dirty()? {
            return Err(Error::DirtyWorkspace {
                repo: self.repo_path.display().to_string(),
            });
        }
        Ok(())
    }

    /// Branch to merge into: origin/HEAD if set, else the current branch,
    /// else "main".
    pub fn default_branch(&self) -> Result<String> {
        let repo = self.repo()?;

        if let Ok(reference) = repo.find_reference("refs/remotes/origin/HEAD") {
            if let Some(target) = reference.symbolic_target() {
                if let Some(name) = target.strip_prefix("refs/remotes/origin/") {
                    return Ok(name.to_string());
                }
            }
        }

        if let Ok(head) = repo.head() {
            if head.is_branch() {
                if let Some(name) = head.shorthand() {
                    return Ok(name.to_string());
                }
            }
        }

        Ok("main".to_string())
    }

    /// Force-create `branch` at `base_rev` in the repository at `workdir` and
    /// check it out (the `checkout -B` shape). The base is an explicit
    /// revision so the starting point stays pinned even if the source
    /// repository advances afterward.
    pub fn checkout_branch_at(workdir: &Path, branch: &str, base_rev: &str) -> Result<()> {
        clog_debug!(
            "GitOps::checkout_branch_at workdir={} branch={} base={}",
            workdir.display(),
            branch,
            base_rev
        );
        let repo = Repository::open(workdir)?;
        let object = repo.revparse_single(base_rev)?;
        let commit = object.peel_to_commit()?;
        repo.branch(branch, &commit, true)?;
        repo.set_head(&format!("refs/heads/{}", branch))?;
        let mut checkout = git2::build::CheckoutBuilder::new();
        checkout.force();
        repo.checkout_head(Some(&mut checkout))?;
        Ok(())
    }

    /// Stage everything in the repository at `workdir` and commit it.
    /// Falls back to a crew signature when the repo has none configured.
    pub fn commit_all(workdir: &Path, message: &str) -> Result<String> {
        clog_debug!(
            "GitOps::commit_all path={} message={}",
            workdir.display(),
            message
        );
        let repo = Repository::open(workdir)?;
        let mut index = repo.index()?;
        index.add_all(["."].iter(), IndexAddOption::DEFAULT, None)?;
        index.write()?;

        let tree_id = index.write_tree()?;
        let tree = repo.find_tree(tree_id)?;
        let sig = repo
            .signature()
            .or_else(|_| Signature::now("Crew", "crew@localhost"))?;

        let parent = match repo.head() {
            Ok(head) => Some(head.peel_to_commit()?),
            Err(e) if e.code() == ErrorCode::UnbornBranch => None,
            Err(e) => return Err(e.into()),
        };

        let parents: Vec<&git2::Commit> = parent.iter().collect();
        let commit_id = repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)?;
        clog_debug!("Commit created: {}", commit_id);
        Ok(commit_id.to_string())
    }

    /// Discard all tracked changes in the repository at `workdir`, restoring
    /// the working tree to HEAD.
    pub fn reset_hard(workdir: &Path) -> Result<()> {
        let repo = Repository::open(workdir)?;
        let head = repo.head()?.peel_to_commit()?;
        repo.reset(head.as_object(), ResetType::Hard, None)?;
        Ok(())
    }
}
