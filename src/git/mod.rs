//! The Git Driver: typed wrappers around `git` subprocess
//! invocations, plus two pure helpers kept out of ad-hoc call sites:
//! in-progress detection and remote-branch enumeration.

mod error;
mod in_progress;
mod remote_ref;

pub use error::GitCommandError;
pub use in_progress::detect_in_progress;
pub use remote_ref::{RemoteBranchMatch, enumerate_remote_branch_refs};

use std::path::{Path, PathBuf};
use std::process::Command;

/// A Git repository, identified by a working-directory path, that every
/// typed Git Driver operation runs its `git` subprocess invocations against.
#[derive(Debug, Clone)]
pub struct Repository {
    path: PathBuf,
}

impl Repository {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn current() -> Self {
        Self::at(".")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `git <args>` in this repository's directory and return trimmed
    /// stdout, or a [`GitCommandError`] on non-zero exit.
    pub fn run(&self, args: &[&str]) -> Result<String, GitCommandError> {
        log::debug!("$ git {} [{}]", args.join(" "), self.path.display());

        let output = Command::new("git").args(args).current_dir(&self.path).output().map_err(|e| {
            log::warn!("failed to spawn git (is it on PATH?): {e}");
            GitCommandError {
                argv: args.iter().map(|s| s.to_string()).collect(),
                exit_code: None,
                stdout: String::new(),
                stderr: format!("failed to spawn git (is it on PATH?): {e}"),
            }
        })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            log::warn!("git {} failed: {}", args.join(" "), stderr.trim());
            return Err(GitCommandError {
                argv: args.iter().map(|s| s.to_string()).collect(),
                exit_code: output.status.code(),
                stdout,
                stderr,
            });
        }

        Ok(stdout.trim().to_string())
    }

    /// `git rev-parse --verify <ref>`; `Ok(None)` rather than an error when
    /// the ref simply doesn't resolve.
    pub fn rev_parse(&self, reference: &str) -> Result<Option<String>, GitCommandError> {
        match self.run(&["rev-parse", "--verify", reference]) {
            Ok(oid) => Ok(Some(oid)),
            Err(e) if e.exit_code == Some(128) || e.exit_code == Some(1) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn show_ref(&self, reference: &str) -> bool {
        self.run(&["show-ref", "--verify", "--quiet", reference]).is_ok()
    }

    pub fn branch_exists_local(&self, branch: &str) -> bool {
        self.show_ref(&format!("refs/heads/{branch}"))
    }

    /// `None` when `HEAD` is detached.
    pub fn current_branch(&self) -> Result<Option<String>, GitCommandError> {
        let branch = self.run(&["rev-parse", "--abbrev-ref", "HEAD"])?;
        if branch.is_empty() || branch == "HEAD" {
            Ok(None)
        } else {
            Ok(Some(branch))
        }
    }

    /// Canonical (symlink-resolved) absolute path to the repository's
    /// `.git` directory — the identity of a repository.
    pub fn canonical_git_dir(&self) -> Result<PathBuf, GitCommandError> {
        let raw = self.run(&["rev-parse", "--path-format=absolute", "--git-common-dir"])?;
        Ok(dunce::canonicalize(&raw).unwrap_or_else(|_| PathBuf::from(raw)))
    }

    /// Canonical absolute path to *this* worktree's `.git` directory — for
    /// a linked worktree this differs from [`Self::canonical_git_dir`]
    /// (which returns the shared common dir) and is where per-worktree
    /// state like `MERGE_HEAD`/`REBASE_HEAD` actually lives.
    pub fn actual_git_dir(&self) -> Result<PathBuf, GitCommandError> {
        let raw = self.run(&["rev-parse", "--path-format=absolute", "--git-dir"])?;
        Ok(dunce::canonicalize(&raw).unwrap_or_else(|_| PathBuf::from(raw)))
    }

    /// Canonical absolute path to the working-tree root.
    pub fn repo_root(&self) -> Result<PathBuf, GitCommandError> {
        let raw = self.run(&["rev-parse", "--show-toplevel"])?;
        Ok(dunce::canonicalize(&raw).unwrap_or_else(|_| PathBuf::from(raw)))
    }

    pub fn in_git_repo(&self) -> bool {
        self.run(&["rev-parse", "--show-toplevel"]).is_ok()
    }

    pub fn merge_base(&self, refs: &[&str]) -> Result<String, GitCommandError> {
        let mut args = vec!["merge-base"];
        args.extend_from_slice(refs);
        self.run(&args)
    }

    pub fn is_ancestor(&self, ancestor: &str, descendant: &str) -> bool {
        self.run(&["merge-base", "--is-ancestor", ancestor, descendant]).is_ok()
    }

    /// `git rev-list --left-right --count <local>...<upstream>`, parsed to
    /// `(ahead, behind)`. `None` if the command fails or the output does
    /// not parse as two integers.
    pub fn ahead_behind_counts(&self, local: &str, upstream: &str) -> Option<(u64, u64)> {
        let output = self
            .run(&["rev-list", "--left-right", "--count", &format!("{local}...{upstream}")])
            .ok()?;
        let mut parts = output.split_whitespace();
        let ahead: u64 = parts.next()?.parse().ok()?;
        let behind: u64 = parts.next()?.parse().ok()?;
        if parts.next().is_some() {
            return None;
        }
        Some((ahead, behind))
    }

    /// `git rev-list --reverse <branch> --not <exclude…>` — commits unique
    /// to `branch`, oldest first.
    pub fn commits_unique_to(&self, branch: &str, exclude: &[String]) -> Result<Vec<String>, GitCommandError> {
        let mut args = vec!["rev-list", "--reverse", branch, "--not"];
        args.extend(exclude.iter().map(String::as_str));
        let output = self.run(&args)?;
        Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    /// Whether `commit` has more than one parent.
    pub fn is_merge_commit(&self, commit: &str) -> Result<bool, GitCommandError> {
        let parents = self.run(&["show", "-s", "--format=%P", commit])?;
        Ok(parents.split_whitespace().count() > 1)
    }

    pub fn changed_files(&self, commit: &str) -> Result<Vec<String>, GitCommandError> {
        let output = self.run(&["show", "--pretty=", "--name-only", commit])?;
        Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    pub fn path_exists_at_ref(&self, reference: &str, path: &str) -> bool {
        self.run(&["cat-file", "-e", &format!("{reference}:{path}")]).is_ok()
    }

    pub fn branch_create(&self, branch: &str, base_ref: &str) -> Result<(), GitCommandError> {
        self.run(&["branch", branch, base_ref]).map(|_| ())
    }

    pub fn branch_delete(&self, branch: &str, force: bool) -> Result<(), GitCommandError> {
        let flag = if force { "-D" } else { "-d" };
        self.run(&["branch", flag, branch]).map(|_| ())
    }

    pub fn checkout(&self, target: &str) -> Result<(), GitCommandError> {
        self.run(&["checkout", target]).map(|_| ())
    }

    pub fn reset_hard(&self, target: &str) -> Result<(), GitCommandError> {
        self.run(&["reset", "--hard", target]).map(|_| ())
    }

    pub fn merge_no_ff(&self, message: &str, parents: &[&str]) -> Result<(), GitCommandError> {
        let mut args = vec!["merge", "--no-ff", "-m", message];
        args.extend_from_slice(parents);
        self.run(&args).map(|_| ())
    }

    pub fn cherry_pick(&self, commit: &str) -> Result<(), GitCommandError> {
        self.run(&["cherry-pick", commit]).map(|_| ())
    }

    pub fn rebase(&self, upstream: &str, branch: &str) -> Result<(), GitCommandError> {
        self.run(&["rebase", upstream, branch]).map(|_| ())
    }

    pub fn rebase_continue(&self) -> Result<(), GitCommandError> {
        self.run(&["rebase", "--continue"]).map(|_| ())
    }

    pub fn cherry_pick_continue(&self) -> Result<(), GitCommandError> {
        self.run(&["cherry-pick", "--continue"]).map(|_| ())
    }

    pub fn merge_continue(&self) -> Result<(), GitCommandError> {
        self.run(&["commit", "--no-edit"]).map(|_| ())
    }

    pub fn worktree_add(&self, path: &Path, branch: &str) -> Result<(), GitCommandError> {
        self.run(&["worktree", "add", &path.to_string_lossy(), branch]).map(|_| ())
    }

    pub fn worktree_remove(&self, path: &Path, force: bool) -> Result<(), GitCommandError> {
        let path_str = path.to_string_lossy().into_owned();
        let mut args = vec!["worktree", "remove"];
        if force {
            args.push("--force");
        }
        args.push(&path_str);
        self.run(&args).map(|_| ())
    }

    pub fn update_ref(&self, reference: &str, new_value: &str) -> Result<(), GitCommandError> {
        self.run(&["update-ref", reference, new_value]).map(|_| ())
    }

    pub fn delete_ref(&self, reference: &str) -> Result<(), GitCommandError> {
        self.run(&["update-ref", "-d", reference]).map(|_| ())
    }

    pub fn for_each_ref(&self, prefix: &str) -> Result<Vec<String>, GitCommandError> {
        let output = self.run(&["for-each-ref", "--format=%(refname)", prefix])?;
        Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    pub fn fetch(&self, remote: &str) -> Result<(), GitCommandError> {
        self.run(&["fetch", remote]).map(|_| ())
    }

    pub fn remotes(&self) -> Result<Vec<String>, GitCommandError> {
        let output = self.run(&["remote"])?;
        Ok(output.lines().map(str::trim).filter(|l| !l.is_empty()).map(str::to_string).collect())
    }

    pub fn remote_url(&self, remote: &str) -> Result<String, GitCommandError> {
        self.run(&["remote", "get-url", remote])
    }

    pub fn status_porcelain(&self) -> Result<String, GitCommandError> {
        self.run(&["status", "--porcelain"])
    }

    pub fn is_dirty(&self) -> bool {
        self.status_porcelain().map(|s| !s.is_empty()).unwrap_or(false)
    }
}
