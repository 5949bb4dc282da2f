//! The Orchestrator: the pre-flight gate every command runs
//! through before reaching the Workspace Lifecycle engine.
//!
//! For a mutating command: verify cwd is inside a repository and no
//! in-progress Git operation is detected, then ensure the repository is
//! tracked before building and running a transaction. Read-only commands
//! (`list`, `status`, `diag`) skip the tracking step.

use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::metadata::MetadataStore;

/// cwd must be inside a Git repository.
pub fn ensure_in_git_repo(repo: &Repository) -> Result<(), AppError> {
    if repo.in_git_repo() {
        return Ok(());
    }
    Err(AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from inside a git repository")
        .with_guidance("cd into a git repository and retry"))
}

/// No in-progress Git operation (merge, rebase, cherry-pick, revert) may
/// be underway in the current worktree.
pub fn ensure_no_operation_in_progress(repo: &Repository) -> Result<(), AppError> {
    let git_dir = repo
        .actual_git_dir()
        .map_err(|e| AppError::new(ErrorCode::GitCommandFailed, "failed to resolve git directory").with_details(e.details()))?;

    if let Some(marker) = crate::git::detect_in_progress(&git_dir) {
        return Err(AppError::new(ErrorCode::GitOperationInProgress, "a git operation is already in progress")
            .with_details(marker)
            .with_guidance("finish or abort the in-progress operation before running gitcuttle"));
    }
    Ok(())
}

/// For mutating commands, track the repository (idempotent) before
/// dispatching. Read-only commands must never call this.
pub fn ensure_repo_tracked(repo: &Repository, store: &MetadataStore) -> Result<(), AppError> {
    store.ensure_repo_tracked(repo, chrono::Utc::now())?;
    Ok(())
}

/// Runs the shared (a)+(b) pre-flight checks common to every command.
pub fn preflight(repo: &Repository) -> Result<(), AppError> {
    ensure_in_git_repo(repo)?;
    ensure_no_operation_in_progress(repo)?;
    Ok(())
}
