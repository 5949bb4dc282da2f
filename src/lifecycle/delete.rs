//! `delete` — retire a tracked workspace.
//!
//! Grounded on `delete.py`'s block-reason check plus a three-step
//! transaction (worktree remove, branch delete, untrack, all inside one
//! [`crate::transaction::Transaction`]).

use std::path::PathBuf;

use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::metadata::{MetadataStore, Workspace};
use crate::plan::{DryRunPlan, PlanAction};
use crate::transaction::{Step, Transaction, TransactionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteScope {
    Both,
    WorkspaceOnly,
    WorktreeOnly,
}

pub struct DeleteOutcome {
    pub branch: String,
    pub plan: Option<DryRunPlan>,
}

fn delete_block_reason(current: Option<&str>, target: &str, force: bool) -> Option<&'static str> {
    if force {
        return None;
    }
    if current == Some(target) {
        return Some("current-workspace");
    }
    None
}

fn build_delete_plan(workspace: &Workspace, scope: DeleteScope, force: bool) -> DryRunPlan {
    let mut actions = Vec::new();
    if matches!(scope, DeleteScope::Both | DeleteScope::WorktreeOnly) && workspace.worktree_path.exists() {
        actions.push(PlanAction::new(
            "delete-worktree",
            workspace.worktree_path.to_string_lossy().into_owned(),
            if force { Some("forced".to_string()) } else { None },
        ));
    }
    if matches!(scope, DeleteScope::Both | DeleteScope::WorkspaceOnly) {
        actions.push(PlanAction::new(
            "delete-branch",
            workspace.branch.clone(),
            if force { Some("forced".to_string()) } else { None },
        ));
        actions.push(PlanAction::new("untrack-workspace", workspace.branch.clone(), None));
    }
    DryRunPlan::new("delete", actions, Vec::new())
}

/// `delete [<branch>] [--workspace-only|--worktree-only] [--force]
/// [--dry-run]`.
pub fn delete_workspace(
    repo: &Repository,
    store: &MetadataStore,
    branch: &str,
    scope: DeleteScope,
    force: bool,
    dry_run: bool,
) -> Result<DeleteOutcome, AppError> {
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;

    let mut metadata = store.read()?;
    let tracked_repo = metadata
        .repo(&git_dir)
        .ok_or_else(|| AppError::new(ErrorCode::RepoNotTracked, "repository metadata is missing").with_guidance("rerun the command to retry auto-tracking"))?;
    let workspace = tracked_repo
        .workspaces
        .get(branch)
        .cloned()
        .ok_or_else(|| AppError::new(ErrorCode::WorkspaceNotTracked, "workspace is not tracked").with_details(branch))?;

    let current = repo
        .current_branch()
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.details()))?;
    if let Some(reason) = delete_block_reason(current.as_deref(), branch, force) {
        return Err(AppError::new(ErrorCode::DeleteBlocked, "cannot delete the current workspace without --force").with_details(reason));
    }

    if !force && workspace.worktree_path.exists() {
        let worktree_repo = Repository::at(&workspace.worktree_path);
        if worktree_repo.is_dirty() {
            return Err(AppError::new(ErrorCode::WorkspaceDirty, "workspace worktree has uncommitted changes")
                .with_details(workspace.worktree_path.to_string_lossy().into_owned())
                .with_guidance("commit or stash changes, or rerun with --force"));
        }
    }

    let plan = build_delete_plan(&workspace, scope, force);
    if dry_run {
        return Ok(DeleteOutcome {
            branch: branch.to_string(),
            plan: Some(plan),
        });
    }

    run_delete_transaction(repo, &mut metadata, &git_dir, &workspace, scope, force)?;
    store.write(&metadata)?;

    Ok(DeleteOutcome {
        branch: branch.to_string(),
        plan: None,
    })
}

/// Maps a failed transaction step's name to the more specific of the two
/// taxonomy codes for a delete failure.
fn delete_failure_code(failed_step_name: &str) -> ErrorCode {
    if failed_step_name == "delete-branch" {
        ErrorCode::BranchDeleteFailed
    } else {
        ErrorCode::WorktreeDeleteFailed
    }
}

fn run_delete_transaction(
    repo: &Repository,
    metadata: &mut crate::metadata::MetadataFile,
    git_dir: &std::path::Path,
    workspace: &Workspace,
    scope: DeleteScope,
    force: bool,
) -> Result<(), AppError> {
    let mut txn = Transaction::new();
    let worktree_path: PathBuf = workspace.worktree_path.clone();
    let branch = workspace.branch.clone();

    if matches!(scope, DeleteScope::Both | DeleteScope::WorktreeOnly) && worktree_path.exists() {
        let repo_for_apply = repo.clone();
        let path_for_apply = worktree_path.clone();
        txn.add_step(
            Step::new(
                "remove-worktree",
                move || repo_for_apply.worktree_remove(&path_for_apply, force).map_err(Into::into),
                || Ok(()),
            )
            .with_recovery_commands([format!("git worktree add {} {}", worktree_path.display(), branch)]),
        );
    }

    if matches!(scope, DeleteScope::Both | DeleteScope::WorkspaceOnly) {
        let repo_for_apply = repo.clone();
        let branch_for_apply = workspace.branch.clone();
        let recovery_branch = workspace.branch.clone();
        txn.add_step(
            Step::new(
                "delete-branch",
                move || repo_for_apply.branch_delete(&branch_for_apply, force).map_err(Into::into),
                || Ok(()),
            )
            .with_recovery_commands([format!("git branch {recovery_branch} <pre-delete-oid>")]),
        );
    }

    txn.run().map_err(|e| match e {
        TransactionError::Execution(e) => {
            let code = delete_failure_code(&e.failed_step_name);
            AppError::new(code, "failed to delete workspace").with_details(e.to_string())
        }
        TransactionError::Rollback(e) => {
            let code = delete_failure_code(&e.failed_step_name);
            AppError::new(code, "failed to delete workspace").with_details(e.format_partial_state())
        }
    })?;

    if matches!(scope, DeleteScope::Both | DeleteScope::WorkspaceOnly) {
        if let Some(tracked_repo) = metadata.repo_mut(git_dir) {
            tracked_repo.workspaces.remove(&workspace.branch);
            tracked_repo.updated_at = chrono::Utc::now();
        }
    }

    Ok(())
}
