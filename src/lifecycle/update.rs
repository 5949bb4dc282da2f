//! `update` — rebase a standard workspace onto its upstream, or rebuild an
//! octopus workspace's merge and replay its post-merge commits.
//!
//! The standard flow is grounded directly on `update.py`'s
//! `update_non_octopus_workspace`. The octopus flow resolves each declared
//! parent, rebuilds the merge from scratch, and replays any post-merge
//! commits on top; the rebuild is wrapped in a [`Transaction`] backed by a
//! [`BackupRef`] of the workspace branch so a failed rebuild leaves the
//! branch at its pre-update OID rather than mid-rebuild.

use crate::backup_ref::{BackupRef, purge_txn_namespace};
use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::metadata::{Workspace, WorkspaceKind};
use crate::remote_status::workspace_upstream_ref;
use crate::transaction::{Step, Transaction, TransactionError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateResult {
    pub branch: String,
    pub upstream_ref: String,
    pub before_oid: String,
    pub after_oid: String,
}

impl UpdateResult {
    pub fn changed(&self) -> bool {
        self.before_oid != self.after_oid
    }
}

fn branch_head(repo: &Repository, branch: &str) -> Result<String, AppError> {
    repo.rev_parse(&format!("refs/heads/{branch}"))
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read branch head").with_details(e.details()))?
        .ok_or_else(|| {
            AppError::new(ErrorCode::BranchMissing, "workspace branch does not exist locally")
                .with_details(branch)
                .with_guidance("fetch or recreate the local branch before running update")
        })
}

/// Rebases a standard workspace's branch onto its resolved upstream ref.
pub fn update_standard_workspace(repo: &Repository, workspace: &Workspace, default_remote: Option<&str>) -> Result<UpdateResult, AppError> {
    if workspace.kind != WorkspaceKind::Standard {
        return Err(AppError::new(ErrorCode::OctopusUpdateNotSupported, "octopus workspaces require the octopus update flow")
            .with_guidance("run `gitcuttle update` on this branch; the octopus flow is chosen automatically"));
    }

    let upstream_ref = workspace_upstream_ref(workspace, default_remote).ok_or_else(|| {
        AppError::new(ErrorCode::NoUpstream, "workspace has no upstream remote branch configured")
            .with_details(&workspace.branch)
            .with_guidance("set tracked_remote metadata or configure a default remote for this repository")
    })?;

    let remote_name = upstream_ref.split('/').next().unwrap_or(&upstream_ref);
    repo.fetch(remote_name)
        .map_err(|e| AppError::new(ErrorCode::UpdateFetchFailed, "failed to fetch upstream").with_details(e.details()))?;

    let remote_tracking_ref = format!("refs/remotes/{upstream_ref}");
    if repo.rev_parse(&remote_tracking_ref).map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to resolve upstream ref").with_details(e.details()))?.is_none() {
        return Err(AppError::new(ErrorCode::NoUpstream, "workspace upstream remote branch does not exist")
            .with_details(&upstream_ref)
            .with_guidance("push the branch to the remote or configure a different upstream"));
    }

    let before_oid = branch_head(repo, &workspace.branch)?;
    repo.rebase(&upstream_ref, &workspace.branch)
        .map_err(|e| AppError::new(ErrorCode::UpdateRebaseFailed, "failed to rebase branch onto upstream").with_details(e.details()))?;
    let after_oid = branch_head(repo, &workspace.branch)?;

    Ok(UpdateResult {
        branch: workspace.branch.clone(),
        upstream_ref,
        before_oid,
        after_oid,
    })
}

/// Resolves each declared octopus parent to a concrete ref: prefer
/// `<remote>/<parent>` if that remote-tracking ref exists, else the local
/// branch `parent`, else fail `octopus-parent-missing`.
fn resolve_octopus_parent(repo: &Repository, remote: Option<&str>, parent: &str) -> Result<String, AppError> {
    if let Some(remote) = remote {
        let candidate = format!("{remote}/{parent}");
        if repo.show_ref(&format!("refs/remotes/{candidate}")) {
            return Ok(candidate);
        }
    }
    if repo.branch_exists_local(parent) {
        return Ok(parent.to_string());
    }
    Err(AppError::new(ErrorCode::OctopusParentMissing, "octopus parent ref could not be resolved")
        .with_details(parent)
        .with_guidance("fetch the parent branch or remove it from the octopus workspace"))
}

/// Maps a failed transaction step's name to the more specific of the two
/// taxonomy codes for an octopus rebuild failure.
fn update_rebuild_failure_code(failed_step_name: &str) -> ErrorCode {
    if failed_step_name == "checkout-workspace-branch" {
        ErrorCode::BranchCheckoutFailed
    } else {
        ErrorCode::OctopusUpdateAnalysisFailed
    }
}

/// Rebuilds an octopus workspace's merge from its resolved parents and
/// replays any post-merge commits on top.
pub fn update_octopus_workspace(repo: &Repository, workspace: &Workspace, default_remote: Option<&str>) -> Result<UpdateResult, AppError> {
    if workspace.kind != WorkspaceKind::Octopus {
        return Err(AppError::new(ErrorCode::InvalidWorkspaceKind, "update (octopus) requires an octopus workspace").with_details(&workspace.branch));
    }

    let remote = workspace.tracked_remote.as_deref().or(default_remote);
    if let Some(remote) = remote {
        repo.fetch(remote)
            .map_err(|e| AppError::new(ErrorCode::UpdateFetchFailed, "failed to fetch upstream").with_details(e.details()))?;
    }

    let resolved_parents: Vec<String> = workspace
        .octopus_parents
        .iter()
        .map(|parent| resolve_octopus_parent(repo, remote, parent))
        .collect::<Result<_, _>>()?;

    let before_oid = branch_head(repo, &workspace.branch)?;

    let unique = repo
        .commits_unique_to(&workspace.branch, &resolved_parents)
        .map_err(|e| AppError::new(ErrorCode::OctopusUpdateAnalysisFailed, "failed to analyze octopus branch history").with_details(e.details()))?;

    let replay_commits: Vec<String> = match unique.first() {
        Some(first) if repo.is_merge_commit(first).map_err(|e| AppError::new(ErrorCode::OctopusUpdateAnalysisFailed, "failed to inspect commit parents").with_details(e.details()))? => {
            unique[1..].to_vec()
        }
        _ => unique,
    };

    let original_branch = repo
        .current_branch()
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.details()))?;

    let mut txn = Transaction::new();
    let backup = BackupRef::snapshot(repo, &txn.txn_id, &workspace.branch)
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to snapshot workspace branch before rebuild").with_details(e.to_string()))?;

    {
        let repo = repo.clone();
        let branch = workspace.branch.clone();
        let new_base = resolved_parents[0].clone();
        let rollback_repo = repo.clone();
        let rollback_backup = backup.clone();

        txn.add_step(
            Step::new(
                "checkout-workspace-branch",
                move || {
                    repo.checkout(&branch)?;
                    repo.reset_hard(&new_base)?;
                    Ok(())
                },
                move || rollback_backup.restore(&rollback_repo),
            )
            .with_recovery_commands([backup.recovery_command()]),
        );
    }

    {
        let repo = repo.clone();
        let branch = workspace.branch.clone();
        let merge_parents = resolved_parents[1..].to_vec();
        let replay_commits = replay_commits.clone();
        let rollback_repo = repo.clone();
        let rollback_backup = backup.clone();

        txn.add_step(
            Step::new(
                "rebuild-octopus-merge",
                move || {
                    let message = format!("Rebuild octopus workspace {branch}");
                    let merge_parents: Vec<&str> = merge_parents.iter().map(String::as_str).collect();
                    repo.merge_no_ff(&message, &merge_parents)?;
                    for commit in &replay_commits {
                        repo.cherry_pick(commit)?;
                    }
                    Ok(())
                },
                move || rollback_backup.restore(&rollback_repo),
            )
            .with_recovery_commands([backup.recovery_command()]),
        );
    }

    let txn_id = txn.txn_id.clone();
    let run_result = txn.run();

    if let Some(original_branch) = &original_branch {
        if original_branch != &workspace.branch {
            let current = repo.current_branch().ok().flatten();
            if current.as_deref() != Some(original_branch.as_str()) {
                let _ = repo.checkout(original_branch);
            }
        }
    }

    match run_result {
        Ok(()) => {
            purge_txn_namespace(repo, &txn_id);
        }
        Err(TransactionError::Execution(e)) => {
            purge_txn_namespace(repo, &txn_id);
            let code = update_rebuild_failure_code(&e.failed_step_name);
            return Err(AppError::new(code, "failed to rebuild octopus workspace").with_details(e.to_string()));
        }
        Err(TransactionError::Rollback(e)) => {
            let code = update_rebuild_failure_code(&e.failed_step_name);
            return Err(AppError::new(code, "failed to rebuild octopus workspace and rollback was partial").with_details(e.format_partial_state()));
        }
    }

    let after_oid = branch_head(repo, &workspace.branch)?;
    Ok(UpdateResult {
        branch: workspace.branch.clone(),
        upstream_ref: resolved_parents.join(","),
        before_oid,
        after_oid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_workspace(kind: WorkspaceKind) -> Workspace {
        Workspace {
            branch: "feature/x".to_string(),
            worktree_path: std::path::PathBuf::from("/tmp/ws"),
            tracked_remote: None,
            kind,
            base_ref: "main".to_string(),
            octopus_parents: vec!["main".to_string(), "release".to_string()],
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn standard_update_rejects_octopus_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path());
        let ws = sample_workspace(WorkspaceKind::Octopus);
        let err = update_standard_workspace(&repo, &ws, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::OctopusUpdateNotSupported);
    }

    #[test]
    fn standard_update_requires_upstream() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path());
        let ws = sample_workspace(WorkspaceKind::Standard);
        let err = update_standard_workspace(&repo, &ws, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::NoUpstream);
    }

    #[test]
    fn octopus_update_rejects_standard_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path());
        let ws = sample_workspace(WorkspaceKind::Standard);
        let err = update_octopus_workspace(&repo, &ws, None).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidWorkspaceKind);
    }
}
