//! `prune` — retire workspaces whose local branch vanished or whose PR
//! merged.
//!
//! Grounded directly on `prune.py`'s `PruneCandidate`/`prune_reason`/
//! `prune_block_reason` and its dry-run plan construction.

use std::path::PathBuf;

use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::metadata::{MetadataStore, Repo};
use crate::plan::{DryRunPlan, PlanAction};
use crate::remote_status::PrState;
use crate::transaction::{Step, Transaction, TransactionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneReason {
    MissingLocalBranch,
    MergedPr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PruneBlockReason {
    CurrentWorkspace,
    WorkspaceDirty,
}

#[derive(Debug, Clone)]
pub struct PruneDecision {
    pub branch: String,
    pub reason: PruneReason,
    pub block_reason: Option<PruneBlockReason>,
    pub local_branch_exists: bool,
    pub worktree_path: PathBuf,
}

fn prune_reason(local_branch_exists: bool, pr_state: Option<PrState>) -> Option<PruneReason> {
    if !local_branch_exists {
        return Some(PruneReason::MissingLocalBranch);
    }
    if pr_state == Some(PrState::Merged) {
        return Some(PruneReason::MergedPr);
    }
    None
}

fn prune_block_reason(repo: &Repository, current: Option<&str>, target: &str, worktree_path: &std::path::Path, force: bool) -> Option<PruneBlockReason> {
    if force {
        return None;
    }
    if current == Some(target) {
        return Some(PruneBlockReason::CurrentWorkspace);
    }
    if worktree_path.exists() {
        let worktree_repo = Repository::at(worktree_path);
        if worktree_repo.is_dirty() {
            return Some(PruneBlockReason::WorkspaceDirty);
        }
    }
    let _ = repo;
    None
}

/// Builds the sorted-by-branch set of prune decisions for every tracked
/// workspace in `repo`.
pub fn prune_decisions(repo: &Repository, metadata_repo: &Repo, pr_states_by_branch: &std::collections::BTreeMap<String, PrState>, force: bool) -> Result<Vec<PruneDecision>, AppError> {
    let current = repo
        .current_branch()
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.details()))?;

    let mut decisions = Vec::new();
    for (branch, workspace) in &metadata_repo.workspaces {
        let local_branch_exists = repo.branch_exists_local(branch);
        let pr_state = pr_states_by_branch.get(branch).copied();
        let Some(reason) = prune_reason(local_branch_exists, pr_state) else {
            continue;
        };

        let block_reason = prune_block_reason(repo, current.as_deref(), branch, &workspace.worktree_path, force);
        decisions.push(PruneDecision {
            branch: branch.clone(),
            reason,
            block_reason,
            local_branch_exists,
            worktree_path: workspace.worktree_path.clone(),
        });
    }
    decisions.sort_by(|a, b| a.branch.cmp(&b.branch));
    Ok(decisions)
}

fn reason_label(reason: PruneReason) -> &'static str {
    match reason {
        PruneReason::MissingLocalBranch => "missing-local-branch",
        PruneReason::MergedPr => "merged-pr",
    }
}

fn block_reason_label(reason: PruneBlockReason) -> &'static str {
    match reason {
        PruneBlockReason::CurrentWorkspace => "current-workspace",
        PruneBlockReason::WorkspaceDirty => "workspace-dirty",
    }
}

pub fn build_prune_plan(decisions: &[PruneDecision], force: bool) -> DryRunPlan {
    let mut actions = Vec::new();
    let mut warnings = Vec::new();

    for decision in decisions {
        if let Some(block_reason) = decision.block_reason {
            warnings.push(format!(
                "skipping {}: blocked by {}; rerun with --force",
                decision.branch,
                block_reason_label(block_reason)
            ));
            continue;
        }

        actions.push(PlanAction::new(
            "delete-worktree",
            decision.worktree_path.to_string_lossy().into_owned(),
            Some(reason_label(decision.reason).to_string()),
        ));
        if decision.local_branch_exists {
            actions.push(PlanAction::new(
                "delete-branch",
                decision.branch.clone(),
                Some(if force { "forced".to_string() } else { reason_label(decision.reason).to_string() }),
            ));
        }
        actions.push(PlanAction::new("untrack-workspace", decision.branch.clone(), Some(reason_label(decision.reason).to_string())));
    }

    DryRunPlan::new("prune", actions, warnings)
}

/// Maps a failed transaction step's name to the more specific of the two
/// taxonomy codes for a prune failure.
fn prune_failure_code(failed_step_name: &str) -> ErrorCode {
    if failed_step_name == "delete-branch" {
        ErrorCode::BranchDeleteFailed
    } else {
        ErrorCode::WorktreeDeleteFailed
    }
}

/// Executes the non-blocked prune decisions inside a single transaction,
/// then persists the reduced `workspaces` map. Returns the plan rendering
/// when `dry_run`; otherwise `None`.
pub fn prune_workspaces(
    repo: &Repository,
    store: &MetadataStore,
    pr_states_by_branch: &std::collections::BTreeMap<String, PrState>,
    force: bool,
    dry_run: bool,
) -> Result<Option<DryRunPlan>, AppError> {
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;

    let mut metadata = store.read()?;
    let tracked_repo = metadata
        .repo(&git_dir)
        .ok_or_else(|| AppError::new(ErrorCode::RepoNotTracked, "repository metadata is missing").with_guidance("rerun the command to retry auto-tracking"))?;

    let decisions = prune_decisions(repo, tracked_repo, pr_states_by_branch, force)?;
    let plan = build_prune_plan(&decisions, force);

    if dry_run {
        return Ok(Some(plan));
    }

    let eligible: Vec<&PruneDecision> = decisions.iter().filter(|d| d.block_reason.is_none()).collect();
    if eligible.is_empty() {
        return Ok(None);
    }

    let mut txn = Transaction::new();
    for decision in &eligible {
        if decision.worktree_path.exists() {
            let repo_for_apply = repo.clone();
            let path = decision.worktree_path.clone();
            txn.add_step(Step::new("remove-worktree", move || repo_for_apply.worktree_remove(&path, force).map_err(Into::into), || Ok(())));
        }
        if decision.local_branch_exists {
            let repo_for_apply = repo.clone();
            let branch = decision.branch.clone();
            txn.add_step(Step::new("delete-branch", move || repo_for_apply.branch_delete(&branch, force).map_err(Into::into), || Ok(())));
        }
    }

    txn.run().map_err(|e| match e {
        TransactionError::Execution(e) => {
            let code = prune_failure_code(&e.failed_step_name);
            AppError::new(code, "failed to prune workspaces").with_details(e.to_string())
        }
        TransactionError::Rollback(e) => {
            let code = prune_failure_code(&e.failed_step_name);
            AppError::new(code, "failed to prune workspaces").with_details(e.format_partial_state())
        }
    })?;

    let pruned_branches: std::collections::BTreeSet<&str> = eligible.iter().map(|d| d.branch.as_str()).collect();
    if let Some(tracked_repo) = metadata.repo_mut(&git_dir) {
        tracked_repo.workspaces.retain(|branch, _| !pruned_branches.contains(branch.as_str()));
        tracked_repo.updated_at = chrono::Utc::now();
    }
    store.write(&metadata)?;

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_local_branch_is_eligible_regardless_of_pr_state() {
        assert_eq!(prune_reason(false, None), Some(PruneReason::MissingLocalBranch));
        assert_eq!(prune_reason(false, Some(PrState::Open)), Some(PruneReason::MissingLocalBranch));
    }

    #[test]
    fn merged_pr_with_local_branch_is_eligible() {
        assert_eq!(prune_reason(true, Some(PrState::Merged)), Some(PruneReason::MergedPr));
    }

    #[test]
    fn other_states_with_local_branch_are_not_eligible() {
        for state in [PrState::Open, PrState::Closed, PrState::Unknown, PrState::Unavailable] {
            assert_eq!(prune_reason(true, Some(state)), None);
        }
        assert_eq!(prune_reason(true, None), None);
    }
}
