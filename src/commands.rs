//! Command handlers: the glue between the CLI surface, the
//! Orchestrator, and the Workspace Lifecycle engine.
//!
//! Each handler returns the process exit code (`0`/`1`/`2`,
//! though `2` only ever comes from `clap` before a handler runs) or an
//! [`AppError`] rendered in the "Human error format."

use crate::cli::{AbsorbArgs, ContinuableArgs, DeleteArgs, NewArgs, PruneArgs};
use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::lifecycle::absorb::{TargetSelection, absorb_octopus_workspace};
use crate::lifecycle::create::{create_octopus_workspace, create_standard_workspace};
use crate::lifecycle::delete::{DeleteScope, delete_workspace};
use crate::lifecycle::prune::prune_workspaces;
use crate::lifecycle::update::{update_octopus_workspace, update_standard_workspace};
use crate::metadata::{MetadataStore, Workspace, WorkspaceKind};
use crate::remote_status::{PrState, pull_request_status_for_workspace};
use crate::styling::{SUCCESS, eprintln, println};
use crate::{listing, orchestrator, remote_status};

/// Splits `new`/`worktree` positionals (plus `--name`) into `(branch,
/// parent_refs)`, per the CLI-surface reconciliation documented in
/// `DESIGN.md`: with `--name`, every positional is a parent ref; without
/// it, the first positional is the branch and the rest are parent refs.
fn resolve_new_target(args: &NewArgs) -> (String, Vec<String>) {
    match &args.name {
        Some(name) => (name.clone(), args.refs.clone()),
        None => {
            let mut refs = args.refs.clone();
            let branch = refs.remove(0);
            (branch, refs)
        }
    }
}

pub fn handle_new(repo: &Repository, store: &MetadataStore, args: &NewArgs, print_path_only: bool) -> Result<i32, AppError> {
    orchestrator::preflight(repo)?;
    orchestrator::ensure_repo_tracked(repo, store)?;

    let (branch, parent_refs) = resolve_new_target(args);

    let path = if parent_refs.len() >= 2 {
        if args.base.is_some() {
            return Err(AppError::new(ErrorCode::InvalidOctopusParents, "--base is not valid for an octopus workspace")
                .with_guidance("drop --base; the first parent ref is the octopus merge base"));
        }
        create_octopus_workspace(repo, store, &branch, &parent_refs)?
    } else if parent_refs.len() == 1 {
        if args.base.is_some() {
            return Err(AppError::new(ErrorCode::InvalidBaseRef, "pass either --base or a single base ref positional, not both"));
        }
        create_standard_workspace(repo, store, &branch, Some(parent_refs[0].as_str()))?
    } else {
        create_standard_workspace(repo, store, &branch, args.base.as_deref())?
    };

    if print_path_only {
        println!("{}", path.display());
    } else {
        println!("{SUCCESS}created workspace `{branch}` at {}{SUCCESS:#}", path.display());
    }
    Ok(0)
}

fn lookup_current_workspace<'a>(repo: &Repository, metadata_repo: &'a crate::metadata::Repo) -> Result<&'a Workspace, AppError> {
    let current = repo
        .current_branch()
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.details()))?
        .ok_or_else(|| AppError::new(ErrorCode::DetachedHead, "cannot identify a workspace while HEAD is detached"))?;

    metadata_repo
        .workspaces
        .get(&current)
        .ok_or_else(|| AppError::new(ErrorCode::WorkspaceNotTracked, "current branch is not a tracked workspace").with_details(current))
}

/// Resumes whatever Git operation left a marker behind.
fn continue_in_progress(repo: &Repository) -> Result<(), AppError> {
    let git_dir = repo
        .actual_git_dir()
        .map_err(|e| AppError::new(ErrorCode::GitCommandFailed, "failed to resolve git directory").with_details(e.details()))?;

    match crate::git::detect_in_progress(&git_dir) {
        Some("REBASE_HEAD") | Some("rebase-apply") | Some("rebase-merge") => repo
            .rebase_continue()
            .map_err(|e| AppError::new(ErrorCode::UpdateRebaseFailed, "failed to continue rebase").with_details(e.details())),
        Some("CHERRY_PICK_HEAD") => repo
            .cherry_pick_continue()
            .map_err(|e| AppError::new(ErrorCode::AbsorbCherryPickFailed, "failed to continue cherry-pick").with_details(e.details())),
        Some("MERGE_HEAD") => repo
            .merge_continue()
            .map_err(|e| AppError::new(ErrorCode::OctopusMergeFailed, "failed to complete merge").with_details(e.details())),
        Some(other) => Err(AppError::new(ErrorCode::GitOperationInProgress, "no continuable operation for this marker").with_details(other)),
        None => Err(AppError::new(ErrorCode::GitOperationInProgress, "no in-progress git operation to continue")
            .with_guidance("drop --continue to start a fresh update/absorb")),
    }
}

pub fn handle_update(repo: &Repository, store: &MetadataStore, args: &ContinuableArgs) -> Result<i32, AppError> {
    if args.continue_ {
        continue_in_progress(repo)?;
        println!("update continued");
        return Ok(0);
    }

    orchestrator::preflight(repo)?;
    let metadata = store.read()?;
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;
    let tracked_repo = metadata
        .repo(&git_dir)
        .ok_or_else(|| AppError::new(ErrorCode::RepoNotTracked, "repository metadata is missing").with_guidance("run any gitcuttle command once to start tracking"))?;
    let workspace = lookup_current_workspace(repo, tracked_repo)?;
    let default_remote = tracked_repo.default_remote.as_deref();

    let result = match workspace.kind {
        WorkspaceKind::Standard => update_standard_workspace(repo, workspace, default_remote)?,
        WorkspaceKind::Octopus => update_octopus_workspace(repo, workspace, default_remote)?,
    };

    if result.changed() {
        println!("updated `{}`: {} -> {}", result.branch, &result.before_oid[..12.min(result.before_oid.len())], &result.after_oid[..12.min(result.after_oid.len())]);
    } else {
        println!("`{}` is already up to date", result.branch);
    }
    Ok(0)
}

pub fn handle_absorb(repo: &Repository, store: &MetadataStore, args: &AbsorbArgs) -> Result<i32, AppError> {
    if args.continuable.continue_ {
        continue_in_progress(repo)?;
        println!("absorb continued");
        return Ok(0);
    }

    orchestrator::preflight(repo)?;
    let metadata = store.read()?;
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;
    let tracked_repo = metadata
        .repo(&git_dir)
        .ok_or_else(|| AppError::new(ErrorCode::RepoNotTracked, "repository metadata is missing").with_guidance("run any gitcuttle command once to start tracking"))?;
    let workspace = lookup_current_workspace(repo, tracked_repo)?;

    let selection = if let Some(target) = args.target.as_deref() {
        TargetSelection::Explicit(target)
    } else if args.interactive {
        return Err(AppError::new(ErrorCode::InteractiveSelectionUnavailable, "interactive absorb target selection requires an embedding application")
            .with_guidance("pass --target <branch> to pick the destination explicitly"));
    } else {
        TargetSelection::Heuristic
    };

    let result = absorb_octopus_workspace(repo, workspace, selection)?;
    if result.absorbed_commits.is_empty() {
        println!("`{}` has no post-merge commits to absorb", result.branch);
    } else {
        for commit in &result.absorbed_commits {
            println!("absorbed {} onto `{}`", &commit.commit[..12.min(commit.commit.len())], commit.target_parent);
        }
    }
    Ok(0)
}

pub fn handle_delete(repo: &Repository, store: &MetadataStore, args: &DeleteArgs) -> Result<i32, AppError> {
    orchestrator::preflight(repo)?;
    orchestrator::ensure_repo_tracked(repo, store)?;

    let branch = match &args.name {
        Some(name) => name.clone(),
        None => repo
            .current_branch()
            .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.details()))?
            .ok_or_else(|| AppError::new(ErrorCode::DetachedHead, "cannot default to the current branch while HEAD is detached"))?,
    };

    let scope = if args.workspace_only {
        DeleteScope::WorkspaceOnly
    } else if args.worktree_only {
        DeleteScope::WorktreeOnly
    } else {
        DeleteScope::Both
    };

    let outcome = delete_workspace(repo, store, &branch, scope, args.common.force, args.common.dry_run)?;
    render_plan_or_confirmation(&outcome.plan, args.common.json, || format!("deleted workspace `{}`", outcome.branch))
}

pub fn handle_prune(repo: &Repository, store: &MetadataStore, args: &PruneArgs) -> Result<i32, AppError> {
    orchestrator::preflight(repo)?;
    orchestrator::ensure_repo_tracked(repo, store)?;

    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;
    let metadata = store.read()?;
    let tracked_repo = metadata
        .repo(&git_dir)
        .ok_or_else(|| AppError::new(ErrorCode::RepoNotTracked, "repository metadata is missing"))?;

    let pr_states = pr_states_for_repo(repo, tracked_repo);
    let plan = prune_workspaces(repo, store, &pr_states, args.common.force, args.common.dry_run)?;
    render_plan_or_confirmation(&plan, args.common.json, || "prune complete".to_string())
}

fn pr_states_for_repo(repo: &Repository, metadata_repo: &crate::metadata::Repo) -> std::collections::BTreeMap<String, PrState> {
    metadata_repo
        .workspaces
        .values()
        .map(|ws| (ws.branch.clone(), pull_request_status_for_workspace(repo, ws, metadata_repo.default_remote.as_deref()).state))
        .collect()
}

fn render_plan_or_confirmation(plan: &Option<crate::plan::DryRunPlan>, json: bool, confirmation: impl FnOnce() -> String) -> Result<i32, AppError> {
    match plan {
        Some(plan) => {
            if json {
                let rendered = plan.render_json().map_err(|e| AppError::new(ErrorCode::SchemaInvalid, "failed to render plan JSON").with_details(e.to_string()))?;
                println!("{rendered}");
            } else {
                println!("{}", plan.render_human());
            }
            Ok(0)
        }
        None => {
            println!("{}", confirmation());
            Ok(0)
        }
    }
}

pub fn handle_list(repo: &Repository, store: &MetadataStore, cache: &remote_status::RemoteStatusCache) -> Result<i32, AppError> {
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;
    let metadata = store.read()?;
    let Some(tracked_repo) = metadata.repo(&git_dir) else {
        println!("{}", listing::render_workspace_table(&[]));
        return Ok(0);
    };

    let resolver: remote_status::ResolverFn = Box::new(|repo, metadata_repo| remote_status::remote_statuses_for_repo(repo, metadata_repo));
    let remote_statuses = cache.statuses_for_repo(repo, tracked_repo, &resolver);
    let pr_statuses: std::collections::BTreeMap<_, _> = tracked_repo
        .workspaces
        .values()
        .map(|ws| (ws.branch.clone(), pull_request_status_for_workspace(repo, ws, tracked_repo.default_remote.as_deref())))
        .collect();

    let rows = listing::rows_for_repo(tracked_repo, &remote_statuses, &pr_statuses);
    println!("{}", listing::render_workspace_table(&rows));
    Ok(0)
}

pub fn handle_status(repo: &Repository, store: &MetadataStore) -> Result<i32, AppError> {
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;
    let metadata = store.read()?;
    match metadata.repo(&git_dir) {
        Some(tracked_repo) => {
            println!("repository tracked since {}", tracked_repo.tracked_at.to_rfc3339());
            println!("{} workspace(s) tracked", tracked_repo.workspaces.len());
            Ok(0)
        }
        None => {
            eprintln!("repository is not tracked; run a mutating gitcuttle command to start tracking");
            Ok(1)
        }
    }
}

pub fn handle_diag(repo: &Repository, store: &MetadataStore) -> Result<i32, AppError> {
    println!("{}", crate::diagnostic::build_report(repo, store));
    Ok(0)
}
