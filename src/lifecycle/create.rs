//! `new`/`worktree` — workspace creation, standard and octopus.
//!
//! Grounded directly on `new.py`'s `create_standard_workspace` /
//! `create_octopus_workspace`: same preflight order, same branch-create
//! then worktree-add then (for octopus) merge-commit sequence.

use std::path::PathBuf;

use chrono::Utc;

use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::metadata::{MetadataStore, Workspace, WorkspaceKind};
use crate::path::derive_workspace_path;

/// Resolves the effective base ref: the caller's explicit ref if given (it
/// must exist), otherwise the current branch — failing if `HEAD` is
/// detached and no explicit base was supplied.
pub fn resolve_base_ref(repo: &Repository, base_ref: Option<&str>) -> Result<String, AppError> {
    if let Some(base_ref) = base_ref {
        return match repo.rev_parse(base_ref) {
            Ok(Some(_)) => Ok(base_ref.to_string()),
            Ok(None) => Err(AppError::new(ErrorCode::InvalidBaseRef, "base ref does not exist")
                .with_details(base_ref)
                .with_guidance("pass a valid local branch, tag, or commit")),
            Err(e) => Err(AppError::new(ErrorCode::GitStateReadFailed, "failed to resolve base ref").with_details(e.to_string())),
        };
    }

    match repo.current_branch() {
        Ok(Some(branch)) => Ok(branch),
        Ok(None) => Err(AppError::new(ErrorCode::DetachedHead, "cannot infer base ref while HEAD is detached")
            .with_guidance("pass --base <ref> explicitly")),
        Err(e) => Err(AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.to_string())),
    }
}

fn require_repo_tracked<'a>(metadata: &'a crate::metadata::MetadataFile, git_dir: &std::path::Path) -> Result<&'a crate::metadata::Repo, AppError> {
    metadata.repo(git_dir).ok_or_else(|| {
        AppError::new(ErrorCode::RepoNotTracked, "repository metadata is missing")
            .with_guidance("rerun the command to retry auto-tracking")
    })
}

fn reject_if_branch_exists(repo: &Repository, branch: &str) -> Result<(), AppError> {
    if repo.branch_exists_local(branch) {
        return Err(AppError::new(ErrorCode::BranchAlreadyExists, "target branch already exists")
            .with_details(branch)
            .with_guidance("choose a new branch name"));
    }
    Ok(())
}

fn create_branch(repo: &Repository, branch: &str, base_ref: &str) -> Result<(), AppError> {
    repo.branch_create(branch, base_ref)
        .map_err(|e| AppError::new(ErrorCode::BranchCreateFailed, "failed to create branch").with_details(e.details()))
}

fn add_worktree(repo: &Repository, branch: &str, destination: &std::path::Path) -> Result<(), AppError> {
    if let Some(parent) = destination.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| AppError::new(ErrorCode::WorktreeCreateFailed, "failed to create worktree parent directory").with_details(e.to_string()))?;
    }
    repo.worktree_add(destination, branch)
        .map_err(|e| AppError::new(ErrorCode::WorktreeCreateFailed, "failed to create worktree").with_details(e.details()))
}

/// `new <branch> [--base <ref>]`. Returns the new worktree's path.
pub fn create_standard_workspace(
    repo: &Repository,
    store: &MetadataStore,
    branch: &str,
    base_ref: Option<&str>,
) -> Result<PathBuf, AppError> {
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;

    store.ensure_repo_tracked(repo, Utc::now())?;

    let metadata = store.read()?;
    let tracked_repo = require_repo_tracked(&metadata, &git_dir)?;

    reject_if_branch_exists(repo, branch)?;
    let resolved_base_ref = resolve_base_ref(repo, base_ref)?;
    create_branch(repo, branch, &resolved_base_ref)?;

    let siblings: Vec<String> = tracked_repo.workspaces.keys().cloned().collect();
    let destination = derive_workspace_path(&git_dir, branch, &siblings);
    add_worktree(repo, branch, &destination)?;

    let now = Utc::now();
    let mut metadata = metadata;
    let tracked_repo = metadata.repos.get_mut(&git_dir.to_string_lossy().into_owned()).expect("repo was just validated as tracked");
    tracked_repo.workspaces.insert(
        branch.to_string(),
        Workspace {
            branch: branch.to_string(),
            worktree_path: destination.clone(),
            tracked_remote: tracked_repo.default_remote.clone(),
            kind: WorkspaceKind::Standard,
            base_ref: resolved_base_ref,
            octopus_parents: Vec::new(),
            created_at: now,
            updated_at: now,
        },
    );
    tracked_repo.updated_at = now;
    store.write(&metadata)?;

    Ok(destination)
}

/// Trims and drops empty entries, then requires ≥ 2 distinct, resolvable
/// refs.
pub fn normalize_octopus_parent_refs(repo: &Repository, parent_refs: &[String]) -> Result<Vec<String>, AppError> {
    let normalized: Vec<String> = parent_refs.iter().map(|r| r.trim().to_string()).filter(|r| !r.is_empty()).collect();

    if normalized.len() < 2 {
        return Err(AppError::new(ErrorCode::InvalidOctopusParents, "octopus workspace requires at least two parent refs")
            .with_guidance("pass at least two branch names, tags, or commit refs"));
    }

    let mut distinct = normalized.clone();
    distinct.sort();
    distinct.dedup();
    if distinct.len() != normalized.len() {
        return Err(AppError::new(ErrorCode::InvalidOctopusParents, "octopus parent refs must be unique").with_details(normalized.join(", ")));
    }

    let mut missing = Vec::new();
    for r in &normalized {
        match repo.rev_parse(r) {
            Ok(None) => missing.push(r.clone()),
            Ok(Some(_)) => {}
            Err(e) => return Err(AppError::new(ErrorCode::GitStateReadFailed, "failed to resolve octopus parent ref").with_details(e.to_string())),
        }
    }
    if !missing.is_empty() {
        return Err(AppError::new(ErrorCode::InvalidBaseRef, "one or more octopus parent refs do not exist")
            .with_details(missing.join(", "))
            .with_guidance("pass valid local branches, tags, or commit refs"));
    }

    Ok(normalized)
}

fn create_octopus_merge_commit(worktree: &Repository, branch: &str, merge_parents: &[String]) -> Result<(), AppError> {
    let message = format!("Create octopus workspace {branch}");
    let parent_refs: Vec<&str> = merge_parents.iter().map(String::as_str).collect();
    worktree
        .merge_no_ff(&message, &parent_refs)
        .map_err(|e| AppError::new(ErrorCode::OctopusMergeFailed, "failed to create octopus merge commit")
            .with_details(e.details())
            .with_guidance("resolve parent branch conflicts before retrying octopus workspace creation"))
}

/// `new <branch> <parent1> <parent2> [...]` — N-way octopus create.
pub fn create_octopus_workspace(
    repo: &Repository,
    store: &MetadataStore,
    branch: &str,
    parent_refs: &[String],
) -> Result<PathBuf, AppError> {
    let git_dir = repo
        .canonical_git_dir()
        .map_err(|e| AppError::new(ErrorCode::NotInGitRepo, "gitcuttle must be run from within a git repository").with_details(e.details()))?;

    store.ensure_repo_tracked(repo, Utc::now())?;

    let normalized_parents = normalize_octopus_parent_refs(repo, parent_refs)?;

    let metadata = store.read()?;
    let tracked_repo = require_repo_tracked(&metadata, &git_dir)?;

    reject_if_branch_exists(repo, branch)?;
    create_branch(repo, branch, &normalized_parents[0])?;

    let siblings: Vec<String> = tracked_repo.workspaces.keys().cloned().collect();
    let destination = derive_workspace_path(&git_dir, branch, &siblings);
    add_worktree(repo, branch, &destination)?;

    let worktree_repo = Repository::at(&destination);
    create_octopus_merge_commit(&worktree_repo, branch, &normalized_parents[1..])?;

    let now = Utc::now();
    let mut metadata = metadata;
    let tracked_repo = metadata.repos.get_mut(&git_dir.to_string_lossy().into_owned()).expect("repo was just validated as tracked");
    tracked_repo.workspaces.insert(
        branch.to_string(),
        Workspace {
            branch: branch.to_string(),
            worktree_path: destination.clone(),
            tracked_remote: tracked_repo.default_remote.clone(),
            kind: WorkspaceKind::Octopus,
            base_ref: normalized_parents[0].clone(),
            octopus_parents: normalized_parents,
            created_at: now,
            updated_at: now,
        },
    );
    tracked_repo.updated_at = now;
    store.write(&metadata)?;

    Ok(destination)
}
