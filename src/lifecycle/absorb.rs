//! `absorb` — move post-merge commits off an octopus workspace onto the
//! parent branch they belong to.
//!
//! Grounded directly on `absorb.py`'s `absorb_octopus_workspace`: same
//! merge-commit/post-merge split, same explicit/interactive/heuristic
//! target selection order, same changed-file overlap scoring. The cherry-pick
//! and final reset are wrapped in a [`Transaction`] backed by one
//! [`BackupRef`] per branch touched (the workspace branch, plus every
//! distinct target parent a commit is cherry-picked onto), so a failed
//! absorb leaves every touched branch at its pre-absorb OID rather than
//! partially rebuilt.

use std::collections::BTreeMap;

use crate::backup_ref::{BackupRef, purge_txn_namespace};
use crate::error::{AppError, ErrorCode};
use crate::git::Repository;
use crate::metadata::{Workspace, WorkspaceKind};
use crate::transaction::{Step, Transaction, TransactionError};

/// Minimum fraction of a commit's changed files that must exist at a
/// parent's tip for that parent to be selected heuristically.
const CONFIDENCE_THRESHOLD: f64 = 0.6;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsorbedCommit {
    pub commit: String,
    pub target_parent: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AbsorbResult {
    pub branch: String,
    pub before_oid: String,
    pub after_oid: String,
    pub absorbed_commits: Vec<AbsorbedCommit>,
}

impl AbsorbResult {
    pub fn changed(&self) -> bool {
        self.before_oid != self.after_oid
    }
}

/// How the target parent for each post-merge commit is chosen.
pub enum TargetSelection<'a> {
    Explicit(&'a str),
    Interactive(&'a dyn Fn(&str, &[String]) -> anyhow::Result<String>),
    Heuristic,
}

fn branch_head(repo: &Repository, branch: &str) -> Result<String, AppError> {
    repo.rev_parse(&format!("refs/heads/{branch}"))
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read branch head").with_details(e.details()))?
        .ok_or_else(|| {
            AppError::new(ErrorCode::BranchMissing, "workspace branch does not exist locally")
                .with_details(branch)
                .with_guidance("fetch or recreate the local branch before running absorb")
        })
}

fn octopus_unique_commits(repo: &Repository, branch: &str, parents: &[String]) -> Result<Vec<String>, AppError> {
    repo.commits_unique_to(branch, parents)
        .map_err(|e| AppError::new(ErrorCode::OctopusUpdateAnalysisFailed, "failed to analyze octopus branch history").with_details(e.details()))
}

/// Splits `unique_commits` into `(mergeCommit?, postMergeCommits)`: if the
/// first unique commit is a merge commit it is the workspace's own
/// historical octopus merge and is removed from the replay set.
fn split_octopus_history(repo: &Repository, unique_commits: Vec<String>) -> Result<(Option<String>, Vec<String>), AppError> {
    let Some(first) = unique_commits.first().cloned() else {
        return Ok((None, Vec::new()));
    };
    let is_merge = repo
        .is_merge_commit(&first)
        .map_err(|e| AppError::new(ErrorCode::AbsorbAnalysisFailed, "failed to inspect commit parents").with_details(e.details()))?;
    if is_merge {
        Ok((Some(first), unique_commits[1..].to_vec()))
    } else {
        Ok((None, unique_commits))
    }
}

fn heuristic_target_parent(repo: &Repository, commit: &str, parents: &[String]) -> Result<String, AppError> {
    let changed_files = repo
        .changed_files(commit)
        .map_err(|e| AppError::new(ErrorCode::AbsorbAnalysisFailed, "failed to inspect changed files for absorb").with_details(e.details()))?;

    if changed_files.is_empty() {
        return Err(AppError::new(ErrorCode::AbsorbTargetUncertain, "cannot infer absorb target for empty or metadata-only commit")
            .with_details(commit)
            .with_guidance("rerun with an explicit parent branch or interactive mode (-i)"));
    }

    let mut scores: Vec<(String, usize)> = Vec::new();
    for parent in parents {
        let matches = changed_files.iter().filter(|path| repo.path_exists_at_ref(parent, path)).count();
        scores.push((parent.clone(), matches));
    }

    let best_score = scores.iter().map(|(_, s)| *s).max().unwrap_or(0);
    let winners: Vec<&(String, usize)> = scores.iter().filter(|(_, s)| *s == best_score).collect();
    let confidence = best_score as f64 / changed_files.len() as f64;

    if best_score == 0 || winners.len() > 1 || confidence < CONFIDENCE_THRESHOLD {
        let mut sorted_scores = scores.clone();
        sorted_scores.sort_by(|a, b| a.0.cmp(&b.0));
        let score_details = sorted_scores.iter().map(|(p, s)| format!("{p}={s}")).collect::<Vec<_>>().join(", ");
        return Err(AppError::new(ErrorCode::AbsorbTargetUncertain, "could not infer a high-confidence absorb target")
            .with_details(format!("{commit}: {score_details}"))
            .with_guidance("rerun with an explicit parent branch or interactive mode (-i)"));
    }

    Ok(winners[0].0.clone())
}

fn plan_absorb_targets(repo: &Repository, commits: &[String], parents: &[String], selection: &TargetSelection) -> Result<Vec<AbsorbedCommit>, AppError> {
    let mut planned = Vec::new();
    for commit in commits {
        let target = match selection {
            TargetSelection::Explicit(target) => target.to_string(),
            TargetSelection::Interactive(chooser) => chooser(commit, parents)
                .map_err(|e| AppError::new(ErrorCode::InteractiveSelectionUnavailable, "interactive absorb target selection failed").with_details(e.to_string()))?,
            TargetSelection::Heuristic => heuristic_target_parent(repo, commit, parents)?,
        };

        if !parents.contains(&target) {
            return Err(AppError::new(ErrorCode::InvalidAbsorbTarget, "selected absorb target is not an octopus parent")
                .with_details(format!("{target} for commit {commit}")));
        }

        planned.push(AbsorbedCommit {
            commit: commit.clone(),
            target_parent: target,
        });
    }
    Ok(planned)
}

/// Maps a failed transaction step's name to the more specific of the two
/// taxonomy codes for an absorb failure.
fn absorb_failure_code(failed_step_name: &str) -> ErrorCode {
    if failed_step_name.starts_with("reset ") {
        ErrorCode::AbsorbResetFailed
    } else {
        ErrorCode::AbsorbCherryPickFailed
    }
}

/// `absorb` — `target_parent` pins an explicit destination
/// (must be one of the workspace's declared octopus parents); otherwise
/// `selection` governs interactive vs. heuristic assignment.
pub fn absorb_octopus_workspace(repo: &Repository, workspace: &Workspace, selection: TargetSelection) -> Result<AbsorbResult, AppError> {
    if workspace.kind != WorkspaceKind::Octopus {
        return Err(AppError::new(ErrorCode::InvalidWorkspaceKind, "absorb requires octopus workspace metadata").with_details(&workspace.branch));
    }
    if workspace.octopus_parents.len() < 2 {
        return Err(AppError::new(ErrorCode::InvalidOctopusParents, "octopus workspace must track at least two parent refs").with_details(&workspace.branch));
    }
    if let TargetSelection::Explicit(target) = &selection {
        if !workspace.octopus_parents.iter().any(|p| p == target) {
            return Err(AppError::new(ErrorCode::InvalidAbsorbTarget, "target parent is not part of the octopus workspace")
                .with_details(*target)
                .with_guidance("choose one of the configured octopus parent branches"));
        }
    }

    let before_oid = branch_head(repo, &workspace.branch)?;
    let unique_commits = octopus_unique_commits(repo, &workspace.branch, &workspace.octopus_parents)?;
    let (merge_commit, post_merge_commits) = split_octopus_history(repo, unique_commits)?;

    if post_merge_commits.is_empty() {
        return Ok(AbsorbResult {
            branch: workspace.branch.clone(),
            before_oid: before_oid.clone(),
            after_oid: before_oid,
            absorbed_commits: Vec::new(),
        });
    }

    let planned = plan_absorb_targets(repo, &post_merge_commits, &workspace.octopus_parents, &selection)?;

    let original_branch = repo
        .current_branch()
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to read current branch").with_details(e.details()))?;

    let mut txn = Transaction::new();
    let mut backups: BTreeMap<String, BackupRef> = BTreeMap::new();

    for item in &planned {
        if !backups.contains_key(&item.target_parent) {
            let backup = BackupRef::snapshot(repo, &txn.txn_id, &item.target_parent)
                .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to snapshot absorb target branch before rebuild").with_details(e.to_string()))?;
            backups.insert(item.target_parent.clone(), backup);
        }
    }
    if merge_commit.is_some() && !backups.contains_key(&workspace.branch) {
        let backup = BackupRef::snapshot(repo, &txn.txn_id, &workspace.branch)
            .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to snapshot workspace branch before rebuild").with_details(e.to_string()))?;
        backups.insert(workspace.branch.clone(), backup);
    }

    for item in &planned {
        let repo = repo.clone();
        let target = item.target_parent.clone();
        let commit = item.commit.clone();
        let rollback_repo = repo.clone();
        let rollback_backup = backups[&item.target_parent].clone();

        txn.add_step(
            Step::new(
                format!("cherry-pick {commit} onto {target}"),
                move || {
                    repo.checkout(&target)?;
                    repo.cherry_pick(&commit)?;
                    Ok(())
                },
                move || rollback_backup.restore(&rollback_repo),
            )
            .with_recovery_commands([backups[&item.target_parent].recovery_command()]),
        );
    }

    if let Some(merge_commit) = merge_commit.clone() {
        let repo = repo.clone();
        let branch = workspace.branch.clone();
        let rollback_repo = repo.clone();
        let rollback_backup = backups[&workspace.branch].clone();

        txn.add_step(
            Step::new(
                format!("reset {branch} to {merge_commit}"),
                move || {
                    repo.checkout(&branch)?;
                    repo.reset_hard(&merge_commit)?;
                    Ok(())
                },
                move || rollback_backup.restore(&rollback_repo),
            )
            .with_recovery_commands([backups[&workspace.branch].recovery_command()]),
        );
    }

    let txn_id = txn.txn_id.clone();
    let run_result = txn.run();

    if let Some(original_branch) = &original_branch {
        let current = repo.current_branch().ok().flatten();
        if current.as_deref() != Some(original_branch.as_str()) {
            let _ = repo.checkout(original_branch);
        }
    }

    match run_result {
        Ok(()) => {
            purge_txn_namespace(repo, &txn_id);
        }
        Err(TransactionError::Execution(e)) => {
            purge_txn_namespace(repo, &txn_id);
            let code = absorb_failure_code(&e.failed_step_name);
            return Err(AppError::new(code, "failed to absorb post-merge commits").with_details(e.to_string()));
        }
        Err(TransactionError::Rollback(e)) => {
            let code = absorb_failure_code(&e.failed_step_name);
            return Err(AppError::new(code, "failed to absorb post-merge commits and rollback was partial").with_details(e.format_partial_state()));
        }
    }

    let after_oid = branch_head(repo, &workspace.branch)?;
    Ok(AbsorbResult {
        branch: workspace.branch.clone(),
        before_oid,
        after_oid,
        absorbed_commits: planned,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn sample_workspace(kind: WorkspaceKind, parents: Vec<String>) -> Workspace {
        Workspace {
            branch: "integration/ws".to_string(),
            worktree_path: std::path::PathBuf::from("/tmp/ws"),
            tracked_remote: None,
            kind,
            base_ref: parents.first().cloned().unwrap_or_default(),
            octopus_parents: parents,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_standard_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path());
        let ws = sample_workspace(WorkspaceKind::Standard, Vec::new());
        let err = absorb_octopus_workspace(&repo, &ws, TargetSelection::Heuristic).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidWorkspaceKind);
    }

    #[test]
    fn rejects_explicit_target_not_in_parents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path());
        let ws = sample_workspace(WorkspaceKind::Octopus, vec!["main".to_string(), "release".to_string()]);
        let err = absorb_octopus_workspace(&repo, &ws, TargetSelection::Explicit("hotfix")).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidAbsorbTarget);
    }

    #[test]
    fn rejects_fewer_than_two_octopus_parents() {
        let dir = tempfile::tempdir().unwrap();
        let repo = Repository::at(dir.path());
        let ws = sample_workspace(WorkspaceKind::Octopus, vec!["main".to_string()]);
        let err = absorb_octopus_workspace(&repo, &ws, TargetSelection::Heuristic).unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidOctopusParents);
    }

    fn git(dir: &std::path::Path, args: &[&str]) {
        let status = std::process::Command::new("git").args(args).current_dir(dir).status().unwrap();
        assert!(status.success(), "git {args:?} failed");
    }

    fn init_repo(dir: &std::path::Path) -> Repository {
        git(dir, &["init", "--initial-branch=main"]);
        git(dir, &["config", "user.email", "test@example.com"]);
        git(dir, &["config", "user.name", "Test"]);
        std::fs::write(dir.join("shared.txt"), "hello\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-m", "initial"]);
        Repository::at(dir)
    }

    /// Builds an octopus workspace `integration/ws` merging `main` and
    /// `release`, then adds one post-merge commit that only touches a file
    /// that exists on `release`'s tip — the case the heuristic should
    /// resolve unambiguously.
    fn build_octopus_with_post_merge_commit(dir: &std::path::Path) -> (Repository, String) {
        let repo = init_repo(dir);

        git(dir, &["checkout", "-b", "release"]);
        std::fs::write(dir.join("release.txt"), "from release\n").unwrap();
        git(dir, &["add", "."]);
        git(dir, &["commit", "-m", "release work"]);

        git(dir, &["checkout", "main"]);
        git(dir, &["checkout", "-b", "integration/ws"]);
        repo.merge_no_ff("Create octopus workspace integration/ws", &["release"]).unwrap();
        let merge_oid = repo.rev_parse("refs/heads/integration/ws").unwrap().unwrap();

        std::fs::write(dir.join("release.txt"), "from release, tweaked on integration\n").unwrap();
        git(dir, &["commit", "-am", "post-merge tweak that belongs on release"]);

        (repo, merge_oid)
    }

    #[test]
    fn heuristic_absorb_cherry_picks_post_merge_commit_onto_matching_parent_and_resets_workspace_branch() {
        let dir = tempfile::tempdir().unwrap();
        let (repo, merge_oid) = build_octopus_with_post_merge_commit(dir.path());
        let ws = sample_workspace(WorkspaceKind::Octopus, vec!["main".to_string(), "release".to_string()]);

        let result = absorb_octopus_workspace(&repo, &ws, TargetSelection::Heuristic).unwrap();

        assert!(result.changed());
        assert_eq!(result.after_oid, merge_oid);
        assert_eq!(result.absorbed_commits.len(), 1);
        assert_eq!(result.absorbed_commits[0].target_parent, "release");

        repo.checkout("release").unwrap();
        let on_release = std::fs::read_to_string(dir.path().join("release.txt")).unwrap();
        assert_eq!(on_release, "from release, tweaked on integration\n");

        assert!(repo.for_each_ref("refs/gitcuttle/").unwrap().is_empty());
    }

    #[test]
    fn absorb_is_a_noop_when_there_are_no_post_merge_commits() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());

        git(dir.path(), &["checkout", "-b", "release"]);
        std::fs::write(dir.path().join("release.txt"), "from release\n").unwrap();
        git(dir.path(), &["add", "."]);
        git(dir.path(), &["commit", "-m", "release work"]);

        git(dir.path(), &["checkout", "main"]);
        git(dir.path(), &["checkout", "-b", "integration/ws"]);
        repo.merge_no_ff("Create octopus workspace integration/ws", &["release"]).unwrap();

        let ws = sample_workspace(WorkspaceKind::Octopus, vec!["main".to_string(), "release".to_string()]);
        let result = absorb_octopus_workspace(&repo, &ws, TargetSelection::Heuristic).unwrap();

        assert!(!result.changed());
        assert!(result.absorbed_commits.is_empty());
    }
}
