//! Remote Status + PR Probe: ahead/behind counts against a
//! workspace's upstream, pull-request state probed through the `gh` CLI,
//! and a TTL cache over the ahead/behind computation.
//!
//! Grounded on `remote_status.py`: same upstream-ref derivation, same
//! `rev-list --left-right --count` ahead/behind algorithm, same GitHub
//! slug parsing and `gh pr list` JSON mapping.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::git::Repository;
use crate::metadata::{Repo, Workspace};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteStatus {
    pub branch: String,
    pub upstream_ref: Option<String>,
    pub ahead: Option<u64>,
    pub behind: Option<u64>,
}

impl RemoteStatus {
    fn unknown(branch: &str, upstream_ref: Option<String>) -> Self {
        Self {
            branch: branch.to_string(),
            upstream_ref,
            ahead: None,
            behind: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum PrState {
    Open,
    Closed,
    Merged,
    Unknown,
    Unavailable,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequestStatus {
    pub branch: String,
    pub upstream_ref: Option<String>,
    pub state: PrState,
    pub title: Option<String>,
    pub url: Option<String>,
}

impl PullRequestStatus {
    fn with_state(branch: &str, upstream_ref: Option<String>, state: PrState) -> Self {
        Self {
            branch: branch.to_string(),
            upstream_ref,
            state,
            title: None,
            url: None,
        }
    }
}

/// `<trackedRemote or repo.defaultRemote>/<branch>`, or `None` if neither
/// is configured.
pub fn workspace_upstream_ref(workspace: &Workspace, default_remote: Option<&str>) -> Option<String> {
    let remote = workspace.tracked_remote.as_deref().or(default_remote)?;
    Some(format!("{remote}/{}", workspace.branch))
}

pub fn remote_status_for_workspace(repo: &Repository, workspace: &Workspace, default_remote: Option<&str>) -> RemoteStatus {
    let upstream_ref = workspace_upstream_ref(workspace, default_remote);
    let Some(upstream_ref) = upstream_ref else {
        return RemoteStatus::unknown(&workspace.branch, None);
    };

    let local_ref = format!("refs/heads/{}", workspace.branch);
    let remote_ref = format!("refs/remotes/{upstream_ref}");
    if !repo.show_ref(&local_ref) || !repo.show_ref(&remote_ref) {
        return RemoteStatus::unknown(&workspace.branch, Some(upstream_ref));
    }

    match repo.ahead_behind_counts(&workspace.branch, &upstream_ref) {
        Some((ahead, behind)) => RemoteStatus {
            branch: workspace.branch.clone(),
            upstream_ref: Some(upstream_ref),
            ahead: Some(ahead),
            behind: Some(behind),
        },
        None => RemoteStatus::unknown(&workspace.branch, Some(upstream_ref)),
    }
}

pub fn remote_statuses_for_repo(repo_dir: &Repository, repo: &Repo) -> BTreeMap<String, RemoteStatus> {
    repo.workspaces
        .values()
        .map(|ws| (ws.branch.clone(), remote_status_for_workspace(repo_dir, ws, repo.default_remote.as_deref())))
        .collect()
}

/// Parses a GitHub `owner/repo` slug out of either SSH (`git@github.com:…`,
/// `ssh://git@github.com/…`) or HTTPS (`https://github.com/…`) remote URLs.
/// Any URL not resolving to exactly two non-empty path segments on
/// `github.com` returns `None`.
pub fn github_repo_slug_from_url(remote_url: &str) -> Option<String> {
    let trimmed = remote_url.trim();
    if trimmed.is_empty() {
        return None;
    }
    let normalized = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let path = if let Some(rest) = normalized.strip_prefix("git@github.com:") {
        rest
    } else if let Some(rest) = normalized.strip_prefix("ssh://git@github.com/") {
        rest
    } else if let Some(rest) = normalized.strip_prefix("https://github.com/") {
        rest
    } else if let Some(rest) = normalized.strip_prefix("http://github.com/") {
        rest
    } else {
        return None;
    };

    slug_from_path(path)
}

fn slug_from_path(path: &str) -> Option<String> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.len() != 2 {
        return None;
    }
    Some(format!("{}/{}", parts[0], parts[1]))
}

#[derive(Debug, Deserialize)]
struct GhPullRequest {
    state: String,
    title: Option<String>,
    url: Option<String>,
}

fn map_gh_state(state: &str) -> PrState {
    match state {
        "OPEN" => PrState::Open,
        "CLOSED" => PrState::Closed,
        "MERGED" => PrState::Merged,
        _ => PrState::Unknown,
    }
}

/// Invokes `gh pr list --repo <slug> --head <branch> --state all --json
/// state,title,url --limit 1` and maps its result into a [`PrState`].
fn pull_request_status_from_gh(repo: &Repository, branch: &str, upstream_ref: Option<String>, repo_slug: &str) -> PullRequestStatus {
    let output = std::process::Command::new("gh")
        .args([
            "pr", "list", "--repo", repo_slug, "--head", branch, "--state", "all", "--json", "state,title,url", "--limit", "1",
        ])
        .current_dir(repo.path())
        .output();

    let Ok(output) = output else {
        return PullRequestStatus::with_state(branch, upstream_ref, PrState::Unavailable);
    };
    if !output.status.success() {
        return PullRequestStatus::with_state(branch, upstream_ref, PrState::Unavailable);
    }

    let Ok(parsed) = serde_json::from_slice::<Vec<GhPullRequest>>(&output.stdout) else {
        return PullRequestStatus::with_state(branch, upstream_ref, PrState::Unavailable);
    };

    let Some(first) = parsed.into_iter().next() else {
        return PullRequestStatus::with_state(branch, upstream_ref, PrState::Unknown);
    };

    PullRequestStatus {
        branch: branch.to_string(),
        upstream_ref,
        state: map_gh_state(&first.state),
        title: first.title,
        url: first.url,
    }
}

pub fn pull_request_status_for_workspace(repo: &Repository, workspace: &Workspace, default_remote: Option<&str>) -> PullRequestStatus {
    let upstream_ref = workspace_upstream_ref(workspace, default_remote);
    let Some(upstream_ref) = upstream_ref else {
        return PullRequestStatus::with_state(&workspace.branch, None, PrState::Unknown);
    };

    let remote_name = workspace.tracked_remote.as_deref().or(default_remote);
    let Some(remote_name) = remote_name else {
        return PullRequestStatus::with_state(&workspace.branch, Some(upstream_ref), PrState::Unknown);
    };

    let Ok(remote_url) = repo.remote_url(remote_name) else {
        return PullRequestStatus::with_state(&workspace.branch, Some(upstream_ref), PrState::Unavailable);
    };

    let Some(repo_slug) = github_repo_slug_from_url(&remote_url) else {
        return PullRequestStatus::with_state(&workspace.branch, Some(upstream_ref), PrState::Unavailable);
    };

    pull_request_status_from_gh(repo, &workspace.branch, Some(upstream_ref), &repo_slug)
}

/// Clock abstraction injectable for tests.
pub type ClockFn = Box<dyn Fn() -> Instant>;
pub type ResolverFn = Box<dyn Fn(&Repository, &Repo) -> BTreeMap<String, RemoteStatus>>;

struct CacheEntry {
    fetched_at: Instant,
    statuses: BTreeMap<String, RemoteStatus>,
}

/// Process-scoped cache keyed by canonical `gitDir`, storing ahead/behind
/// results for `ttl` before they are recomputed.
pub struct RemoteStatusCache {
    ttl: Duration,
    clock: ClockFn,
    entries: std::cell::RefCell<BTreeMap<String, CacheEntry>>,
}

impl RemoteStatusCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_clock(ttl, Box::new(Instant::now))
    }

    pub fn with_clock(ttl: Duration, clock: ClockFn) -> Self {
        Self {
            ttl,
            clock,
            entries: std::cell::RefCell::new(BTreeMap::new()),
        }
    }

    /// Returns the cached statuses for `repo` if fetched within `ttl`,
    /// otherwise invokes `resolver` and caches the fresh result.
    pub fn statuses_for_repo(&self, git_repo: &Repository, repo: &Repo, resolver: &ResolverFn) -> BTreeMap<String, RemoteStatus> {
        let key = repo.git_dir.to_string_lossy().into_owned();
        let now = (self.clock)();

        if let Some(entry) = self.entries.borrow().get(&key) {
            if now.duration_since(entry.fetched_at) < self.ttl {
                return entry.statuses.clone();
            }
        }

        let statuses = resolver(git_repo, repo);
        self.entries.borrow_mut().insert(
            key,
            CacheEntry {
                fetched_at: now,
                statuses: statuses.clone(),
            },
        );
        statuses
    }
}

impl Default for RemoteStatusCache {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rstest::rstest;
    use std::cell::Cell;
    use std::rc::Rc;

    fn sample_workspace(branch: &str, tracked_remote: Option<&str>) -> Workspace {
        Workspace {
            branch: branch.to_string(),
            worktree_path: std::path::PathBuf::from("/tmp/ws"),
            tracked_remote: tracked_remote.map(str::to_string),
            kind: crate::metadata::WorkspaceKind::Standard,
            base_ref: "main".to_string(),
            octopus_parents: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn upstream_ref_prefers_tracked_remote_over_default() {
        let ws = sample_workspace("feature/x", Some("fork"));
        assert_eq!(workspace_upstream_ref(&ws, Some("origin")), Some("fork/feature/x".to_string()));
    }

    #[test]
    fn upstream_ref_falls_back_to_default_remote() {
        let ws = sample_workspace("feature/x", None);
        assert_eq!(workspace_upstream_ref(&ws, Some("origin")), Some("origin/feature/x".to_string()));
    }

    #[test]
    fn upstream_ref_is_none_without_any_remote() {
        let ws = sample_workspace("feature/x", None);
        assert_eq!(workspace_upstream_ref(&ws, None), None);
    }

    #[rstest]
    #[case::ssh_form("git@github.com:owner/repo.git", Some("owner/repo"))]
    #[case::https_form("https://github.com/owner/repo", Some("owner/repo"))]
    #[case::non_github_host("https://gitlab.com/owner/repo", None)]
    #[case::extra_path_segment("https://github.com/owner/repo/extra", None)]
    #[case::missing_repo_segment("https://github.com/owner", None)]
    fn github_slug_parsing(#[case] remote_url: &str, #[case] expected: Option<&str>) {
        assert_eq!(github_repo_slug_from_url(remote_url), expected.map(str::to_string));
    }

    #[test]
    fn cache_reuses_result_within_ttl_and_calls_resolver_once() {
        let call_count = Rc::new(Cell::new(0));
        let counted = call_count.clone();
        let clock_time = Rc::new(Cell::new(Instant::now()));
        let clock_for_cache = clock_time.clone();

        let cache = RemoteStatusCache::with_clock(Duration::from_secs(60), Box::new(move || clock_for_cache.get()));
        let resolver: ResolverFn = Box::new(move |_repo, _meta| {
            counted.set(counted.get() + 1);
            BTreeMap::new()
        });

        let repo = Repo {
            git_dir: std::path::PathBuf::from("/home/user/project/.git"),
            repo_root: std::path::PathBuf::from("/home/user/project"),
            default_remote: None,
            tracked_at: Utc::now(),
            updated_at: Utc::now(),
            workspaces: BTreeMap::new(),
        };
        let git_repo = Repository::at("/home/user/project");

        cache.statuses_for_repo(&git_repo, &repo, &resolver);
        cache.statuses_for_repo(&git_repo, &repo, &resolver);
        assert_eq!(call_count.get(), 1);

        clock_time.set(clock_time.get() + Duration::from_secs(61));
        cache.statuses_for_repo(&git_repo, &repo, &resolver);
        assert_eq!(call_count.get(), 2);
    }
}
