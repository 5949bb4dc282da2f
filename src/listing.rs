//! Listing/Status Views: the `list`/`status` table renderer.
//!
//! Grounded directly on `list_output.py`'s `rows_for_repo` /
//! `render_workspace_table`: same header set, same unknown marker, same
//! left-justified max-width column layout.

use std::collections::BTreeMap;

use crate::metadata::Repo;
use crate::remote_status::{PullRequestStatus, RemoteStatus};

const UNKNOWN_MARKER: &str = "?";
const TABLE_HEADERS: [&str; 8] = ["BRANCH", "KIND", "BASE", "UPSTREAM", "AHEAD", "BEHIND", "PR", "WORKTREE"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListWorkspaceRow {
    pub branch: String,
    pub kind: String,
    pub base_ref: String,
    pub upstream_ref: String,
    pub ahead: String,
    pub behind: String,
    pub pull_request: String,
    pub worktree_path: String,
}

impl ListWorkspaceRow {
    fn values(&self) -> [&str; 8] {
        [
            &self.branch,
            &self.kind,
            &self.base_ref,
            &self.upstream_ref,
            &self.ahead,
            &self.behind,
            &self.pull_request,
            &self.worktree_path,
        ]
    }
}

fn remote_upstream(remote: Option<&RemoteStatus>) -> String {
    match remote.and_then(|r| r.upstream_ref.as_deref()) {
        Some(upstream) => upstream.to_string(),
        None => UNKNOWN_MARKER.to_string(),
    }
}

fn remote_count(value: Option<u64>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => UNKNOWN_MARKER.to_string(),
    }
}

fn pull_request_marker(pr: Option<&PullRequestStatus>) -> String {
    match pr {
        Some(pr) => pr.state.to_string(),
        None => UNKNOWN_MARKER.to_string(),
    }
}

/// One row per workspace, sorted by branch; missing remote/PR data
/// renders as `UNKNOWN_MARKER`.
pub fn rows_for_repo(repo: &Repo, remote_statuses: &BTreeMap<String, RemoteStatus>, pr_statuses: &BTreeMap<String, PullRequestStatus>) -> Vec<ListWorkspaceRow> {
    repo.workspaces
        .iter()
        .map(|(branch, workspace)| {
            let remote = remote_statuses.get(branch);
            let pr = pr_statuses.get(branch);
            ListWorkspaceRow {
                branch: workspace.branch.clone(),
                kind: workspace.kind.to_string(),
                base_ref: workspace.base_ref.clone(),
                upstream_ref: remote_upstream(remote),
                ahead: remote_count(remote.and_then(|r| r.ahead)),
                behind: remote_count(remote.and_then(|r| r.behind)),
                pull_request: pull_request_marker(pr),
                worktree_path: workspace.worktree_path.display().to_string(),
            }
        })
        .collect()
}

fn format_row(values: &[&str], widths: &[usize]) -> String {
    values.iter().zip(widths).map(|(v, w)| format!("{v:<w$}")).collect::<Vec<_>>().join("  ")
}

/// Renders the workspace table, or `(no tracked workspaces)` when `rows`
/// is empty.
pub fn render_workspace_table(rows: &[ListWorkspaceRow]) -> String {
    if rows.is_empty() {
        return "(no tracked workspaces)".to_string();
    }

    let mut widths: Vec<usize> = TABLE_HEADERS.iter().map(|h| h.len()).collect();
    for row in rows {
        for (index, value) in row.values().iter().enumerate() {
            widths[index] = widths[index].max(value.len());
        }
    }

    let mut lines = vec![format_row(&TABLE_HEADERS, &widths)];
    for row in rows {
        lines.push(format_row(&row.values(), &widths));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::{Workspace, WorkspaceKind};
    use chrono::Utc;

    fn sample_row(branch: &str) -> ListWorkspaceRow {
        ListWorkspaceRow {
            branch: branch.to_string(),
            kind: "standard".to_string(),
            base_ref: "main".to_string(),
            upstream_ref: UNKNOWN_MARKER.to_string(),
            ahead: UNKNOWN_MARKER.to_string(),
            behind: UNKNOWN_MARKER.to_string(),
            pull_request: UNKNOWN_MARKER.to_string(),
            worktree_path: "/tmp/ws".to_string(),
        }
    }

    #[test]
    fn empty_repo_renders_no_tracked_workspaces() {
        assert_eq!(render_workspace_table(&[]), "(no tracked workspaces)");
    }

    #[test]
    fn table_has_header_and_row_with_consistent_widths() {
        let rendered = render_workspace_table(&[sample_row("feature/x")]);
        let lines: Vec<&str> = rendered.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("BRANCH"));
        assert!(lines[1].starts_with("feature/x"));
    }

    #[test]
    fn rows_for_repo_fills_unknown_marker_when_no_remote_status() {
        let mut repo = Repo {
            git_dir: std::path::PathBuf::from("/home/user/project/.git"),
            repo_root: std::path::PathBuf::from("/home/user/project"),
            default_remote: None,
            tracked_at: Utc::now(),
            updated_at: Utc::now(),
            workspaces: std::collections::BTreeMap::new(),
        };
        repo.workspaces.insert(
            "feature/x".to_string(),
            Workspace {
                branch: "feature/x".to_string(),
                worktree_path: std::path::PathBuf::from("/tmp/ws"),
                tracked_remote: None,
                kind: WorkspaceKind::Standard,
                base_ref: "main".to_string(),
                octopus_parents: Vec::new(),
                created_at: Utc::now(),
                updated_at: Utc::now(),
            },
        );
        let rows = rows_for_repo(&repo, &BTreeMap::new(), &BTreeMap::new());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].upstream_ref, UNKNOWN_MARKER);
        assert_eq!(rows[0].ahead, UNKNOWN_MARKER);
        assert_eq!(rows[0].pull_request, UNKNOWN_MARKER);
    }
}
