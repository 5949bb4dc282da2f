//! The Path Deriver: turns a repository's canonical `.git`
//! directory plus a branch name into a deterministic worktree path under
//! the XDG data directory.
//!
//! Grounded directly on the reference `workspace_paths.py` implementation:
//! same slugify/hash/collision-suffix algorithm, same `repo-slug-hash8`
//! repo id shape, same sanitized-branch-dir shape.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use etcetera::base_strategy::{BaseStrategy, Xdg};
use regex::Regex;
use sha2::{Digest, Sha256};

/// Matches any run of characters outside `[A-Za-z0-9._-]`.
fn non_branch_chars() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^A-Za-z0-9._-]+").expect("static regex is valid"))
}

/// Root directory under which all workspace worktrees live:
/// `$XDG_DATA_HOME/gitcuttle`, falling back to `~/.local/share/gitcuttle`.
pub fn workspace_root_dir() -> PathBuf {
    let strategy = Xdg::new().expect("unable to determine home directory");
    strategy.data_dir().join("gitcuttle")
}

/// `repo-slug-<sha256(canonical_git_dir)[:8]>`.
pub fn derive_repo_id(canonical_git_dir: &Path) -> String {
    let parent_name = canonical_git_dir
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or("");
    let slug = slugify_repo_name(parent_name);
    let hash = &short_hash(canonical_git_dir.to_string_lossy().as_ref())[..8];
    format!("{slug}-{hash}")
}

/// Sanitizes a branch name to a filesystem-safe directory component:
/// any run of characters outside `[A-Za-z0-9._-]` becomes a single `-`,
/// leading/trailing `-._` are trimmed, and the result is lowercased.
/// Falls back to `"workspace"` if sanitization empties the string.
pub fn derive_branch_dir(branch: &str) -> String {
    let sanitized = non_branch_chars().replace_all(branch, "-");
    let trimmed = sanitized.trim_matches(|c: char| c == '-' || c == '.' || c == '_');
    let lowered = trimmed.to_lowercase();
    if lowered.is_empty() { "workspace".to_string() } else { lowered }
}

/// Full derived worktree path for `branch` in the repository identified by
/// `canonical_git_dir`. If `derive_branch_dir(branch)` collides with the
/// sanitized form of another branch in `sibling_branches`, a 6-character
/// stable hash suffix of `branch` disambiguates it.
pub fn derive_workspace_path(canonical_git_dir: &Path, branch: &str, sibling_branches: &[String]) -> PathBuf {
    let repo_id = derive_repo_id(canonical_git_dir);
    let mut branch_dir = derive_branch_dir(branch);

    if has_sanitized_collision(branch, sibling_branches) {
        let suffix = &short_hash(branch)[..6];
        branch_dir = format!("{branch_dir}-{suffix}");
    }

    workspace_root_dir().join(repo_id).join(branch_dir)
}

fn slugify_repo_name(repo_name: &str) -> String {
    let mut slug = String::with_capacity(repo_name.len());
    let mut last_was_dash = false;
    for c in repo_name.chars() {
        if c.is_ascii_alphanumeric() {
            slug.push(c);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    let trimmed = slug.trim_matches('-').to_lowercase();
    if trimmed.is_empty() { "repo".to_string() } else { trimmed }
}

fn has_sanitized_collision(branch: &str, sibling_branches: &[String]) -> bool {
    let branch_dir = derive_branch_dir(branch);
    sibling_branches
        .iter()
        .any(|sibling| sibling != branch && derive_branch_dir(sibling) == branch_dir)
}

fn short_hash(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    format!("{:x}", hasher.finalize())
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn branch_dir_is_deterministic(branch in ".{0,64}") {
            prop_assert_eq!(derive_branch_dir(&branch), derive_branch_dir(&branch));
        }

        #[test]
        fn branch_dir_is_always_filesystem_safe(branch in ".{0,64}") {
            let dir = derive_branch_dir(&branch);
            prop_assert!(!dir.is_empty());
            prop_assert!(dir.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '.' || c == '_' || c == '-'));
            prop_assert!(!dir.starts_with(['-', '.', '_']));
            prop_assert!(!dir.ends_with(['-', '.', '_']));
        }

        #[test]
        fn repo_id_is_deterministic_and_fixed_shape(name in "[ -~]{1,40}") {
            let git_dir = PathBuf::from(format!("/home/user/projects/{name}/.git"));
            let first = derive_repo_id(&git_dir);
            let second = derive_repo_id(&git_dir);
            prop_assert_eq!(&first, &second);
            prop_assert!(first.ends_with(&first[first.len() - 8..]));
            prop_assert_eq!(&first[first.len() - 8..], &first[first.len() - 8..].to_lowercase());
        }

        #[test]
        fn workspace_path_is_deterministic(branch in ".{1,32}") {
            let git_dir = PathBuf::from("/home/user/projects/my-repo/.git");
            let first = derive_workspace_path(&git_dir, &branch, &[]);
            let second = derive_workspace_path(&git_dir, &branch, &[]);
            prop_assert_eq!(first, second);
        }
    }
}
