//! Remote-branch enumeration.
//!
//! Reads `refs/remotes` and selects refs whose *second path component
//! onward* equals the requested branch, ignoring `HEAD` pseudo-refs and
//! tolerating remote names that themselves contain `/`.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteBranchMatch {
    pub remote: String,
    pub full_ref: String,
}

/// `all_refs` is the set of fully-qualified ref names under `refs/remotes/…`
/// (as returned by `git for-each-ref refs/remotes`). Returns every
/// `(remote, ref)` decomposition whose branch-path component equals
/// `branch`, sorted by remote name for determinism.
///
/// A ref's remote name is not assumed to be a single path segment: for
/// `refs/remotes/a/b/feature/x` with `branch = "feature/x"`, the remote is
/// `a/b`. Every split point is tried; pseudo-refs whose final path segment
/// is `HEAD` are always excluded.
pub fn enumerate_remote_branch_refs(all_refs: &[String], branch: &str) -> Vec<RemoteBranchMatch> {
    let mut matches = Vec::new();
    for full_ref in all_refs {
        let Some(suffix) = full_ref.strip_prefix("refs/remotes/") else {
            continue;
        };
        let parts: Vec<&str> = suffix.split('/').collect();
        if parts.last() == Some(&"HEAD") {
            continue;
        }
        for split in 1..parts.len() {
            let remote = parts[..split].join("/");
            let candidate_branch = parts[split..].join("/");
            if candidate_branch == branch {
                matches.push(RemoteBranchMatch {
                    remote,
                    full_ref: full_ref.clone(),
                });
            }
        }
    }
    matches.sort_by(|a, b| a.remote.cmp(&b.remote));
    matches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_simple_remote() {
        let refs = vec![
            "refs/remotes/origin/feature/x".to_string(),
            "refs/remotes/origin/HEAD".to_string(),
        ];
        let matches = enumerate_remote_branch_refs(&refs, "feature/x");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].remote, "origin");
        assert_eq!(matches[0].full_ref, "refs/remotes/origin/feature/x");
    }

    #[test]
    fn ignores_head_pseudo_ref() {
        let refs = vec!["refs/remotes/origin/HEAD".to_string()];
        assert!(enumerate_remote_branch_refs(&refs, "HEAD").is_empty());
    }

    #[test]
    fn tolerates_slash_containing_remote_names() {
        let refs = vec!["refs/remotes/fork/nested/main".to_string()];
        let matches = enumerate_remote_branch_refs(&refs, "main");
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].remote, "fork/nested");
    }

    #[test]
    fn no_match_returns_empty() {
        let refs = vec!["refs/remotes/origin/other".to_string()];
        assert!(enumerate_remote_branch_refs(&refs, "feature/x").is_empty());
    }
}
