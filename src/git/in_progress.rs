//! In-progress Git operation detection.
//!
//! Probes for marker files directly rather than parsing `git status`
//! output: it must not parse Git output, only the presence of files in
//! `.git`.

use std::path::Path;

/// The markers that indicate an in-progress Git operation, checked in this
/// order (first match wins) relative to the canonical `.git` directory.
const MARKERS: &[&str] = &[
    "MERGE_HEAD",
    "CHERRY_PICK_HEAD",
    "REVERT_HEAD",
    "REBASE_HEAD",
    "rebase-apply",
    "rebase-merge",
];

/// Returns the name of the first in-progress-operation marker found under
/// `git_dir`, or `None` if the repository is clean.
///
/// `git_dir` must already be the canonical `.git`/`gitdir` directory (a
/// worktree's `.git` file has already been resolved to its real `gitdir`
/// by the caller).
pub fn detect_in_progress(git_dir: &Path) -> Option<&'static str> {
    MARKERS.iter().copied().find(|marker| git_dir.join(marker).exists())
}
