//! `gitcuttle diag`: a read-only diagnostic snapshot for pasting into a
//! bug report. This is supplemental ambient tooling, not a workspace
//! lifecycle operation, so it is exempt from the Orchestrator's tracking
//! gate.

use crate::git::Repository;
use crate::metadata::MetadataStore;

const LOG_TAIL_LINES: usize = 80;

/// Collects the metadata file contents, `git worktree list --porcelain`
/// for the current repo, and the tail of the verbose log (if one was
/// written this run) into a single markdown block.
pub fn build_report(repo: &Repository, store: &MetadataStore) -> String {
    let mut sections = vec!["# gitcuttle diagnostic report".to_string()];

    sections.push(format!("## metadata file\n\npath: `{}`\n", store.path().display()));
    match std::fs::read_to_string(store.path()) {
        Ok(contents) => sections.push(format!("```json\n{}\n```", contents.trim_end())),
        Err(_) => sections.push("_(metadata file does not exist yet)_".to_string()),
    }

    sections.push("## git worktree list --porcelain".to_string());
    match repo.run(&["worktree", "list", "--porcelain"]) {
        Ok(output) => sections.push(format!("```\n{output}\n```")),
        Err(e) => sections.push(format!("_(failed to run: {})_", e.details())),
    }

    sections.push("## verbose log (tail)".to_string());
    match crate::verbose_log::log_file_path().and_then(|path| std::fs::read_to_string(path).ok()) {
        Some(contents) => {
            let tail: Vec<&str> = contents.lines().rev().take(LOG_TAIL_LINES).collect();
            let tail: Vec<&str> = tail.into_iter().rev().collect();
            sections.push(format!("```\n{}\n```", tail.join("\n")));
        }
        None => sections.push("_(rerun with `-v` to capture a verbose log)_".to_string()),
    }

    sections.join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_without_metadata_file_notes_its_absence() {
        let dir = tempfile::tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("workspaces.json"));
        let repo = Repository::at(dir.path());
        let report = build_report(&repo, &store);
        assert!(report.contains("metadata file does not exist yet"));
        assert!(report.contains("rerun with `-v`"));
    }
}
