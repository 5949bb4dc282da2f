//! `BackupRef`: snapshots a branch's pre-transaction OID
//! under `refs/gitcuttle/txn/<txnId>/heads/<branch>` so a transaction step
//! that rewrites a branch's head can restore it on rollback, and so the
//! transaction can leave nothing behind on success.

use crate::git::Repository;

#[derive(Debug, Clone)]
pub struct BackupRef {
    pub branch: String,
    pub refname: String,
    pub oid: String,
}

impl BackupRef {
    /// Snapshots `branch`'s current OID into `refs/gitcuttle/txn/<txn_id>/heads/<branch>`.
    pub fn snapshot(repo: &Repository, txn_id: &str, branch: &str) -> anyhow::Result<Self> {
        let oid = repo
            .rev_parse(&format!("refs/heads/{branch}"))?
            .ok_or_else(|| anyhow::anyhow!("branch '{branch}' does not exist locally"))?;
        let refname = format!("refs/gitcuttle/txn/{txn_id}/heads/{branch}");
        repo.update_ref(&refname, &oid)?;
        Ok(Self {
            branch: branch.to_string(),
            refname,
            oid,
        })
    }

    /// Resets `refs/heads/<branch>` back to the snapshotted OID.
    pub fn restore(&self, repo: &Repository) -> anyhow::Result<()> {
        repo.update_ref(&format!("refs/heads/{}", self.branch), &self.oid)?;
        Ok(())
    }

    /// Removes this backup ref. Called once a transaction no longer needs it
    /// (on success, or after a completed rollback).
    pub fn cleanup(&self, repo: &Repository) -> anyhow::Result<()> {
        repo.delete_ref(&self.refname)?;
        Ok(())
    }

    /// The `git update-ref` invocation a user could run by hand if
    /// automated rollback itself fails (surfaced via
    /// [`crate::transaction::RollbackError::recovery_commands`]).
    pub fn recovery_command(&self) -> String {
        format!("git update-ref refs/heads/{} {}", self.branch, self.oid)
    }
}

/// Deletes every ref under `refs/gitcuttle/txn/<txn_id>/`, best-effort.
/// Called once a transaction has either fully succeeded or fully rolled
/// back, so its backup namespace never lingers.
pub fn purge_txn_namespace(repo: &Repository, txn_id: &str) {
    let prefix = format!("refs/gitcuttle/txn/{txn_id}/");
    if let Ok(refs) = repo.for_each_ref(&prefix) {
        for reference in refs {
            let _ = repo.delete_ref(&reference);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_repo(dir: &std::path::Path) -> Repository {
        std::process::Command::new("git").args(["init", "--initial-branch=main"]).current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["config", "user.email", "test@example.com"]).current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["config", "user.name", "Test"]).current_dir(dir).output().unwrap();
        std::fs::write(dir.join("README.md"), "hello\n").unwrap();
        std::process::Command::new("git").args(["add", "."]).current_dir(dir).output().unwrap();
        std::process::Command::new("git").args(["commit", "-m", "initial"]).current_dir(dir).output().unwrap();
        Repository::at(dir)
    }

    #[test]
    fn snapshot_then_restore_resets_branch_to_backed_up_oid() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let original_oid = repo.rev_parse("refs/heads/main").unwrap().unwrap();

        let backup = BackupRef::snapshot(&repo, "testtxn", "main").unwrap();
        assert_eq!(backup.oid, original_oid);

        std::fs::write(dir.path().join("README.md"), "changed\n").unwrap();
        std::process::Command::new("git").args(["commit", "-am", "second"]).current_dir(dir.path()).output().unwrap();
        assert_ne!(repo.rev_parse("refs/heads/main").unwrap().unwrap(), original_oid);

        backup.restore(&repo).unwrap();
        assert_eq!(repo.rev_parse("refs/heads/main").unwrap().unwrap(), original_oid);
    }

    #[test]
    fn purge_removes_every_ref_under_the_txn_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let backup = BackupRef::snapshot(&repo, "testtxn", "main").unwrap();
        assert!(repo.show_ref(&backup.refname));

        purge_txn_namespace(&repo, "testtxn");
        assert!(!repo.show_ref(&backup.refname));
    }

    #[test]
    fn cleanup_removes_only_its_own_ref() {
        let dir = tempfile::tempdir().unwrap();
        let repo = init_repo(dir.path());
        let backup = BackupRef::snapshot(&repo, "testtxn", "main").unwrap();
        backup.cleanup(&repo).unwrap();
        assert!(!repo.show_ref(&backup.refname));
    }
}
