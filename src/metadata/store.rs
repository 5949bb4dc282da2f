//! The Metadata Store: atomic, validated reads and writes of
//! the single on-disk `MetadataFile`.
//!
//! Atomic write pattern (temp file in the same directory, fsync, rename,
//! directory fsync) is grounded on `MergeState::write_atomic` in the
//! `bobisme-maw` sibling repo; this store additionally uses a uuid-suffixed
//! temp name so concurrent writers never collide, and fsyncs the
//! containing directory where the platform supports it.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{AppError, ErrorCode};
use crate::git::Repository;

use super::migration::migrate_to_current;
use super::schema::{MetadataFile, Repo};

/// `$XDG_DATA_HOME/gitcuttle/workspaces.json`, honoring the
/// `GITCUTTLE_METADATA_PATH` test/override hook.
pub fn default_metadata_path() -> PathBuf {
    if let Ok(overridden) = std::env::var("GITCUTTLE_METADATA_PATH") {
        return PathBuf::from(overridden);
    }
    crate::path::workspace_root_dir().join("workspaces.json")
}

pub struct MetadataStore {
    path: PathBuf,
}

impl MetadataStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn at_default_path() -> Self {
        Self::new(default_metadata_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the metadata file, migrating it in place if its `version` is
    /// older than [`super::schema::SCHEMA_VERSION`]. A missing file is an
    /// empty index, not an error.
    pub fn read(&self) -> Result<MetadataFile, AppError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(MetadataFile::empty());
            }
            Err(e) => {
                return Err(AppError::new(
                    ErrorCode::SchemaInvalid,
                    format!("failed to read metadata file at {}", self.path.display()),
                )
                .with_details(e.to_string()));
            }
        };

        let migrated = migrate_to_current(&raw, &self.path)?;
        let metadata: MetadataFile = serde_json::from_str(&migrated).map_err(|e| {
            AppError::new(ErrorCode::SchemaInvalid, "metadata file is not valid JSON").with_details(e.to_string())
        })?;
        metadata.validate()?;
        Ok(metadata)
    }

    /// Serializes `metadata` and atomically replaces the on-disk file.
    pub fn write(&self, metadata: &MetadataFile) -> Result<(), AppError> {
        metadata.validate()?;

        let dir = self.path.parent().ok_or_else(|| {
            AppError::new(ErrorCode::SchemaInvalid, format!("metadata path has no parent directory: {}", self.path.display()))
        })?;
        fs::create_dir_all(dir).map_err(|e| io_error(&self.path, e))?;

        let json = serde_json::to_string_pretty(metadata)
            .map_err(|e| AppError::new(ErrorCode::SchemaInvalid, "failed to serialize metadata").with_details(e.to_string()))?;

        let tmp_name = format!(".workspaces.{}.tmp", uuid::Uuid::new_v4().simple());
        let tmp_path = dir.join(&tmp_name);

        let write_result = (|| -> std::io::Result<()> {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
            Ok(())
        })();

        if let Err(e) = write_result {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(&tmp_path, e));
        }

        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(io_error(&self.path, e));
        }

        fsync_dir(dir);
        Ok(())
    }

    /// Idempotent: inserts a new `Repo` (preserving `tracked_at` if one
    /// already exists for this `gitDir`) with `updated_at = now` and
    /// persists. Non-mutating commands must never call this.
    pub fn ensure_repo_tracked(&self, repo: &Repository, now: DateTime<Utc>) -> Result<MetadataFile, AppError> {
        let git_dir = repo
            .canonical_git_dir()
            .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to resolve git directory").with_details(e.to_string()))?;
        let repo_root = repo
            .repo_root()
            .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to resolve repository root").with_details(e.to_string()))?;
        let default_remote = resolve_default_remote(repo)?;

        let mut metadata = self.read()?;
        let key = git_dir.to_string_lossy().into_owned();

        let tracked_at = metadata.repos.get(&key).map(|r| r.tracked_at).unwrap_or(now);
        let workspaces = metadata.repos.get(&key).map(|r| r.workspaces.clone()).unwrap_or_default();

        metadata.repos.insert(
            key,
            Repo {
                git_dir,
                repo_root,
                default_remote,
                tracked_at,
                updated_at: now,
                workspaces,
            },
        );

        self.write(&metadata)?;
        Ok(metadata)
    }
}

/// Prefers `origin`; else the lexicographically smallest remote; else
/// `None`.
fn resolve_default_remote(repo: &Repository) -> Result<Option<String>, AppError> {
    let mut remotes = repo
        .remotes()
        .map_err(|e| AppError::new(ErrorCode::GitStateReadFailed, "failed to list remotes").with_details(e.to_string()))?;
    if remotes.iter().any(|r| r == "origin") {
        return Ok(Some("origin".to_string()));
    }
    remotes.sort();
    Ok(remotes.into_iter().next())
}

fn io_error(path: &Path, e: std::io::Error) -> AppError {
    AppError::new(ErrorCode::SchemaInvalid, format!("metadata I/O failure at {}", path.display())).with_details(e.to_string())
}

#[cfg(unix)]
fn fsync_dir(dir: &Path) {
    if let Ok(file) = fs::File::open(dir) {
        let _ = file.sync_all();
    }
}

#[cfg(not(unix))]
fn fsync_dir(_dir: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_reads_as_empty_index() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("workspaces.json"));
        let metadata = store.read().unwrap();
        assert_eq!(metadata.version, super::super::schema::SCHEMA_VERSION);
        assert!(metadata.repos.is_empty());
    }

    #[test]
    fn write_then_read_round_trips() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("workspaces.json"));
        let metadata = MetadataFile::empty();
        store.write(&metadata).unwrap();
        let read_back = store.read().unwrap();
        assert_eq!(read_back, metadata);
    }

    #[test]
    fn write_leaves_no_temp_files_behind() {
        let dir = tempdir().unwrap();
        let store = MetadataStore::new(dir.path().join("workspaces.json"));
        store.write(&MetadataFile::empty()).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}

#[cfg(test)]
mod proptests {
    use std::collections::BTreeMap;

    use super::*;
    use super::super::schema::{Workspace, WorkspaceKind, SCHEMA_VERSION};
    use proptest::collection::vec as prop_vec;
    use proptest::prelude::*;
    use tempfile::tempdir;

    fn arb_metadata_file() -> impl Strategy<Value = MetadataFile> {
        let repo_entry = ("[a-z]{3,10}", prop_vec("[a-z]{3,10}", 0..3));
        prop_vec(repo_entry, 0..4).prop_map(|entries| {
            let mut repos = BTreeMap::new();
            for (name, mut branches) in entries {
                branches.sort();
                branches.dedup();
                let git_dir = PathBuf::from(format!("/home/user/projects/{name}/.git"));
                let workspaces: BTreeMap<String, Workspace> = branches
                    .into_iter()
                    .map(|b| {
                        let ws = Workspace {
                            branch: b.clone(),
                            worktree_path: PathBuf::from(format!("/home/user/.local/share/gitcuttle/repo-aaaaaaaa/{b}")),
                            tracked_remote: None,
                            kind: WorkspaceKind::Standard,
                            base_ref: "main".to_string(),
                            octopus_parents: Vec::new(),
                            created_at: Utc::now(),
                            updated_at: Utc::now(),
                        };
                        (b, ws)
                    })
                    .collect();
                let key = git_dir.to_string_lossy().into_owned();
                repos.insert(
                    key,
                    Repo {
                        git_dir,
                        repo_root: PathBuf::from(format!("/home/user/projects/{name}")),
                        default_remote: None,
                        tracked_at: Utc::now(),
                        updated_at: Utc::now(),
                        workspaces,
                    },
                );
            }
            MetadataFile { version: SCHEMA_VERSION, repos }
        })
    }

    proptest! {
        #[test]
        fn write_then_read_round_trips_arbitrary_metadata(metadata in arb_metadata_file()) {
            let dir = tempdir().unwrap();
            let store = MetadataStore::new(dir.path().join("workspaces.json"));
            store.write(&metadata).unwrap();
            let read_back = store.read().unwrap();
            prop_assert_eq!(read_back, metadata);
        }

        #[test]
        fn every_key_matches_its_child_field(metadata in arb_metadata_file()) {
            for (key, repo) in &metadata.repos {
                prop_assert_eq!(key, &repo.git_dir.to_string_lossy().into_owned());
                for (branch, workspace) in &repo.workspaces {
                    prop_assert_eq!(branch, &workspace.branch);
                }
            }
        }
    }
}
