//! The durable data model: `MetadataFile`, `Repo`, `Workspace`,
//! and their serialization shape, plus the validation invariants enforced
//! on every `read`/`write`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, ErrorCode};

/// Bumped whenever the on-disk shape changes; migrations chain `v -> v+1`.
pub const SCHEMA_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum WorkspaceKind {
    Standard,
    Octopus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub branch: String,
    pub worktree_path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tracked_remote: Option<String>,
    pub kind: WorkspaceKind,
    pub base_ref: String,
    #[serde(default)]
    pub octopus_parents: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workspace {
    /// Checks the `kind`/`octopusParents` invariants and path absoluteness,
    /// independent of where this workspace lives in a `MetadataFile` (its
    /// key is checked one level up).
    pub fn validate(&self) -> Result<(), AppError> {
        if !self.worktree_path.is_absolute() {
            return Err(AppError::new(
                ErrorCode::SchemaInvalid,
                format!("worktree path for '{}' is not absolute", self.branch),
            ));
        }
        match self.kind {
            WorkspaceKind::Standard => {
                if !self.octopus_parents.is_empty() {
                    return Err(AppError::new(
                        ErrorCode::SchemaInvalid,
                        format!("standard workspace '{}' must not have octopus parents", self.branch),
                    ));
                }
            }
            WorkspaceKind::Octopus => {
                if self.octopus_parents.len() < 2 {
                    return Err(AppError::new(
                        ErrorCode::SchemaInvalid,
                        format!("octopus workspace '{}' needs at least two parents", self.branch),
                    ));
                }
                let mut distinct = self.octopus_parents.clone();
                distinct.sort();
                distinct.dedup();
                if distinct.len() != self.octopus_parents.len() {
                    return Err(AppError::new(
                        ErrorCode::SchemaInvalid,
                        format!("octopus workspace '{}' has duplicate parents", self.branch),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repo {
    pub git_dir: PathBuf,
    pub repo_root: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_remote: Option<String>,
    pub tracked_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub workspaces: BTreeMap<String, Workspace>,
}

impl Repo {
    pub fn validate(&self, key: &str) -> Result<(), AppError> {
        if !self.git_dir.is_absolute() {
            return Err(AppError::new(
                ErrorCode::SchemaInvalid,
                format!("git_dir for repo '{key}' is not absolute"),
            ));
        }
        if self.git_dir.to_string_lossy() != key {
            return Err(AppError::new(
                ErrorCode::SchemaInvalid,
                format!("repo key '{key}' does not match its git_dir"),
            ));
        }

        let mut seen_paths: Vec<&Path> = Vec::new();
        for (branch, workspace) in &self.workspaces {
            if &workspace.branch != branch {
                return Err(AppError::new(
                    ErrorCode::SchemaInvalid,
                    format!("workspace key '{branch}' does not match its branch field"),
                ));
            }
            workspace.validate()?;
            if seen_paths.contains(&workspace.worktree_path.as_path()) {
                return Err(AppError::new(
                    ErrorCode::SchemaInvalid,
                    format!("duplicate worktree path within repo '{key}': {}", workspace.worktree_path.display()),
                ));
            }
            seen_paths.push(&workspace.worktree_path);
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataFile {
    pub version: u32,
    #[serde(default)]
    pub repos: BTreeMap<String, Repo>,
}

impl MetadataFile {
    pub fn empty() -> Self {
        Self {
            version: SCHEMA_VERSION,
            repos: BTreeMap::new(),
        }
    }

    /// All of the `read`/`write` validation invariants in one place.
    pub fn validate(&self) -> Result<(), AppError> {
        if self.version == 0 {
            return Err(AppError::new(ErrorCode::SchemaInvalid, "schema version must be positive"));
        }
        if self.version > SCHEMA_VERSION {
            return Err(AppError::new(
                ErrorCode::SchemaUnsupported,
                format!("metadata file version {} is newer than supported version {SCHEMA_VERSION}", self.version),
            )
            .with_guidance("upgrade gitcuttle to a version that supports this metadata schema"));
        }
        for (key, repo) in &self.repos {
            repo.validate(key)?;
        }
        Ok(())
    }

    pub fn repo_mut(&mut self, git_dir: &Path) -> Option<&mut Repo> {
        self.repos.get_mut(&git_dir.to_string_lossy().into_owned())
    }

    pub fn repo(&self, git_dir: &Path) -> Option<&Repo> {
        self.repos.get(&git_dir.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_workspace() -> Workspace {
        Workspace {
            branch: "feature/x".to_string(),
            worktree_path: PathBuf::from("/home/user/.local/share/gitcuttle/repo-aaaaaaaa/feature-x"),
            tracked_remote: None,
            kind: WorkspaceKind::Standard,
            base_ref: "main".to_string(),
            octopus_parents: Vec::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn standard_workspace_with_parents_is_invalid() {
        let mut ws = sample_workspace();
        ws.octopus_parents = vec!["main".to_string()];
        assert!(ws.validate().is_err());
    }

    #[test]
    fn octopus_workspace_needs_two_distinct_parents() {
        let mut ws = sample_workspace();
        ws.kind = WorkspaceKind::Octopus;
        ws.octopus_parents = vec!["main".to_string()];
        assert!(ws.validate().is_err());

        ws.octopus_parents = vec!["main".to_string(), "main".to_string()];
        assert!(ws.validate().is_err());

        ws.octopus_parents = vec!["main".to_string(), "release".to_string()];
        assert!(ws.validate().is_ok());
    }

    #[test]
    fn relative_worktree_path_is_invalid() {
        let mut ws = sample_workspace();
        ws.worktree_path = PathBuf::from("relative/path");
        assert!(ws.validate().is_err());
    }

    #[test]
    fn repo_key_must_match_git_dir() {
        let repo = Repo {
            git_dir: PathBuf::from("/home/user/project/.git"),
            repo_root: PathBuf::from("/home/user/project"),
            default_remote: Some("origin".to_string()),
            tracked_at: Utc::now(),
            updated_at: Utc::now(),
            workspaces: BTreeMap::new(),
        };
        assert!(repo.validate("/home/user/project/.git").is_ok());
        assert!(repo.validate("/other/.git").is_err());
    }

    #[test]
    fn metadata_file_rejects_version_above_schema() {
        let mut m = MetadataFile::empty();
        m.version = SCHEMA_VERSION + 1;
        assert!(m.validate().is_err());
    }

    #[test]
    fn metadata_file_rejects_version_zero() {
        let mut m = MetadataFile::empty();
        m.version = 0;
        assert!(m.validate().is_err());
    }
}
