//! The domain error taxonomy.
//!
//! Every user-visible failure is an [`AppError`]: a stable machine-readable
//! `code`, a message, optional details, and zero or more guidance lines.
//! Internal plumbing (subprocess spawning, JSON parsing, path resolution)
//! uses `anyhow::Result` and is converted to an `AppError` at the call
//! site where the domain code is known.

use std::fmt;

/// The closed set of machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorCode {
    NotInGitRepo,
    GitOperationInProgress,
    RepoNotTracked,
    WorkspaceNotTracked,
    BranchMissing,
    BranchAlreadyExists,
    DetachedHead,
    InvalidBaseRef,
    InvalidOctopusParents,
    OctopusMergeFailed,
    OctopusParentMissing,
    OctopusUpdateAnalysisFailed,
    OctopusUpdateNotSupported,
    NoUpstream,
    UpdateFetchFailed,
    UpdateRebaseFailed,
    InvalidAbsorbTarget,
    AbsorbTargetUncertain,
    AbsorbCherryPickFailed,
    AbsorbResetFailed,
    AbsorbAnalysisFailed,
    DeleteBlocked,
    WorkspaceDirty,
    WorktreeDeleteFailed,
    BranchDeleteFailed,
    WorktreeCreateFailed,
    BranchCreateFailed,
    BranchCheckoutFailed,
    GitCommandFailed,
    GitStateReadFailed,
    InteractiveSelectionUnavailable,
    InvalidWorkspaceKind,
    SchemaUnsupported,
    SchemaInvalid,
}

/// A stable, user-facing application error.
#[derive(Debug, Clone)]
pub struct AppError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
    pub guidance: Vec<String>,
}

impl AppError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
            guidance: Vec::new(),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_guidance(mut self, hint: impl Into<String>) -> Self {
        self.guidance.push(hint.into());
        self
    }

    pub fn with_guidance_all(mut self, hints: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.guidance.extend(hints.into_iter().map(Into::into));
        self
    }
}

/// Renders the human error format:
/// ```text
/// error[<code>]: <message>
/// details: <details>         (optional)
/// hint: <guidance line>      (0 or more)
/// ```
impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "error[{}]: {}", self.code, self.message)?;
        if let Some(details) = &self.details {
            writeln!(f, "details: {details}")?;
        }
        for hint in &self.guidance {
            writeln!(f, "hint: {hint}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_message_only() {
        let err = AppError::new(ErrorCode::NotInGitRepo, "must run inside a repository");
        assert_eq!(
            err.to_string(),
            "error[not-in-git-repo]: must run inside a repository\n"
        );
    }

    #[test]
    fn formats_details_and_hints_in_order() {
        let err = AppError::new(ErrorCode::BranchAlreadyExists, "target branch already exists")
            .with_details("feature/x")
            .with_guidance("choose a new branch name")
            .with_guidance("or delete the existing branch first");
        let expected = "error[branch-already-exists]: target branch already exists\n\
             details: feature/x\n\
             hint: choose a new branch name\n\
             hint: or delete the existing branch first\n";
        assert_eq!(err.to_string(), expected);
    }
}
