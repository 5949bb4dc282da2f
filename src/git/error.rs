//! Low-level Git subprocess failures.
//!
//! `GitCommandError` is intentionally dumb: it just carries what happened.
//! Callers translate it into the domain taxonomy in [`crate::error`] because
//! only the caller knows *why* the git invocation was being made.

use std::fmt;

#[derive(Debug, Clone)]
pub struct GitCommandError {
    pub argv: Vec<String>,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl GitCommandError {
    /// The best single-line description of what went wrong: stderr if
    /// present, else stdout, else the command itself.
    pub fn details(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        self.argv.join(" ")
    }
}

impl fmt::Display for GitCommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "git {} failed ({}): {}",
            self.argv.join(" "),
            self.exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "no exit code".to_string()),
            self.details()
        )
    }
}

impl std::error::Error for GitCommandError {}
