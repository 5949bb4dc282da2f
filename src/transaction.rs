//! The Transaction Executor: an ordered list of [`Step`]s that
//! applies forward and rolls back in reverse on the first failure.
//!
//! Grounded directly on `transaction.py`'s `Transaction`/`TransactionStep`/
//! `TransactionExecutionError`/`TransactionRollbackError` design: same
//! apply-then-rollback-in-reverse control flow, same two failure shapes.

use std::fmt;

use anyhow::Error;

/// A single reversible unit of work inside a [`Transaction`].
pub struct Step {
    pub name: String,
    pub apply: Box<dyn FnOnce() -> anyhow::Result<()>>,
    pub rollback: Box<dyn FnOnce() -> anyhow::Result<()>>,
    pub recovery_commands: Vec<String>,
}

impl Step {
    pub fn new(
        name: impl Into<String>,
        apply: impl FnOnce() -> anyhow::Result<()> + 'static,
        rollback: impl FnOnce() -> anyhow::Result<()> + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            apply: Box::new(apply),
            rollback: Box::new(rollback),
            recovery_commands: Vec::new(),
        }
    }

    pub fn with_recovery_commands(mut self, commands: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.recovery_commands = commands.into_iter().map(Into::into).collect();
        self
    }
}

/// A step's `apply` succeeded but at least one prior step failed, so this
/// step's `rollback` ran as part of unwinding.
struct CompletedStep {
    name: String,
    rollback: Box<dyn FnOnce() -> anyhow::Result<()>>,
    recovery_commands: Vec<String>,
}

/// One rollback invocation that itself failed.
#[derive(Debug)]
pub struct RollbackFailure {
    pub step_name: String,
    pub error: Error,
    pub recovery_commands: Vec<String>,
}

/// `apply` failed; every previously completed step's `rollback` succeeded.
#[derive(Debug)]
pub struct ExecutionError {
    pub txn_id: String,
    pub failed_step_name: String,
    pub cause: Error,
    pub rolled_back_steps: Vec<String>,
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "transaction {} failed during step '{}': {}",
            self.txn_id, self.failed_step_name, self.cause
        )
    }
}

impl std::error::Error for ExecutionError {}

/// `apply` failed and at least one rollback itself failed.
#[derive(Debug)]
pub struct RollbackError {
    pub txn_id: String,
    pub failed_step_name: String,
    pub cause: Error,
    pub rollback_failures: Vec<RollbackFailure>,
    pub rolled_back_steps: Vec<String>,
}

impl RollbackError {
    /// Ordered, deduplicated union of every failed step's recovery commands.
    pub fn recovery_commands(&self) -> Vec<String> {
        let mut commands = Vec::new();
        for failure in &self.rollback_failures {
            for command in &failure.recovery_commands {
                if !commands.contains(command) {
                    commands.push(command.clone());
                }
            }
        }
        commands
    }

    /// Human-readable block suitable for emission to stderr.
    pub fn format_partial_state(&self) -> String {
        let rolled_back = if self.rolled_back_steps.is_empty() {
            "(none)".to_string()
        } else {
            self.rolled_back_steps.join(", ")
        };

        let mut lines = vec![
            format!("transaction id: {}", self.txn_id),
            format!("failed step: {}", self.failed_step_name),
            format!("operation error: {}", self.cause),
            format!("rolled back steps: {rolled_back}"),
            "rollback failures:".to_string(),
        ];
        for failure in &self.rollback_failures {
            lines.push(format!("- {}: {}", failure.step_name, failure.error));
        }

        let recovery = self.recovery_commands();
        if recovery.is_empty() {
            lines.push("deterministic recovery commands: (none provided)".to_string());
        } else {
            lines.push("deterministic recovery commands:".to_string());
            lines.extend(recovery.iter().map(|c| format!("- {c}")));
        }
        lines.join("\n")
    }
}

impl fmt::Display for RollbackError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed_rollbacks = self
            .rollback_failures
            .iter()
            .map(|f| format!("{}: {}", f.step_name, f.error))
            .collect::<Vec<_>>()
            .join(", ");
        write!(
            f,
            "transaction {} failed during step '{}' and rollback was partial ({})",
            self.txn_id, self.failed_step_name, failed_rollbacks
        )
    }
}

impl std::error::Error for RollbackError {}

#[derive(Debug)]
pub enum TransactionError {
    Execution(ExecutionError),
    Rollback(RollbackError),
}

impl fmt::Display for TransactionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Execution(e) => write!(f, "{e}"),
            Self::Rollback(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for TransactionError {}

/// An ordered list of [`Step`]s with a unique id, applied in insertion order.
pub struct Transaction {
    pub txn_id: String,
    steps: Vec<Step>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            txn_id: uuid::Uuid::new_v4().simple().to_string(),
            steps: Vec::new(),
        }
    }

    pub fn with_id(txn_id: impl Into<String>) -> Self {
        Self {
            txn_id: txn_id.into(),
            steps: Vec::new(),
        }
    }

    pub fn add_step(&mut self, step: Step) {
        self.steps.push(step);
    }

    /// Applies every step in order. On the first failure, rolls back every
    /// previously completed step in reverse order and returns the
    /// corresponding failure shape. Never retries, never swallows errors.
    pub fn run(self) -> Result<(), TransactionError> {
        let mut completed: Vec<CompletedStep> = Vec::new();

        for step in self.steps {
            match (step.apply)() {
                Ok(()) => {
                    completed.push(CompletedStep {
                        name: step.name,
                        rollback: step.rollback,
                        recovery_commands: step.recovery_commands,
                    });
                }
                Err(cause) => {
                    let failed_step_name = step.name;
                    let mut rollback_failures = Vec::new();
                    let mut rolled_back_steps = Vec::new();

                    for completed_step in completed.into_iter().rev() {
                        match (completed_step.rollback)() {
                            Ok(()) => rolled_back_steps.push(completed_step.name),
                            Err(error) => rollback_failures.push(RollbackFailure {
                                step_name: completed_step.name,
                                error,
                                recovery_commands: completed_step.recovery_commands,
                            }),
                        }
                    }

                    if rollback_failures.is_empty() {
                        return Err(TransactionError::Execution(ExecutionError {
                            txn_id: self.txn_id,
                            failed_step_name,
                            cause,
                            rolled_back_steps,
                        }));
                    }

                    return Err(TransactionError::Rollback(RollbackError {
                        txn_id: self.txn_id,
                        failed_step_name,
                        cause,
                        rollback_failures,
                        rolled_back_steps,
                    }));
                }
            }
        }

        Ok(())
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn all_steps_succeed_leaves_no_rollback_invoked() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut txn = Transaction::new();

        for name in ["a", "b", "c"] {
            let apply_log = log.clone();
            let rollback_log = log.clone();
            let applied = name.to_string();
            let rolled_back = name.to_string();
            txn.add_step(Step::new(
                name,
                move || {
                    apply_log.borrow_mut().push(format!("apply:{applied}"));
                    Ok(())
                },
                move || {
                    rollback_log.borrow_mut().push(format!("rollback:{rolled_back}"));
                    Ok(())
                },
            ));
        }

        assert!(txn.run().is_ok());
        assert_eq!(*log.borrow(), vec!["apply:a", "apply:b", "apply:c"]);
    }

    #[test]
    fn failing_step_rolls_back_completed_steps_in_reverse() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut txn = Transaction::new();

        for name in ["a", "b"] {
            let rollback_log = log.clone();
            let rolled_back = name.to_string();
            txn.add_step(Step::new(
                name,
                || Ok(()),
                move || {
                    rollback_log.borrow_mut().push(rolled_back.clone());
                    Ok(())
                },
            ));
        }
        txn.add_step(Step::new("c", || anyhow::bail!("boom"), || Ok(())));

        let err = txn.run().unwrap_err();
        match err {
            TransactionError::Execution(e) => {
                assert_eq!(e.failed_step_name, "c");
                assert_eq!(e.rolled_back_steps, vec!["b", "a"]);
            }
            TransactionError::Rollback(_) => panic!("expected execution error"),
        }
        assert_eq!(*log.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn rollback_failure_is_reported_with_recovery_commands() {
        let mut txn = Transaction::new();
        txn.add_step(
            Step::new("a", || Ok(()), || anyhow::bail!("rollback of a failed"))
                .with_recovery_commands(["git update-ref refs/heads/a <oid>"]),
        );
        txn.add_step(Step::new("b", || anyhow::bail!("boom"), || Ok(())));

        let err = txn.run().unwrap_err();
        match err {
            TransactionError::Rollback(e) => {
                assert_eq!(e.failed_step_name, "b");
                assert_eq!(e.rollback_failures.len(), 1);
                assert_eq!(e.rollback_failures[0].step_name, "a");
                assert_eq!(e.recovery_commands(), vec!["git update-ref refs/heads/a <oid>"]);
                let rendered = e.format_partial_state();
                assert!(rendered.contains("transaction id:"));
                assert!(rendered.contains("failed step: b"));
                assert!(rendered.contains("git update-ref refs/heads/a <oid>"));
            }
            TransactionError::Execution(_) => panic!("expected rollback error"),
        }
    }

    #[test]
    fn recovery_commands_are_deduplicated_preserving_order() {
        let mut txn = Transaction::new();
        txn.add_step(
            Step::new("a", || Ok(()), || anyhow::bail!("fail"))
                .with_recovery_commands(["cmd-1", "cmd-2"]),
        );
        txn.add_step(
            Step::new("b", || Ok(()), || anyhow::bail!("fail"))
                .with_recovery_commands(["cmd-2", "cmd-3"]),
        );
        txn.add_step(Step::new("c", || anyhow::bail!("boom"), || Ok(())));

        let err = txn.run().unwrap_err();
        match err {
            TransactionError::Rollback(e) => {
                assert_eq!(e.recovery_commands(), vec!["cmd-2", "cmd-3", "cmd-1"]);
            }
            TransactionError::Execution(_) => panic!("expected rollback error"),
        }
    }
}
