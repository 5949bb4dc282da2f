//! Dry-run plan rendering.
//!
//! Grounded directly on `plan_output.py`'s `DryRunPlan`/`PlanAction` and its
//! human/JSON renderers. The JSON payload's `sort_keys=True` requirement is
//! satisfied structurally: [`PlanPayload`]'s fields are declared in
//! alphabetical order of their serialized names, which is the order
//! `serde_json` emits them in.

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanAction {
    pub op: String,
    pub target: String,
    pub details: Option<String>,
}

impl PlanAction {
    pub fn new(op: impl Into<String>, target: impl Into<String>, details: Option<String>) -> Self {
        Self {
            op: op.into(),
            target: target.into(),
            details,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DryRunPlan {
    pub command: String,
    pub actions: Vec<PlanAction>,
    pub warnings: Vec<String>,
}

impl DryRunPlan {
    pub fn new(command: impl Into<String>, actions: Vec<PlanAction>, warnings: Vec<String>) -> Self {
        Self {
            command: command.into(),
            actions,
            warnings,
        }
    }

    pub fn render_human(&self) -> String {
        let mut lines = vec![format!("Dry-run plan for `{}`:", self.command)];
        if self.actions.is_empty() {
            lines.push("No changes planned.".to_string());
        } else {
            for (index, action) in self.actions.iter().enumerate() {
                let n = index + 1;
                match &action.details {
                    Some(details) => lines.push(format!("{n}. {}: {} ({details})", action.op, action.target)),
                    None => lines.push(format!("{n}. {}: {}", action.op, action.target)),
                }
            }
        }

        if !self.warnings.is_empty() {
            lines.push("Warnings:".to_string());
            lines.extend(self.warnings.iter().map(|w| format!("- {w}")));
        }

        lines.join("\n")
    }

    pub fn render_json(&self) -> Result<String, serde_json::Error> {
        let payload = PlanPayload {
            action_count: self.actions.len(),
            actions: self.actions.iter().map(PlanActionPayload::from).collect(),
            command: self.command.clone(),
            dry_run: true,
            warnings: self.warnings.clone(),
        };
        serde_json::to_string_pretty(&payload)
    }
}

#[derive(Serialize)]
struct PlanActionPayload {
    details: Option<String>,
    op: String,
    target: String,
}

impl From<&PlanAction> for PlanActionPayload {
    fn from(action: &PlanAction) -> Self {
        Self {
            details: action.details.clone(),
            op: action.op.clone(),
            target: action.target.clone(),
        }
    }
}

#[derive(Serialize)]
struct PlanPayload {
    action_count: usize,
    actions: Vec<PlanActionPayload>,
    command: String,
    dry_run: bool,
    warnings: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn human_plan_with_no_actions_says_so() {
        let plan = DryRunPlan::new("delete", Vec::new(), Vec::new());
        assert_eq!(plan.render_human(), "Dry-run plan for `delete`:\nNo changes planned.");
    }

    #[test]
    fn human_plan_numbers_actions_and_appends_details() {
        let plan = DryRunPlan::new(
            "prune",
            vec![
                PlanAction::new("delete-worktree", "/tmp/ws", Some("missing-local-branch".to_string())),
                PlanAction::new("untrack-workspace", "feature/x", None),
            ],
            vec!["skipping feature/y: blocked by current-workspace; rerun with --force".to_string()],
        );
        let rendered = plan.render_human();
        assert!(rendered.contains("1. delete-worktree: /tmp/ws (missing-local-branch)"));
        assert!(rendered.contains("2. untrack-workspace: feature/x"));
        assert!(rendered.contains("Warnings:"));
        assert!(rendered.contains("- skipping feature/y"));
    }

    #[test]
    fn json_plan_has_alphabetically_ordered_keys() {
        let plan = DryRunPlan::new("prune", Vec::new(), Vec::new());
        let json = plan.render_json().unwrap();
        let action_count_pos = json.find("action_count").unwrap();
        let actions_pos = json.find("\"actions\"").unwrap();
        let command_pos = json.find("\"command\"").unwrap();
        let dry_run_pos = json.find("dry_run").unwrap();
        let warnings_pos = json.find("warnings").unwrap();
        assert!(action_count_pos < actions_pos);
        assert!(actions_pos < command_pos);
        assert!(command_pos < dry_run_pos);
        assert!(dry_run_pos < warnings_pos);
    }
}
