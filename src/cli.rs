//! The CLI surface, built on `clap`'s derive API.

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(name = "gitcuttle", version, about = "Manage Git workspaces layered on worktrees, including octopus merges")]
pub struct Cli {
    /// Verbose (debug-level) logging. Mirrored by `GITCUTTLE_VERBOSE`.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create a standard or octopus workspace.
    New(NewArgs),
    /// Alias of `new` with `--print-path` support; identical underlying
    /// behavior.
    Worktree(NewArgs),
    /// Refresh a workspace from its upstream(s).
    Update(ContinuableArgs),
    /// Move post-merge commits off an octopus workspace onto a parent.
    Absorb(AbsorbArgs),
    /// Remove a tracked workspace.
    Delete(DeleteArgs),
    /// Remove workspaces whose local branch vanished or whose PR merged.
    Prune(PruneArgs),
    /// List tracked workspaces with remote/PR status.
    List,
    /// Report whether the current repository is tracked.
    Status,
    /// Print a diagnostic report for bug reports (read-only).
    Diag,
}

#[derive(Debug, Args)]
pub struct NewArgs {
    /// Branch name (first positional) and, for an octopus workspace, the
    /// parent refs to merge (second positional onward). With `--name`,
    /// every positional here is treated as a parent ref instead and
    /// `--name` supplies the new branch.
    #[arg(required = true)]
    pub refs: Vec<String>,

    /// Explicit name for the new workspace branch, freeing every
    /// positional to be a parent ref.
    #[arg(long)]
    pub name: Option<String>,

    /// Base ref for a standard (single-parent) workspace. Defaults to the
    /// current branch.
    #[arg(long)]
    pub base: Option<String>,

    /// Print only the resulting worktree path to stdout.
    #[arg(long)]
    pub print_path: bool,
}

#[derive(Debug, Args)]
pub struct ContinuableArgs {
    /// Resume after manually resolving a conflict left by a prior run.
    #[arg(long = "continue")]
    pub continue_: bool,
}

#[derive(Debug, Args)]
pub struct AbsorbArgs {
    #[command(flatten)]
    pub continuable: ContinuableArgs,

    /// Pin the absorb target explicitly (must be one of the workspace's
    /// declared octopus parents).
    #[arg(long)]
    pub target: Option<String>,

    /// Prompt interactively for the target of each ambiguous commit.
    #[arg(short = 'i', long)]
    pub interactive: bool,
}

#[derive(Debug, Args)]
#[command(group(clap::ArgGroup::new("scope").args(["workspace_only", "worktree_only"])))]
pub struct DeleteArgs {
    /// Workspace branch to delete (defaults to the current branch).
    pub name: Option<String>,

    /// Untrack the workspace and delete the branch, but leave the worktree.
    #[arg(long)]
    pub workspace_only: bool,

    /// Remove the worktree only, keeping the branch and metadata entry.
    #[arg(long)]
    pub worktree_only: bool,

    #[command(flatten)]
    pub common: PlanArgs,
}

#[derive(Debug, Args)]
pub struct PruneArgs {
    #[command(flatten)]
    pub common: PlanArgs,
}

#[derive(Debug, Args)]
pub struct PlanArgs {
    /// Bypass blocking checks (current workspace, dirty worktree).
    #[arg(long)]
    pub force: bool,

    /// Render the plan without mutating anything.
    #[arg(long)]
    pub dry_run: bool,

    /// Render the dry-run plan as JSON instead of human-readable text.
    #[arg(long)]
    pub json: bool,
}
