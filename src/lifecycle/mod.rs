//! The Workspace Lifecycle engine: create/update/absorb/delete/prune.

pub mod absorb;
pub mod create;
pub mod delete;
pub mod prune;
pub mod update;
