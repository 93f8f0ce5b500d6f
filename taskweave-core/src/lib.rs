//! Core domain for the Taskweave MCP server
//!
//! This crate holds everything that does not depend on the wire protocol:
//!
//! - **[`config`]**: the task/workflow configuration model loaded at bootstrap
//! - **[`tasks`]**: the task backend contract, the built-in backends and the
//!   registry of configured tasks that workflows call into
//! - **[`workflow`]**: dependency resolution and step execution for workflows
//! - **[`placeholder`]**: `{name}` substitution shared by backends and workflows

pub mod config;
pub mod error;
pub mod placeholder;
pub mod tasks;
pub mod workflow;

pub use error::{Error, Result};
