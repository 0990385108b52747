//! Command-line interface for stack-metastore.
//!
//! Provides commands for managing projects, users, roles, stack components,
//! stacks and flavors.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
