//! SQLite persistent storage.
//!
//! This module persists the metadata entities and enforces the deletion
//! rules of the relationship graph through the engine's foreign keys.
//!
//! # Overview
//!
//! The storage system consists of:
//! - **Database**: SQLite client with one operation per entity action
//! - **Filters**: builder-style filters for list operations
//! - **Migrations**: schema management and versioning
//! - **Schema**: table DDL assembled from column lists and the foreign-key
//!   declarations in [`crate::schemas::foreign_keys`]
//!
//! # Usage
//!
//! ```rust,ignore
//! use stack_metastore::models::{ComponentCreate, ProjectCreate, StackComponentType, StackCreate};
//! use stack_metastore::storage::{Database, StackFilter};
//!
//! let db = Database::connect("sqlite://metastore.db").await?;
//! db.run_migrations().await?;
//!
//! let project = db.create_project(&ProjectCreate::new("p1")).await?;
//! let orchestrator = db
//!     .create_component(&ComponentCreate::new(
//!         "local",
//!         StackComponentType::Orchestrator,
//!         "local",
//!         project.id,
//!     ))
//!     .await?;
//! db.create_stack(&StackCreate::new("s1", project.id).with_component(orchestrator.id))
//!     .await?;
//!
//! let stacks = db.list_stacks(&StackFilter::new().with_project(project.id)).await?;
//! ```

pub mod database;
pub mod filters;
pub mod migrations;
pub mod schema;

// Re-export main types for convenience
pub use database::Database;
pub use filters::{
    ComponentFilter, FlavorFilter, PipelineFilter, RoleAssignmentFilter, RunFilter, StackFilter,
};
pub use migrations::{AppliedMigration, MigrationError, MigrationRunner};
