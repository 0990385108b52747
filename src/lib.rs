//! stack-metastore: metadata store for ML pipeline stacks.
//!
//! This library persists projects, users, teams, roles, stack components,
//! stacks, pipelines and pipeline runs in SQLite, and enforces the deletion
//! rules between them (cascade, detach or refuse).

// Core modules
pub mod cli;
pub mod config;
pub mod error;
pub mod models;
pub mod registry;
pub mod schemas;
pub mod storage;

// Re-export commonly used types
pub use config::{ConfigError, StoreConfig};
pub use error::{StoreError, StoreResult};
pub use registry::{FlavorEntry, FlavorRegistry};
pub use storage::Database;
