//! Row-shaped representations of the persisted entities.
//!
//! Each row type implements [`Persistable`] (and [`Updatable`] where partial
//! updates make sense) to map between domain models and stored columns:
//!
//! - `from_create_model` builds a new row, generating the id when absent,
//!   encoding structured fields and stamping `created`/`updated`
//! - `from_update_model` applies the fields a caller set and re-stamps
//!   `updated`; ownership changes are rejected
//! - `to_model` decodes stored fields and converts the owning project/user
//!
//! Shared columns are grouped into embedded structs ([`Timestamps`],
//! [`Ownership`], [`Shareable`]) flattened into each row.

pub mod base;
pub mod component;
pub mod config_codec;
pub mod foreign_keys;
pub mod pipeline;
pub mod project;
pub mod stack;
pub mod user_management;

pub use base::{OwnerRelations, Ownership, Persistable, Shareable, Timestamps, Updatable};
pub use component::{FlavorSchema, StackComponentSchema};
pub use config_codec::{decode_configuration, encode_configuration};
pub use foreign_keys::{ForeignKey, OnDelete, FOREIGN_KEYS};
pub use pipeline::{PipelineRunSchema, PipelineSchema};
pub use project::ProjectSchema;
pub use stack::{StackCompositionSchema, StackRelations, StackSchema};
pub use user_management::{
    RolePermissionSchema, RoleSchema, TeamAssignmentSchema, TeamRoleAssignmentSchema,
    TeamSchema, UserRoleAssignmentSchema, UserSchema,
};
