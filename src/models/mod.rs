//! Domain models exchanged with callers of the metadata store.
//!
//! These types are decoupled from the storage encoding: identifiers of
//! owning rows are resolved into their own models, configurations are plain
//! JSON maps, and secrets only ever appear hashed.

pub mod component;
pub mod enums;
pub mod pipeline;
pub mod project;
pub mod stack;
pub mod user;

pub use component::{
    ComponentConfiguration, ComponentCreate, ComponentModel, ComponentUpdate, FlavorCreate,
    FlavorModel,
};
pub use enums::{ExecutionStatus, PermissionType, StackComponentType};
pub use pipeline::{
    PipelineCreate, PipelineModel, PipelineRunCreate, PipelineRunModel, PipelineRunUpdate,
    PipelineUpdate,
};
pub use project::{ProjectCreate, ProjectModel, ProjectUpdate};
pub use stack::{StackCreate, StackModel, StackUpdate};
pub use user::{
    Assignee, RoleAssignmentCreate, RoleAssignmentModel, RoleCreate, RoleModel, RoleUpdate,
    TeamCreate, TeamModel, TeamUpdate, UserCreate, UserModel, UserUpdate,
};
