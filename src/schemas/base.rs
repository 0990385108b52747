//! Capability traits and reusable column groups shared by the row types.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{ProjectModel, UserModel};

use super::project::ProjectSchema;
use super::user_management::UserSchema;

/// A row type that can be built from a create request and converted back
/// into its domain model.
pub trait Persistable: Sized {
    /// Entity name used in error messages and logs.
    const ENTITY: &'static str;

    type Create;
    type Model;
    /// Already-loaded related rows needed to build the domain model.
    type Related;

    fn from_create_model(create: &Self::Create) -> StoreResult<Self>;

    fn to_model(&self, related: Self::Related) -> StoreResult<Self::Model>;
}

/// A row type that accepts partial updates.
pub trait Updatable: Persistable {
    type Update;

    /// Applies the fields set in `update` and re-stamps `updated`.
    fn from_update_model(self, update: &Self::Update) -> StoreResult<Self>;
}

/// Returns the supplied id, or a fresh one.
pub fn id_or_new(id: Option<Uuid>) -> Uuid {
    id.unwrap_or_else(Uuid::new_v4)
}

/// `created` / `updated` columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Timestamps {
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl Timestamps {
    pub fn now() -> Self {
        let now = Utc::now();
        Self {
            created: now,
            updated: now,
        }
    }

    /// Marks the row as modified. `updated` never moves backwards.
    pub fn touch(&mut self) {
        self.updated = Utc::now().max(self.updated);
    }
}

/// `name` / `is_shared` columns of shareable entities.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Shareable {
    pub name: String,
    pub is_shared: bool,
}

/// Owning project and (optional) creating user of a project-scoped row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct Ownership {
    pub project_id: Uuid,
    pub user_id: Option<Uuid>,
}

impl Ownership {
    pub fn new(project_id: Uuid, user_id: Option<Uuid>) -> Self {
        Self {
            project_id,
            user_id,
        }
    }

    /// Rejects an update that names a different owner than the stored one.
    pub fn ensure_unchanged(
        &self,
        entity: &'static str,
        project: Option<Uuid>,
        user: Option<Uuid>,
    ) -> StoreResult<()> {
        if let Some(project) = project {
            if project != self.project_id {
                return Err(StoreError::Consistency {
                    entity,
                    field: "project",
                });
            }
        }
        if let Some(user) = user {
            if Some(user) != self.user_id {
                return Err(StoreError::Consistency {
                    entity,
                    field: "user",
                });
            }
        }
        Ok(())
    }
}

/// The loaded owner rows of a project-scoped entity.
#[derive(Debug, Clone)]
pub struct OwnerRelations {
    pub project: ProjectSchema,
    pub user: Option<UserSchema>,
}

impl OwnerRelations {
    pub fn to_models(&self) -> StoreResult<(ProjectModel, Option<UserModel>)> {
        let project = self.project.to_model(())?;
        let user = self.user.as_ref().map(|u| u.to_model(())).transpose()?;
        Ok((project, user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_touch_keeps_created() {
        let mut ts = Timestamps::now();
        let created = ts.created;
        ts.touch();
        assert_eq!(ts.created, created);
        assert!(ts.updated >= created);
    }

    #[test]
    fn test_touch_never_moves_backwards() {
        let future = Utc::now() + chrono::Duration::hours(1);
        let mut ts = Timestamps {
            created: future,
            updated: future,
        };
        ts.touch();
        assert_eq!(ts.updated, future);
    }

    #[test]
    fn test_ownership_accepts_matching_owner() {
        let project = Uuid::new_v4();
        let user = Uuid::new_v4();
        let owners = Ownership::new(project, Some(user));

        assert!(owners.ensure_unchanged("stack", None, None).is_ok());
        assert!(owners.ensure_unchanged("stack", Some(project), Some(user)).is_ok());
    }

    #[test]
    fn test_ownership_rejects_reassignment() {
        let owners = Ownership::new(Uuid::new_v4(), Some(Uuid::new_v4()));

        let err = owners
            .ensure_unchanged("stack", Some(Uuid::new_v4()), None)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::Consistency {
                field: "project",
                ..
            }
        ));

        let err = owners
            .ensure_unchanged("stack_component", None, Some(Uuid::new_v4()))
            .unwrap_err();
        assert_eq!(err.code(), "CONSISTENCY_ERROR");
    }

    #[test]
    fn test_ownership_after_user_deletion() {
        // The user reference was cleared; naming any user is a change.
        let owners = Ownership::new(Uuid::new_v4(), None);
        assert!(owners
            .ensure_unchanged("stack", None, Some(Uuid::new_v4()))
            .is_err());
    }

    #[test]
    fn test_id_or_new() {
        let id = Uuid::new_v4();
        assert_eq!(id_or_new(Some(id)), id);
        assert_ne!(id_or_new(None), id_or_new(None));
    }
}
