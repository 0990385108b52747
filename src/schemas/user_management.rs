//! Row types for users, teams, roles and role assignments.

use std::collections::BTreeSet;

use sqlx::FromRow;
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::user::hash_secret;
use crate::models::{
    Assignee, PermissionType, RoleAssignmentCreate, RoleAssignmentModel, RoleCreate, RoleModel,
    RoleUpdate, TeamCreate, TeamModel, TeamUpdate, UserCreate, UserModel, UserUpdate,
};

use super::base::{id_or_new, Persistable, Timestamps, Updatable};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserSchema {
    pub id: Uuid,
    pub name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub email_opted_in: Option<bool>,
    pub active: bool,
    /// Argon2 PHC string, never the plain password.
    pub password: Option<String>,
    pub activation_token: Option<String>,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for UserSchema {
    const ENTITY: &'static str = "user";

    type Create = UserCreate;
    type Model = UserModel;
    type Related = ();

    fn from_create_model(create: &UserCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            full_name: create.full_name.clone(),
            email: create.email.clone(),
            email_opted_in: create.email_opted_in,
            active: create.active,
            password: create.password.as_deref().map(hash_secret).transpose()?,
            activation_token: create
                .activation_token
                .as_deref()
                .map(hash_secret)
                .transpose()?,
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, _: ()) -> StoreResult<UserModel> {
        Ok(UserModel {
            id: self.id,
            name: self.name.clone(),
            full_name: self.full_name.clone(),
            email: self.email.clone(),
            email_opted_in: self.email_opted_in,
            active: self.active,
            password_hash: self.password.clone(),
            activation_token_hash: self.activation_token.clone(),
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for UserSchema {
    type Update = UserUpdate;

    fn from_update_model(mut self, update: &UserUpdate) -> StoreResult<Self> {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(full_name) = &update.full_name {
            self.full_name = full_name.clone();
        }
        if let Some(email) = &update.email {
            self.email = email.clone();
        }
        if let Some(opted_in) = update.email_opted_in {
            self.email_opted_in = Some(opted_in);
        }
        if let Some(active) = update.active {
            self.active = active;
        }
        if let Some(password) = &update.password {
            self.password = Some(hash_secret(password)?);
        }
        if let Some(token) = &update.activation_token {
            self.activation_token = Some(hash_secret(token)?);
        }
        self.timestamps.touch();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TeamSchema {
    pub id: Uuid,
    pub name: String,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for TeamSchema {
    const ENTITY: &'static str = "team";

    type Create = TeamCreate;
    type Model = TeamModel;
    type Related = ();

    fn from_create_model(create: &TeamCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, _: ()) -> StoreResult<TeamModel> {
        Ok(TeamModel {
            id: self.id,
            name: self.name.clone(),
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for TeamSchema {
    type Update = TeamUpdate;

    fn from_update_model(mut self, update: &TeamUpdate) -> StoreResult<Self> {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        self.timestamps.touch();
        Ok(self)
    }
}

/// Join row between users and teams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct TeamAssignmentSchema {
    pub user_id: Uuid,
    pub team_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct RoleSchema {
    pub id: Uuid,
    pub name: String,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl RoleSchema {
    /// Permission rows granting `permissions` through this role.
    pub fn permission_rows(&self, permissions: &BTreeSet<PermissionType>) -> Vec<RolePermissionSchema> {
        permissions
            .iter()
            .map(|p| RolePermissionSchema {
                name: p.as_str().to_string(),
                role_id: self.id,
            })
            .collect()
    }
}

impl Persistable for RoleSchema {
    const ENTITY: &'static str = "role";

    type Create = RoleCreate;
    type Model = RoleModel;
    type Related = Vec<RolePermissionSchema>;

    fn from_create_model(create: &RoleCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, permissions: Vec<RolePermissionSchema>) -> StoreResult<RoleModel> {
        let permissions = permissions
            .iter()
            .map(|p| p.name.parse::<PermissionType>())
            .collect::<StoreResult<BTreeSet<_>>>()?;

        Ok(RoleModel {
            id: self.id,
            name: self.name.clone(),
            permissions,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for RoleSchema {
    type Update = RoleUpdate;

    /// Renames the role. A new permission set is written by the caller as
    /// replacement permission rows.
    fn from_update_model(mut self, update: &RoleUpdate) -> StoreResult<Self> {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        self.timestamps.touch();
        Ok(self)
    }
}

/// A permission granted by a role; keyed by (name, role_id).
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RolePermissionSchema {
    pub name: String,
    pub role_id: Uuid,
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct UserRoleAssignmentSchema {
    pub id: Uuid,
    pub role_id: Uuid,
    pub user_id: Uuid,
    pub project_id: Option<Uuid>,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for UserRoleAssignmentSchema {
    const ENTITY: &'static str = "user_role_assignment";

    type Create = RoleAssignmentCreate;
    type Model = RoleAssignmentModel;
    type Related = ();

    fn from_create_model(create: &RoleAssignmentCreate) -> StoreResult<Self> {
        let Assignee::User(user_id) = create.assignee else {
            return Err(StoreError::Consistency {
                entity: Self::ENTITY,
                field: "assignee",
            });
        };
        Ok(Self {
            id: id_or_new(create.id),
            role_id: create.role,
            user_id,
            project_id: create.project,
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, _: ()) -> StoreResult<RoleAssignmentModel> {
        Ok(RoleAssignmentModel {
            id: self.id,
            role: self.role_id,
            user: Some(self.user_id),
            team: None,
            project: self.project_id,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct TeamRoleAssignmentSchema {
    pub id: Uuid,
    pub role_id: Uuid,
    pub team_id: Uuid,
    pub project_id: Option<Uuid>,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for TeamRoleAssignmentSchema {
    const ENTITY: &'static str = "team_role_assignment";

    type Create = RoleAssignmentCreate;
    type Model = RoleAssignmentModel;
    type Related = ();

    fn from_create_model(create: &RoleAssignmentCreate) -> StoreResult<Self> {
        let Assignee::Team(team_id) = create.assignee else {
            return Err(StoreError::Consistency {
                entity: Self::ENTITY,
                field: "assignee",
            });
        };
        Ok(Self {
            id: id_or_new(create.id),
            role_id: create.role,
            team_id,
            project_id: create.project,
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, _: ()) -> StoreResult<RoleAssignmentModel> {
        Ok(RoleAssignmentModel {
            id: self.id,
            role: self.role_id,
            user: None,
            team: Some(self.team_id),
            project: self.project_id,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_round_trip_keeps_scalars() {
        let create = UserCreate {
            email_opted_in: Some(true),
            ..UserCreate::new("alice")
                .with_full_name("Alice Liddell")
                .with_email("alice@example.com")
                .with_password("secret")
        };
        let model = UserSchema::from_create_model(&create)
            .unwrap()
            .to_model(())
            .unwrap();

        assert_eq!(model.name, "alice");
        assert_eq!(model.full_name, "Alice Liddell");
        assert_eq!(model.email.as_deref(), Some("alice@example.com"));
        assert_eq!(model.email_opted_in, Some(true));
        assert!(model.active);
        assert!(model.verify_password("secret"));
        assert!(model.activation_token_hash.is_none());
    }

    #[test]
    fn test_password_is_never_stored_in_plain_text() {
        let row = UserSchema::from_create_model(&UserCreate::new("bob").with_password("pw")).unwrap();
        let stored = row.password.unwrap();
        assert_ne!(stored, "pw");
        assert!(stored.starts_with("$argon2"));
    }

    #[test]
    fn test_user_update_sets_and_clears_email() {
        let row = UserSchema::from_create_model(&UserCreate::new("carol")).unwrap();

        let row = row
            .from_update_model(&UserUpdate {
                email: Some(Some("carol@example.com".to_string())),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(row.email.as_deref(), Some("carol@example.com"));

        // Leaving the field unset keeps the email.
        let row = row
            .from_update_model(&UserUpdate {
                full_name: Some("Carol".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(row.email.as_deref(), Some("carol@example.com"));

        let row = row
            .from_update_model(&UserUpdate {
                email: Some(None),
                ..Default::default()
            })
            .unwrap();
        assert!(row.email.is_none());
    }

    #[test]
    fn test_user_update_rehashes_password() {
        let row = UserSchema::from_create_model(&UserCreate::new("bob").with_password("old")).unwrap();
        let row = row
            .from_update_model(&UserUpdate {
                password: Some("new".to_string()),
                active: Some(false),
                ..Default::default()
            })
            .unwrap();
        let model = row.to_model(()).unwrap();

        assert!(model.verify_password("new"));
        assert!(!model.verify_password("old"));
        assert!(!model.active);
        assert_eq!(model.name, "bob");
    }

    #[test]
    fn test_role_permissions_round_trip() {
        let create = RoleCreate::new("admin")
            .with_permission(PermissionType::Read)
            .with_permission(PermissionType::Write);
        let row = RoleSchema::from_create_model(&create).unwrap();
        let permissions = row.permission_rows(&create.permissions);
        let model = row.to_model(permissions).unwrap();

        assert_eq!(model.permissions, create.permissions);
    }

    #[test]
    fn test_unknown_permission_is_decode_error() {
        let row = RoleSchema::from_create_model(&RoleCreate::new("odd")).unwrap();
        let rows = vec![RolePermissionSchema {
            name: "superuser".to_string(),
            role_id: row.id,
        }];
        assert_eq!(row.to_model(rows).unwrap_err().code(), "DECODE_ERROR");
    }

    #[test]
    fn test_assignment_rows_match_assignee() {
        let role = Uuid::new_v4();
        let team = Uuid::new_v4();
        let create = RoleAssignmentCreate::for_team(role, team);

        assert!(UserRoleAssignmentSchema::from_create_model(&create).is_err());
        let row = TeamRoleAssignmentSchema::from_create_model(&create).unwrap();
        let model = row.to_model(()).unwrap();
        assert_eq!(model.team, Some(team));
        assert_eq!(model.user, None);
        assert_eq!(model.project, None);
    }
}
