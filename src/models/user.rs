//! User, team and role domain models.

use std::collections::BTreeSet;

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};

use super::enums::PermissionType;

/// Hashes a secret (password or activation token) with Argon2id and a fresh
/// random salt. The result is a PHC string (`$argon2id$v=19$...`).
pub fn hash_secret(secret: &str) -> StoreResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map_err(|e| StoreError::Secret(e.to_string()))?;
    Ok(hash.to_string())
}

/// Checks `candidate` against a hash produced by [`hash_secret`]. A stored
/// value that is not a valid PHC string never verifies.
pub fn verify_secret(hash: &str, candidate: &str) -> bool {
    match PasswordHash::new(hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(candidate.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

/// Request to create a user. Secrets are given in plain text and hashed
/// before they are persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub full_name: String,
    pub email: Option<String>,
    pub email_opted_in: Option<bool>,
    #[serde(default)]
    pub active: bool,
    pub password: Option<String>,
    pub activation_token: Option<String>,
}

impl UserCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            active: true,
            ..Default::default()
        }
    }

    pub fn with_full_name(mut self, full_name: impl Into<String>) -> Self {
        self.full_name = full_name.into();
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserUpdate {
    pub name: Option<String>,
    pub full_name: Option<String>,
    /// `Some(None)` clears the stored email, `None` leaves it untouched.
    #[serde(default, deserialize_with = "present_or_null")]
    pub email: Option<Option<String>>,
    pub email_opted_in: Option<bool>,
    pub active: Option<bool>,
    pub password: Option<String>,
    pub activation_token: Option<String>,
}

/// Maps a present field to `Some`, so an explicit `null` becomes `Some(None)`.
fn present_or_null<'de, D>(deserializer: D) -> Result<Option<Option<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserModel {
    pub id: Uuid,
    pub name: String,
    pub full_name: String,
    pub email: Option<String>,
    pub email_opted_in: Option<bool>,
    pub active: bool,
    #[serde(skip_serializing, default)]
    pub password_hash: Option<String>,
    #[serde(skip_serializing, default)]
    pub activation_token_hash: Option<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl UserModel {
    pub fn verify_password(&self, candidate: &str) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| verify_secret(hash, candidate))
    }

    pub fn verify_activation_token(&self, candidate: &str) -> bool {
        self.activation_token_hash
            .as_deref()
            .is_some_and(|hash| verify_secret(hash, candidate))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamCreate {
    pub id: Option<Uuid>,
    pub name: String,
}

impl TeamCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: None,
            name: name.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TeamUpdate {
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeamModel {
    pub id: Uuid,
    pub name: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeSet<PermissionType>,
}

impl RoleCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_permission(mut self, permission: PermissionType) -> Self {
        self.permissions.insert(permission);
        self
    }
}

/// Partial role update. A supplied permission set replaces the stored one.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoleUpdate {
    pub name: Option<String>,
    pub permissions: Option<BTreeSet<PermissionType>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleModel {
    pub id: Uuid,
    pub name: String,
    pub permissions: BTreeSet<PermissionType>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Who a role is granted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "id")]
pub enum Assignee {
    User(Uuid),
    Team(Uuid),
}

/// Request to grant a role, globally (`project == None`) or within one
/// project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleAssignmentCreate {
    pub id: Option<Uuid>,
    pub role: Uuid,
    pub assignee: Assignee,
    pub project: Option<Uuid>,
}

impl RoleAssignmentCreate {
    pub fn for_user(role: Uuid, user: Uuid) -> Self {
        Self {
            id: None,
            role,
            assignee: Assignee::User(user),
            project: None,
        }
    }

    pub fn for_team(role: Uuid, team: Uuid) -> Self {
        Self {
            id: None,
            role,
            assignee: Assignee::Team(team),
            project: None,
        }
    }

    pub fn in_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoleAssignmentModel {
    pub id: Uuid,
    pub role: Uuid,
    pub user: Option<Uuid>,
    pub team: Option<Uuid>,
    pub project: Option<Uuid>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_secret_verifies() {
        let hash = hash_secret("hunter2").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret(&hash, "hunter2"));
        assert!(!verify_secret(&hash, "hunter3"));
    }

    #[test]
    fn test_hash_secret_is_salted() {
        assert_ne!(hash_secret("same").unwrap(), hash_secret("same").unwrap());
    }

    #[test]
    fn test_verify_rejects_malformed_hash() {
        assert!(!verify_secret("plaintext", "plaintext"));
        assert!(!verify_secret("md5$abc$def", "x"));
        // Salted SHA-256 digests from older stores are not accepted.
        assert!(!verify_secret("sha256$0011$aabb", "x"));
    }

    #[test]
    fn test_user_model_hides_secrets_when_serialized() {
        let now = Utc::now();
        let user = UserModel {
            id: Uuid::new_v4(),
            name: "alice".to_string(),
            full_name: String::new(),
            email: None,
            email_opted_in: None,
            active: true,
            password_hash: Some(hash_secret("pw").unwrap()),
            activation_token_hash: None,
            created: now,
            updated: now,
        };

        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password"));
        assert!(user.verify_password("pw"));
        assert!(!user.verify_activation_token("pw"));
    }

    #[test]
    fn test_user_update_email_distinguishes_null_from_missing() {
        let update: UserUpdate = serde_json::from_str(r#"{"email": null}"#).unwrap();
        assert_eq!(update.email, Some(None));

        let update: UserUpdate = serde_json::from_str(r#"{"email": "a@b.c"}"#).unwrap();
        assert_eq!(update.email, Some(Some("a@b.c".to_string())));

        let update: UserUpdate = serde_json::from_str("{}").unwrap();
        assert_eq!(update.email, None);
    }

    #[test]
    fn test_role_assignment_builder() {
        let role = Uuid::new_v4();
        let user = Uuid::new_v4();
        let project = Uuid::new_v4();
        let create = RoleAssignmentCreate::for_user(role, user).in_project(project);

        assert_eq!(create.assignee, Assignee::User(user));
        assert_eq!(create.project, Some(project));
    }
}
