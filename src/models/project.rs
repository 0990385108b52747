//! Project domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request to create a project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl ProjectCreate {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// Partial project update. `None` leaves the field untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// A project as seen by callers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectModel {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
