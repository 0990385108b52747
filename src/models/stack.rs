//! Stack domain models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::component::ComponentModel;
use super::enums::StackComponentType;
use super::project::ProjectModel;
use super::user::UserModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub is_shared: bool,
    pub project: Uuid,
    pub user: Option<Uuid>,
    /// Ids of the components making up the stack.
    #[serde(default)]
    pub components: Vec<Uuid>,
}

impl StackCreate {
    pub fn new(name: impl Into<String>, project: Uuid) -> Self {
        Self {
            id: None,
            name: name.into(),
            is_shared: false,
            project,
            user: None,
            components: Vec::new(),
        }
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_component(mut self, component: Uuid) -> Self {
        self.components.push(component);
        self
    }

    pub fn shared(mut self) -> Self {
        self.is_shared = true;
        self
    }
}

/// Partial stack update. A supplied component list replaces the current
/// composition wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StackUpdate {
    pub name: Option<String>,
    pub is_shared: Option<bool>,
    pub components: Option<Vec<Uuid>>,
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StackModel {
    pub id: Uuid,
    pub name: String,
    pub is_shared: bool,
    pub project: ProjectModel,
    pub user: Option<UserModel>,
    pub components: BTreeMap<StackComponentType, Vec<ComponentModel>>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl StackModel {
    /// The first component of the given type, if any.
    pub fn component(&self, component_type: StackComponentType) -> Option<&ComponentModel> {
        self.components
            .get(&component_type)
            .and_then(|list| list.first())
    }

    /// Ids of every component in the stack.
    pub fn component_ids(&self) -> Vec<Uuid> {
        self.components.values().flatten().map(|c| c.id).collect()
    }
}
