//! Stack component and flavor domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::StackComponentType;
use super::project::ProjectModel;
use super::user::UserModel;

/// Arbitrary user-supplied component configuration.
pub type ComponentConfiguration = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: StackComponentType,
    pub flavor: String,
    #[serde(default)]
    pub configuration: ComponentConfiguration,
    #[serde(default)]
    pub is_shared: bool,
    pub project: Uuid,
    pub user: Option<Uuid>,
}

impl ComponentCreate {
    pub fn new(
        name: impl Into<String>,
        component_type: StackComponentType,
        flavor: impl Into<String>,
        project: Uuid,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            component_type,
            flavor: flavor.into(),
            configuration: ComponentConfiguration::new(),
            is_shared: false,
            project,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_configuration(mut self, configuration: ComponentConfiguration) -> Self {
        self.configuration = configuration;
        self
    }

    pub fn shared(mut self) -> Self {
        self.is_shared = true;
        self
    }
}

/// Partial component update.
///
/// `project` and `user` may be echoed back by callers but must match the
/// stored owners; ownership never changes after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComponentUpdate {
    pub name: Option<String>,
    pub is_shared: Option<bool>,
    pub configuration: Option<ComponentConfiguration>,
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentModel {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: StackComponentType,
    pub flavor: String,
    pub configuration: ComponentConfiguration,
    pub is_shared: bool,
    pub project: ProjectModel,
    pub user: Option<UserModel>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// Request to persist a custom flavor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlavorCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: StackComponentType,
    /// Import path of the implementation backing this flavor.
    pub source: String,
    #[serde(default)]
    pub config_schema: serde_json::Value,
    pub integration: Option<String>,
    pub project: Uuid,
    pub user: Option<Uuid>,
}

impl FlavorCreate {
    pub fn new(
        name: impl Into<String>,
        component_type: StackComponentType,
        source: impl Into<String>,
        project: Uuid,
    ) -> Self {
        Self {
            id: None,
            name: name.into(),
            component_type,
            source: source.into(),
            config_schema: serde_json::Value::Null,
            integration: None,
            project,
            user: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FlavorModel {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: StackComponentType,
    pub source: String,
    pub config_schema: serde_json::Value,
    pub integration: Option<String>,
    pub project: ProjectModel,
    pub user: Option<UserModel>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
