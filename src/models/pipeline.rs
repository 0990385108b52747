//! Pipeline and pipeline run domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::ExecutionStatus;
use super::project::ProjectModel;
use super::user::UserModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineCreate {
    pub id: Option<Uuid>,
    pub name: String,
    pub docstring: Option<String>,
    /// Step graph of the pipeline as produced by the pipeline compiler.
    #[serde(default)]
    pub spec: serde_json::Value,
    pub project: Uuid,
    pub user: Option<Uuid>,
}

impl PipelineCreate {
    pub fn new(name: impl Into<String>, project: Uuid) -> Self {
        Self {
            id: None,
            name: name.into(),
            docstring: None,
            spec: serde_json::Value::Null,
            project,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineUpdate {
    pub name: Option<String>,
    pub docstring: Option<String>,
    pub spec: Option<serde_json::Value>,
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineModel {
    pub id: Uuid,
    pub name: String,
    pub docstring: Option<String>,
    pub spec: serde_json::Value,
    pub project: ProjectModel,
    pub user: Option<UserModel>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRunCreate {
    pub id: Option<Uuid>,
    pub name: String,
    #[serde(default)]
    pub status: ExecutionStatus,
    pub pipeline: Option<Uuid>,
    pub stack: Option<Uuid>,
    #[serde(default)]
    pub pipeline_configuration: serde_json::Value,
    pub num_steps: Option<i64>,
    pub project: Uuid,
    pub user: Option<Uuid>,
}

impl PipelineRunCreate {
    pub fn new(name: impl Into<String>, project: Uuid) -> Self {
        Self {
            id: None,
            name: name.into(),
            status: ExecutionStatus::Running,
            pipeline: None,
            stack: None,
            pipeline_configuration: serde_json::Value::Null,
            num_steps: None,
            project,
            user: None,
        }
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn on_stack(mut self, stack: Uuid) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn of_pipeline(mut self, pipeline: Uuid) -> Self {
        self.pipeline = Some(pipeline);
        self
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineRunUpdate {
    pub status: Option<ExecutionStatus>,
    pub num_steps: Option<i64>,
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineRunModel {
    pub id: Uuid,
    pub name: String,
    pub status: ExecutionStatus,
    pub pipeline: Option<Uuid>,
    pub stack: Option<Uuid>,
    pub pipeline_configuration: serde_json::Value,
    pub num_steps: Option<i64>,
    pub project: ProjectModel,
    pub user: Option<UserModel>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}
