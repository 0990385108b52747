//! Row types for pipelines and pipeline runs.

use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    ExecutionStatus, PipelineCreate, PipelineModel, PipelineRunCreate, PipelineRunModel,
    PipelineRunUpdate, PipelineUpdate,
};

use super::base::{id_or_new, OwnerRelations, Ownership, Persistable, Timestamps, Updatable};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PipelineSchema {
    pub id: Uuid,
    pub name: String,
    pub docstring: Option<String>,
    pub spec: Json<serde_json::Value>,
    #[sqlx(flatten)]
    pub ownership: Ownership,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for PipelineSchema {
    const ENTITY: &'static str = "pipeline";

    type Create = PipelineCreate;
    type Model = PipelineModel;
    type Related = OwnerRelations;

    fn from_create_model(create: &PipelineCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            docstring: create.docstring.clone(),
            spec: Json(create.spec.clone()),
            ownership: Ownership::new(create.project, create.user),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, owners: OwnerRelations) -> StoreResult<PipelineModel> {
        let (project, user) = owners.to_models()?;
        Ok(PipelineModel {
            id: self.id,
            name: self.name.clone(),
            docstring: self.docstring.clone(),
            spec: self.spec.0.clone(),
            project,
            user,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for PipelineSchema {
    type Update = PipelineUpdate;

    fn from_update_model(mut self, update: &PipelineUpdate) -> StoreResult<Self> {
        self.ownership
            .ensure_unchanged(Self::ENTITY, update.project, update.user)?;

        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(docstring) = &update.docstring {
            self.docstring = Some(docstring.clone());
        }
        if let Some(spec) = &update.spec {
            self.spec = Json(spec.clone());
        }
        self.timestamps.touch();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct PipelineRunSchema {
    pub id: Uuid,
    pub name: String,
    pub status: String,
    pub pipeline_id: Option<Uuid>,
    pub stack_id: Option<Uuid>,
    pub pipeline_configuration: Json<serde_json::Value>,
    pub num_steps: Option<i64>,
    #[sqlx(flatten)]
    pub ownership: Ownership,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for PipelineRunSchema {
    const ENTITY: &'static str = "pipeline_run";

    type Create = PipelineRunCreate;
    type Model = PipelineRunModel;
    type Related = OwnerRelations;

    fn from_create_model(create: &PipelineRunCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            status: create.status.as_str().to_string(),
            pipeline_id: create.pipeline,
            stack_id: create.stack,
            pipeline_configuration: Json(create.pipeline_configuration.clone()),
            num_steps: create.num_steps,
            ownership: Ownership::new(create.project, create.user),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, owners: OwnerRelations) -> StoreResult<PipelineRunModel> {
        let (project, user) = owners.to_models()?;
        Ok(PipelineRunModel {
            id: self.id,
            name: self.name.clone(),
            status: self.status.parse::<ExecutionStatus>()?,
            pipeline: self.pipeline_id,
            stack: self.stack_id,
            pipeline_configuration: self.pipeline_configuration.0.clone(),
            num_steps: self.num_steps,
            project,
            user,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for PipelineRunSchema {
    type Update = PipelineRunUpdate;

    fn from_update_model(mut self, update: &PipelineRunUpdate) -> StoreResult<Self> {
        self.ownership
            .ensure_unchanged(Self::ENTITY, update.project, update.user)?;

        if let Some(status) = update.status {
            self.status = status.as_str().to_string();
        }
        if let Some(num_steps) = update.num_steps {
            self.num_steps = Some(num_steps);
        }
        self.timestamps.touch();
        Ok(self)
    }
}
