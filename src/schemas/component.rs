//! Row types for stack components and flavors.

use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{
    ComponentCreate, ComponentModel, ComponentUpdate, FlavorCreate, FlavorModel,
    StackComponentType,
};

use super::base::{id_or_new, OwnerRelations, Ownership, Persistable, Shareable, Timestamps, Updatable};
use super::config_codec::{decode_configuration, encode_configuration};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StackComponentSchema {
    pub id: Uuid,
    #[sqlx(flatten)]
    pub shareable: Shareable,
    #[sqlx(rename = "type")]
    pub component_type: String,
    pub flavor: String,
    /// Encoded with [`encode_configuration`].
    pub configuration: Vec<u8>,
    #[sqlx(flatten)]
    pub ownership: Ownership,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl StackComponentSchema {
    pub fn component_type(&self) -> StoreResult<StackComponentType> {
        self.component_type.parse()
    }
}

impl Persistable for StackComponentSchema {
    const ENTITY: &'static str = "stack_component";

    type Create = ComponentCreate;
    type Model = ComponentModel;
    type Related = OwnerRelations;

    fn from_create_model(create: &ComponentCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            shareable: Shareable {
                name: create.name.clone(),
                is_shared: create.is_shared,
            },
            component_type: create.component_type.as_str().to_string(),
            flavor: create.flavor.clone(),
            configuration: encode_configuration(&create.configuration)?,
            ownership: Ownership::new(create.project, create.user),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, owners: OwnerRelations) -> StoreResult<ComponentModel> {
        let (project, user) = owners.to_models()?;
        Ok(ComponentModel {
            id: self.id,
            name: self.shareable.name.clone(),
            component_type: self.component_type()?,
            flavor: self.flavor.clone(),
            configuration: decode_configuration(&self.configuration)?,
            is_shared: self.shareable.is_shared,
            project,
            user,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for StackComponentSchema {
    type Update = ComponentUpdate;

    fn from_update_model(mut self, update: &ComponentUpdate) -> StoreResult<Self> {
        self.ownership
            .ensure_unchanged(Self::ENTITY, update.project, update.user)?;

        if let Some(name) = &update.name {
            self.shareable.name = name.clone();
        }
        if let Some(is_shared) = update.is_shared {
            self.shareable.is_shared = is_shared;
        }
        if let Some(configuration) = &update.configuration {
            self.configuration = encode_configuration(configuration)?;
        }
        self.timestamps.touch();
        Ok(self)
    }
}

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct FlavorSchema {
    pub id: Uuid,
    pub name: String,
    #[sqlx(rename = "type")]
    pub component_type: String,
    pub source: String,
    pub config_schema: Json<serde_json::Value>,
    pub integration: Option<String>,
    #[sqlx(flatten)]
    pub ownership: Ownership,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for FlavorSchema {
    const ENTITY: &'static str = "flavor";

    type Create = FlavorCreate;
    type Model = FlavorModel;
    type Related = OwnerRelations;

    fn from_create_model(create: &FlavorCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            component_type: create.component_type.as_str().to_string(),
            source: create.source.clone(),
            config_schema: Json(create.config_schema.clone()),
            integration: create.integration.clone(),
            ownership: Ownership::new(create.project, create.user),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, owners: OwnerRelations) -> StoreResult<FlavorModel> {
        let (project, user) = owners.to_models()?;
        Ok(FlavorModel {
            id: self.id,
            name: self.name.clone(),
            component_type: self.component_type.parse()?,
            source: self.source.clone(),
            config_schema: self.config_schema.0.clone(),
            integration: self.integration.clone(),
            project,
            user,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}
