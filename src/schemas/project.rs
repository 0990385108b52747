//! Row type for projects.

use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{ProjectCreate, ProjectModel, ProjectUpdate};

use super::base::{id_or_new, Persistable, Timestamps, Updatable};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct ProjectSchema {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl Persistable for ProjectSchema {
    const ENTITY: &'static str = "project";

    type Create = ProjectCreate;
    type Model = ProjectModel;
    type Related = ();

    fn from_create_model(create: &ProjectCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            name: create.name.clone(),
            description: create.description.clone(),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, _: ()) -> StoreResult<ProjectModel> {
        Ok(ProjectModel {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for ProjectSchema {
    type Update = ProjectUpdate;

    fn from_update_model(mut self, update: &ProjectUpdate) -> StoreResult<Self> {
        if let Some(name) = &update.name {
            self.name = name.clone();
        }
        if let Some(description) = &update.description {
            self.description = description.clone();
        }
        self.timestamps.touch();
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_round_trip() {
        let create = ProjectCreate::new("p1").with_description("first project");
        let row = ProjectSchema::from_create_model(&create).unwrap();
        let model = row.to_model(()).unwrap();

        assert_eq!(model.name, "p1");
        assert_eq!(model.description, "first project");
        assert_eq!(model.created, model.updated);
    }

    #[test]
    fn test_supplied_id_is_kept() {
        let id = Uuid::new_v4();
        let create = ProjectCreate {
            id: Some(id),
            ..ProjectCreate::new("p1")
        };
        assert_eq!(ProjectSchema::from_create_model(&create).unwrap().id, id);
    }

    #[test]
    fn test_partial_update_leaves_unset_fields() {
        let row = ProjectSchema::from_create_model(&ProjectCreate::new("p1").with_description("d"))
            .unwrap();
        let created = row.timestamps.created;

        let row = row
            .from_update_model(&ProjectUpdate {
                name: Some("renamed".to_string()),
                description: None,
            })
            .unwrap();

        assert_eq!(row.name, "renamed");
        assert_eq!(row.description, "d");
        assert_eq!(row.timestamps.created, created);
        assert!(row.timestamps.updated >= created);
    }
}
