//! Row types for stacks and their component composition.

use std::collections::BTreeMap;

use sqlx::FromRow;
use uuid::Uuid;

use crate::error::StoreResult;
use crate::models::{ComponentModel, StackCreate, StackModel, StackUpdate};

use super::base::{id_or_new, OwnerRelations, Ownership, Persistable, Shareable, Timestamps, Updatable};

#[derive(Debug, Clone, PartialEq, FromRow)]
pub struct StackSchema {
    pub id: Uuid,
    #[sqlx(flatten)]
    pub shareable: Shareable,
    #[sqlx(flatten)]
    pub ownership: Ownership,
    #[sqlx(flatten)]
    pub timestamps: Timestamps,
}

impl StackSchema {
    /// Composition rows for the given component ids, without duplicates.
    pub fn composition(&self, component_ids: &[Uuid]) -> Vec<StackCompositionSchema> {
        let mut seen = Vec::with_capacity(component_ids.len());
        for id in component_ids {
            if !seen.contains(id) {
                seen.push(*id);
            }
        }
        seen.into_iter()
            .map(|component_id| StackCompositionSchema {
                stack_id: self.id,
                component_id,
            })
            .collect()
    }
}

/// Related rows needed to build a [`StackModel`].
#[derive(Debug, Clone)]
pub struct StackRelations {
    pub owners: OwnerRelations,
    pub components: Vec<ComponentModel>,
}

impl Persistable for StackSchema {
    const ENTITY: &'static str = "stack";

    type Create = StackCreate;
    type Model = StackModel;
    type Related = StackRelations;

    fn from_create_model(create: &StackCreate) -> StoreResult<Self> {
        Ok(Self {
            id: id_or_new(create.id),
            shareable: Shareable {
                name: create.name.clone(),
                is_shared: create.is_shared,
            },
            ownership: Ownership::new(create.project, create.user),
            timestamps: Timestamps::now(),
        })
    }

    fn to_model(&self, related: StackRelations) -> StoreResult<StackModel> {
        let (project, user) = related.owners.to_models()?;

        let mut components = BTreeMap::new();
        for component in related.components {
            components
                .entry(component.component_type)
                .or_insert_with(Vec::new)
                .push(component);
        }

        Ok(StackModel {
            id: self.id,
            name: self.shareable.name.clone(),
            is_shared: self.shareable.is_shared,
            project,
            user,
            components,
            created: self.timestamps.created,
            updated: self.timestamps.updated,
        })
    }
}

impl Updatable for StackSchema {
    type Update = StackUpdate;

    /// Applies scalar changes. The component list, when present, is written
    /// by the caller as a fresh composition.
    fn from_update_model(mut self, update: &StackUpdate) -> StoreResult<Self> {
        self.ownership
            .ensure_unchanged(Self::ENTITY, update.project, update.user)?;

        if let Some(name) = &update.name {
            self.shareable.name = name.clone();
        }
        if let Some(is_shared) = update.is_shared {
            self.shareable.is_shared = is_shared;
        }
        self.timestamps.touch();
        Ok(self)
    }
}

/// Join row between stacks and stack components.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRow)]
pub struct StackCompositionSchema {
    pub stack_id: Uuid,
    pub component_id: Uuid,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ComponentCreate, ProjectCreate, StackComponentType, UserCreate};
    use crate::schemas::{ProjectSchema, StackComponentSchema, UserSchema};

    fn owners() -> OwnerRelations {
        OwnerRelations {
            project: ProjectSchema::from_create_model(&ProjectCreate::new("p1")).unwrap(),
            user: Some(UserSchema::from_create_model(&UserCreate::new("alice")).unwrap()),
        }
    }

    fn component(owners: &OwnerRelations, name: &str, t: StackComponentType) -> ComponentModel {
        StackComponentSchema::from_create_model(&ComponentCreate::new(name, t, "local", owners.project.id))
            .unwrap()
            .to_model(owners.clone())
            .unwrap()
    }

    #[test]
    fn test_to_model_groups_components_by_type() {
        let owners = owners();
        let stack = StackSchema::from_create_model(&StackCreate::new("s1", owners.project.id)).unwrap();
        let components = vec![
            component(&owners, "orch", StackComponentType::Orchestrator),
            component(&owners, "store", StackComponentType::ArtifactStore),
        ];

        let model = stack
            .to_model(StackRelations {
                owners: owners.clone(),
                components,
            })
            .unwrap();

        assert_eq!(model.components.len(), 2);
        assert_eq!(
            model.component(StackComponentType::Orchestrator).unwrap().name,
            "orch"
        );
        assert_eq!(model.project.name, "p1");
        assert_eq!(model.user.unwrap().name, "alice");
    }

    #[test]
    fn test_update_rejects_user_change() {
        let owners = owners();
        let user = owners.user.as_ref().unwrap().id;
        let stack = StackSchema::from_create_model(
            &StackCreate::new("s1", owners.project.id).with_user(user),
        )
        .unwrap();

        let same = stack
            .clone()
            .from_update_model(&StackUpdate {
                user: Some(user),
                name: Some("s2".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(same.shareable.name, "s2");

        let err = stack
            .from_update_model(&StackUpdate {
                user: Some(Uuid::new_v4()),
                ..Default::default()
            })
            .unwrap_err();
        assert_eq!(err.code(), "CONSISTENCY_ERROR");
    }

    #[test]
    fn test_composition_deduplicates() {
        let owners = owners();
        let stack = StackSchema::from_create_model(&StackCreate::new("s1", owners.project.id)).unwrap();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        let rows = stack.composition(&[a, b, a]);
        assert_eq!(rows.len(), 2);
        assert!(rows.iter().all(|r| r.stack_id == stack.id));
    }
}
