//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use stack_metastore::models::{
    ComponentCreate, ComponentModel, ProjectCreate, ProjectModel, StackComponentType, UserCreate,
    UserModel,
};
use stack_metastore::Database;
use uuid::Uuid;

/// A fresh, migrated in-memory store.
pub async fn store() -> Database {
    Database::in_memory()
        .await
        .expect("in-memory store should open")
}

pub async fn project(db: &Database, name: &str) -> ProjectModel {
    db.create_project(&ProjectCreate::new(name))
        .await
        .expect("project should be created")
}

pub async fn user(db: &Database, name: &str) -> UserModel {
    db.create_user(&UserCreate::new(name))
        .await
        .expect("user should be created")
}

pub async fn component(
    db: &Database,
    project: Uuid,
    user: Option<Uuid>,
    component_type: StackComponentType,
    name: &str,
) -> ComponentModel {
    let mut create = ComponentCreate::new(name, component_type, "local", project);
    create.user = user;
    db.create_component(&create)
        .await
        .expect("component should be created")
}
