//! Flavor registry.
//!
//! A [`FlavorRegistry`] knows which implementations ("flavors") exist for
//! each kind of stack component. It is built once at startup, from the
//! built-in flavors plus any custom flavors persisted in a project, and is
//! passed by reference to whatever needs to validate components.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{StoreError, StoreResult};
use crate::models::{ComponentCreate, FlavorModel, StackComponentType};
use crate::storage::{Database, FlavorFilter};

/// Entity name used for registry lookups in errors.
const FLAVOR: &str = "flavor";

/// A registered flavor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FlavorEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: StackComponentType,
    /// Import path of the implementation.
    pub source: String,
    /// Integration that provides the flavor, `None` for core flavors.
    pub integration: Option<String>,
    /// Whether components of this flavor run outside the local machine.
    pub remote: bool,
    /// Whether the flavor was loaded from the store rather than built in.
    pub custom: bool,
}

impl FlavorEntry {
    pub fn builtin(
        name: &str,
        component_type: StackComponentType,
        source: &str,
        integration: Option<&str>,
        remote: bool,
    ) -> Self {
        Self {
            name: name.to_string(),
            component_type,
            source: source.to_string(),
            integration: integration.map(str::to_string),
            remote,
            custom: false,
        }
    }
}

impl From<&FlavorModel> for FlavorEntry {
    fn from(flavor: &FlavorModel) -> Self {
        Self {
            name: flavor.name.clone(),
            component_type: flavor.component_type,
            source: flavor.source.clone(),
            integration: flavor.integration.clone(),
            remote: flavor.integration.is_some(),
            custom: true,
        }
    }
}

/// Flavors keyed by component type and flavor name.
#[derive(Debug, Clone, Default)]
pub struct FlavorRegistry {
    entries: BTreeMap<(StackComponentType, String), FlavorEntry>,
}

impl FlavorRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the flavors that ship with the store.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for entry in builtin_flavors() {
            // The built-in table has no repeated keys.
            let _ = registry.register(entry);
        }
        registry
    }

    /// Register a flavor.
    ///
    /// # Errors
    /// Returns `Duplicate` if a flavor with the same type and name exists.
    pub fn register(&mut self, entry: FlavorEntry) -> StoreResult<()> {
        let key = (entry.component_type, entry.name.clone());
        if self.entries.contains_key(&key) {
            return Err(StoreError::duplicate(
                FLAVOR,
                format!("{}/{}", entry.component_type, entry.name),
            ));
        }
        self.entries.insert(key, entry);
        Ok(())
    }

    /// Adds the custom flavors persisted in a project.
    ///
    /// A stored flavor whose name collides with an already-registered one is
    /// skipped. Returns the number of flavors added.
    pub async fn load_from_store(&mut self, db: &Database, project_id: Uuid) -> StoreResult<usize> {
        let flavors = db
            .list_flavors(&FlavorFilter::new().with_project(project_id))
            .await?;

        let mut added = 0;
        for flavor in &flavors {
            match self.register(FlavorEntry::from(flavor)) {
                Ok(()) => added += 1,
                Err(err) => warn!(flavor = %flavor.name, error = %err, "Skipping stored flavor"),
            }
        }

        debug!(project_id = %project_id, added, "Loaded stored flavors");
        Ok(added)
    }

    pub fn get(&self, component_type: StackComponentType, name: &str) -> Option<&FlavorEntry> {
        self.entries.get(&(component_type, name.to_string()))
    }

    /// Checks that a component names a registered flavor for its type.
    ///
    /// # Errors
    /// Returns `NotFound` for an unknown flavor.
    pub fn validate_component(&self, component: &ComponentCreate) -> StoreResult<&FlavorEntry> {
        self.get(component.component_type, &component.flavor)
            .ok_or_else(|| {
                StoreError::not_found(
                    FLAVOR,
                    format!("{}/{}", component.component_type, component.flavor),
                )
            })
    }

    /// All flavors of one component type, by name.
    pub fn flavors_for(&self, component_type: StackComponentType) -> Vec<&FlavorEntry> {
        self.entries
            .values()
            .filter(|entry| entry.component_type == component_type)
            .collect()
    }

    /// Get all flavors, ordered by type and name.
    pub fn all(&self) -> Vec<&FlavorEntry> {
        self.entries.values().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn builtin_flavors() -> Vec<FlavorEntry> {
    use StackComponentType::*;

    vec![
        FlavorEntry::builtin(
            "local",
            Orchestrator,
            "flavors.orchestrators.LocalOrchestratorFlavor",
            None,
            false,
        ),
        FlavorEntry::builtin(
            "local",
            ArtifactStore,
            "flavors.artifact_stores.LocalArtifactStoreFlavor",
            None,
            false,
        ),
        FlavorEntry::builtin(
            "local",
            SecretsManager,
            "flavors.secrets_managers.LocalSecretsManagerFlavor",
            None,
            false,
        ),
        FlavorEntry::builtin(
            "default",
            ContainerRegistry,
            "flavors.container_registries.DefaultContainerRegistryFlavor",
            None,
            false,
        ),
        FlavorEntry::builtin(
            "kubeflow",
            Orchestrator,
            "integrations.kubeflow.flavors.KubeflowOrchestratorFlavor",
            Some("kubeflow"),
            true,
        ),
        FlavorEntry::builtin(
            "tekton",
            Orchestrator,
            "integrations.tekton.flavors.TektonOrchestratorFlavor",
            Some("tekton"),
            true,
        ),
        FlavorEntry::builtin(
            "azureml",
            StepOperator,
            "integrations.azure.flavors.AzureMLStepOperatorFlavor",
            Some("azure"),
            true,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtins_are_registered() {
        let registry = FlavorRegistry::with_builtins();
        assert!(!registry.is_empty());
        assert!(registry.get(StackComponentType::Orchestrator, "local").is_some());
        assert!(registry.get(StackComponentType::ArtifactStore, "local").is_some());

        let azureml = registry
            .get(StackComponentType::StepOperator, "azureml")
            .unwrap();
        assert!(azureml.remote);
        assert_eq!(azureml.integration.as_deref(), Some("azure"));
    }

    #[test]
    fn test_same_name_different_type_is_allowed() {
        let registry = FlavorRegistry::with_builtins();
        let locals: Vec<_> = registry
            .all()
            .into_iter()
            .filter(|entry| entry.name == "local")
            .collect();
        assert!(locals.len() >= 2);
    }

    #[test]
    fn test_register_duplicate() {
        let mut registry = FlavorRegistry::with_builtins();
        let err = registry
            .register(FlavorEntry::builtin(
                "kubeflow",
                StackComponentType::Orchestrator,
                "elsewhere.Kubeflow",
                None,
                true,
            ))
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_ERROR");
    }

    #[test]
    fn test_validate_component() {
        let registry = FlavorRegistry::with_builtins();
        let project = Uuid::new_v4();

        let known = ComponentCreate::new("orch", StackComponentType::Orchestrator, "tekton", project);
        assert_eq!(registry.validate_component(&known).unwrap().name, "tekton");

        // azureml exists, but only as a step operator
        let wrong_type =
            ComponentCreate::new("orch", StackComponentType::Orchestrator, "azureml", project);
        let err = registry.validate_component(&wrong_type).unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[test]
    fn test_flavors_for_type() {
        let registry = FlavorRegistry::with_builtins();
        let names: Vec<&str> = registry
            .flavors_for(StackComponentType::Orchestrator)
            .iter()
            .map(|entry| entry.name.as_str())
            .collect();
        assert_eq!(names, vec!["kubeflow", "local", "tekton"]);
    }

    #[tokio::test]
    async fn test_load_from_store() {
        let db = Database::in_memory().await.unwrap();
        let project = db
            .create_project(&crate::models::ProjectCreate::new("p1"))
            .await
            .unwrap();
        db.create_flavor(&crate::models::FlavorCreate::new(
            "airflow",
            StackComponentType::Orchestrator,
            "my_flavors.AirflowOrchestratorFlavor",
            project.id,
        ))
        .await
        .unwrap();
        db.create_flavor(&crate::models::FlavorCreate::new(
            "local",
            StackComponentType::Orchestrator,
            "my_flavors.Shadow",
            project.id,
        ))
        .await
        .unwrap();

        let mut registry = FlavorRegistry::with_builtins();
        let added = registry.load_from_store(&db, project.id).await.unwrap();

        assert_eq!(added, 1);
        let airflow = registry
            .get(StackComponentType::Orchestrator, "airflow")
            .unwrap();
        assert!(airflow.custom);
        assert!(!registry
            .get(StackComponentType::Orchestrator, "local")
            .unwrap()
            .custom);
    }
}
