//! Enumerations shared by the domain models.
//!
//! They are stored as lowercase text columns, so each enum knows how to
//! render itself (`as_str`) and how to parse the stored text back.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Kind of a stack component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StackComponentType {
    Alerter,
    Annotator,
    ArtifactStore,
    ContainerRegistry,
    DataValidator,
    ExperimentTracker,
    FeatureStore,
    ImageBuilder,
    ModelDeployer,
    Orchestrator,
    SecretsManager,
    StepOperator,
}

impl StackComponentType {
    pub const ALL: [StackComponentType; 12] = [
        StackComponentType::Alerter,
        StackComponentType::Annotator,
        StackComponentType::ArtifactStore,
        StackComponentType::ContainerRegistry,
        StackComponentType::DataValidator,
        StackComponentType::ExperimentTracker,
        StackComponentType::FeatureStore,
        StackComponentType::ImageBuilder,
        StackComponentType::ModelDeployer,
        StackComponentType::Orchestrator,
        StackComponentType::SecretsManager,
        StackComponentType::StepOperator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StackComponentType::Alerter => "alerter",
            StackComponentType::Annotator => "annotator",
            StackComponentType::ArtifactStore => "artifact_store",
            StackComponentType::ContainerRegistry => "container_registry",
            StackComponentType::DataValidator => "data_validator",
            StackComponentType::ExperimentTracker => "experiment_tracker",
            StackComponentType::FeatureStore => "feature_store",
            StackComponentType::ImageBuilder => "image_builder",
            StackComponentType::ModelDeployer => "model_deployer",
            StackComponentType::Orchestrator => "orchestrator",
            StackComponentType::SecretsManager => "secrets_manager",
            StackComponentType::StepOperator => "step_operator",
        }
    }
}

impl fmt::Display for StackComponentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StackComponentType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| StoreError::Decode(format!("unknown stack component type '{}'", s)))
    }
}

/// Permission granted by a role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionType {
    Read,
    Write,
    Me,
}

impl PermissionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            PermissionType::Read => "read",
            PermissionType::Write => "write",
            PermissionType::Me => "me",
        }
    }
}

impl fmt::Display for PermissionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PermissionType {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "read" => Ok(PermissionType::Read),
            "write" => Ok(PermissionType::Write),
            "me" => Ok(PermissionType::Me),
            other => Err(StoreError::Decode(format!("unknown permission '{}'", other))),
        }
    }
}

/// Execution status of a pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    #[default]
    Running,
    Completed,
    Failed,
    Cached,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cached => "cached",
        }
    }

    /// Whether the run has stopped executing.
    pub fn is_finished(&self) -> bool {
        !matches!(self, ExecutionStatus::Running)
    }
}

impl fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExecutionStatus {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ExecutionStatus::Running),
            "completed" => Ok(ExecutionStatus::Completed),
            "failed" => Ok(ExecutionStatus::Failed),
            "cached" => Ok(ExecutionStatus::Cached),
            other => Err(StoreError::Decode(format!(
                "unknown execution status '{}'",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_type_text_matches_serde() {
        for t in StackComponentType::ALL {
            let json = serde_json::to_string(&t).unwrap();
            assert_eq!(json, format!("\"{}\"", t.as_str()));
            assert_eq!(t.as_str().parse::<StackComponentType>().unwrap(), t);
        }
    }

    #[test]
    fn test_unknown_component_type_is_decode_error() {
        let err = "spaceship".parse::<StackComponentType>().unwrap_err();
        assert_eq!(err.code(), "DECODE_ERROR");
    }

    #[test]
    fn test_permission_parse() {
        assert_eq!("write".parse::<PermissionType>().unwrap(), PermissionType::Write);
        assert!("admin".parse::<PermissionType>().is_err());
    }

    #[test]
    fn test_execution_status() {
        assert!(!ExecutionStatus::Running.is_finished());
        assert!(ExecutionStatus::Failed.is_finished());
        assert_eq!(
            "cached".parse::<ExecutionStatus>().unwrap(),
            ExecutionStatus::Cached
        );
    }
}
