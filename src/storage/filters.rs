//! Filters for list operations.
//!
//! Every field left as `None` matches all rows. Set fields are combined
//! with `AND`.

use sqlx::query::QueryAs;
use sqlx::sqlite::{Sqlite, SqliteArguments};
use uuid::Uuid;

use crate::models::{ExecutionStatus, StackComponentType};

#[derive(Debug, Clone, PartialEq)]
enum FilterParam {
    Id(Uuid),
    Text(String),
    Flag(bool),
}

/// A `WHERE` clause with its positional parameters.
#[derive(Debug, Default)]
pub(crate) struct WhereClause {
    conditions: Vec<String>,
    params: Vec<FilterParam>,
}

impl WhereClause {
    fn id(mut self, column: &str, value: Option<Uuid>) -> Self {
        if let Some(id) = value {
            self.conditions.push(format!("{} = ?", column));
            self.params.push(FilterParam::Id(id));
        }
        self
    }

    fn text(mut self, column: &str, value: Option<&str>) -> Self {
        if let Some(text) = value {
            self.conditions.push(format!("{} = ?", column));
            self.params.push(FilterParam::Text(text.to_string()));
        }
        self
    }

    fn flag(mut self, column: &str, value: Option<bool>) -> Self {
        if let Some(flag) = value {
            self.conditions.push(format!("{} = ?", column));
            self.params.push(FilterParam::Flag(flag));
        }
        self
    }

    /// The clause text, empty when nothing is filtered.
    pub fn sql(&self) -> String {
        if self.conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.conditions.join(" AND "))
        }
    }

    /// Binds the parameters in clause order.
    pub fn bind<'q, O>(
        &self,
        mut query: QueryAs<'q, Sqlite, O, SqliteArguments<'q>>,
    ) -> QueryAs<'q, Sqlite, O, SqliteArguments<'q>> {
        for param in &self.params {
            query = match param {
                FilterParam::Id(id) => query.bind(*id),
                FilterParam::Text(text) => query.bind(text.clone()),
                FilterParam::Flag(flag) => query.bind(*flag),
            };
        }
        query
    }
}

/// Filter for listing stack components.
#[derive(Debug, Default, Clone)]
pub struct ComponentFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub component_type: Option<StackComponentType>,
    pub flavor: Option<String>,
    pub name: Option<String>,
    pub is_shared: Option<bool>,
}

impl ComponentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_type(mut self, component_type: StackComponentType) -> Self {
        self.component_type = Some(component_type);
        self
    }

    pub fn with_flavor(mut self, flavor: impl Into<String>) -> Self {
        self.flavor = Some(flavor.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_shared(mut self, is_shared: bool) -> Self {
        self.is_shared = Some(is_shared);
        self
    }

    pub(crate) fn where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("project_id", self.project)
            .id("user_id", self.user)
            .text("type", self.component_type.map(|t| t.as_str()))
            .text("flavor", self.flavor.as_deref())
            .text("name", self.name.as_deref())
            .flag("is_shared", self.is_shared)
    }
}

/// Filter for listing stacks.
#[derive(Debug, Default, Clone)]
pub struct StackFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub name: Option<String>,
    pub is_shared: Option<bool>,
}

impl StackFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_shared(mut self, is_shared: bool) -> Self {
        self.is_shared = Some(is_shared);
        self
    }

    pub(crate) fn where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("project_id", self.project)
            .id("user_id", self.user)
            .text("name", self.name.as_deref())
            .flag("is_shared", self.is_shared)
    }
}

/// Filter for listing flavors.
#[derive(Debug, Default, Clone)]
pub struct FlavorFilter {
    pub project: Option<Uuid>,
    pub component_type: Option<StackComponentType>,
    pub name: Option<String>,
}

impl FlavorFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_type(mut self, component_type: StackComponentType) -> Self {
        self.component_type = Some(component_type);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("project_id", self.project)
            .text("type", self.component_type.map(|t| t.as_str()))
            .text("name", self.name.as_deref())
    }
}

/// Filter for listing pipelines.
#[derive(Debug, Default, Clone)]
pub struct PipelineFilter {
    pub project: Option<Uuid>,
    pub user: Option<Uuid>,
    pub name: Option<String>,
}

impl PipelineFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub(crate) fn where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("project_id", self.project)
            .id("user_id", self.user)
            .text("name", self.name.as_deref())
    }
}

/// Filter for listing pipeline runs.
#[derive(Debug, Default, Clone)]
pub struct RunFilter {
    pub project: Option<Uuid>,
    pub stack: Option<Uuid>,
    pub pipeline: Option<Uuid>,
    pub user: Option<Uuid>,
    pub status: Option<ExecutionStatus>,
}

impl RunFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }

    pub fn with_stack(mut self, stack: Uuid) -> Self {
        self.stack = Some(stack);
        self
    }

    pub fn with_pipeline(mut self, pipeline: Uuid) -> Self {
        self.pipeline = Some(pipeline);
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_status(mut self, status: ExecutionStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub(crate) fn where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("project_id", self.project)
            .id("stack_id", self.stack)
            .id("pipeline_id", self.pipeline)
            .id("user_id", self.user)
            .text("status", self.status.map(|s| s.as_str()))
    }
}

/// Filter for listing role assignments of users and teams.
///
/// Setting `user` excludes team assignments and setting `team` excludes
/// user assignments.
#[derive(Debug, Default, Clone)]
pub struct RoleAssignmentFilter {
    pub role: Option<Uuid>,
    pub user: Option<Uuid>,
    pub team: Option<Uuid>,
    pub project: Option<Uuid>,
}

impl RoleAssignmentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_role(mut self, role: Uuid) -> Self {
        self.role = Some(role);
        self
    }

    pub fn with_user(mut self, user: Uuid) -> Self {
        self.user = Some(user);
        self
    }

    pub fn with_team(mut self, team: Uuid) -> Self {
        self.team = Some(team);
        self
    }

    pub fn with_project(mut self, project: Uuid) -> Self {
        self.project = Some(project);
        self
    }

    pub(crate) fn includes_users(&self) -> bool {
        self.team.is_none()
    }

    pub(crate) fn includes_teams(&self) -> bool {
        self.user.is_none()
    }

    pub(crate) fn user_where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("role_id", self.role)
            .id("user_id", self.user)
            .id("project_id", self.project)
    }

    pub(crate) fn team_where_clause(&self) -> WhereClause {
        WhereClause::default()
            .id("role_id", self.role)
            .id("team_id", self.team)
            .id("project_id", self.project)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_filter_has_no_clause() {
        assert_eq!(StackFilter::new().where_clause().sql(), "");
        assert_eq!(RunFilter::default().where_clause().sql(), "");
    }

    #[test]
    fn test_set_fields_are_joined_in_order() {
        let filter = ComponentFilter::new()
            .with_project(Uuid::new_v4())
            .with_type(StackComponentType::Orchestrator)
            .with_shared(true);
        let clause = filter.where_clause();

        assert_eq!(
            clause.sql(),
            " WHERE project_id = ? AND type = ? AND is_shared = ?"
        );
        assert_eq!(clause.params.len(), 3);
        assert_eq!(
            clause.params[1],
            FilterParam::Text("orchestrator".to_string())
        );
    }

    #[test]
    fn test_run_filter_by_status() {
        let clause = RunFilter::new()
            .with_status(ExecutionStatus::Failed)
            .where_clause();
        assert_eq!(clause.sql(), " WHERE status = ?");
        assert_eq!(clause.params, vec![FilterParam::Text("failed".to_string())]);
    }

    #[test]
    fn test_assignment_filter_selects_tables() {
        let by_user = RoleAssignmentFilter::new().with_user(Uuid::new_v4());
        assert!(by_user.includes_users());
        assert!(!by_user.includes_teams());

        let by_role = RoleAssignmentFilter::new().with_role(Uuid::new_v4());
        assert!(by_role.includes_users());
        assert!(by_role.includes_teams());
        assert_eq!(by_role.team_where_clause().sql(), " WHERE role_id = ?");
    }
}
