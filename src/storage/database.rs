//! SQLite database client for the metadata store.
//!
//! This module provides the client that persists projects, users, roles,
//! stack components, stacks and pipelines using SQLite with sqlx. Deletion
//! rules are enforced by the engine's foreign-key actions, which are
//! switched on for every pooled connection.

use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow};
use sqlx::{FromRow, SqliteConnection, SqlitePool};
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::error::{StoreError, StoreResult};
use crate::models::{
    Assignee, ComponentCreate, ComponentModel, ComponentUpdate, FlavorCreate, FlavorModel,
    PipelineCreate, PipelineModel, PipelineRunCreate, PipelineRunModel, PipelineRunUpdate,
    PipelineUpdate, ProjectCreate, ProjectModel, ProjectUpdate, RoleAssignmentCreate,
    RoleAssignmentModel, RoleCreate, RoleModel, RoleUpdate, StackCreate, StackModel, StackUpdate,
    TeamCreate, TeamModel, TeamUpdate, UserCreate, UserModel, UserUpdate,
};
use crate::schemas::{
    FlavorSchema, OwnerRelations, Ownership, Persistable, PipelineRunSchema, PipelineSchema,
    ProjectSchema, RolePermissionSchema, RoleSchema, StackComponentSchema,
    StackCompositionSchema, StackRelations, StackSchema, TeamAssignmentSchema,
    TeamRoleAssignmentSchema, TeamSchema, Updatable, UserRoleAssignmentSchema, UserSchema,
};

use super::filters::{
    ComponentFilter, FlavorFilter, PipelineFilter, RoleAssignmentFilter, RunFilter, StackFilter,
};
use super::migrations::MigrationRunner;
use super::schema::tables;

const TEAM_ASSIGNMENT: &str = "team_assignment";
const STACK_COMPOSITION: &str = "stack_composition";

/// SQLite database client.
///
/// Every mutation runs inside a single transaction. Reads borrow one pooled
/// connection for their whole duration and give it back on return.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Connects to the database at `database_url` with default pool settings.
    pub async fn connect(database_url: &str) -> StoreResult<Self> {
        Self::connect_with(&StoreConfig::default().with_database_url(database_url)).await
    }

    /// Connects using the given configuration.
    ///
    /// In-memory databases are held in a single connection that is never
    /// recycled, since closing it would discard the data.
    pub async fn connect_with(config: &StoreConfig) -> StoreResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&config.database_url)?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true);
        if !config.is_in_memory() {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(config.effective_max_connections())
            .acquire_timeout(config.acquire_timeout);
        if config.is_in_memory() {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options.connect_with(options).await?;

        info!(
            url = %config.database_url,
            max_connections = config.effective_max_connections(),
            "Metadata store opened"
        );
        Ok(Self { pool })
    }

    /// Opens a fresh in-memory database with the schema already applied.
    pub async fn in_memory() -> StoreResult<Self> {
        let db = Self::connect_with(&StoreConfig::in_memory()).await?;
        db.run_migrations().await?;
        Ok(db)
    }

    /// Creates a new database client from an existing pool.
    ///
    /// The pool's connections must have foreign keys enabled.
    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Runs database migrations.
    pub async fn run_migrations(&self) -> StoreResult<()> {
        let runner = MigrationRunner::new(self.pool.clone());
        runner.run_migrations().await?;
        Ok(())
    }

    /// Closes every pooled connection.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    // =========================================================================
    // Project Operations
    // =========================================================================

    pub async fn create_project(&self, project: &ProjectCreate) -> StoreResult<ProjectModel> {
        let row = ProjectSchema::from_create_model(project)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO projects (id, name, description, created, updated) VALUES (?1, ?2, ?3, ?4, ?5)",
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.description)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, ProjectSchema::ENTITY, &row.name))?;

        tx.commit().await?;
        info!(project_id = %row.id, name = %row.name, "Project created");
        row.to_model(())
    }

    pub async fn get_project(&self, id: Uuid) -> StoreResult<ProjectModel> {
        let mut conn = self.pool.acquire().await?;
        get_row::<ProjectSchema>(&mut conn, tables::PROJECTS, id)
            .await?
            .to_model(())
    }

    pub async fn get_project_by_name(&self, name: &str) -> StoreResult<ProjectModel> {
        let mut conn = self.pool.acquire().await?;
        get_row_by_name::<ProjectSchema>(&mut conn, tables::PROJECTS, name)
            .await?
            .to_model(())
    }

    pub async fn list_projects(&self) -> StoreResult<Vec<ProjectModel>> {
        let rows: Vec<ProjectSchema> = sqlx::query_as("SELECT * FROM projects ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| row.to_model(())).collect()
    }

    pub async fn update_project(&self, id: Uuid, update: &ProjectUpdate) -> StoreResult<ProjectModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<ProjectSchema>(&mut tx, tables::PROJECTS, id)
            .await?
            .from_update_model(update)?;

        sqlx::query("UPDATE projects SET name = ?1, description = ?2, updated = ?3 WHERE id = ?4")
            .bind(&row.name)
            .bind(&row.description)
            .bind(row.timestamps.updated)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, ProjectSchema::ENTITY, &row.name))?;

        tx.commit().await?;
        debug!(project_id = %id, "Project updated");
        row.to_model(())
    }

    /// Deletes a project together with every stack, component, flavor,
    /// pipeline, run and role assignment scoped to it.
    pub async fn delete_project(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::PROJECTS, ProjectSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(project_id = %id, "Project deleted");
        Ok(())
    }

    /// Stacks owned by a project.
    pub async fn list_project_stacks(&self, project_id: Uuid) -> StoreResult<Vec<StackModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(&mut conn, tables::PROJECTS, ProjectSchema::ENTITY, project_id).await?;
        query_stacks(&mut conn, &StackFilter::new().with_project(project_id)).await
    }

    /// Stack components owned by a project.
    pub async fn list_project_components(&self, project_id: Uuid) -> StoreResult<Vec<ComponentModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(&mut conn, tables::PROJECTS, ProjectSchema::ENTITY, project_id).await?;
        query_components(&mut conn, &ComponentFilter::new().with_project(project_id)).await
    }

    // =========================================================================
    // User Operations
    // =========================================================================

    pub async fn create_user(&self, user: &UserCreate) -> StoreResult<UserModel> {
        let row = UserSchema::from_create_model(user)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO users (
                id, name, full_name, email, email_opted_in, active,
                password, activation_token, created, updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(row.email_opted_in)
        .bind(row.active)
        .bind(&row.password)
        .bind(&row.activation_token)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, UserSchema::ENTITY, &row.name))?;

        tx.commit().await?;
        info!(user_id = %row.id, name = %row.name, "User created");
        row.to_model(())
    }

    pub async fn get_user(&self, id: Uuid) -> StoreResult<UserModel> {
        let mut conn = self.pool.acquire().await?;
        get_row::<UserSchema>(&mut conn, tables::USERS, id)
            .await?
            .to_model(())
    }

    pub async fn get_user_by_name(&self, name: &str) -> StoreResult<UserModel> {
        let mut conn = self.pool.acquire().await?;
        get_row_by_name::<UserSchema>(&mut conn, tables::USERS, name)
            .await?
            .to_model(())
    }

    pub async fn list_users(&self) -> StoreResult<Vec<UserModel>> {
        let rows: Vec<UserSchema> = sqlx::query_as("SELECT * FROM users ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| row.to_model(())).collect()
    }

    pub async fn update_user(&self, id: Uuid, update: &UserUpdate) -> StoreResult<UserModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<UserSchema>(&mut tx, tables::USERS, id)
            .await?
            .from_update_model(update)?;

        sqlx::query(
            r#"
            UPDATE users SET
                name = ?1, full_name = ?2, email = ?3, email_opted_in = ?4, active = ?5,
                password = ?6, activation_token = ?7, updated = ?8
            WHERE id = ?9
            "#,
        )
        .bind(&row.name)
        .bind(&row.full_name)
        .bind(&row.email)
        .bind(row.email_opted_in)
        .bind(row.active)
        .bind(&row.password)
        .bind(&row.activation_token)
        .bind(row.timestamps.updated)
        .bind(row.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, UserSchema::ENTITY, &row.name))?;

        tx.commit().await?;
        debug!(user_id = %id, "User updated");
        row.to_model(())
    }

    /// Deletes a user. Entities the user created survive with their user
    /// reference cleared; the user's role assignments and team memberships
    /// are removed.
    pub async fn delete_user(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::USERS, UserSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(user_id = %id, "User deleted");
        Ok(())
    }

    /// Teams the user belongs to.
    pub async fn list_user_teams(&self, user_id: Uuid) -> StoreResult<Vec<TeamModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(&mut conn, tables::USERS, UserSchema::ENTITY, user_id).await?;

        let rows: Vec<TeamSchema> = sqlx::query_as(
            r#"
            SELECT t.* FROM teams t
            JOIN team_assignments ta ON ta.team_id = t.id
            WHERE ta.user_id = ?1
            ORDER BY t.name
            "#,
        )
        .bind(user_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(|row| row.to_model(())).collect()
    }

    /// Roles assigned directly to the user.
    pub async fn list_user_role_assignments(
        &self,
        user_id: Uuid,
    ) -> StoreResult<Vec<RoleAssignmentModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(&mut conn, tables::USERS, UserSchema::ENTITY, user_id).await?;
        query_role_assignments(&mut conn, &RoleAssignmentFilter::new().with_user(user_id)).await
    }

    // =========================================================================
    // Team Operations
    // =========================================================================

    pub async fn create_team(&self, team: &TeamCreate) -> StoreResult<TeamModel> {
        let row = TeamSchema::from_create_model(team)?;
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO teams (id, name, created, updated) VALUES (?1, ?2, ?3, ?4)")
            .bind(row.id)
            .bind(&row.name)
            .bind(row.timestamps.created)
            .bind(row.timestamps.updated)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, TeamSchema::ENTITY, &row.name))?;

        tx.commit().await?;
        info!(team_id = %row.id, name = %row.name, "Team created");
        row.to_model(())
    }

    pub async fn get_team(&self, id: Uuid) -> StoreResult<TeamModel> {
        let mut conn = self.pool.acquire().await?;
        get_row::<TeamSchema>(&mut conn, tables::TEAMS, id)
            .await?
            .to_model(())
    }

    pub async fn get_team_by_name(&self, name: &str) -> StoreResult<TeamModel> {
        let mut conn = self.pool.acquire().await?;
        get_row_by_name::<TeamSchema>(&mut conn, tables::TEAMS, name)
            .await?
            .to_model(())
    }

    pub async fn list_teams(&self) -> StoreResult<Vec<TeamModel>> {
        let rows: Vec<TeamSchema> = sqlx::query_as("SELECT * FROM teams ORDER BY name")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|row| row.to_model(())).collect()
    }

    pub async fn update_team(&self, id: Uuid, update: &TeamUpdate) -> StoreResult<TeamModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<TeamSchema>(&mut tx, tables::TEAMS, id)
            .await?
            .from_update_model(update)?;

        sqlx::query("UPDATE teams SET name = ?1, updated = ?2 WHERE id = ?3")
            .bind(&row.name)
            .bind(row.timestamps.updated)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, TeamSchema::ENTITY, &row.name))?;

        tx.commit().await?;
        debug!(team_id = %id, "Team updated");
        row.to_model(())
    }

    pub async fn delete_team(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::TEAMS, TeamSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(team_id = %id, "Team deleted");
        Ok(())
    }

    /// Adds a user to a team. Adding an existing member is a duplicate.
    pub async fn add_user_to_team(&self, team_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let link = TeamAssignmentSchema { user_id, team_id };
        let mut tx = self.pool.begin().await?;
        ensure_exists(&mut tx, tables::TEAMS, TeamSchema::ENTITY, team_id).await?;
        ensure_exists(&mut tx, tables::USERS, UserSchema::ENTITY, user_id).await?;

        sqlx::query("INSERT INTO team_assignments (user_id, team_id) VALUES (?1, ?2)")
            .bind(link.user_id)
            .bind(link.team_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                StoreError::from_write(e, TEAM_ASSIGNMENT, format!("{}/{}", team_id, user_id))
            })?;

        tx.commit().await?;
        info!(team_id = %team_id, user_id = %user_id, "User added to team");
        Ok(())
    }

    pub async fn remove_user_from_team(&self, team_id: Uuid, user_id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query("DELETE FROM team_assignments WHERE team_id = ?1 AND user_id = ?2")
            .bind(team_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                TEAM_ASSIGNMENT,
                format!("{}/{}", team_id, user_id),
            ));
        }

        tx.commit().await?;
        info!(team_id = %team_id, user_id = %user_id, "User removed from team");
        Ok(())
    }

    pub async fn list_team_members(&self, team_id: Uuid) -> StoreResult<Vec<UserModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(&mut conn, tables::TEAMS, TeamSchema::ENTITY, team_id).await?;

        let rows: Vec<UserSchema> = sqlx::query_as(
            r#"
            SELECT u.* FROM users u
            JOIN team_assignments ta ON ta.user_id = u.id
            WHERE ta.team_id = ?1
            ORDER BY u.name
            "#,
        )
        .bind(team_id)
        .fetch_all(&mut *conn)
        .await?;
        rows.iter().map(|row| row.to_model(())).collect()
    }

    // =========================================================================
    // Role Operations
    // =========================================================================

    pub async fn create_role(&self, role: &RoleCreate) -> StoreResult<RoleModel> {
        let row = RoleSchema::from_create_model(role)?;
        let permissions = row.permission_rows(&role.permissions);
        let mut tx = self.pool.begin().await?;

        sqlx::query("INSERT INTO roles (id, name, created, updated) VALUES (?1, ?2, ?3, ?4)")
            .bind(row.id)
            .bind(&row.name)
            .bind(row.timestamps.created)
            .bind(row.timestamps.updated)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, RoleSchema::ENTITY, &row.name))?;
        insert_permissions(&mut tx, &permissions).await?;

        tx.commit().await?;
        info!(role_id = %row.id, name = %row.name, permissions = permissions.len(), "Role created");
        row.to_model(permissions)
    }

    pub async fn get_role(&self, id: Uuid) -> StoreResult<RoleModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row::<RoleSchema>(&mut conn, tables::ROLES, id).await?;
        role_model(&mut conn, &row).await
    }

    pub async fn get_role_by_name(&self, name: &str) -> StoreResult<RoleModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row_by_name::<RoleSchema>(&mut conn, tables::ROLES, name).await?;
        role_model(&mut conn, &row).await
    }

    pub async fn list_roles(&self) -> StoreResult<Vec<RoleModel>> {
        let mut conn = self.pool.acquire().await?;
        let rows: Vec<RoleSchema> = sqlx::query_as("SELECT * FROM roles ORDER BY name")
            .fetch_all(&mut *conn)
            .await?;

        let mut roles = Vec::with_capacity(rows.len());
        for row in &rows {
            roles.push(role_model(&mut conn, row).await?);
        }
        Ok(roles)
    }

    /// Renames a role and/or replaces its permission set.
    pub async fn update_role(&self, id: Uuid, update: &RoleUpdate) -> StoreResult<RoleModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<RoleSchema>(&mut tx, tables::ROLES, id)
            .await?
            .from_update_model(update)?;

        sqlx::query("UPDATE roles SET name = ?1, updated = ?2 WHERE id = ?3")
            .bind(&row.name)
            .bind(row.timestamps.updated)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, RoleSchema::ENTITY, &row.name))?;

        if let Some(permissions) = &update.permissions {
            sqlx::query("DELETE FROM role_permissions WHERE role_id = ?1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
            insert_permissions(&mut tx, &row.permission_rows(permissions)).await?;
        }

        let model = role_model(&mut tx, &row).await?;
        tx.commit().await?;
        debug!(role_id = %id, "Role updated");
        Ok(model)
    }

    /// Deletes a role, its permissions and every assignment of it.
    pub async fn delete_role(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::ROLES, RoleSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(role_id = %id, "Role deleted");
        Ok(())
    }

    // =========================================================================
    // Role Assignment Operations
    // =========================================================================

    /// Assigns a role to a user or team, optionally scoped to a project.
    ///
    /// Assigning the same role to the same assignee in the same scope twice
    /// is a duplicate.
    pub async fn assign_role(
        &self,
        assignment: &RoleAssignmentCreate,
    ) -> StoreResult<RoleAssignmentModel> {
        let mut tx = self.pool.begin().await?;
        ensure_exists(&mut tx, tables::ROLES, RoleSchema::ENTITY, assignment.role).await?;
        if let Some(project) = assignment.project {
            ensure_exists(&mut tx, tables::PROJECTS, ProjectSchema::ENTITY, project).await?;
        }

        let model = match assignment.assignee {
            Assignee::User(user_id) => {
                ensure_exists(&mut tx, tables::USERS, UserSchema::ENTITY, user_id).await?;
                let row = UserRoleAssignmentSchema::from_create_model(assignment)?;

                let existing: Option<(i64,)> = sqlx::query_as(
                    "SELECT 1 FROM user_role_assignments WHERE role_id = ?1 AND user_id = ?2 AND project_id IS ?3",
                )
                .bind(row.role_id)
                .bind(row.user_id)
                .bind(row.project_id)
                .fetch_optional(&mut *tx)
                .await?;
                if existing.is_some() {
                    return Err(StoreError::duplicate(
                        UserRoleAssignmentSchema::ENTITY,
                        format!("{}/{}", row.role_id, row.user_id),
                    ));
                }

                sqlx::query(
                    r#"
                    INSERT INTO user_role_assignments (id, role_id, user_id, project_id, created, updated)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(row.id)
                .bind(row.role_id)
                .bind(row.user_id)
                .bind(row.project_id)
                .bind(row.timestamps.created)
                .bind(row.timestamps.updated)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::from_write(e, UserRoleAssignmentSchema::ENTITY, row.id))?;

                row.to_model(())?
            }
            Assignee::Team(team_id) => {
                ensure_exists(&mut tx, tables::TEAMS, TeamSchema::ENTITY, team_id).await?;
                let row = TeamRoleAssignmentSchema::from_create_model(assignment)?;

                let existing: Option<(i64,)> = sqlx::query_as(
                    "SELECT 1 FROM team_role_assignments WHERE role_id = ?1 AND team_id = ?2 AND project_id IS ?3",
                )
                .bind(row.role_id)
                .bind(row.team_id)
                .bind(row.project_id)
                .fetch_optional(&mut *tx)
                .await?;
                if existing.is_some() {
                    return Err(StoreError::duplicate(
                        TeamRoleAssignmentSchema::ENTITY,
                        format!("{}/{}", row.role_id, row.team_id),
                    ));
                }

                sqlx::query(
                    r#"
                    INSERT INTO team_role_assignments (id, role_id, team_id, project_id, created, updated)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                    "#,
                )
                .bind(row.id)
                .bind(row.role_id)
                .bind(row.team_id)
                .bind(row.project_id)
                .bind(row.timestamps.created)
                .bind(row.timestamps.updated)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::from_write(e, TeamRoleAssignmentSchema::ENTITY, row.id))?;

                row.to_model(())?
            }
        };

        tx.commit().await?;
        info!(
            assignment_id = %model.id,
            role_id = %model.role,
            project_id = ?model.project,
            "Role assigned"
        );
        Ok(model)
    }

    pub async fn assign_role_to_user(
        &self,
        role_id: Uuid,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> StoreResult<RoleAssignmentModel> {
        let mut assignment = RoleAssignmentCreate::for_user(role_id, user_id);
        assignment.project = project_id;
        self.assign_role(&assignment).await
    }

    pub async fn assign_role_to_team(
        &self,
        role_id: Uuid,
        team_id: Uuid,
        project_id: Option<Uuid>,
    ) -> StoreResult<RoleAssignmentModel> {
        let mut assignment = RoleAssignmentCreate::for_team(role_id, team_id);
        assignment.project = project_id;
        self.assign_role(&assignment).await
    }

    /// Revokes the user's role in the given scope (`None` for global).
    pub async fn revoke_user_role(
        &self,
        role_id: Uuid,
        user_id: Uuid,
        project_id: Option<Uuid>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "DELETE FROM user_role_assignments WHERE role_id = ?1 AND user_id = ?2 AND project_id IS ?3",
        )
        .bind(role_id)
        .bind(user_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                UserRoleAssignmentSchema::ENTITY,
                format!("{}/{}", role_id, user_id),
            ));
        }

        tx.commit().await?;
        info!(role_id = %role_id, user_id = %user_id, "User role revoked");
        Ok(())
    }

    /// Revokes the team's role in the given scope (`None` for global).
    pub async fn revoke_team_role(
        &self,
        role_id: Uuid,
        team_id: Uuid,
        project_id: Option<Uuid>,
    ) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            "DELETE FROM team_role_assignments WHERE role_id = ?1 AND team_id = ?2 AND project_id IS ?3",
        )
        .bind(role_id)
        .bind(team_id)
        .bind(project_id)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                TeamRoleAssignmentSchema::ENTITY,
                format!("{}/{}", role_id, team_id),
            ));
        }

        tx.commit().await?;
        info!(role_id = %role_id, team_id = %team_id, "Team role revoked");
        Ok(())
    }

    /// Lists user and team role assignments matching the filter, oldest first.
    pub async fn list_role_assignments(
        &self,
        filter: &RoleAssignmentFilter,
    ) -> StoreResult<Vec<RoleAssignmentModel>> {
        let mut conn = self.pool.acquire().await?;
        query_role_assignments(&mut conn, filter).await
    }

    // =========================================================================
    // Flavor Operations
    // =========================================================================

    pub async fn create_flavor(&self, flavor: &FlavorCreate) -> StoreResult<FlavorModel> {
        let row = FlavorSchema::from_create_model(flavor)?;
        let mut tx = self.pool.begin().await?;
        ensure_owners(&mut tx, &row.ownership).await?;

        sqlx::query(
            r#"
            INSERT INTO flavors (
                id, name, type, source, config_schema, integration,
                project_id, user_id, created, updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.component_type)
        .bind(&row.source)
        .bind(&row.config_schema)
        .bind(&row.integration)
        .bind(row.ownership.project_id)
        .bind(row.ownership.user_id)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            StoreError::from_write(
                e,
                FlavorSchema::ENTITY,
                format!("{}/{}", row.component_type, row.name),
            )
        })?;

        let owners = load_owners(&mut tx, &row.ownership).await?;
        tx.commit().await?;
        info!(flavor_id = %row.id, name = %row.name, component_type = %row.component_type, "Flavor created");
        row.to_model(owners)
    }

    pub async fn get_flavor(&self, id: Uuid) -> StoreResult<FlavorModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row::<FlavorSchema>(&mut conn, tables::FLAVORS, id).await?;
        let owners = load_owners(&mut conn, &row.ownership).await?;
        row.to_model(owners)
    }

    pub async fn list_flavors(&self, filter: &FlavorFilter) -> StoreResult<Vec<FlavorModel>> {
        let mut conn = self.pool.acquire().await?;
        let clause = filter.where_clause();
        let sql = format!("SELECT * FROM flavors{} ORDER BY type, name", clause.sql());
        let rows = clause
            .bind(sqlx::query_as::<_, FlavorSchema>(&sql))
            .fetch_all(&mut *conn)
            .await?;

        let mut flavors = Vec::with_capacity(rows.len());
        for row in &rows {
            let owners = load_owners(&mut conn, &row.ownership).await?;
            flavors.push(row.to_model(owners)?);
        }
        Ok(flavors)
    }

    pub async fn delete_flavor(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::FLAVORS, FlavorSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(flavor_id = %id, "Flavor deleted");
        Ok(())
    }

    // =========================================================================
    // Stack Component Operations
    // =========================================================================

    pub async fn create_component(&self, component: &ComponentCreate) -> StoreResult<ComponentModel> {
        let row = StackComponentSchema::from_create_model(component)?;
        let mut tx = self.pool.begin().await?;
        ensure_owners(&mut tx, &row.ownership).await?;

        sqlx::query(
            r#"
            INSERT INTO stack_components (
                id, name, is_shared, type, flavor, configuration,
                project_id, user_id, created, updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(row.id)
        .bind(&row.shareable.name)
        .bind(row.shareable.is_shared)
        .bind(&row.component_type)
        .bind(&row.flavor)
        .bind(&row.configuration)
        .bind(row.ownership.project_id)
        .bind(row.ownership.user_id)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, StackComponentSchema::ENTITY, row.id))?;

        let model = component_model(&mut tx, &row).await?;
        tx.commit().await?;
        info!(
            component_id = %row.id,
            name = %row.shareable.name,
            component_type = %row.component_type,
            flavor = %row.flavor,
            "Stack component created"
        );
        Ok(model)
    }

    pub async fn get_component(&self, id: Uuid) -> StoreResult<ComponentModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row::<StackComponentSchema>(&mut conn, tables::STACK_COMPONENTS, id).await?;
        component_model(&mut conn, &row).await
    }

    pub async fn list_components(&self, filter: &ComponentFilter) -> StoreResult<Vec<ComponentModel>> {
        let mut conn = self.pool.acquire().await?;
        query_components(&mut conn, filter).await
    }

    /// Applies a partial update. Naming a different project or user than the
    /// stored one is a consistency error.
    pub async fn update_component(
        &self,
        id: Uuid,
        update: &ComponentUpdate,
    ) -> StoreResult<ComponentModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<StackComponentSchema>(&mut tx, tables::STACK_COMPONENTS, id)
            .await?
            .from_update_model(update)?;

        sqlx::query(
            "UPDATE stack_components SET name = ?1, is_shared = ?2, configuration = ?3, updated = ?4 WHERE id = ?5",
        )
        .bind(&row.shareable.name)
        .bind(row.shareable.is_shared)
        .bind(&row.configuration)
        .bind(row.timestamps.updated)
        .bind(row.id)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, StackComponentSchema::ENTITY, row.id))?;

        let model = component_model(&mut tx, &row).await?;
        tx.commit().await?;
        debug!(component_id = %id, "Stack component updated");
        Ok(model)
    }

    /// Deletes a component and removes it from every stack.
    pub async fn delete_component(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::STACK_COMPONENTS, StackComponentSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(component_id = %id, "Stack component deleted");
        Ok(())
    }

    /// Stacks the component is part of.
    pub async fn list_component_stacks(&self, component_id: Uuid) -> StoreResult<Vec<StackModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(
            &mut conn,
            tables::STACK_COMPONENTS,
            StackComponentSchema::ENTITY,
            component_id,
        )
        .await?;

        let rows: Vec<StackSchema> = sqlx::query_as(
            r#"
            SELECT s.* FROM stacks s
            JOIN stack_compositions sc ON sc.stack_id = s.id
            WHERE sc.component_id = ?1
            ORDER BY s.name
            "#,
        )
        .bind(component_id)
        .fetch_all(&mut *conn)
        .await?;

        let mut stacks = Vec::with_capacity(rows.len());
        for row in &rows {
            stacks.push(stack_model(&mut conn, row).await?);
        }
        Ok(stacks)
    }

    // =========================================================================
    // Stack Operations
    // =========================================================================

    /// Creates a stack from the given components. Repeated component ids are
    /// stored once.
    pub async fn create_stack(&self, stack: &StackCreate) -> StoreResult<StackModel> {
        let row = StackSchema::from_create_model(stack)?;
        let mut tx = self.pool.begin().await?;
        ensure_owners(&mut tx, &row.ownership).await?;

        sqlx::query(
            r#"
            INSERT INTO stacks (id, name, is_shared, project_id, user_id, created, updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
        )
        .bind(row.id)
        .bind(&row.shareable.name)
        .bind(row.shareable.is_shared)
        .bind(row.ownership.project_id)
        .bind(row.ownership.user_id)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, StackSchema::ENTITY, row.id))?;

        for link in row.composition(&stack.components) {
            insert_composition(&mut tx, &link, row.ownership.project_id).await?;
        }

        let model = stack_model(&mut tx, &row).await?;
        tx.commit().await?;
        info!(
            stack_id = %row.id,
            name = %row.shareable.name,
            components = model.component_ids().len(),
            "Stack created"
        );
        Ok(model)
    }

    pub async fn get_stack(&self, id: Uuid) -> StoreResult<StackModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row::<StackSchema>(&mut conn, tables::STACKS, id).await?;
        stack_model(&mut conn, &row).await
    }

    pub async fn list_stacks(&self, filter: &StackFilter) -> StoreResult<Vec<StackModel>> {
        let mut conn = self.pool.acquire().await?;
        query_stacks(&mut conn, filter).await
    }

    /// Applies a partial update. A supplied component list replaces the
    /// stack's composition.
    pub async fn update_stack(&self, id: Uuid, update: &StackUpdate) -> StoreResult<StackModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<StackSchema>(&mut tx, tables::STACKS, id)
            .await?
            .from_update_model(update)?;

        sqlx::query("UPDATE stacks SET name = ?1, is_shared = ?2, updated = ?3 WHERE id = ?4")
            .bind(&row.shareable.name)
            .bind(row.shareable.is_shared)
            .bind(row.timestamps.updated)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, StackSchema::ENTITY, row.id))?;

        if let Some(components) = &update.components {
            sqlx::query("DELETE FROM stack_compositions WHERE stack_id = ?1")
                .bind(row.id)
                .execute(&mut *tx)
                .await?;
            for link in row.composition(components) {
                insert_composition(&mut tx, &link, row.ownership.project_id).await?;
            }
        }

        let model = stack_model(&mut tx, &row).await?;
        tx.commit().await?;
        debug!(stack_id = %id, "Stack updated");
        Ok(model)
    }

    /// Deletes a stack. Fails while pipeline runs still reference it.
    pub async fn delete_stack(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::STACKS, StackSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(stack_id = %id, "Stack deleted");
        Ok(())
    }

    /// Adds one component to a stack. Adding a component the stack already
    /// holds is a duplicate.
    pub async fn add_component_to_stack(
        &self,
        stack_id: Uuid,
        component_id: Uuid,
    ) -> StoreResult<StackModel> {
        let mut tx = self.pool.begin().await?;
        let mut row = fetch_row::<StackSchema>(&mut tx, tables::STACKS, stack_id)
            .await?
            .ok_or_else(|| StoreError::reference(StackSchema::ENTITY, stack_id))?;

        insert_composition(
            &mut tx,
            &StackCompositionSchema {
                stack_id,
                component_id,
            },
            row.ownership.project_id,
        )
        .await?;
        touch_stack(&mut tx, &mut row).await?;

        let model = stack_model(&mut tx, &row).await?;
        tx.commit().await?;
        info!(stack_id = %stack_id, component_id = %component_id, "Component added to stack");
        Ok(model)
    }

    pub async fn remove_component_from_stack(
        &self,
        stack_id: Uuid,
        component_id: Uuid,
    ) -> StoreResult<StackModel> {
        let mut tx = self.pool.begin().await?;
        let mut row = get_row::<StackSchema>(&mut tx, tables::STACKS, stack_id).await?;

        let result =
            sqlx::query("DELETE FROM stack_compositions WHERE stack_id = ?1 AND component_id = ?2")
                .bind(stack_id)
                .bind(component_id)
                .execute(&mut *tx)
                .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found(
                STACK_COMPOSITION,
                format!("{}/{}", stack_id, component_id),
            ));
        }
        touch_stack(&mut tx, &mut row).await?;

        let model = stack_model(&mut tx, &row).await?;
        tx.commit().await?;
        info!(stack_id = %stack_id, component_id = %component_id, "Component removed from stack");
        Ok(model)
    }

    pub async fn list_stack_components(&self, stack_id: Uuid) -> StoreResult<Vec<ComponentModel>> {
        let mut conn = self.pool.acquire().await?;
        ensure_found(&mut conn, tables::STACKS, StackSchema::ENTITY, stack_id).await?;
        let rows = fetch_stack_components(&mut conn, stack_id).await?;

        let mut components = Vec::with_capacity(rows.len());
        for row in &rows {
            components.push(component_model(&mut conn, row).await?);
        }
        Ok(components)
    }

    // =========================================================================
    // Pipeline Operations
    // =========================================================================

    pub async fn create_pipeline(&self, pipeline: &PipelineCreate) -> StoreResult<PipelineModel> {
        let row = PipelineSchema::from_create_model(pipeline)?;
        let mut tx = self.pool.begin().await?;
        ensure_owners(&mut tx, &row.ownership).await?;

        sqlx::query(
            r#"
            INSERT INTO pipelines (id, name, docstring, spec, project_id, user_id, created, updated)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.docstring)
        .bind(&row.spec)
        .bind(row.ownership.project_id)
        .bind(row.ownership.user_id)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, PipelineSchema::ENTITY, row.id))?;

        let owners = load_owners(&mut tx, &row.ownership).await?;
        tx.commit().await?;
        info!(pipeline_id = %row.id, name = %row.name, "Pipeline created");
        row.to_model(owners)
    }

    pub async fn get_pipeline(&self, id: Uuid) -> StoreResult<PipelineModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row::<PipelineSchema>(&mut conn, tables::PIPELINES, id).await?;
        let owners = load_owners(&mut conn, &row.ownership).await?;
        row.to_model(owners)
    }

    pub async fn list_pipelines(&self, filter: &PipelineFilter) -> StoreResult<Vec<PipelineModel>> {
        let mut conn = self.pool.acquire().await?;
        let clause = filter.where_clause();
        let sql = format!("SELECT * FROM pipelines{} ORDER BY name", clause.sql());
        let rows = clause
            .bind(sqlx::query_as::<_, PipelineSchema>(&sql))
            .fetch_all(&mut *conn)
            .await?;

        let mut pipelines = Vec::with_capacity(rows.len());
        for row in &rows {
            let owners = load_owners(&mut conn, &row.ownership).await?;
            pipelines.push(row.to_model(owners)?);
        }
        Ok(pipelines)
    }

    pub async fn update_pipeline(
        &self,
        id: Uuid,
        update: &PipelineUpdate,
    ) -> StoreResult<PipelineModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<PipelineSchema>(&mut tx, tables::PIPELINES, id)
            .await?
            .from_update_model(update)?;

        sqlx::query("UPDATE pipelines SET name = ?1, docstring = ?2, spec = ?3, updated = ?4 WHERE id = ?5")
            .bind(&row.name)
            .bind(&row.docstring)
            .bind(&row.spec)
            .bind(row.timestamps.updated)
            .bind(row.id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::from_write(e, PipelineSchema::ENTITY, row.id))?;

        let owners = load_owners(&mut tx, &row.ownership).await?;
        tx.commit().await?;
        debug!(pipeline_id = %id, "Pipeline updated");
        row.to_model(owners)
    }

    /// Deletes a pipeline. Fails while runs still reference it.
    pub async fn delete_pipeline(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::PIPELINES, PipelineSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(pipeline_id = %id, "Pipeline deleted");
        Ok(())
    }

    // =========================================================================
    // Pipeline Run Operations
    // =========================================================================

    pub async fn create_pipeline_run(&self, run: &PipelineRunCreate) -> StoreResult<PipelineRunModel> {
        let row = PipelineRunSchema::from_create_model(run)?;
        let mut tx = self.pool.begin().await?;
        ensure_owners(&mut tx, &row.ownership).await?;
        if let Some(pipeline_id) = row.pipeline_id {
            ensure_in_project(
                &mut tx,
                tables::PIPELINES,
                PipelineSchema::ENTITY,
                pipeline_id,
                row.ownership.project_id,
            )
            .await?;
        }
        if let Some(stack_id) = row.stack_id {
            ensure_in_project(
                &mut tx,
                tables::STACKS,
                StackSchema::ENTITY,
                stack_id,
                row.ownership.project_id,
            )
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO pipeline_runs (
                id, name, status, pipeline_id, stack_id, pipeline_configuration, num_steps,
                project_id, user_id, created, updated
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
        )
        .bind(row.id)
        .bind(&row.name)
        .bind(&row.status)
        .bind(row.pipeline_id)
        .bind(row.stack_id)
        .bind(&row.pipeline_configuration)
        .bind(row.num_steps)
        .bind(row.ownership.project_id)
        .bind(row.ownership.user_id)
        .bind(row.timestamps.created)
        .bind(row.timestamps.updated)
        .execute(&mut *tx)
        .await
        .map_err(|e| StoreError::from_write(e, PipelineRunSchema::ENTITY, row.id))?;

        let owners = load_owners(&mut tx, &row.ownership).await?;
        tx.commit().await?;
        info!(run_id = %row.id, name = %row.name, status = %row.status, "Pipeline run created");
        row.to_model(owners)
    }

    pub async fn get_pipeline_run(&self, id: Uuid) -> StoreResult<PipelineRunModel> {
        let mut conn = self.pool.acquire().await?;
        let row = get_row::<PipelineRunSchema>(&mut conn, tables::PIPELINE_RUNS, id).await?;
        let owners = load_owners(&mut conn, &row.ownership).await?;
        row.to_model(owners)
    }

    /// Lists runs matching the filter, oldest first.
    pub async fn list_pipeline_runs(&self, filter: &RunFilter) -> StoreResult<Vec<PipelineRunModel>> {
        let mut conn = self.pool.acquire().await?;
        let clause = filter.where_clause();
        let sql = format!("SELECT * FROM pipeline_runs{} ORDER BY created, name", clause.sql());
        let rows = clause
            .bind(sqlx::query_as::<_, PipelineRunSchema>(&sql))
            .fetch_all(&mut *conn)
            .await?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in &rows {
            let owners = load_owners(&mut conn, &row.ownership).await?;
            runs.push(row.to_model(owners)?);
        }
        Ok(runs)
    }

    pub async fn update_pipeline_run(
        &self,
        id: Uuid,
        update: &PipelineRunUpdate,
    ) -> StoreResult<PipelineRunModel> {
        let mut tx = self.pool.begin().await?;
        let row = get_row::<PipelineRunSchema>(&mut tx, tables::PIPELINE_RUNS, id)
            .await?
            .from_update_model(update)?;

        sqlx::query("UPDATE pipeline_runs SET status = ?1, num_steps = ?2, updated = ?3 WHERE id = ?4")
            .bind(&row.status)
            .bind(row.num_steps)
            .bind(row.timestamps.updated)
            .bind(row.id)
            .execute(&mut *tx)
            .await?;

        let owners = load_owners(&mut tx, &row.ownership).await?;
        tx.commit().await?;
        debug!(run_id = %id, status = %row.status, "Pipeline run updated");
        row.to_model(owners)
    }

    pub async fn delete_pipeline_run(&self, id: Uuid) -> StoreResult<()> {
        let mut tx = self.pool.begin().await?;
        delete_by_id(&mut tx, tables::PIPELINE_RUNS, PipelineRunSchema::ENTITY, id).await?;
        tx.commit().await?;
        info!(run_id = %id, "Pipeline run deleted");
        Ok(())
    }
}

// =============================================================================
// Row helpers
// =============================================================================

async fn fetch_row<T>(conn: &mut SqliteConnection, table: &str, id: Uuid) -> StoreResult<Option<T>>
where
    T: for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    let row = sqlx::query_as::<_, T>(&format!("SELECT * FROM {} WHERE id = ?1", table))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

async fn get_row<T>(conn: &mut SqliteConnection, table: &str, id: Uuid) -> StoreResult<T>
where
    T: Persistable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    fetch_row::<T>(conn, table, id)
        .await?
        .ok_or_else(|| StoreError::not_found(T::ENTITY, id))
}

async fn get_row_by_name<T>(conn: &mut SqliteConnection, table: &str, name: &str) -> StoreResult<T>
where
    T: Persistable + for<'r> FromRow<'r, SqliteRow> + Send + Unpin,
{
    sqlx::query_as::<_, T>(&format!("SELECT * FROM {} WHERE name = ?1", table))
        .bind(name)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| StoreError::not_found(T::ENTITY, name))
}

async fn row_exists(conn: &mut SqliteConnection, table: &str, id: Uuid) -> StoreResult<bool> {
    let found: Option<(i64,)> = sqlx::query_as(&format!("SELECT 1 FROM {} WHERE id = ?1", table))
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(found.is_some())
}

/// Fails with a reference error when a row pointed at by a new row is missing.
async fn ensure_exists(
    conn: &mut SqliteConnection,
    table: &str,
    entity: &'static str,
    id: Uuid,
) -> StoreResult<()> {
    if !row_exists(conn, table, id).await? {
        return Err(StoreError::reference(entity, id));
    }
    Ok(())
}

/// Fails unless the referenced row exists and is scoped to `project_id`.
/// A row of another project would otherwise block that project's delete.
async fn ensure_in_project(
    conn: &mut SqliteConnection,
    table: &str,
    entity: &'static str,
    id: Uuid,
    project_id: Uuid,
) -> StoreResult<()> {
    let owner: Option<(Uuid,)> =
        sqlx::query_as(&format!("SELECT project_id FROM {} WHERE id = ?1", table))
            .bind(id)
            .fetch_optional(&mut *conn)
            .await?;
    match owner {
        None => Err(StoreError::reference(entity, id)),
        Some((owner,)) if owner != project_id => Err(StoreError::Consistency {
            entity,
            field: "project",
        }),
        Some(_) => Ok(()),
    }
}

/// Fails with not-found when the row a lookup is scoped to is missing.
async fn ensure_found(
    conn: &mut SqliteConnection,
    table: &str,
    entity: &'static str,
    id: Uuid,
) -> StoreResult<()> {
    if !row_exists(conn, table, id).await? {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

async fn ensure_owners(conn: &mut SqliteConnection, ownership: &Ownership) -> StoreResult<()> {
    ensure_exists(conn, tables::PROJECTS, ProjectSchema::ENTITY, ownership.project_id).await?;
    if let Some(user_id) = ownership.user_id {
        ensure_exists(conn, tables::USERS, UserSchema::ENTITY, user_id).await?;
    }
    Ok(())
}

async fn delete_by_id(
    conn: &mut SqliteConnection,
    table: &str,
    entity: &'static str,
    id: Uuid,
) -> StoreResult<()> {
    let result = sqlx::query(&format!("DELETE FROM {} WHERE id = ?1", table))
        .bind(id)
        .execute(&mut *conn)
        .await
        .map_err(|e| StoreError::from_delete(e, entity, id))?;

    if result.rows_affected() == 0 {
        return Err(StoreError::not_found(entity, id));
    }
    Ok(())
}

async fn load_owners(conn: &mut SqliteConnection, ownership: &Ownership) -> StoreResult<OwnerRelations> {
    let project = get_row::<ProjectSchema>(conn, tables::PROJECTS, ownership.project_id).await?;
    let user = match ownership.user_id {
        Some(user_id) => fetch_row::<UserSchema>(conn, tables::USERS, user_id).await?,
        None => None,
    };
    Ok(OwnerRelations { project, user })
}

async fn component_model(
    conn: &mut SqliteConnection,
    row: &StackComponentSchema,
) -> StoreResult<ComponentModel> {
    let owners = load_owners(conn, &row.ownership).await?;
    row.to_model(owners)
}

async fn fetch_stack_components(
    conn: &mut SqliteConnection,
    stack_id: Uuid,
) -> StoreResult<Vec<StackComponentSchema>> {
    let rows = sqlx::query_as(
        r#"
        SELECT c.* FROM stack_components c
        JOIN stack_compositions sc ON sc.component_id = c.id
        WHERE sc.stack_id = ?1
        ORDER BY c.type, c.name
        "#,
    )
    .bind(stack_id)
    .fetch_all(&mut *conn)
    .await?;
    Ok(rows)
}

async fn stack_model(conn: &mut SqliteConnection, row: &StackSchema) -> StoreResult<StackModel> {
    let owners = load_owners(conn, &row.ownership).await?;

    let mut components = Vec::new();
    for component in &fetch_stack_components(conn, row.id).await? {
        components.push(component_model(conn, component).await?);
    }

    row.to_model(StackRelations { owners, components })
}

async fn role_model(conn: &mut SqliteConnection, row: &RoleSchema) -> StoreResult<RoleModel> {
    let permissions: Vec<RolePermissionSchema> =
        sqlx::query_as("SELECT * FROM role_permissions WHERE role_id = ?1 ORDER BY name")
            .bind(row.id)
            .fetch_all(&mut *conn)
            .await?;
    row.to_model(permissions)
}

async fn insert_permissions(
    conn: &mut SqliteConnection,
    permissions: &[RolePermissionSchema],
) -> StoreResult<()> {
    for permission in permissions {
        sqlx::query("INSERT INTO role_permissions (name, role_id) VALUES (?1, ?2)")
            .bind(&permission.name)
            .bind(permission.role_id)
            .execute(&mut *conn)
            .await?;
    }
    Ok(())
}

/// Links a component into a stack of `project_id`. The stack row must
/// already exist and the component must belong to the same project.
async fn insert_composition(
    conn: &mut SqliteConnection,
    link: &StackCompositionSchema,
    project_id: Uuid,
) -> StoreResult<()> {
    ensure_in_project(
        conn,
        tables::STACK_COMPONENTS,
        StackComponentSchema::ENTITY,
        link.component_id,
        project_id,
    )
    .await?;

    sqlx::query("INSERT INTO stack_compositions (stack_id, component_id) VALUES (?1, ?2)")
        .bind(link.stack_id)
        .bind(link.component_id)
        .execute(&mut *conn)
        .await
        .map_err(|e| {
            StoreError::from_write(
                e,
                STACK_COMPOSITION,
                format!("{}/{}", link.stack_id, link.component_id),
            )
        })?;
    Ok(())
}

async fn touch_stack(conn: &mut SqliteConnection, row: &mut StackSchema) -> StoreResult<()> {
    row.timestamps.touch();
    sqlx::query("UPDATE stacks SET updated = ?1 WHERE id = ?2")
        .bind(row.timestamps.updated)
        .bind(row.id)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn query_components(
    conn: &mut SqliteConnection,
    filter: &ComponentFilter,
) -> StoreResult<Vec<ComponentModel>> {
    let clause = filter.where_clause();
    let sql = format!("SELECT * FROM stack_components{} ORDER BY type, name", clause.sql());
    let rows = clause
        .bind(sqlx::query_as::<_, StackComponentSchema>(&sql))
        .fetch_all(&mut *conn)
        .await?;

    let mut components = Vec::with_capacity(rows.len());
    for row in &rows {
        components.push(component_model(conn, row).await?);
    }
    Ok(components)
}

async fn query_stacks(conn: &mut SqliteConnection, filter: &StackFilter) -> StoreResult<Vec<StackModel>> {
    let clause = filter.where_clause();
    let sql = format!("SELECT * FROM stacks{} ORDER BY name", clause.sql());
    let rows = clause
        .bind(sqlx::query_as::<_, StackSchema>(&sql))
        .fetch_all(&mut *conn)
        .await?;

    let mut stacks = Vec::with_capacity(rows.len());
    for row in &rows {
        stacks.push(stack_model(conn, row).await?);
    }
    Ok(stacks)
}

async fn query_role_assignments(
    conn: &mut SqliteConnection,
    filter: &RoleAssignmentFilter,
) -> StoreResult<Vec<RoleAssignmentModel>> {
    let mut assignments = Vec::new();

    if filter.includes_users() {
        let clause = filter.user_where_clause();
        let sql = format!("SELECT * FROM user_role_assignments{}", clause.sql());
        let rows = clause
            .bind(sqlx::query_as::<_, UserRoleAssignmentSchema>(&sql))
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            assignments.push(row.to_model(())?);
        }
    }

    if filter.includes_teams() {
        let clause = filter.team_where_clause();
        let sql = format!("SELECT * FROM team_role_assignments{}", clause.sql());
        let rows = clause
            .bind(sqlx::query_as::<_, TeamRoleAssignmentSchema>(&sql))
            .fetch_all(&mut *conn)
            .await?;
        for row in &rows {
            assignments.push(row.to_model(())?);
        }
    }

    assignments.sort_by_key(|a| a.created);
    Ok(assignments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{PermissionType, StackComponentType};

    async fn setup() -> (Database, ProjectModel) {
        let db = Database::in_memory().await.unwrap();
        let project = db.create_project(&ProjectCreate::new("p1")).await.unwrap();
        (db, project)
    }

    #[tokio::test]
    async fn test_project_crud() {
        let (db, project) = setup().await;

        assert_eq!(db.get_project(project.id).await.unwrap(), project);
        assert_eq!(db.get_project_by_name("p1").await.unwrap().id, project.id);

        let updated = db
            .update_project(
                project.id,
                &ProjectUpdate {
                    description: Some("renamed".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "p1");
        assert_eq!(updated.description, "renamed");
        assert_eq!(updated.created, project.created);
        assert!(updated.updated >= project.updated);

        db.delete_project(project.id).await.unwrap();
        let err = db.get_project(project.id).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert!(db.list_projects().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_duplicate_project_name() {
        let (db, _) = setup().await;
        let err = db
            .create_project(&ProjectCreate::new("p1"))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_ERROR");
    }

    #[tokio::test]
    async fn test_delete_missing_is_not_found() {
        let (db, _) = setup().await;
        let err = db.delete_stack(Uuid::new_v4()).await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_component_with_missing_project_is_reference_error() {
        let (db, _) = setup().await;
        let create = ComponentCreate::new("orch", StackComponentType::Orchestrator, "local", Uuid::new_v4());
        let err = db.create_component(&create).await.unwrap_err();
        assert!(matches!(err, StoreError::Reference { entity: "project", .. }));
    }

    #[tokio::test]
    async fn test_component_configuration_round_trip() {
        let (db, project) = setup().await;
        let configuration = match serde_json::json!({
            "retries": 3,
            "threshold": 0.1,
            "nested": {"list": [1, "two", null, true]}
        }) {
            serde_json::Value::Object(map) => map,
            _ => unreachable!(),
        };
        let created = db
            .create_component(
                &ComponentCreate::new("store", StackComponentType::ArtifactStore, "local", project.id)
                    .with_configuration(configuration.clone()),
            )
            .await
            .unwrap();

        let fetched = db.get_component(created.id).await.unwrap();
        assert_eq!(fetched.configuration, configuration);
        assert_eq!(fetched.project.id, project.id);
    }

    #[tokio::test]
    async fn test_role_permissions_replaced_on_update() {
        let (db, _) = setup().await;
        let role = db
            .create_role(&RoleCreate::new("admin").with_permission(PermissionType::Read))
            .await
            .unwrap();

        let updated = db
            .update_role(
                role.id,
                &RoleUpdate {
                    name: None,
                    permissions: Some(
                        [PermissionType::Write, PermissionType::Me].into_iter().collect(),
                    ),
                },
            )
            .await
            .unwrap();

        assert_eq!(updated.name, "admin");
        assert!(!updated.permissions.contains(&PermissionType::Read));
        assert_eq!(updated.permissions.len(), 2);
        assert_eq!(db.get_role_by_name("admin").await.unwrap().permissions, updated.permissions);
    }

    #[tokio::test]
    async fn test_run_status_update() {
        let (db, project) = setup().await;
        let run = db
            .create_pipeline_run(&PipelineRunCreate::new("run-1", project.id))
            .await
            .unwrap();

        let run = db
            .update_pipeline_run(
                run.id,
                &PipelineRunUpdate {
                    status: Some(crate::models::ExecutionStatus::Completed),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert!(run.status.is_finished());

        let listed = db
            .list_pipeline_runs(&RunFilter::new().with_status(crate::models::ExecutionStatus::Completed))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
