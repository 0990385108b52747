//! Database migration helpers.
//!
//! This module provides utilities for running database migrations
//! and managing schema versions.

use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{debug, info};

use super::schema;

/// Errors that can occur during migration operations.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// Database query failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Migration script failed to execute.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),
}

/// Migration runner for applying schema changes.
pub struct MigrationRunner {
    pool: SqlitePool,
}

impl MigrationRunner {
    /// Creates a new migration runner.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Runs all pending migrations.
    ///
    /// This method is idempotent - running it multiple times will not
    /// cause errors or duplicate schema objects due to IF NOT EXISTS clauses.
    pub async fn run_migrations(&self) -> Result<(), MigrationError> {
        self.ensure_migrations_table().await?;

        let mut applied = 0;
        // Steps are keyed by table, so adding a table never renames the others.
        for (migration_name, statement) in schema::all_schema_statements() {
            if !self.is_migration_applied(&migration_name).await? {
                self.apply_migration(&migration_name, &statement).await?;
                applied += 1;
            }
        }

        info!(applied, "Schema migrations complete");
        Ok(())
    }

    /// Ensures the migrations tracking table exists.
    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                applied_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Checks if a migration has already been applied.
    async fn is_migration_applied(&self, name: &str) -> Result<bool, MigrationError> {
        let result: Option<(i64,)> = sqlx::query_as("SELECT id FROM _migrations WHERE name = ?1")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;

        Ok(result.is_some())
    }

    /// Applies a single migration.
    async fn apply_migration(&self, name: &str, sql: &str) -> Result<(), MigrationError> {
        debug!(migration = name, "Applying migration");
        let mut tx = self.pool.begin().await?;

        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| MigrationError::MigrationFailed(format!("{}: {}", name, e)))?;

        sqlx::query("INSERT INTO _migrations (name) VALUES (?1)")
            .bind(name)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(())
    }

    /// Returns a list of applied migrations.
    pub async fn list_applied_migrations(&self) -> Result<Vec<AppliedMigration>, MigrationError> {
        self.ensure_migrations_table().await?;

        let migrations: Vec<AppliedMigration> =
            sqlx::query_as("SELECT name, applied_at FROM _migrations ORDER BY id")
                .fetch_all(&self.pool)
                .await?;

        Ok(migrations)
    }

    /// Resets the database by dropping all tables.
    ///
    /// **WARNING**: This will destroy all data! Use only in development/testing.
    pub async fn reset_database(&self) -> Result<(), MigrationError> {
        // Children first so no constraint is violated along the way.
        let mut drop_statements: Vec<String> = schema::TABLES
            .iter()
            .rev()
            .map(|t| format!("DROP TABLE IF EXISTS {}", t.name))
            .collect();
        drop_statements.push("DROP TABLE IF EXISTS _migrations".to_string());

        for statement in &drop_statements {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::MigrationFailed(format!("Drop failed: {}", e)))?;
        }

        info!(tables = drop_statements.len(), "Database reset");
        Ok(())
    }

    /// Names of the entity tables currently present in the database.
    pub async fn existing_tables(&self) -> Result<Vec<String>, MigrationError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE '\\_%' ESCAPE '\\' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|(name,)| name).collect())
    }
}

/// Record of an applied migration.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AppliedMigration {
    /// Name of the migration.
    pub name: String,
    /// When the migration was applied.
    pub applied_at: String,
}
