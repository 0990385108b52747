//! Database schema definitions.
//!
//! Column lists are declared per table here; the foreign-key constraints
//! are appended from [`crate::schemas::foreign_keys::FOREIGN_KEYS`] so the
//! deletion policies live in exactly one place.

use crate::schemas::foreign_keys::{build_foreign_key_clause, foreign_keys_of};

/// Table names in the schema.
pub mod tables {
    pub const PROJECTS: &str = "projects";
    pub const USERS: &str = "users";
    pub const TEAMS: &str = "teams";
    pub const TEAM_ASSIGNMENTS: &str = "team_assignments";
    pub const ROLES: &str = "roles";
    pub const ROLE_PERMISSIONS: &str = "role_permissions";
    pub const USER_ROLE_ASSIGNMENTS: &str = "user_role_assignments";
    pub const TEAM_ROLE_ASSIGNMENTS: &str = "team_role_assignments";
    pub const FLAVORS: &str = "flavors";
    pub const STACK_COMPONENTS: &str = "stack_components";
    pub const STACKS: &str = "stacks";
    pub const STACK_COMPOSITIONS: &str = "stack_compositions";
    pub const PIPELINES: &str = "pipelines";
    pub const PIPELINE_RUNS: &str = "pipeline_runs";
}

/// Column and key definitions of one table, without foreign keys.
pub struct TableDef {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    /// Composite primary key, for tables without an `id` column.
    pub primary_key: Option<&'static [&'static str]>,
    pub unique: &'static [&'static [&'static str]],
}

const TIMESTAMP_COLUMNS: [&str; 2] = ["created TEXT NOT NULL", "updated TEXT NOT NULL"];

/// Every table, parents before children.
pub const TABLES: &[TableDef] = &[
    TableDef {
        name: tables::PROJECTS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "description TEXT NOT NULL DEFAULT ''",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[&["name"]],
    },
    TableDef {
        name: tables::USERS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "full_name TEXT NOT NULL DEFAULT ''",
            "email TEXT",
            "email_opted_in INTEGER",
            "active INTEGER NOT NULL",
            "password TEXT",
            "activation_token TEXT",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[&["name"]],
    },
    TableDef {
        name: tables::TEAMS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[&["name"]],
    },
    TableDef {
        name: tables::TEAM_ASSIGNMENTS,
        columns: &["user_id BLOB NOT NULL", "team_id BLOB NOT NULL"],
        primary_key: Some(&["user_id", "team_id"]),
        unique: &[],
    },
    TableDef {
        name: tables::ROLES,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[&["name"]],
    },
    TableDef {
        name: tables::ROLE_PERMISSIONS,
        columns: &["name TEXT NOT NULL", "role_id BLOB NOT NULL"],
        primary_key: Some(&["name", "role_id"]),
        unique: &[],
    },
    TableDef {
        name: tables::USER_ROLE_ASSIGNMENTS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "role_id BLOB NOT NULL",
            "user_id BLOB NOT NULL",
            "project_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[],
    },
    TableDef {
        name: tables::TEAM_ROLE_ASSIGNMENTS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "role_id BLOB NOT NULL",
            "team_id BLOB NOT NULL",
            "project_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[],
    },
    TableDef {
        name: tables::FLAVORS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "type TEXT NOT NULL",
            "source TEXT NOT NULL",
            "config_schema TEXT NOT NULL",
            "integration TEXT",
            "project_id BLOB NOT NULL",
            "user_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[&["project_id", "type", "name"]],
    },
    TableDef {
        name: tables::STACK_COMPONENTS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "is_shared INTEGER NOT NULL",
            "type TEXT NOT NULL",
            "flavor TEXT NOT NULL",
            "configuration BLOB NOT NULL",
            "project_id BLOB NOT NULL",
            "user_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[],
    },
    TableDef {
        name: tables::STACKS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "is_shared INTEGER NOT NULL",
            "project_id BLOB NOT NULL",
            "user_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[],
    },
    TableDef {
        name: tables::STACK_COMPOSITIONS,
        columns: &["stack_id BLOB NOT NULL", "component_id BLOB NOT NULL"],
        primary_key: Some(&["stack_id", "component_id"]),
        unique: &[],
    },
    TableDef {
        name: tables::PIPELINES,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "docstring TEXT",
            "spec TEXT NOT NULL",
            "project_id BLOB NOT NULL",
            "user_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[],
    },
    TableDef {
        name: tables::PIPELINE_RUNS,
        columns: &[
            "id BLOB PRIMARY KEY NOT NULL",
            "name TEXT NOT NULL",
            "status TEXT NOT NULL",
            "pipeline_id BLOB",
            "stack_id BLOB",
            "pipeline_configuration TEXT NOT NULL",
            "num_steps INTEGER",
            "project_id BLOB NOT NULL",
            "user_id BLOB",
            TIMESTAMP_COLUMNS[0],
            TIMESTAMP_COLUMNS[1],
        ],
        primary_key: None,
        unique: &[],
    },
];

/// Builds the `CREATE TABLE` statement for a table definition.
pub fn create_table_statement(table: &TableDef) -> String {
    let mut lines: Vec<String> = table.columns.iter().map(|c| format!("    {}", c)).collect();

    if let Some(key) = table.primary_key {
        lines.push(format!("    PRIMARY KEY ({})", key.join(", ")));
    }
    for unique in table.unique {
        lines.push(format!("    UNIQUE ({})", unique.join(", ")));
    }
    for fk in foreign_keys_of(table.name) {
        lines.push(format!("    {}", build_foreign_key_clause(fk)));
    }

    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
        table.name,
        lines.join(",\n")
    )
}

/// SQL for creating all required indexes.
pub const CREATE_INDEXES: &str = r#"
CREATE INDEX IF NOT EXISTS idx_stack_components_project_id ON stack_components(project_id);
CREATE INDEX IF NOT EXISTS idx_stack_components_user_id ON stack_components(user_id);
CREATE INDEX IF NOT EXISTS idx_stacks_project_id ON stacks(project_id);
CREATE INDEX IF NOT EXISTS idx_stacks_user_id ON stacks(user_id);
CREATE INDEX IF NOT EXISTS idx_stack_compositions_component_id ON stack_compositions(component_id);
CREATE INDEX IF NOT EXISTS idx_flavors_project_id ON flavors(project_id);
CREATE INDEX IF NOT EXISTS idx_pipelines_project_id ON pipelines(project_id);
CREATE INDEX IF NOT EXISTS idx_pipeline_runs_project_id ON pipeline_runs(project_id);
CREATE INDEX IF NOT EXISTS idx_pipeline_runs_stack_id ON pipeline_runs(stack_id);
CREATE INDEX IF NOT EXISTS idx_pipeline_runs_pipeline_id ON pipeline_runs(pipeline_id);
CREATE INDEX IF NOT EXISTS idx_user_role_assignments_user_id ON user_role_assignments(user_id);
CREATE INDEX IF NOT EXISTS idx_team_role_assignments_team_id ON team_role_assignments(team_id);
CREATE INDEX IF NOT EXISTS idx_team_assignments_team_id ON team_assignments(team_id)
"#;

/// Name of the migration step that creates the indexes.
pub const INDEXES_MIGRATION: &str = "create_indexes";

/// Name of the migration step that creates `table`.
pub fn table_migration_name(table: &str) -> String {
    format!("create_{}", table)
}

/// Returns all schema creation statements in the correct order, each paired
/// with the name of its migration step.
pub fn all_schema_statements() -> Vec<(String, String)> {
    let mut statements: Vec<(String, String)> = TABLES
        .iter()
        .map(|table| (table_migration_name(table.name), create_table_statement(table)))
        .collect();
    statements.push((INDEXES_MIGRATION.to_string(), CREATE_INDEXES.to_string()));
    statements
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schemas::foreign_keys::FOREIGN_KEYS;

    #[test]
    fn test_all_schema_statements_order() {
        let statements = all_schema_statements();
        assert_eq!(statements.len(), TABLES.len() + 1);
        assert_eq!(statements[0].0, "create_projects");
        assert!(statements[0].1.contains("projects"));

        let (name, sql) = statements.last().unwrap();
        assert_eq!(name, INDEXES_MIGRATION);
        assert!(sql.contains("CREATE INDEX"));
    }

    #[test]
    fn test_migration_names_follow_tables() {
        let statements = all_schema_statements();
        for (table, (name, sql)) in TABLES.iter().zip(&statements) {
            assert_eq!(name, &format!("create_{}", table.name));
            assert!(sql.contains(&format!("CREATE TABLE IF NOT EXISTS {} ", table.name)));
        }

        let mut names: Vec<&str> = statements.iter().map(|(name, _)| name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), statements.len());
    }

    #[test]
    fn test_parents_are_created_before_children() {
        let position = |name: &str| TABLES.iter().position(|t| t.name == name).unwrap();
        for fk in FOREIGN_KEYS {
            assert!(
                position(fk.target) < position(fk.source),
                "{} must be created before {}",
                fk.target,
                fk.source
            );
        }
    }

    #[test]
    fn test_every_foreign_key_column_is_declared() {
        for fk in FOREIGN_KEYS {
            let table = TABLES.iter().find(|t| t.name == fk.source).unwrap();
            let column = table
                .columns
                .iter()
                .find(|c| c.split_whitespace().next() == Some(fk.source_column))
                .unwrap_or_else(|| panic!("{}.{} missing", fk.source, fk.source_column));
            assert_eq!(
                column.contains("NOT NULL"),
                !fk.nullable,
                "{}.{} nullability",
                fk.source,
                fk.source_column
            );
        }
    }

    #[test]
    fn test_join_table_statement() {
        let table = TABLES
            .iter()
            .find(|t| t.name == tables::STACK_COMPOSITIONS)
            .unwrap();
        let sql = create_table_statement(table);

        assert!(sql.contains("PRIMARY KEY (stack_id, component_id)"));
        assert!(sql.contains("REFERENCES stacks(id) ON DELETE CASCADE"));
        assert!(sql.contains("REFERENCES stack_components(id) ON DELETE CASCADE"));
    }

    #[test]
    fn test_run_references_are_restrictive() {
        let table = TABLES.iter().find(|t| t.name == tables::PIPELINE_RUNS).unwrap();
        let sql = create_table_statement(table);

        assert!(sql.contains("FOREIGN KEY (stack_id) REFERENCES stacks(id)\n")
            || sql.contains("FOREIGN KEY (stack_id) REFERENCES stacks(id),"));
        assert!(sql.contains("FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE SET NULL"));
    }
}
