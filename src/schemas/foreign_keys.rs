//! Foreign-key declarations and their deletion policies.
//!
//! [`FOREIGN_KEYS`] is the single source of truth for how deletes propagate
//! through the relationship graph. The table DDL in
//! [`crate::storage::schema`] is generated from it, so the engine enforces
//! exactly these rules.

use std::fmt;

use crate::storage::schema::tables;

/// What happens to a referencing row when its parent is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    /// The referencing row is deleted too.
    Cascade,
    /// The reference is cleared and the row survives.
    SetNull,
    /// No action is declared; the delete fails while references remain.
    Restrict,
}

impl OnDelete {
    /// The `ON DELETE` clause for this policy. `Restrict` declares none so
    /// the engine checks the constraint at the end of the statement, which
    /// lets a cascade remove the referencing rows first.
    pub fn clause(&self) -> Option<&'static str> {
        match self {
            OnDelete::Cascade => Some("ON DELETE CASCADE"),
            OnDelete::SetNull => Some("ON DELETE SET NULL"),
            OnDelete::Restrict => None,
        }
    }
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::Cascade => f.write_str("CASCADE"),
            OnDelete::SetNull => f.write_str("SET_NULL"),
            OnDelete::Restrict => f.write_str("RESTRICT"),
        }
    }
}

/// A single foreign-key column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKey {
    pub source: &'static str,
    pub source_column: &'static str,
    pub target: &'static str,
    pub target_column: &'static str,
    pub on_delete: OnDelete,
    pub nullable: bool,
    /// Whether the column is part of the source table's composite key.
    pub primary_key: bool,
}

/// Declares a foreign key from `source.source_column` to `target.id`.
pub const fn build_foreign_key_field(
    source: &'static str,
    source_column: &'static str,
    target: &'static str,
    on_delete: OnDelete,
    nullable: bool,
) -> ForeignKey {
    ForeignKey {
        source,
        source_column,
        target,
        target_column: "id",
        on_delete,
        nullable,
        primary_key: false,
    }
}

/// Declares a non-null cascading foreign key that is part of a join table's
/// composite primary key.
pub const fn build_join_key_field(
    source: &'static str,
    source_column: &'static str,
    target: &'static str,
) -> ForeignKey {
    ForeignKey {
        source,
        source_column,
        target,
        target_column: "id",
        on_delete: OnDelete::Cascade,
        nullable: false,
        primary_key: true,
    }
}

use OnDelete::{Cascade, Restrict, SetNull};

pub const FOREIGN_KEYS: &[ForeignKey] = &[
    // team membership
    build_join_key_field(tables::TEAM_ASSIGNMENTS, "user_id", tables::USERS),
    build_join_key_field(tables::TEAM_ASSIGNMENTS, "team_id", tables::TEAMS),
    // roles
    build_join_key_field(tables::ROLE_PERMISSIONS, "role_id", tables::ROLES),
    build_foreign_key_field(tables::USER_ROLE_ASSIGNMENTS, "role_id", tables::ROLES, Cascade, false),
    build_foreign_key_field(tables::USER_ROLE_ASSIGNMENTS, "user_id", tables::USERS, Cascade, false),
    build_foreign_key_field(tables::USER_ROLE_ASSIGNMENTS, "project_id", tables::PROJECTS, Cascade, true),
    build_foreign_key_field(tables::TEAM_ROLE_ASSIGNMENTS, "role_id", tables::ROLES, Cascade, false),
    build_foreign_key_field(tables::TEAM_ROLE_ASSIGNMENTS, "team_id", tables::TEAMS, Cascade, false),
    build_foreign_key_field(tables::TEAM_ROLE_ASSIGNMENTS, "project_id", tables::PROJECTS, Cascade, true),
    // project-scoped entities
    build_foreign_key_field(tables::FLAVORS, "project_id", tables::PROJECTS, Cascade, false),
    build_foreign_key_field(tables::FLAVORS, "user_id", tables::USERS, SetNull, true),
    build_foreign_key_field(tables::STACK_COMPONENTS, "project_id", tables::PROJECTS, Cascade, false),
    build_foreign_key_field(tables::STACK_COMPONENTS, "user_id", tables::USERS, SetNull, true),
    build_foreign_key_field(tables::STACKS, "project_id", tables::PROJECTS, Cascade, false),
    build_foreign_key_field(tables::STACKS, "user_id", tables::USERS, SetNull, true),
    build_join_key_field(tables::STACK_COMPOSITIONS, "stack_id", tables::STACKS),
    build_join_key_field(tables::STACK_COMPOSITIONS, "component_id", tables::STACK_COMPONENTS),
    build_foreign_key_field(tables::PIPELINES, "project_id", tables::PROJECTS, Cascade, false),
    build_foreign_key_field(tables::PIPELINES, "user_id", tables::USERS, SetNull, true),
    build_foreign_key_field(tables::PIPELINE_RUNS, "project_id", tables::PROJECTS, Cascade, false),
    build_foreign_key_field(tables::PIPELINE_RUNS, "user_id", tables::USERS, SetNull, true),
    build_foreign_key_field(tables::PIPELINE_RUNS, "pipeline_id", tables::PIPELINES, Restrict, true),
    build_foreign_key_field(tables::PIPELINE_RUNS, "stack_id", tables::STACKS, Restrict, true),
];

/// Foreign keys declared on `table`, in declaration order.
pub fn foreign_keys_of(table: &str) -> impl Iterator<Item = &'static ForeignKey> + '_ {
    FOREIGN_KEYS.iter().filter(move |fk| fk.source == table)
}

/// Foreign keys pointing at `table`.
pub fn references_to(table: &str) -> impl Iterator<Item = &'static ForeignKey> + '_ {
    FOREIGN_KEYS.iter().filter(move |fk| fk.target == table)
}

/// Deletion policy of `source.source_column`, if such a key is declared.
pub fn policy_for(source: &str, source_column: &str) -> Option<OnDelete> {
    FOREIGN_KEYS
        .iter()
        .find(|fk| fk.source == source && fk.source_column == source_column)
        .map(|fk| fk.on_delete)
}

/// Renders the table-level `FOREIGN KEY` constraint for a declaration.
pub fn build_foreign_key_clause(fk: &ForeignKey) -> String {
    let mut clause = format!(
        "FOREIGN KEY ({}) REFERENCES {}({})",
        fk.source_column, fk.target, fk.target_column
    );
    if let Some(action) = fk.on_delete.clause() {
        clause.push(' ');
        clause.push_str(action);
    }
    clause
}
