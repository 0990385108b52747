//! Error types for metadata store operations.
//!
//! Every failure surfaced by the schema and storage layers is a
//! [`StoreError`]. Each variant carries a stable code so that the CLI (or any
//! service sitting above this crate) can tell "not found" apart from an
//! integrity violation or from corrupted data:
//! - `REFERENCE_ERROR`: a foreign key points at a row that does not exist
//! - `DUPLICATE_ERROR`: a unique or composite key is already taken
//! - `CONSISTENCY_ERROR`: an immutable association was changed on update,
//!   or a row links to one owned by another project
//! - `DECODE_ERROR`: a stored value could not be decoded
//! - `NOT_FOUND`: a lookup by id or name found nothing
//! - `SECRET_ERROR`: a password or token could not be hashed

use sqlx::error::ErrorKind;
use thiserror::Error;
use uuid::Uuid;

use crate::storage::MigrationError;

/// Errors that can occur while mapping or persisting metadata entities.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{entity} '{id}' does not exist")]
    Reference { entity: &'static str, id: String },

    #[error("{entity} '{key}' already exists")]
    Duplicate { entity: &'static str, key: String },

    #[error("The {field} of the {entity} does not match its owner")]
    Consistency {
        entity: &'static str,
        field: &'static str,
    },

    #[error("Failed to decode stored data: {0}")]
    Decode(String),

    #[error("No {entity} found for '{key}'")]
    NotFound { entity: &'static str, key: String },

    #[error("{entity} '{id}' is still referenced by other rows")]
    Restricted { entity: &'static str, id: Uuid },

    #[error("Failed to hash secret: {0}")]
    Secret(String),

    #[error("Database error: {0}")]
    Database(sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] MigrationError),
}

impl StoreError {
    /// Stable, machine-readable code for this error kind.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Reference { .. } => "REFERENCE_ERROR",
            StoreError::Duplicate { .. } => "DUPLICATE_ERROR",
            StoreError::Consistency { .. } => "CONSISTENCY_ERROR",
            StoreError::Decode(_) => "DECODE_ERROR",
            StoreError::NotFound { .. } => "NOT_FOUND",
            StoreError::Restricted { .. } => "RESTRICTED",
            StoreError::Secret(_) => "SECRET_ERROR",
            StoreError::Database(_) => "DATABASE_ERROR",
            StoreError::Migration(_) => "MIGRATION_ERROR",
        }
    }

    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    pub fn reference(entity: &'static str, id: impl ToString) -> Self {
        StoreError::Reference {
            entity,
            id: id.to_string(),
        }
    }

    pub fn duplicate(entity: &'static str, key: impl ToString) -> Self {
        StoreError::Duplicate {
            entity,
            key: key.to_string(),
        }
    }

    /// Classifies an engine error raised while writing a row of `entity`.
    ///
    /// Unique and primary-key violations become [`StoreError::Duplicate`],
    /// foreign-key violations become [`StoreError::Reference`]. Anything else
    /// is passed through untouched.
    pub fn from_write(err: sqlx::Error, entity: &'static str, key: impl ToString) -> Self {
        match constraint_kind(&err) {
            Some(ErrorKind::UniqueViolation) => StoreError::duplicate(entity, key),
            Some(ErrorKind::ForeignKeyViolation) => StoreError::reference(entity, key),
            _ => StoreError::Database(err),
        }
    }

    /// Classifies an engine error raised while deleting `entity` row `id`.
    pub fn from_delete(err: sqlx::Error, entity: &'static str, id: Uuid) -> Self {
        match constraint_kind(&err) {
            Some(ErrorKind::ForeignKeyViolation) => StoreError::Restricted { entity, id },
            _ => StoreError::Database(err),
        }
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err)
    }
}

/// Result alias used throughout the crate.
pub type StoreResult<T> = Result<T, StoreError>;

fn constraint_kind(err: &sqlx::Error) -> Option<ErrorKind> {
    let db_err = err.as_database_error()?;
    match db_err.kind() {
        ErrorKind::Other => {
            // Older SQLite builds report constraint failures without the
            // extended result code.
            let message = db_err.message();
            if message.contains("UNIQUE constraint failed") {
                Some(ErrorKind::UniqueViolation)
            } else if message.contains("FOREIGN KEY constraint failed") {
                Some(ErrorKind::ForeignKeyViolation)
            } else {
                None
            }
        }
        kind => Some(kind),
    }
}
