//! Storage-specific error type wrapping sqlx errors.

use metahub_domain::error::{MetaError, NotFoundError, ValidationError};

/// Errors originating from the `SQLite` storage layer.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// A query or connection failed.
    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// Failed to (de)serialize a stored JSON body.
    #[error("JSON serialization error")]
    Json(#[from] serde_json::Error),

    /// Failed to run migrations.
    #[error("migration error")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// An insert hit the unique index on `name`.
    #[error("{entity} name '{name}' already exists")]
    Duplicate { entity: &'static str, name: String },

    /// An update or delete matched no row.
    #[error("{entity} '{name}' not found")]
    Missing { entity: &'static str, name: String },
}

impl StorageError {
    /// Classify an insert failure, singling out unique-name violations.
    pub(crate) fn on_insert(entity: &'static str, name: &str, err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => Self::Duplicate {
                entity,
                name: name.to_string(),
            },
            _ => Self::Database(err),
        }
    }
}

impl From<StorageError> for MetaError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::Duplicate { entity, name } => {
                ValidationError::DuplicateName { entity, name }.into()
            }
            StorageError::Missing { entity, name } => NotFoundError { entity, id: name }.into(),
            other => Self::Storage(Box::new(other)),
        }
    }
}
