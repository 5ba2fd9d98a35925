use thiserror::Error;

pub type DbResult<T> = std::result::Result<T, DbError>;

/// Errors surfaced by the history database.
///
/// Schema errors (`IncompatibleSchema`, `SchemaCorrupt`, `MigrationFailed`)
/// need operator action and must never be retried automatically.
/// `StorageIo` may be transient, callers decide whether to retry it.
#[derive(Debug, Error)]
pub enum DbError {
    #[error(
        "The database file version {found} is newer than this program can read (supported: {supported}). Please update to the latest version."
    )]
    IncompatibleSchema { found: usize, supported: usize },

    #[error(
        "The database schema is corrupt: {0}. Restore the file from a backup or reset the play history."
    )]
    SchemaCorrupt(String),

    #[error("Storage error: {0}")]
    StorageIo(#[source] rusqlite::Error),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(#[source] rusqlite::Error),

    #[error("Invalid metadata key {key:?}, keys must be 1 to {max} characters long")]
    InvalidMetadataKey { key: String, max: usize },

    #[error("Failed to migrate database from version {from} to {to}: {source:#}")]
    MigrationFailed {
        from: usize,
        to: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid database configuration: {0}")]
    Config(String),
}

impl DbError {
    pub fn is_fatal_at_startup(&self) -> bool {
        matches!(
            self,
            DbError::IncompatibleSchema { .. }
                | DbError::SchemaCorrupt(_)
                | DbError::MigrationFailed { .. }
                | DbError::Config(_)
        )
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(failure, _)
                if failure.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                DbError::ConstraintViolation(err)
            }
            // stored value doesn't map back to the model
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::IntegralValueOutOfRange(..) => {
                DbError::SchemaCorrupt(err.to_string())
            }
            _ => DbError::StorageIo(err),
        }
    }
}
