use crate::config::DbConfig;
use crate::error::DbResult;
use crate::history_store::{
    versioned_schemas, IdentityKey, SchemaMigrator, SqliteMetadataStore,
    SqlitePlayHistoryRepository,
};
use crate::sqlite_persistence::VersionedSchema;
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Owns the history database connection.
///
/// The schema is created or upgraded inside [`DbProvider::open`], so holding
/// a provider means the repositories are ready to use.
pub struct DbProvider {
    db_path: PathBuf,
    schema_version: usize,
    identity_key: IdentityKey,
    metadata: SqliteMetadataStore,
    play_history: SqlitePlayHistoryRepository,
}

impl DbProvider {
    pub fn open(config: &DbConfig) -> DbResult<Self> {
        Self::open_with_schemas(config, versioned_schemas(config.identity_key))
    }

    /// Like [`DbProvider::open`] with a custom schema chain, e.g. one that
    /// carries extra versions.
    pub fn open_with_schemas(
        config: &DbConfig,
        schemas: &'static [VersionedSchema],
    ) -> DbResult<Self> {
        let migrator = SchemaMigrator::new(schemas, config.supported_version)?;

        let mut conn = Connection::open(&config.db_path)?;
        let schema_version = migrator.ensure_schema(&mut conn)?;
        info!(
            "Opened play history database at {:?} (schema version {}, identity key {})",
            config.db_path,
            schema_version,
            config.identity_key.as_str()
        );

        let conn = Arc::new(Mutex::new(conn));
        Ok(Self {
            db_path: config.db_path.clone(),
            schema_version,
            identity_key: config.identity_key,
            metadata: SqliteMetadataStore::new(conn.clone()),
            play_history: SqlitePlayHistoryRepository::new(conn, config.identity_key),
        })
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    pub fn schema_version(&self) -> usize {
        self.schema_version
    }

    pub fn identity_key(&self) -> IdentityKey {
        self.identity_key
    }

    pub fn metadata(&self) -> &SqliteMetadataStore {
        &self.metadata
    }

    pub fn play_history(&self) -> &SqlitePlayHistoryRepository {
        &self.play_history
    }
}
