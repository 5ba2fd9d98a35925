mod migrator;
mod models;
pub mod resource_mapper;
mod schema;
mod sqlite_metadata_store;
mod sqlite_play_history;

pub use migrator::SchemaMigrator;
pub use models::*;
pub use schema::{
    latest_schema_version, versioned_schemas, IdentityKey, LEGACY_PLAY_HISTORY_TABLE_V1,
    LEGACY_PLAY_HISTORY_VERSIONED_SCHEMAS, METADATA_KEY_MAX_LEN, METADATA_TABLE_NAME,
    METADATA_TABLE_V1, PLAY_HISTORY_TABLE_NAME, PLAY_HISTORY_TABLE_V1,
    PLAY_HISTORY_VERSIONED_SCHEMAS, VERSION_KEY,
};
pub use sqlite_metadata_store::SqliteMetadataStore;
pub use sqlite_play_history::SqlitePlayHistoryRepository;

use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};

pub trait MetadataStore: Send + Sync {
    /// Returns `None` when the key is absent.
    fn get(&self, key: &str) -> DbResult<Option<String>>;
    /// Inserts or replaces the value. Keys are 1 to [`METADATA_KEY_MAX_LEN`] characters.
    fn set(&self, key: &str, value: &str) -> DbResult<()>;

    /// The stored schema version, `None` if no version was ever written.
    fn version(&self) -> DbResult<Option<usize>> {
        self.get(VERSION_KEY)?
            .map(|value| parse_version(&value))
            .transpose()
    }
}

/// Parses a stored `Version` value.
pub(crate) fn parse_version(value: &str) -> DbResult<usize> {
    value.trim().parse().map_err(|_| {
        DbError::SchemaCorrupt(format!("schema version {:?} is not a number", value))
    })
}

pub trait PlayHistoryRepository: Send + Sync {
    /// Records one play of `resource`.
    ///
    /// Creates the entry on the first play of an identity, otherwise bumps
    /// its play count and moves its timestamp to `now`.
    fn record_play(
        &self,
        resource: &AudioResource,
        invoker_id: u64,
        now: DateTime<Utc>,
    ) -> DbResult<PlayHistoryEntry>;
    fn find(&self, resource: &AudioResource) -> DbResult<Option<PlayHistoryEntry>>;
    fn get(&self, id: i64) -> DbResult<Option<PlayHistoryEntry>>;
    /// Snapshot of all entries, ordered by id.
    fn list(&self) -> DbResult<Vec<PlayHistoryEntry>>;
    /// Entries with the highest play count first, ties by id.
    fn most_played(&self, limit: usize) -> DbResult<Vec<PlayHistoryEntry>>;
    fn stats(&self) -> DbResult<HistoryStats>;
}
