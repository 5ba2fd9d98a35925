//! Play history store for the audio bot.
//!
//! Keeps one SQLite file per server with a metadata table (schema version
//! stamp and other small facts) and a play history table with one row per
//! played resource.

pub mod config;
pub mod db_provider;
pub mod error;
pub mod history_store;
pub mod sqlite_persistence;

pub use config::DbConfig;
pub use db_provider::DbProvider;
pub use error::{DbError, DbResult};
pub use history_store::{
    AudioResource, AudioType, HistoryStats, IdentityKey, MetadataStore, PlayHistoryEntry,
    PlayHistoryRepository,
};
