//! SQLite schema definitions for the play history database.
//!
//! The schema version lives in the `metadata` table under [`VERSION_KEY`],
//! not in `PRAGMA user_version`, so the file describes itself.

use crate::sqlite_column;
use crate::sqlite_persistence::{SqlType, Table, VersionedSchema};

pub const METADATA_TABLE_NAME: &str = "metadata";
pub const PLAY_HISTORY_TABLE_NAME: &str = "play_history";

/// Metadata key holding the schema version stamp.
pub const VERSION_KEY: &str = "Version";
/// Metadata keys are limited to this many characters.
pub const METADATA_KEY_MAX_LEN: usize = 16;

/// Which columns make a play history row unique.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
#[value(rename_all = "snake_case")]
pub enum IdentityKey {
    /// `UNIQUE(resource_type, resource_id)`
    #[default]
    TypeAndId,
    /// `UNIQUE(resource_id)`. Legacy layout where ids collide across
    /// resource types.
    ResourceIdOnly,
}

impl IdentityKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentityKey::TypeAndId => "type_and_id",
            IdentityKey::ResourceIdOnly => "resource_id_only",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "type_and_id" => Some(IdentityKey::TypeAndId),
            "resource_id_only" => Some(IdentityKey::ResourceIdOnly),
            _ => None,
        }
    }
}

// =============================================================================
// Version 1 - Metadata and play history
// =============================================================================

/// Key-value facts about the file itself, e.g. the schema version
pub const METADATA_TABLE_V1: Table = Table {
    name: METADATA_TABLE_NAME,
    columns: &[
        sqlite_column!("key", SqlType::Text, is_primary_key = true),
        sqlite_column!("value", SqlType::Text),
    ],
    indices: &[],
    unique_constraints: &[],
};

const PLAY_HISTORY_COLUMNS_V1: &[crate::sqlite_persistence::Column] = &[
    sqlite_column!(
        "id",
        SqlType::Integer,
        is_primary_key = true,
        is_autoincrement = true
    ),
    sqlite_column!("invoker_id", SqlType::Integer, non_null = true),
    sqlite_column!("play_count", SqlType::Integer, non_null = true),
    sqlite_column!("timestamp", SqlType::DateTime, non_null = true), // RFC 3339
    sqlite_column!("resource_type", SqlType::Text, non_null = true),
    sqlite_column!("resource_id", SqlType::Text, non_null = true),
    sqlite_column!("resource_title", SqlType::Text, non_null = true),
];

const PLAY_HISTORY_INDICES_V1: &[(&str, &str)] =
    &[("idx_play_history_resource_id", "resource_id")];

/// One row per played resource, unique on (resource_type, resource_id)
pub const PLAY_HISTORY_TABLE_V1: Table = Table {
    name: PLAY_HISTORY_TABLE_NAME,
    columns: PLAY_HISTORY_COLUMNS_V1,
    indices: PLAY_HISTORY_INDICES_V1,
    unique_constraints: &[&["resource_type", "resource_id"]],
};

/// Same as [`PLAY_HISTORY_TABLE_V1`] but unique on resource_id alone
pub const LEGACY_PLAY_HISTORY_TABLE_V1: Table = Table {
    name: PLAY_HISTORY_TABLE_NAME,
    columns: PLAY_HISTORY_COLUMNS_V1,
    indices: PLAY_HISTORY_INDICES_V1,
    unique_constraints: &[&["resource_id"]],
};

// =============================================================================
// Versioned Schema Definition
// =============================================================================

/// All versioned schemas for the play history database.
///
/// Version 1: metadata and play_history tables
///
/// New versions append an entry whose `migration` upgrades the previous one.
pub const PLAY_HISTORY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1],
    migration: None, // Initial version has no migration
}];

/// [`PLAY_HISTORY_VERSIONED_SCHEMAS`] with the resource_id-only identity key.
pub const LEGACY_PLAY_HISTORY_VERSIONED_SCHEMAS: &[VersionedSchema] = &[VersionedSchema {
    version: 1,
    tables: &[METADATA_TABLE_V1, LEGACY_PLAY_HISTORY_TABLE_V1],
    migration: None,
}];

pub fn versioned_schemas(identity_key: IdentityKey) -> &'static [VersionedSchema] {
    match identity_key {
        IdentityKey::TypeAndId => PLAY_HISTORY_VERSIONED_SCHEMAS,
        IdentityKey::ResourceIdOnly => LEGACY_PLAY_HISTORY_VERSIONED_SCHEMAS,
    }
}

/// Newest schema version this build can read and write.
pub fn latest_schema_version() -> usize {
    PLAY_HISTORY_VERSIONED_SCHEMAS
        .last()
        .map(|schema| schema.version)
        .unwrap_or(0)
}
