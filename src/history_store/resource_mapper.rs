//! Conversion between the flat `play_history` row and the in-memory models.
//!
//! Nothing else reads or writes the resource columns directly.

use super::models::{AudioResource, AudioType, PlayHistoryEntry};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use thiserror::Error;

/// Column list matching [`entry_from_sql_row`].
pub const ENTRY_COLUMNS: &str =
    "id, invoker_id, play_count, timestamp, resource_type, resource_id, resource_title";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MappingError {
    #[error("unknown resource type {0:?}")]
    UnknownResourceType(String),
}

/// The three persisted columns describing a resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRow {
    pub resource_type: String,
    pub resource_id: String,
    pub resource_title: String,
}

pub fn to_row(resource: &AudioResource) -> ResourceRow {
    ResourceRow {
        resource_type: resource.resource_type.as_str().to_string(),
        resource_id: resource.resource_id.clone(),
        resource_title: resource.title.clone(),
    }
}

pub fn from_row(row: ResourceRow) -> Result<AudioResource, MappingError> {
    let resource_type = AudioType::parse(&row.resource_type)
        .ok_or(MappingError::UnknownResourceType(row.resource_type))?;
    Ok(AudioResource {
        resource_type,
        resource_id: row.resource_id,
        title: row.resource_title,
    })
}

pub fn format_timestamp(timestamp: &DateTime<Utc>) -> String {
    timestamp.to_rfc3339()
}

pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// invoker_id is stored as the i64 with the same bit pattern, so every u64
/// survives the trip through SQLite's signed INTEGER.
pub fn invoker_id_to_sql(invoker_id: u64) -> i64 {
    invoker_id as i64
}

pub fn invoker_id_from_sql(value: i64) -> u64 {
    value as u64
}

fn conversion_failure(
    row: &rusqlite::Row,
    column: &str,
    err: impl std::error::Error + Send + Sync + 'static,
) -> rusqlite::Error {
    match row.as_ref().column_index(column) {
        Ok(index) => rusqlite::Error::FromSqlConversionFailure(index, Type::Text, Box::new(err)),
        Err(e) => e,
    }
}

/// Reads a row selected with [`ENTRY_COLUMNS`].
pub fn entry_from_sql_row(row: &rusqlite::Row) -> rusqlite::Result<PlayHistoryEntry> {
    let timestamp_str: String = row.get("timestamp")?;
    let timestamp = parse_timestamp(&timestamp_str)
        .map_err(|e| conversion_failure(row, "timestamp", e))?;

    let resource = from_row(ResourceRow {
        resource_type: row.get("resource_type")?,
        resource_id: row.get("resource_id")?,
        resource_title: row.get("resource_title")?,
    })
    .map_err(|e| conversion_failure(row, "resource_type", e))?;

    Ok(PlayHistoryEntry {
        id: row.get("id")?,
        invoker_id: invoker_id_from_sql(row.get("invoker_id")?),
        play_count: row.get("play_count")?,
        timestamp,
        resource,
    })
}
