use super::models::{AudioResource, HistoryStats, PlayHistoryEntry};
use super::resource_mapper::{
    entry_from_sql_row, format_timestamp, invoker_id_to_sql, to_row, ENTRY_COLUMNS,
};
use super::schema::{IdentityKey, PLAY_HISTORY_TABLE_NAME};
use super::PlayHistoryRepository;
use crate::error::{DbError, DbResult};
use crate::sqlite_persistence::lock_connection;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::{debug, error};

/// Play history backed by the provider's SQLite connection.
///
/// Only [`crate::DbProvider`] constructs this, after the schema is in place.
#[derive(Clone)]
pub struct SqlitePlayHistoryRepository {
    conn: Arc<Mutex<Connection>>,
    identity_key: IdentityKey,
}

impl SqlitePlayHistoryRepository {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>, identity_key: IdentityKey) -> Self {
        Self { conn, identity_key }
    }

    fn find_in(conn: &Connection, resource: &AudioResource) -> DbResult<Option<PlayHistoryEntry>> {
        let row = to_row(resource);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE resource_type = ?1 AND resource_id = ?2",
            ENTRY_COLUMNS, PLAY_HISTORY_TABLE_NAME
        ))?;
        let entry = stmt
            .query_row(
                params![row.resource_type, row.resource_id],
                entry_from_sql_row,
            )
            .optional()?;
        Ok(entry)
    }

    fn log_rejected(&self, resource: &AudioResource, err: &DbError) {
        if let DbError::ConstraintViolation(_) = err {
            match self.identity_key {
                IdentityKey::ResourceIdOnly => error!(
                    "Rejected play of {}: resource id is already recorded under another type ({})",
                    resource, err
                ),
                IdentityKey::TypeAndId => {
                    error!("Rejected play of {}: {}", resource, err)
                }
            }
        }
    }

    fn record_play_in(
        conn: &mut Connection,
        resource: &AudioResource,
        invoker_id: u64,
        now: DateTime<Utc>,
    ) -> DbResult<PlayHistoryEntry> {
        // IMMEDIATE takes the write lock up front, nothing can slip in
        // between the lookup and the write
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let entry = match Self::find_in(&tx, resource)? {
            Some(existing) => {
                let updated = PlayHistoryEntry {
                    play_count: existing.play_count.saturating_add(1),
                    timestamp: now,
                    resource: resource.clone(),
                    ..existing
                };
                tx.execute(
                    &format!(
                        "UPDATE {} SET play_count = ?1, timestamp = ?2, resource_title = ?3 WHERE id = ?4",
                        PLAY_HISTORY_TABLE_NAME
                    ),
                    params![
                        updated.play_count,
                        format_timestamp(&updated.timestamp),
                        updated.resource.title,
                        updated.id
                    ],
                )?;
                updated
            }
            None => {
                let row = to_row(resource);
                tx.execute(
                    &format!(
                        "INSERT INTO {} (invoker_id, play_count, timestamp, resource_type, resource_id, resource_title)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                        PLAY_HISTORY_TABLE_NAME
                    ),
                    params![
                        invoker_id_to_sql(invoker_id),
                        1u32,
                        format_timestamp(&now),
                        row.resource_type,
                        row.resource_id,
                        row.resource_title
                    ],
                )?;
                PlayHistoryEntry {
                    id: tx.last_insert_rowid(),
                    invoker_id,
                    play_count: 1,
                    timestamp: now,
                    resource: resource.clone(),
                }
            }
        };

        tx.commit()?;
        Ok(entry)
    }

    fn query_entries(&self, sql: &str, limit: Option<usize>) -> DbResult<Vec<PlayHistoryEntry>> {
        let conn = lock_connection(&self.conn);
        let mut stmt = conn.prepare(sql)?;
        let rows = match limit {
            Some(limit) => stmt.query_map(params![limit as i64], entry_from_sql_row)?,
            None => stmt.query_map([], entry_from_sql_row)?,
        };
        let entries = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(entries)
    }
}

impl PlayHistoryRepository for SqlitePlayHistoryRepository {
    fn record_play(
        &self,
        resource: &AudioResource,
        invoker_id: u64,
        now: DateTime<Utc>,
    ) -> DbResult<PlayHistoryEntry> {
        let mut conn = lock_connection(&self.conn);
        let result = Self::record_play_in(&mut conn, resource, invoker_id, now);
        match &result {
            Ok(entry) => debug!(
                "Recorded play of {} as entry {} (count {})",
                resource, entry.id, entry.play_count
            ),
            Err(err) => self.log_rejected(resource, err),
        }
        result
    }

    fn find(&self, resource: &AudioResource) -> DbResult<Option<PlayHistoryEntry>> {
        let conn = lock_connection(&self.conn);
        Self::find_in(&conn, resource)
    }

    fn get(&self, id: i64) -> DbResult<Option<PlayHistoryEntry>> {
        let conn = lock_connection(&self.conn);
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE id = ?1",
            ENTRY_COLUMNS, PLAY_HISTORY_TABLE_NAME
        ))?;
        let entry = stmt
            .query_row(params![id], entry_from_sql_row)
            .optional()?;
        Ok(entry)
    }

    fn list(&self) -> DbResult<Vec<PlayHistoryEntry>> {
        self.query_entries(
            &format!(
                "SELECT {} FROM {} ORDER BY id ASC",
                ENTRY_COLUMNS, PLAY_HISTORY_TABLE_NAME
            ),
            None,
        )
    }

    fn most_played(&self, limit: usize) -> DbResult<Vec<PlayHistoryEntry>> {
        self.query_entries(
            &format!(
                "SELECT {} FROM {} ORDER BY play_count DESC, id ASC LIMIT ?1",
                ENTRY_COLUMNS, PLAY_HISTORY_TABLE_NAME
            ),
            Some(limit),
        )
    }

    fn stats(&self) -> DbResult<HistoryStats> {
        let conn = lock_connection(&self.conn);
        let (entries, total_plays): (i64, i64) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COALESCE(SUM(play_count), 0) FROM {}",
                PLAY_HISTORY_TABLE_NAME
            ),
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )?;
        Ok(HistoryStats {
            entries: entries as u64,
            total_plays: total_plays as u64,
        })
    }
}
