use super::schema::{METADATA_KEY_MAX_LEN, METADATA_TABLE_NAME};
use super::MetadataStore;
use crate::error::{DbError, DbResult};
use crate::sqlite_persistence::lock_connection;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::debug;

pub(crate) fn check_key(key: &str) -> DbResult<()> {
    let len = key.chars().count();
    if len == 0 || len > METADATA_KEY_MAX_LEN {
        return Err(DbError::InvalidMetadataKey {
            key: key.to_string(),
            max: METADATA_KEY_MAX_LEN,
        });
    }
    Ok(())
}

pub(crate) fn read_value(conn: &Connection, key: &str) -> DbResult<Option<String>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT value FROM {} WHERE key = ?1",
        METADATA_TABLE_NAME
    ))?;
    // value is nullable in the schema, a NULL reads as an empty string
    let value: Option<Option<String>> = stmt.query_row(params![key], |row| row.get(0)).optional()?;
    Ok(value.map(Option::unwrap_or_default))
}

pub(crate) fn write_value(conn: &Connection, key: &str, value: &str) -> DbResult<()> {
    check_key(key)?;
    conn.execute(
        &format!(
            "INSERT INTO {} (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = ?2",
            METADATA_TABLE_NAME
        ),
        params![key, value],
    )?;
    Ok(())
}

/// Metadata store sharing the provider's connection.
#[derive(Clone)]
pub struct SqliteMetadataStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteMetadataStore {
    pub(crate) fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }
}

impl MetadataStore for SqliteMetadataStore {
    fn get(&self, key: &str) -> DbResult<Option<String>> {
        let conn = lock_connection(&self.conn);
        read_value(&conn, key)
    }

    fn set(&self, key: &str, value: &str) -> DbResult<()> {
        check_key(key)?;
        let mut conn = lock_connection(&self.conn);
        let tx = conn.transaction()?;
        write_value(&tx, key, value)?;
        tx.commit()?;
        debug!("Set metadata {} = {}", key, value);
        Ok(())
    }
}
