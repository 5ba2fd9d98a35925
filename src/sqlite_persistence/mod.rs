mod versioned_schema;

pub use versioned_schema::*;

use rusqlite::Connection;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Locks the shared connection, ignoring poisoning. All writes are
/// transactional, a panicked holder leaves nothing half-written.
pub fn lock_connection(conn: &Mutex<Connection>) -> MutexGuard<'_, Connection> {
    conn.lock().unwrap_or_else(PoisonError::into_inner)
}
