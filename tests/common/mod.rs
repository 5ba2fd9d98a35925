#![allow(dead_code)]

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use ts3_history_store::{DbConfig, DbProvider, IdentityKey};

pub struct TestDb {
    pub db_path: PathBuf,
    _temp_dir: TempDir, // Keep temp dir alive
}

impl TestDb {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().unwrap();
        let db_path = temp_dir.path().join("history.sqlite");
        TestDb {
            db_path,
            _temp_dir: temp_dir,
        }
    }

    pub fn config(&self) -> DbConfig {
        DbConfig::new(&self.db_path)
    }

    pub fn open(&self) -> DbProvider {
        DbProvider::open(&self.config()).unwrap()
    }

    pub fn open_with_key(&self, identity_key: IdentityKey) -> DbProvider {
        DbProvider::open(&self.config().with_identity_key(identity_key)).unwrap()
    }

    /// A separate raw connection, for poking at the file behind the provider's back.
    pub fn raw(&self) -> Connection {
        Connection::open(&self.db_path).unwrap()
    }

    pub fn count(&self, sql: &str) -> i64 {
        self.raw().query_row(sql, [], |r| r.get(0)).unwrap()
    }

    pub fn checksum(&self) -> Vec<u8> {
        file_checksum(&self.db_path)
    }
}

pub fn file_checksum(path: &Path) -> Vec<u8> {
    let bytes = std::fs::read(path).unwrap();
    Sha256::digest(&bytes).to_vec()
}

pub fn at(hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 15, hour, minute, 0).unwrap()
}
