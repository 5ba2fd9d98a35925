//! Bootstrap, validation and upgrade behavior of history database files.

mod common;

use common::TestDb;
use rusqlite::{params, Connection};
use ts3_history_store::history_store::{METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1};
use ts3_history_store::sqlite_column;
use ts3_history_store::sqlite_persistence::{SqlType, Table, VersionedSchema};
use ts3_history_store::{
    AudioResource, AudioType, DbError, DbProvider, MetadataStore, PlayHistoryRepository,
};

const PLAY_MARKS_TABLE_V2: Table = Table {
    name: "play_marks",
    columns: &[
        sqlite_column!("id", SqlType::Integer, is_primary_key = true),
        sqlite_column!("entry_id", SqlType::Integer, non_null = true),
        sqlite_column!("note", SqlType::Text, non_null = true),
    ],
    indices: &[("idx_play_marks_entry_id", "entry_id")],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &Connection) -> anyhow::Result<()> {
    conn.execute(
        "CREATE TABLE play_marks (id INTEGER PRIMARY KEY, entry_id INTEGER NOT NULL, note TEXT NOT NULL)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX idx_play_marks_entry_id ON play_marks(entry_id)",
        [],
    )?;
    Ok(())
}

fn failing_migration(_conn: &Connection) -> anyhow::Result<()> {
    anyhow::bail!("disk gremlins")
}

const TWO_VERSION_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1, PLAY_MARKS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
];

const THREE_VERSION_SCHEMAS_BROKEN_LAST: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1, PLAY_MARKS_TABLE_V2],
        migration: Some(migrate_v1_to_v2),
    },
    VersionedSchema {
        version: 3,
        tables: &[METADATA_TABLE_V1, PLAY_HISTORY_TABLE_V1, PLAY_MARKS_TABLE_V2],
        migration: Some(failing_migration),
    },
];

fn metadata_rows(db: &TestDb) -> Vec<(String, String)> {
    let conn = db.raw();
    let mut stmt = conn
        .prepare("SELECT key, value FROM metadata ORDER BY key")
        .unwrap();
    let rows = stmt
        .query_map([], |r| Ok((r.get(0)?, r.get(1)?)))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    rows
}

fn schema_sql(db: &TestDb) -> Vec<String> {
    let conn = db.raw();
    let mut stmt = conn
        .prepare("SELECT sql FROM sqlite_master WHERE sql IS NOT NULL ORDER BY name")
        .unwrap();
    let rows = stmt
        .query_map([], |r| r.get(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap();
    rows
}

#[test]
fn test_fresh_file_bootstrap() {
    let db = TestDb::new();
    let provider = db.open();

    assert_eq!(provider.schema_version(), 1);
    assert_eq!(
        metadata_rows(&db),
        vec![("Version".to_string(), "1".to_string())]
    );
    assert_eq!(db.count("SELECT COUNT(*) FROM play_history"), 0);
    assert_eq!(
        db.count("SELECT COUNT(*) FROM sqlite_master WHERE type='index' AND name='idx_play_history_resource_id'"),
        1
    );
}

#[test]
fn test_bootstrap_is_idempotent() {
    let db = TestDb::new();
    drop(db.open());
    let schema_after_first = schema_sql(&db);
    let metadata_after_first = metadata_rows(&db);

    drop(db.open());
    assert_eq!(schema_sql(&db), schema_after_first);
    assert_eq!(metadata_rows(&db), metadata_after_first);
    assert_eq!(
        db.count("SELECT COUNT(*) FROM metadata WHERE key = 'Version'"),
        1
    );
}

#[test]
fn test_reopen_keeps_history() {
    let db = TestDb::new();
    let resource = AudioResource::new(AudioType::Youtube, "abc", "title");
    {
        let provider = db.open();
        provider
            .play_history()
            .record_play(&resource, 5, common::at(10, 0))
            .unwrap();
        provider.metadata().set("Motd", "hello").unwrap();
    }

    let provider = db.open();
    let entry = provider.play_history().find(&resource).unwrap().unwrap();
    assert_eq!(entry.play_count, 1);
    assert_eq!(entry.invoker_id, 5);
    assert_eq!(
        provider.metadata().get("Motd").unwrap(),
        Some("hello".to_string())
    );
}

#[test]
fn test_newer_file_is_refused_without_modification() {
    let db = TestDb::new();
    {
        let provider = db.open();
        provider
            .play_history()
            .record_play(
                &AudioResource::new(AudioType::Soundcloud, "sc_ar1", "asdf"),
                42,
                common::at(10, 0),
            )
            .unwrap();
    }
    db.raw()
        .execute(
            "UPDATE metadata SET value = ?1 WHERE key = 'Version'",
            params!["2"],
        )
        .unwrap();
    let checksum_before = db.checksum();

    let result = DbProvider::open(&db.config());
    assert!(matches!(
        result,
        Err(DbError::IncompatibleSchema {
            found: 2,
            supported: 1
        })
    ));
    if let Err(err) = result {
        assert!(err.is_fatal_at_startup());
        assert!(err.to_string().contains("newer"));
    }

    assert_eq!(db.checksum(), checksum_before);
    assert_eq!(db.count("SELECT COUNT(*) FROM play_history"), 1);
}

#[test]
fn test_newer_file_with_changed_metadata_is_refused() {
    let db = TestDb::new();
    drop(db.open());
    {
        let conn = db.raw();
        conn.execute("ALTER TABLE metadata ADD COLUMN updated_at TEXT", [])
            .unwrap();
        conn.execute(
            "UPDATE metadata SET value = ?1 WHERE key = 'Version'",
            params!["2"],
        )
        .unwrap();
    }
    let checksum_before = db.checksum();

    let result = DbProvider::open(&db.config());
    assert!(matches!(
        result,
        Err(DbError::IncompatibleSchema {
            found: 2,
            supported: 1
        })
    ));
    assert_eq!(db.checksum(), checksum_before);
}

#[test]
fn test_partial_schema_is_reported_as_corrupt() {
    let db = TestDb::new();
    db.raw()
        .execute(
            "CREATE TABLE play_history (id INTEGER PRIMARY KEY, resource_id TEXT NOT NULL)",
            [],
        )
        .unwrap();

    let result = DbProvider::open(&db.config());
    match result {
        Err(DbError::SchemaCorrupt(msg)) => assert!(msg.contains("no metadata table")),
        Err(other) => panic!("expected SchemaCorrupt, got {:?}", other),
        Ok(_) => panic!("expected SchemaCorrupt, got a provider"),
    }
}

#[test]
fn test_dropped_column_is_reported_as_corrupt() {
    let db = TestDb::new();
    drop(db.open());
    db.raw()
        .execute("ALTER TABLE play_history DROP COLUMN resource_title", [])
        .unwrap();

    let result = DbProvider::open(&db.config());
    assert!(matches!(result, Err(DbError::SchemaCorrupt(_))));
}

#[test]
fn test_upgrade_chain_runs_once() {
    let db = TestDb::new();
    let v1_config = db.config().with_supported_version(1);
    let v2_config = db.config().with_supported_version(2);
    let resource = AudioResource::new(AudioType::Twitch, "channel", "stream");

    {
        let provider = DbProvider::open_with_schemas(&v1_config, TWO_VERSION_SCHEMAS).unwrap();
        assert_eq!(provider.schema_version(), 1);
        provider
            .play_history()
            .record_play(&resource, 1, common::at(9, 0))
            .unwrap();
    }

    {
        let provider = DbProvider::open_with_schemas(&v2_config, TWO_VERSION_SCHEMAS).unwrap();
        assert_eq!(provider.schema_version(), 2);
        assert_eq!(provider.metadata().version().unwrap(), Some(2));
        // existing history survives the upgrade
        assert_eq!(
            provider
                .play_history()
                .find(&resource)
                .unwrap()
                .unwrap()
                .play_count,
            1
        );
    }
    assert_eq!(
        db.count("SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='play_marks'"),
        1
    );

    // a v1 build must now refuse the file
    assert!(matches!(
        DbProvider::open_with_schemas(&v1_config, TWO_VERSION_SCHEMAS),
        Err(DbError::IncompatibleSchema {
            found: 2,
            supported: 1
        })
    ));

    // opening again at v2 is a no-op
    DbProvider::open_with_schemas(&v2_config, TWO_VERSION_SCHEMAS).unwrap();
    assert_eq!(
        db.count("SELECT COUNT(*) FROM metadata WHERE key = 'Version' AND value = '2'"),
        1
    );
}

#[test]
fn test_failed_step_keeps_earlier_steps() {
    let db = TestDb::new();
    drop(
        DbProvider::open_with_schemas(
            &db.config().with_supported_version(1),
            THREE_VERSION_SCHEMAS_BROKEN_LAST,
        )
        .unwrap(),
    );

    let result = DbProvider::open_with_schemas(
        &db.config().with_supported_version(3),
        THREE_VERSION_SCHEMAS_BROKEN_LAST,
    );
    match result {
        Err(DbError::MigrationFailed { from, to, source }) => {
            assert_eq!((from, to), (2, 3));
            assert!(source.to_string().contains("disk gremlins"));
        }
        Err(other) => panic!("expected MigrationFailed, got {:?}", other),
        Ok(_) => panic!("expected MigrationFailed, got a provider"),
    }

    // step 1 -> 2 was committed before step 2 -> 3 failed
    assert_eq!(
        metadata_rows(&db),
        vec![("Version".to_string(), "2".to_string())]
    );
    let provider = DbProvider::open_with_schemas(
        &db.config().with_supported_version(2),
        THREE_VERSION_SCHEMAS_BROKEN_LAST,
    )
    .unwrap();
    assert_eq!(provider.schema_version(), 2);
}
