use super::schema::{METADATA_TABLE_NAME, VERSION_KEY};
use super::parse_version;
use super::sqlite_metadata_store::{read_value, write_value};
use crate::error::{DbError, DbResult};
use crate::sqlite_persistence::{table_exists, user_tables, Table, VersionedSchema};
use rusqlite::Connection;
use tracing::{info, warn};

/// Brings a database to the supported schema version.
///
/// The chain must be consecutive versions starting at 1 or above, and every
/// version must declare the metadata table since the version stamp lives there.
pub struct SchemaMigrator {
    schemas: &'static [VersionedSchema],
    supported_version: usize,
}

impl SchemaMigrator {
    pub fn new(schemas: &'static [VersionedSchema], supported_version: usize) -> DbResult<Self> {
        let (first, last) = match (schemas.first(), schemas.last()) {
            (Some(first), Some(last)) => (first, last),
            _ => return Err(DbError::Config("no schema versions declared".to_string())),
        };
        if first.version == 0 {
            return Err(DbError::Config(
                "schema versions must start at 1 or above".to_string(),
            ));
        }
        for pair in schemas.windows(2) {
            if pair[1].version != pair[0].version + 1 {
                return Err(DbError::Config(format!(
                    "schema versions must be consecutive, found {} after {}",
                    pair[1].version, pair[0].version
                )));
            }
        }
        if let Some(schema) = schemas
            .iter()
            .find(|s| !s.tables.iter().any(|t| t.name == METADATA_TABLE_NAME))
        {
            return Err(DbError::Config(format!(
                "schema version {} does not declare the {} table",
                schema.version, METADATA_TABLE_NAME
            )));
        }
        if supported_version < first.version || supported_version > last.version {
            return Err(DbError::Config(format!(
                "supported version {} is outside the declared schema versions {}..={}",
                supported_version, first.version, last.version
            )));
        }
        Ok(Self {
            schemas,
            supported_version,
        })
    }

    pub fn supported_version(&self) -> usize {
        self.supported_version
    }

    fn schema_for(&self, version: usize) -> Option<&'static VersionedSchema> {
        self.schemas.iter().find(|s| s.version == version)
    }

    fn supported_schema(&self) -> DbResult<&'static VersionedSchema> {
        self.schema_for(self.supported_version).ok_or_else(|| {
            DbError::Config(format!("no schema for version {}", self.supported_version))
        })
    }

    fn metadata_table(&self) -> Option<&'static Table> {
        self.schemas
            .first()
            .and_then(|s| s.tables.iter().find(|t| t.name == METADATA_TABLE_NAME))
    }

    /// Creates, validates or upgrades the schema. Returns the schema version
    /// the database is at afterwards, which is always the supported version.
    ///
    /// Safe to call on every start. Fails without touching any table when the
    /// file was written by a newer version.
    pub fn ensure_schema(&self, conn: &mut Connection) -> DbResult<usize> {
        if !table_exists(conn, METADATA_TABLE_NAME)? {
            let existing = user_tables(conn)?;
            if !existing.is_empty() {
                return Err(DbError::SchemaCorrupt(format!(
                    "found tables ({}) but no {} table",
                    existing.join(", "),
                    METADATA_TABLE_NAME
                )));
            }
            return self.bootstrap(conn);
        }

        let stored_version = self.stored_version(conn)?;
        if stored_version > self.supported_version {
            warn!(
                "Refusing to open play history database at version {}, this build supports up to {}",
                stored_version, self.supported_version
            );
            return Err(DbError::IncompatibleSchema {
                found: stored_version,
                supported: self.supported_version,
            });
        }

        let stored_schema = self.schema_for(stored_version).ok_or_else(|| {
            DbError::SchemaCorrupt(format!("unknown schema version {}", stored_version))
        })?;
        stored_schema.validate(conn)?;

        if stored_version == self.supported_version {
            info!(
                "Play history database schema is at version {}",
                stored_version
            );
            return Ok(stored_version);
        }

        self.upgrade(conn, stored_version)?;
        Ok(self.supported_version)
    }

    /// Reads the stamp before any layout check. The metadata layout is
    /// validated with the rest of the stored schema afterwards.
    fn stored_version(&self, conn: &Connection) -> DbResult<usize> {
        let value = match read_value(conn, VERSION_KEY) {
            Ok(value) => value,
            Err(err) => {
                // no key/value columns at all
                if let Some(metadata_table) = self.metadata_table() {
                    metadata_table.validate(conn)?;
                }
                return Err(err);
            }
        };
        let value = value.ok_or_else(|| {
            DbError::SchemaCorrupt(format!(
                "{} table has no {} entry",
                METADATA_TABLE_NAME, VERSION_KEY
            ))
        })?;
        parse_version(&value)
    }

    fn bootstrap(&self, conn: &mut Connection) -> DbResult<usize> {
        let schema = self.supported_schema()?;
        info!(
            "Creating play history database schema at version {}",
            schema.version
        );

        let tx = conn.transaction()?;
        schema.create(&tx)?;
        write_value(&tx, VERSION_KEY, &schema.version.to_string())?;
        tx.commit()?;
        Ok(schema.version)
    }

    /// Runs one step's migration, checks the result against that step's
    /// declaration and stamps the version. Nothing is committed here.
    fn apply_step(conn: &Connection, schema: &VersionedSchema) -> anyhow::Result<()> {
        if let Some(migration_fn) = schema.migration {
            migration_fn(conn)?;
        }
        schema.validate(conn)?;
        write_value(conn, VERSION_KEY, &schema.version.to_string())?;
        Ok(())
    }

    /// Applies each step after `from_version` in its own transaction,
    /// stamping the new version in the same transaction.
    fn upgrade(&self, conn: &mut Connection, from_version: usize) -> DbResult<()> {
        let mut current = from_version;
        for schema in self
            .schemas
            .iter()
            .filter(|s| s.version > from_version && s.version <= self.supported_version)
        {
            info!(
                "Migrating play history database from version {} to {}",
                current, schema.version
            );
            let tx = conn.transaction()?;
            Self::apply_step(&tx, schema).map_err(|source| DbError::MigrationFailed {
                from: current,
                to: schema.version,
                source,
            })?;
            tx.commit()?;
            current = schema.version;
        }
        Ok(())
    }
}
