use crate::error::{DbError, DbResult};
use rusqlite::{params, Connection, OptionalExtension};

#[macro_export]
macro_rules! sqlite_column {
    ($name:expr, $sql_type:expr $(, $field:ident = $value:expr)*) => {
        {
            // Only mutated when optional field assignments are passed,
            // e.g. `is_primary_key = true`
            #[allow(unused_mut)]
            let mut column = $crate::sqlite_persistence::Column {
                name: $name,
                sql_type: $sql_type,
                is_primary_key: false,
                is_autoincrement: false,
                non_null: false,
            };
            $(
                column.$field = $value;
            )*
            column
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Blob,
    DateTime,
}

impl SqlType {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Blob => "BLOB",
            SqlType::DateTime => "DATETIME",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "TEXT" => Some(SqlType::Text),
            "INTEGER" => Some(SqlType::Integer),
            "REAL" => Some(SqlType::Real),
            "BLOB" => Some(SqlType::Blob),
            "DATETIME" => Some(SqlType::DateTime),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub struct Column {
    pub name: &'static str,
    pub sql_type: SqlType,
    pub is_primary_key: bool,
    /// Only meaningful on an INTEGER primary key. Guarantees rowids are never reused.
    pub is_autoincrement: bool,
    pub non_null: bool,
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
    /// (index name, indexed columns)
    pub indices: &'static [(&'static str, &'static str)],
    pub unique_constraints: &'static [&'static [&'static str]],
}

/// A column as reported by `PRAGMA table_info`.
struct LiveColumn {
    name: String,
    declared_type: String,
    non_null: bool,
    is_primary_key: bool,
}

fn mismatch(message: String) -> DbError {
    DbError::SchemaCorrupt(message)
}

pub fn table_exists(conn: &Connection, table_name: &str) -> DbResult<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        params![table_name],
        |r| r.get(0),
    )?;
    Ok(count > 0)
}

/// Names of all non-internal tables, sorted.
pub fn user_tables(conn: &Connection) -> DbResult<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let names = stmt
        .query_map([], |row| row.get::<_, String>(0))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(names)
}

impl Table {
    pub fn create_sql(&self) -> String {
        let mut create_sql = format!("CREATE TABLE {} (", self.name);
        for (column_index, column) in self.columns.iter().enumerate() {
            if column_index > 0 {
                create_sql.push_str(", ");
            }
            create_sql.push_str(&format!("{} {}", column.name, column.sql_type.as_sql()));
            if column.is_primary_key {
                create_sql.push_str(" PRIMARY KEY");
                if column.is_autoincrement {
                    create_sql.push_str(" AUTOINCREMENT");
                }
            }
            if column.non_null {
                create_sql.push_str(" NOT NULL");
            }
        }

        for unique_constraint in self.unique_constraints {
            create_sql.push_str(&format!(", UNIQUE ({})", unique_constraint.join(", ")));
        }
        create_sql.push_str(");");
        create_sql
    }

    pub fn create(&self, conn: &Connection) -> DbResult<()> {
        conn.execute(&self.create_sql(), params![])?;

        for (index_name, column_name) in self.indices {
            conn.execute(
                &format!(
                    "CREATE INDEX {} ON {}({});",
                    index_name, self.name, column_name
                ),
                params![],
            )?;
        }
        Ok(())
    }

    fn live_columns(&self, conn: &Connection) -> DbResult<Vec<LiveColumn>> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({});", self.name))?;
        let columns = stmt
            .query_map(params![], |row| {
                Ok(LiveColumn {
                    name: row.get(1)?,
                    declared_type: row.get(2)?,
                    non_null: row.get::<_, i32>(3)? == 1,
                    is_primary_key: row.get::<_, i32>(5)? >= 1,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(columns)
    }

    fn validate_columns(&self, conn: &Connection) -> DbResult<()> {
        let actual_columns = self.live_columns(conn)?;
        if actual_columns.len() != self.columns.len() {
            return Err(mismatch(format!(
                "table {} has {} columns, expected {}. Found column names: {}, expected: {}",
                self.name,
                actual_columns.len(),
                self.columns.len(),
                actual_columns
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                self.columns
                    .iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        for (actual, expected) in actual_columns.iter().zip(self.columns.iter()) {
            if actual.name != expected.name {
                return Err(mismatch(format!(
                    "table {} column name mismatch: expected {}, got {}",
                    self.name, expected.name, actual.name
                )));
            }
            if SqlType::parse(&actual.declared_type) != Some(expected.sql_type) {
                return Err(mismatch(format!(
                    "table {} column {} type mismatch: expected {}, got {}",
                    self.name,
                    expected.name,
                    expected.sql_type.as_sql(),
                    actual.declared_type
                )));
            }
            if actual.non_null != expected.non_null {
                return Err(mismatch(format!(
                    "table {} column {} non-null mismatch: expected {}, got {}",
                    self.name, expected.name, expected.non_null, actual.non_null
                )));
            }
            if actual.is_primary_key != expected.is_primary_key {
                return Err(mismatch(format!(
                    "table {} column {} primary key mismatch: expected {}, got {}",
                    self.name, expected.name, expected.is_primary_key, actual.is_primary_key
                )));
            }
        }

        // table_info doesn't report AUTOINCREMENT, only the stored DDL does
        if self.columns.iter().any(|c| c.is_autoincrement) {
            let sql: Option<String> = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type='table' AND name=?1",
                    params![self.name],
                    |r| r.get(0),
                )
                .optional()?;
            let has_autoincrement = sql
                .map(|s| s.to_ascii_uppercase().contains("AUTOINCREMENT"))
                .unwrap_or(false);
            if !has_autoincrement {
                return Err(mismatch(format!(
                    "table {} primary key is not AUTOINCREMENT",
                    self.name
                )));
            }
        }
        Ok(())
    }

    fn validate_indices(&self, conn: &Connection) -> DbResult<()> {
        for (index_name, _columns) in self.indices {
            let index_exists = conn
                .query_row(
                    "SELECT 1 FROM sqlite_master WHERE type='index' AND name=?1 AND tbl_name=?2",
                    params![index_name, self.name],
                    |_| Ok(true),
                )
                .optional()?
                .unwrap_or(false);

            if !index_exists {
                return Err(mismatch(format!(
                    "table {} is missing index '{}'",
                    self.name, index_name
                )));
            }
        }
        Ok(())
    }

    /// Every unique index must correspond to a declared constraint and vice
    /// versa, so a file built with a different identity key is rejected.
    fn validate_unique_constraints(&self, conn: &Connection) -> DbResult<()> {
        // SQLite reports UNIQUE constraints as indices with origin 'u'
        let mut stmt = conn.prepare(&format!("PRAGMA index_list({})", self.name))?;
        let unique_indices: Vec<String> = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let is_unique: i32 = row.get(2)?;
                let origin: String = row.get(3)?;
                Ok((name, is_unique, origin))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?
            .into_iter()
            .filter(|(_, is_unique, origin)| *is_unique == 1 && origin == "u")
            .map(|(name, _, _)| name)
            .collect();

        let mut actual_sets: Vec<Vec<String>> = Vec::new();
        for index_name in &unique_indices {
            let mut idx_stmt = conn.prepare(&format!("PRAGMA index_info({})", index_name))?;
            let mut cols: Vec<String> = idx_stmt
                .query_map([], |row| row.get::<_, String>(2))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            cols.sort();
            actual_sets.push(cols);
        }

        let expected_sets: Vec<Vec<String>> = self
            .unique_constraints
            .iter()
            .map(|columns| {
                let mut cols: Vec<String> = columns.iter().map(|c| c.to_string()).collect();
                cols.sort();
                cols
            })
            .collect();

        for expected in &expected_sets {
            if !actual_sets.contains(expected) {
                return Err(mismatch(format!(
                    "table {} is missing unique constraint on columns ({})",
                    self.name,
                    expected.join(", ")
                )));
            }
        }
        for actual in &actual_sets {
            if !expected_sets.contains(actual) {
                return Err(mismatch(format!(
                    "table {} has an unexpected unique constraint on columns ({})",
                    self.name,
                    actual.join(", ")
                )));
            }
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> DbResult<()> {
        if !table_exists(conn, self.name)? {
            return Err(mismatch(format!("missing table {}", self.name)));
        }
        self.validate_columns(conn)?;
        self.validate_indices(conn)?;
        self.validate_unique_constraints(conn)
    }
}

/// One step of a schema chain. `migration` upgrades a database from the
/// previous version to this one and is `None` for the first version.
pub struct VersionedSchema {
    pub version: usize,
    pub tables: &'static [Table],
    pub migration: Option<fn(&Connection) -> anyhow::Result<()>>,
}

impl VersionedSchema {
    pub fn create(&self, conn: &Connection) -> DbResult<()> {
        for table in self.tables {
            table.create(conn)?;
        }
        Ok(())
    }

    pub fn validate(&self, conn: &Connection) -> DbResult<()> {
        for table in self.tables {
            table.validate(conn)?;
        }
        Ok(())
    }
}
