//! Upstream relational data access.
//!
//! The core only needs "execute query → rows"; [`SqliteSource`] is the
//! bundled implementation.

use crate::error::SourceError;
use crate::table::RowSet;
use crate::value::FeatureValue;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use tracing::debug;

/// Trait for running a query against the upstream store.
pub trait DataSource {
    fn query(&self, sql: &str) -> Result<RowSet, SourceError>;

    /// Human-readable location, used in logs.
    fn describe(&self) -> String;
}

/// SQLite database data source.
pub struct SqliteSource {
    conn: Connection,
    location: String,
}

impl SqliteSource {
    /// Open a database file read-only.
    pub fn open(db_path: &Path) -> Result<Self, SourceError> {
        let conn = Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self {
            conn,
            location: db_path.display().to_string(),
        })
    }

    /// Wrap an existing connection, e.g. an in-memory database.
    pub fn from_connection(conn: Connection) -> Self {
        Self {
            conn,
            location: ":memory:".to_string(),
        }
    }

    /// Attach another database file under `schema`, so queries can address
    /// its tables as `schema.table`.
    pub fn attach(&self, schema: &str, db_path: &Path) -> Result<(), SourceError> {
        let path = db_path.display().to_string();
        self.conn
            .execute("ATTACH DATABASE ?1 AS ?2", rusqlite::params![path, schema])?;
        Ok(())
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl DataSource for SqliteSource {
    fn query(&self, sql: &str) -> Result<RowSet, SourceError> {
        let mut stmt = self.conn.prepare(sql)?;
        let column_count = stmt.column_count();
        let columns: Vec<String> = (0..column_count)
            .map(|i| stmt.column_name(i).unwrap_or("?").to_string())
            .collect();

        let mut rows = Vec::new();
        let mut result_rows = stmt.query([])?;
        while let Some(row) = result_rows.next()? {
            let mut values = Vec::with_capacity(column_count);
            for i in 0..column_count {
                let val = match row.get_ref(i)? {
                    ValueRef::Null => FeatureValue::Null,
                    ValueRef::Integer(n) => FeatureValue::Int(n),
                    ValueRef::Real(f) => FeatureValue::float(f),
                    ValueRef::Text(t) => FeatureValue::Text(String::from_utf8_lossy(t).into_owned()),
                    ValueRef::Blob(_) => FeatureValue::Text("<blob>".to_string()),
                };
                values.push(val);
            }
            rows.push(values);
        }

        debug!(rows = rows.len(), source = %self.location, "query complete");
        Ok(RowSet { columns, rows })
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}
