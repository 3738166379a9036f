//! SQLite backend for the spatial store.
//!
//! Connections are opened per operation on Tokio's blocking pool, so the
//! engine's connection budget is the only limit on concurrent access. Every
//! connection registers an `st_intersects(a, b)` scalar function evaluating
//! GeoJSON intersection with `geo`.

use std::io;
use std::time::Duration;

use async_trait::async_trait;
use camino::{Utf8Path, Utf8PathBuf};
use rusqlite::functions::{Context, FunctionFlags};
use rusqlite::types::{Value, ValueRef};
use rusqlite::{Connection, Error as SqliteError, params_from_iter};
use thiserror::Error;
use wof_spatial_core::geometry::intersects_text;
use wof_spatial_core::{SpatialStore, SqlValue, Statement, StoreError, StoreRow};

/// Time a connection waits on a locked database before failing.
pub const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const SCHEMA_SQL: &str = "CREATE TABLE IF NOT EXISTS whosonfirst (
        id INTEGER PRIMARY KEY,
        parent_id INTEGER NOT NULL,
        placetype_id INTEGER NOT NULL,
        is_superseded INTEGER NOT NULL DEFAULT 0,
        is_deprecated INTEGER NOT NULL DEFAULT 0,
        meta TEXT NOT NULL,
        geom_hash TEXT NOT NULL,
        lastmod INTEGER NOT NULL,
        geom TEXT,
        centroid TEXT
    );
    CREATE INDEX IF NOT EXISTS whosonfirst_by_placetype
        ON whosonfirst (placetype_id, is_superseded, is_deprecated);";

/// Errors raised while opening or preparing a SQLite store.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Failed to create the parent directory for the database.
    #[error("failed to create parent directory for {path}")]
    CreateDirectory {
        /// Database path.
        path: Utf8PathBuf,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },
    /// Opening the SQLite database failed.
    #[error("failed to open SQLite database at {path}")]
    Open {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Switching the database to write-ahead logging failed.
    #[error("failed to enable WAL journaling for {path}")]
    Journal {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
    /// Creating the `whosonfirst` table failed.
    #[error("failed to create whosonfirst schema in {path}")]
    CreateSchema {
        /// Database path.
        path: Utf8PathBuf,
        /// Source error returned by `rusqlite`.
        #[source]
        source: SqliteError,
    },
}

fn text_argument(ctx: &Context<'_>, index: usize) -> Result<String, SqliteError> {
    match ctx.get_raw(index) {
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Ok(String::from_utf8_lossy(bytes).into_owned())
        }
        _ => Ok(String::new()),
    }
}

fn register_functions(connection: &Connection) -> Result<(), SqliteError> {
    connection.create_scalar_function(
        "st_intersects",
        2,
        FunctionFlags::SQLITE_UTF8 | FunctionFlags::SQLITE_DETERMINISTIC,
        |ctx| {
            let left = text_argument(ctx, 0)?;
            let right = text_argument(ctx, 1)?;
            intersects_text(&left, &right)
                .map_err(|err| SqliteError::UserFunctionError(Box::new(err)))
        },
    )
}

fn connect(path: &Utf8Path) -> Result<Connection, SqliteError> {
    let connection = Connection::open(path.as_std_path())?;
    connection.busy_timeout(BUSY_TIMEOUT)?;
    register_functions(&connection)?;
    Ok(connection)
}

fn to_sqlite(value: &SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(value) => Value::Integer(*value),
        SqlValue::Text(value) => Value::Text(value.clone()),
    }
}

fn from_sqlite(value: ValueRef<'_>) -> SqlValue {
    match value {
        ValueRef::Null => SqlValue::Null,
        ValueRef::Integer(value) => SqlValue::Integer(value),
        ValueRef::Real(value) => SqlValue::Text(value.to_string()),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            SqlValue::Text(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}

/// A spatial store held in a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteSpatialStore {
    path: Utf8PathBuf,
}

impl SqliteSpatialStore {
    /// Open (creating if needed) the database at `path` in WAL mode.
    pub fn open(path: impl Into<Utf8PathBuf>) -> Result<Self, SqliteStoreError> {
        let path = path.into();
        wof_spatial_fs::ensure_parent_dir(&path).map_err(|source| {
            SqliteStoreError::CreateDirectory {
                path: path.clone(),
                source,
            }
        })?;
        let connection = connect(&path).map_err(|source| SqliteStoreError::Open {
            path: path.clone(),
            source,
        })?;
        connection
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get::<_, String>(0))
            .map_err(|source| SqliteStoreError::Journal {
                path: path.clone(),
                source,
            })?;
        Ok(Self { path })
    }

    /// Create the `whosonfirst` table and its lookup index if missing.
    pub fn initialise_schema(&self) -> Result<(), SqliteStoreError> {
        let connection = connect(&self.path).map_err(|source| SqliteStoreError::Open {
            path: self.path.clone(),
            source,
        })?;
        connection
            .execute_batch(SCHEMA_SQL)
            .map_err(|source| SqliteStoreError::CreateSchema {
                path: self.path.clone(),
                source,
            })
    }

    /// Location of the database file.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    async fn run<T, F>(&self, operation: &'static str, work: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, SqliteError> + Send + 'static,
    {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || {
            let connection = connect(&path)?;
            work(&connection)
        })
        .await
        .map_err(|err| StoreError::Task {
            operation,
            message: err.to_string(),
        })?
        .map_err(|source| StoreError::backend(operation, source))
    }
}

#[async_trait]
impl SpatialStore for SqliteSpatialStore {
    async fn query_count(&self, statement: &Statement) -> Result<u64, StoreError> {
        let statement = statement.clone();
        let count = self
            .run("count", move |connection| {
                connection.query_row(
                    statement.sql(),
                    params_from_iter(statement.params().iter().map(to_sqlite)),
                    |row| row.get::<_, i64>(0),
                )
            })
            .await?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    async fn query_rows(&self, statement: &Statement) -> Result<Vec<StoreRow>, StoreError> {
        let statement = statement.clone();
        self.run("query", move |connection| {
            let mut prepared = connection.prepare(statement.sql())?;
            let columns = prepared.column_count();
            let params = params_from_iter(statement.params().iter().map(to_sqlite));
            let mut rows = prepared.query(params)?;
            let mut decoded = Vec::new();
            while let Some(row) = rows.next()? {
                let values = (0..columns)
                    .map(|index| row.get_ref(index).map(from_sqlite))
                    .collect::<Result<Vec<_>, _>>()?;
                decoded.push(StoreRow::new(values));
            }
            Ok(decoded)
        })
        .await
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError> {
        let statement = statement.clone();
        let changed = self
            .run("execute", move |connection| {
                connection.execute(
                    statement.sql(),
                    params_from_iter(statement.params().iter().map(to_sqlite)),
                )
            })
            .await?;
        Ok(u64::try_from(changed).unwrap_or(u64::MAX))
    }
}
