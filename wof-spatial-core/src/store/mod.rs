//! Store access traits and the statement/row values exchanged with them.
//!
//! The [`SpatialStore`] trait is the only way the engine reaches the
//! relational store. Statements carry SQL text plus positional parameters;
//! rows come back as plain value lists that the [`codec`] turns into
//! [`StoredRecord`](crate::StoredRecord) values.

use std::error::Error as StdError;

use async_trait::async_trait;
use thiserror::Error;

pub mod codec;

/// A single positional parameter or column value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    /// SQL `NULL`.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
}

impl SqlValue {
    /// Short name of the value's type, used in error messages.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Integer(_) => "integer",
            Self::Text(_) => "text",
        }
    }
}

impl From<i64> for SqlValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<bool> for SqlValue {
    fn from(value: bool) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// SQL text plus ordered parameters bound to `?1`, `?2`, and so on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    sql: &'static str,
    params: Vec<SqlValue>,
}

impl Statement {
    /// Build a statement from static SQL and its parameters.
    #[must_use]
    pub const fn new(sql: &'static str, params: Vec<SqlValue>) -> Self {
        Self { sql, params }
    }

    /// SQL text.
    #[must_use]
    pub const fn sql(&self) -> &'static str {
        self.sql
    }

    /// Positional parameters.
    #[must_use]
    pub fn params(&self) -> &[SqlValue] {
        &self.params
    }
}

/// Errors raised when reading typed values out of a [`StoreRow`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RowError {
    /// The row had fewer columns than expected.
    #[error("row has no column {index} ({column})")]
    MissingColumn {
        /// Name of the expected column.
        column: &'static str,
        /// Position of the expected column.
        index: usize,
    },
    /// The column held a value of another type.
    #[error("column {column} holds {found}, expected {expected}")]
    TypeMismatch {
        /// Name of the column.
        column: &'static str,
        /// Expected value type.
        expected: &'static str,
        /// Type actually found.
        found: &'static str,
    },
    /// Both spatial columns of a stored record were empty.
    #[error("stored record {id} has neither geom nor centroid")]
    EmptySpatialColumns {
        /// Identifier of the offending row.
        id: i64,
    },
}

/// A materialized result row.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRow {
    values: Vec<SqlValue>,
}

impl StoreRow {
    /// Wrap a list of column values.
    #[must_use]
    pub const fn new(values: Vec<SqlValue>) -> Self {
        Self { values }
    }

    /// All column values in select order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    fn value(&self, index: usize, column: &'static str) -> Result<&SqlValue, RowError> {
        self.values
            .get(index)
            .ok_or(RowError::MissingColumn { column, index })
    }

    /// Read an integer column.
    pub fn integer(&self, index: usize, column: &'static str) -> Result<i64, RowError> {
        match self.value(index, column)? {
            SqlValue::Integer(value) => Ok(*value),
            other => Err(RowError::TypeMismatch {
                column,
                expected: "integer",
                found: other.kind(),
            }),
        }
    }

    /// Read an integer column as a flag; any non-zero value is `true`.
    pub fn flag(&self, index: usize, column: &'static str) -> Result<bool, RowError> {
        self.integer(index, column).map(|value| value != 0)
    }

    /// Read a text column, mapping `NULL` to `None`.
    pub fn optional_text(
        &self,
        index: usize,
        column: &'static str,
    ) -> Result<Option<String>, RowError> {
        match self.value(index, column)? {
            SqlValue::Null => Ok(None),
            SqlValue::Text(value) => Ok(Some(value.clone())),
            other @ SqlValue::Integer(_) => Err(RowError::TypeMismatch {
                column,
                expected: "text",
                found: other.kind(),
            }),
        }
    }

    /// Read a text column, mapping `NULL` to the empty string.
    pub fn text(&self, index: usize, column: &'static str) -> Result<String, RowError> {
        self.optional_text(index, column)
            .map(Option::unwrap_or_default)
    }
}

/// Errors surfaced by [`SpatialStore`] implementations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend rejected or failed a statement.
    #[error("store {operation} failed: {source}")]
    Backend {
        /// Operation that failed.
        operation: &'static str,
        /// Backend error.
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
    /// The connection budget was closed while waiting for a lease.
    #[error("connection budget for {pool} is closed")]
    PoolClosed {
        /// Name of the guarded resource.
        pool: &'static str,
    },
    /// A returned row did not match the expected layout.
    #[error(transparent)]
    Row(#[from] RowError),
    /// A blocking task running store work did not complete.
    #[error("store task for {operation} did not complete: {message}")]
    Task {
        /// Operation the task was running.
        operation: &'static str,
        /// Join failure description.
        message: String,
    },
}

impl StoreError {
    /// Wrap a backend error raised during `operation`.
    pub fn backend(
        operation: &'static str,
        source: impl Into<Box<dyn StdError + Send + Sync>>,
    ) -> Self {
        Self::Backend {
            operation,
            source: source.into(),
        }
    }
}

/// Connection-level access to the spatial store.
///
/// Implementations must be safe to share across tasks. The engine never
/// calls more than one method per lease at a time.
#[async_trait]
pub trait SpatialStore: Send + Sync {
    /// Run a statement returning a single count.
    async fn query_count(&self, statement: &Statement) -> Result<u64, StoreError>;

    /// Run a statement and materialize every returned row.
    async fn query_rows(&self, statement: &Statement) -> Result<Vec<StoreRow>, StoreError>;

    /// Run a write statement and return the number of affected rows.
    async fn execute(&self, statement: &Statement) -> Result<u64, StoreError>;
}
