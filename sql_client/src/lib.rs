//! The SQL connection seam used by the result merger and metadata
//! helpers.
//!
//! Everything above this crate talks to [`SqlConnection`]; the real
//! implementation drives MySQL through `mysql_async` (including the
//! programmatic `LOAD DATA LOCAL INFILE` input), and [`MockSql`] records
//! statements for tests.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod mock;
mod mysql;

pub use mock::MockSql;
pub use mysql::MySqlConnection;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt::Debug;

/// Connection parameters for the local result database.
#[derive(Debug, Clone, Default)]
pub struct SqlConfig {
    /// Server host name.
    pub host: String,
    /// Server TCP port; ignored when a socket path is set.
    pub port: u16,
    /// User name.
    pub user: String,
    /// Password.
    pub password: String,
    /// Default database.
    pub db: String,
    /// Unix socket path, preferred over TCP when set.
    pub socket: Option<String>,
}

/// A SQL failure, with the server error code when one exists.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sql error {code}: {message}")]
pub struct SqlError {
    /// Server error code, or -1 for client-side failures.
    pub code: i32,
    /// Error text.
    pub message: String,
}

impl SqlError {
    /// A server-reported error.
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// A client-side (connection) failure.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(-1, message)
    }
}

/// One column of a result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColSchema {
    /// Column name.
    pub name: String,
    /// SQL type text.
    pub sql_type: String,
}

/// A materialized query result.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SqlResults {
    /// Result schema.
    pub columns: Vec<ColSchema>,
    /// Rows; `None` cells are SQL NULL.
    pub rows: Vec<Vec<Option<String>>>,
}

impl SqlResults {
    /// An empty result set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A single-column, single-row result, convenient for canned lookups.
    pub fn single_value(column: &str, value: &str) -> Self {
        Self {
            columns: vec![ColSchema {
                name: column.to_string(),
                sql_type: "TEXT".to_string(),
            }],
            rows: vec![vec![Some(value.to_string())]],
        }
    }

    /// The first cell of the first row, if any.
    pub fn scalar(&self) -> Option<&str> {
        self.rows.first()?.first()?.as_deref()
    }
}

/// An async connection to the local result database.
///
/// One logical statement executes at a time per connection; callers
/// serialize access themselves (the merger holds its own lock).
#[async_trait]
pub trait SqlConnection: Debug + Send + Sync {
    /// Execute a statement, discarding any result.
    async fn exec(&self, sql: &str) -> Result<(), SqlError>;

    /// Execute a query and materialize its result.
    async fn query(&self, sql: &str) -> Result<SqlResults, SqlError>;

    /// Execute a `LOAD DATA LOCAL INFILE` statement, supplying `data` as
    /// the file content.
    async fn load_infile(&self, sql: &str, data: Bytes) -> Result<(), SqlError>;
}
