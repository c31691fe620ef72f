//! Recording [`SqlConnection`] double for tests.

use crate::{SqlConnection, SqlError, SqlResults};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;

/// Records every statement and serves canned results, matched by
/// substring (first match wins).
///
/// Several results registered for the same pattern are served in FIFO
/// order, with the last one repeating; that models state that changes
/// between successive lookups (e.g. a table size before and after a
/// delete pass).
#[derive(Debug, Default)]
pub struct MockSql {
    statements: Mutex<Vec<String>>,
    results: Mutex<Vec<(String, std::collections::VecDeque<SqlResults>)>>,
    errors: Mutex<Vec<(String, SqlError)>>,
    infile_payloads: Mutex<Vec<(String, Bytes)>>,
}

impl MockSql {
    /// A mock with no canned behavior: everything succeeds with empty
    /// results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `results` for statements containing `pattern`.
    pub fn set_result_for(&self, pattern: impl Into<String>, results: SqlResults) {
        let pattern = pattern.into();
        let mut canned = self.results.lock();
        match canned.iter_mut().find(|(p, _)| *p == pattern) {
            Some((_, queue)) => queue.push_back(results),
            None => {
                let mut queue = std::collections::VecDeque::new();
                queue.push_back(results);
                canned.push((pattern, queue));
            }
        }
    }

    /// Fail statements containing `pattern` with `error`.
    pub fn set_error_for(&self, pattern: impl Into<String>, error: SqlError) {
        self.errors.lock().push((pattern.into(), error));
    }

    /// Stop failing statements matching `pattern`.
    pub fn clear_error_for(&self, pattern: &str) {
        self.errors.lock().retain(|(p, _)| p.as_str() != pattern);
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> Vec<String> {
        self.statements.lock().clone()
    }

    /// The `LOAD DATA` payloads received so far.
    pub fn infile_payloads(&self) -> Vec<(String, Bytes)> {
        self.infile_payloads.lock().clone()
    }

    fn record(&self, sql: &str) -> Result<(), SqlError> {
        self.statements.lock().push(sql.to_string());
        let errors = self.errors.lock();
        for (pattern, error) in errors.iter() {
            if sql.contains(pattern.as_str()) {
                return Err(error.clone());
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SqlConnection for MockSql {
    async fn exec(&self, sql: &str) -> Result<(), SqlError> {
        self.record(sql)
    }

    async fn query(&self, sql: &str) -> Result<SqlResults, SqlError> {
        self.record(sql)?;
        let mut results = self.results.lock();
        for (pattern, queue) in results.iter_mut() {
            if sql.contains(pattern.as_str()) {
                let front = queue.front().cloned().unwrap_or_default();
                if queue.len() > 1 {
                    queue.pop_front();
                }
                return Ok(front);
            }
        }
        Ok(SqlResults::empty())
    }

    async fn load_infile(&self, sql: &str, data: Bytes) -> Result<(), SqlError> {
        self.record(sql)?;
        self.infile_payloads.lock().push((sql.to_string(), data));
        Ok(())
    }
}
