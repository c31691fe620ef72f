//! The row merger.

use crate::invalid::InvalidAttemptMgr;
use crate::result_table::ResultTableManager;
use crate::rows::serialize_rows;
use crate::{Error, MysqlExecSnafu, Result};
use metric::{Metric, U64Counter};
use observability_deps::tracing::{debug, info, warn};
use parking_lot::Mutex;
use query_ir::SelectStmt;
use shardq_time::TimeProvider;
use snafu::ResultExt;
use sql_client::{ColSchema, SqlConnection};
use std::collections::BTreeSet;
use std::sync::Arc;
use wire_types::{ColumnDesc, JobIdAttempt, WorkerResponse};

// Batched DELETE statements stay under the server's packet limit.
const MAX_DELETE_SQL_BYTES: usize = 950_000;

/// Configuration of one [`InfileMerger`].
#[derive(Debug, Clone, Default)]
pub struct InfileMergerConfig {
    /// The user-visible result table, `db.table`; generated when empty.
    pub target_table: String,
    /// The merge statement; `None` when plain concatenation preserves the
    /// user semantics.
    pub merge_stmt: Option<SelectStmt>,
    /// Ceiling on the accumulated result size.
    pub max_result_table_size_mb: u64,
}

#[derive(Debug, Default)]
struct MergeState {
    job_id_col: Option<String>,
    table_created: bool,
    finished: bool,
    size_check_row_count: i64,
}

/// Merges worker response frames into the per-query result table and
/// executes the final merge statement.
///
/// `merge` is called once per response, concurrently across jobs; rows of
/// invalidated attempts are discarded on arrival or scrubbed by a batched
/// delete pass.
#[derive(Debug)]
pub struct InfileMerger {
    conn: Arc<dyn SqlConnection>,
    tables: ResultTableManager,
    merge_stmt: Option<SelectStmt>,
    target_table: String,
    merge_table: String,
    merge_table_bare: String,
    max_result_table_size_mb: u64,
    check_size_every_x_rows: i64,
    invalid: InvalidAttemptMgr,
    // one statement at a time on the shared connection
    sql_lock: tokio::sync::Mutex<()>,
    create_lock: tokio::sync::Mutex<()>,
    state: Mutex<MergeState>,
    rows_merged: U64Counter,
    responses_discarded: U64Counter,
}

impl InfileMerger {
    /// Build a merger for one user query.
    pub fn new(
        config: InfileMergerConfig,
        conn: Arc<dyn SqlConnection>,
        result_db: impl Into<String>,
        time_provider: Arc<dyn TimeProvider>,
        metrics: &metric::Registry,
    ) -> Self {
        let tables = ResultTableManager::new(Arc::clone(&conn), result_db, time_provider);
        let target_table = if config.target_table.is_empty() {
            tables.make_table_name()
        } else {
            config.target_table
        };
        let merge_table = if config.merge_stmt.is_some() {
            format!("{}_m", target_table)
        } else {
            target_table.clone()
        };
        let merge_table_bare = merge_table
            .rsplit('.')
            .next()
            .expect("split yields at least one part")
            .to_string();

        let max_mb = config.max_result_table_size_mb.max(1);
        let merge_metric: Metric<U64Counter> = metrics.register_metric(
            "result_merge_rows",
            "rows merged into or discarded from result tables",
        );

        let merger = Self {
            conn,
            tables,
            merge_stmt: config.merge_stmt,
            target_table,
            merge_table,
            merge_table_bare,
            max_result_table_size_mb: max_mb,
            check_size_every_x_rows: 10 * max_mb as i64,
            invalid: InvalidAttemptMgr::new(),
            sql_lock: tokio::sync::Mutex::new(()),
            create_lock: tokio::sync::Mutex::new(()),
            state: Mutex::new(MergeState {
                // delay the first size check until a plausible number of
                // rows could have exceeded the ceiling
                size_check_row_count: -100 * max_mb as i64,
                ..Default::default()
            }),
            rows_merged: merge_metric.recorder(&[("outcome", "merged")]),
            responses_discarded: merge_metric.recorder(&[("outcome", "discarded")]),
        };
        debug!(
            target = %merger.target_table,
            merge = %merger.merge_table,
            max_mb,
            "merger ready"
        );
        merger
    }

    /// The user-visible result table name.
    pub fn target_table(&self) -> &str {
        &self.target_table
    }

    /// The accumulation table name (same as the target for trivial
    /// merges).
    pub fn merge_table(&self) -> &str {
        &self.merge_table
    }

    /// True once [`InfileMerger::finalize`] completed.
    pub fn is_finished(&self) -> bool {
        self.state.lock().finished
    }

    /// Merge one worker response into the result table.
    pub async fn merge(&self, response: &WorkerResponse) -> Result<()> {
        let result = &response.result;
        if result.has_error() {
            return Err(Error::ResultImport {
                message: format!(
                    "worker error {}: {}",
                    result.errorcode.unwrap_or(0),
                    result.errormsg.as_deref().unwrap_or("")
                ),
            });
        }
        let tag = JobIdAttempt::try_new(result.job_id, result.attempt_count).map_err(|e| {
            Error::ResultImport {
                message: e.to_string(),
            }
        })?;

        self.ensure_table(&result.columns).await?;
        if result.rows.is_empty() {
            return Ok(());
        }

        if self.invalid.incr_concurrent_merge_count(tag).await {
            debug!(%tag, "attempt invalid, discarding rows");
            self.responses_discarded.inc(1);
            return Ok(());
        }
        let import = self.import_rows(response, tag).await;
        self.invalid.decr_concurrent_merge_count();
        import?;

        self.rows_merged.inc(result.rows.len() as u64);
        self.note_rows_and_check_size(result.rows.len()).await
    }

    /// Invalidate one job attempt before its retry is dispatched. Returns
    /// true when the attempt had already written rows.
    pub fn prep_scrub(&self, job_id: u64, attempt_count: u32) -> Result<bool> {
        let tag = JobIdAttempt::try_new(job_id, attempt_count).map_err(|e| {
            Error::ResultImport {
                message: e.to_string(),
            }
        })?;
        Ok(self.invalid.prep_scrub(tag))
    }

    /// Block new merges and delete all rows of invalidated attempts.
    pub async fn scrub_invalid_rows(&self) -> Result<()> {
        let ok = self
            .invalid
            .hold_merging_for_row_delete(|set| self.delete_invalid_rows(set))
            .await;
        if ok {
            Ok(())
        } else {
            Err(Error::MysqlExec {
                source: sql_client::SqlError::connection("failed to delete invalid rows"),
            })
        }
    }

    /// Execute the merge statement (or drop the tag column) and settle the
    /// target table. Idempotent.
    pub async fn finalize(&self) -> Result<()> {
        if self.state.lock().finished {
            return Ok(());
        }
        self.scrub_invalid_rows().await?;

        let created = self.state.lock().table_created;
        if !created {
            // no response ever arrived; there is nothing to settle
            info!(target = %self.target_table, "finalize without any merged rows");
            self.state.lock().finished = true;
            return Ok(());
        }

        match &self.merge_stmt {
            Some(merge_stmt) => {
                let mut stmt = merge_stmt.clone();
                stmt.set_from_list_as_table(&self.merge_table);
                // single-writer post-processing favors the append-fast
                // engine as well
                let sql = format!(
                    "CREATE TABLE {} ENGINE=MyISAM AS {}",
                    self.target_table,
                    stmt.generate()
                );
                {
                    let _guard = self.sql_lock.lock().await;
                    self.conn.exec(&sql).await.context(MysqlExecSnafu)?;
                }
                self.tables.drop_table_quietly(&self.merge_table).await;
            }
            None => {
                let job_id_col = self.state.lock().job_id_col.clone();
                if let Some(col) = job_id_col {
                    let sql = format!(
                        "ALTER TABLE {} DROP COLUMN `{}`",
                        self.merge_table, col
                    );
                    let _guard = self.sql_lock.lock().await;
                    self.conn.exec(&sql).await.context(MysqlExecSnafu)?;
                }
            }
        }
        self.state.lock().finished = true;
        debug!(target = %self.target_table, "merge finalized");
        Ok(())
    }

    /// Drop both result tables; used on query failure and cancellation.
    pub async fn drop_result_tables(&self) {
        self.tables.drop_table_quietly(&self.merge_table).await;
        if self.merge_table != self.target_table {
            self.tables.drop_table_quietly(&self.target_table).await;
        }
    }

    async fn ensure_table(&self, columns: &[ColumnDesc]) -> Result<()> {
        if self.state.lock().table_created {
            return Ok(());
        }
        let _guard = self.create_lock.lock().await;
        if self.state.lock().table_created {
            return Ok(());
        }
        if columns.is_empty() {
            return Err(Error::HeaderImport {
                message: "response carries no result schema".to_string(),
            });
        }
        let schema: Vec<ColSchema> = columns
            .iter()
            .map(|c| ColSchema {
                name: c.name.clone(),
                sql_type: c.sql_type.clone(),
            })
            .collect();
        let job_id_col = {
            let _sql = self.sql_lock.lock().await;
            self.tables.create_table(&self.merge_table, &schema).await?
        };
        let mut state = self.state.lock();
        state.job_id_col = Some(job_id_col);
        state.table_created = true;
        Ok(())
    }

    async fn import_rows(&self, response: &WorkerResponse, tag: JobIdAttempt) -> Result<()> {
        let data = serialize_rows(&response.result, tag);
        let sql = format!(
            "LOAD DATA LOCAL INFILE '/virt/{}/{}' INTO TABLE {}",
            self.merge_table_bare, tag, self.merge_table
        );
        let _guard = self.sql_lock.lock().await;
        self.conn.load_infile(&sql, data).await.context(MysqlExecSnafu)
    }

    async fn note_rows_and_check_size(&self, rows: usize) -> Result<()> {
        let check_now = {
            let mut state = self.state.lock();
            state.size_check_row_count += rows as i64;
            if state.size_check_row_count >= self.check_size_every_x_rows {
                state.size_check_row_count = 0;
                true
            } else {
                false
            }
        };
        if !check_now {
            return Ok(());
        }

        let size_mb = self.result_table_size_mb().await?;
        if size_mb <= self.max_result_table_size_mb {
            return Ok(());
        }
        // reclaim invalidated rows first, then re-check
        warn!(
            size_mb,
            max_mb = self.max_result_table_size_mb,
            table = %self.merge_table,
            "result table over the ceiling, scrubbing invalid rows"
        );
        self.scrub_invalid_rows().await?;
        let size_mb = self.result_table_size_mb().await?;
        if size_mb > self.max_result_table_size_mb {
            return Err(Error::ResultTooLarge {
                size_mb,
                max_mb: self.max_result_table_size_mb,
            });
        }
        Ok(())
    }

    async fn result_table_size_mb(&self) -> Result<u64> {
        let sql = format!(
            "SELECT table_name, round(((data_length + index_length) / 1048576), 2) as 'MB' \
             FROM information_schema.TABLES \
             WHERE table_schema = '{}' AND table_name = '{}'",
            self.tables.result_db(),
            self.merge_table_bare
        );
        let _guard = self.sql_lock.lock().await;
        let results = self.conn.query(&sql).await.context(MysqlExecSnafu)?;
        let size = results
            .rows
            .first()
            .and_then(|row| row.get(1))
            .and_then(|cell| cell.as_deref())
            .and_then(|text| text.parse::<f64>().ok())
            .unwrap_or(0.0);
        Ok(size.ceil() as u64)
    }

    async fn delete_invalid_rows(&self, attempts: BTreeSet<i64>) -> bool {
        let job_id_col = match self.state.lock().job_id_col.clone() {
            Some(col) => col,
            // no rows were ever written
            None => return true,
        };
        for sql in
            delete_statements(&self.merge_table, &job_id_col, &attempts, MAX_DELETE_SQL_BYTES)
        {
            let _guard = self.sql_lock.lock().await;
            if let Err(e) = self.conn.exec(&sql).await {
                warn!(error = %e, "invalid-row delete failed");
                return false;
            }
        }
        true
    }
}

// Batch the delete set into statements whose text stays under `max_bytes`.
fn delete_statements(
    table: &str,
    job_id_col: &str,
    attempts: &BTreeSet<i64>,
    max_bytes: usize,
) -> Vec<String> {
    let prefix = format!("DELETE FROM {} WHERE `{}` IN (", table, job_id_col);
    let mut out = vec![];
    let mut values = String::new();
    for attempt in attempts {
        let rendered = attempt.to_string();
        if !values.is_empty() && prefix.len() + values.len() + rendered.len() + 2 > max_bytes {
            out.push(format!("{}{})", prefix, values));
            values.clear();
        }
        if !values.is_empty() {
            values.push(',');
        }
        values.push_str(&rendered);
    }
    if !values.is_empty() {
        out.push(format!("{}{})", prefix, values));
    }
    out
}
