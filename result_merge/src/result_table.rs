//! Naming, creation and teardown of the transient result tables.

use crate::{MysqlExecSnafu, Result};
use observability_deps::tracing::{debug, warn};
use shardq_time::TimeProvider;
use snafu::ResultExt;
use sql_client::{ColSchema, SqlConnection};
use std::sync::Arc;

const JOB_ID_BASE_NAME: &str = "jobId";
const JOB_ID_SQL_TYPE: &str = "INT(9)";

/// Creates, names and drops the per-query result tables in the result
/// database. Orphaned tables from earlier czar incarnations are left in
/// place.
#[derive(Debug)]
pub struct ResultTableManager {
    conn: Arc<dyn SqlConnection>,
    result_db: String,
    time_provider: Arc<dyn TimeProvider>,
}

impl ResultTableManager {
    /// A manager writing into `result_db` over `conn`.
    pub fn new(
        conn: Arc<dyn SqlConnection>,
        result_db: impl Into<String>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            conn,
            result_db: result_db.into(),
            time_provider,
        }
    }

    /// The result database name.
    pub fn result_db(&self) -> &str {
        &self.result_db
    }

    /// A collision-free `result_<id>` table name, qualified by the result
    /// database. The id derives from the current timestamp.
    pub fn make_table_name(&self) -> String {
        let now = self.time_provider.now();
        format!(
            "{}.result_{}{}",
            self.result_db,
            now.timestamp() % 10000,
            now.timestamp_subsec_micros()
        )
    }

    /// Create `table` with `schema`, prefixed by a job-attempt tag column
    /// whose name avoids colliding with user columns. Returns the chosen
    /// tag column name.
    ///
    /// The table engine favors append speed over crash recovery; the
    /// table is transient.
    pub async fn create_table(&self, table: &str, schema: &[ColSchema]) -> Result<String> {
        let job_id_col = pick_job_id_column(schema);
        let mut columns = vec![format!("`{}` {}", job_id_col, JOB_ID_SQL_TYPE)];
        columns.extend(
            schema
                .iter()
                .map(|c| format!("`{}` {}", c.name, c.sql_type)),
        );
        let sql = format!(
            "CREATE TABLE {} ({}) ENGINE=MyISAM",
            table,
            columns.join(",")
        );
        debug!(%table, %sql, "creating result table");
        self.conn
            .exec(&sql)
            .await
            .map_err(|e| crate::Error::CreateTable {
                table: table.to_string(),
                message: e.to_string(),
            })?;
        Ok(job_id_col)
    }

    /// Drop `table`, tolerating its absence.
    pub async fn drop_table(&self, table: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", table);
        self.conn.exec(&sql).await.context(MysqlExecSnafu)
    }

    /// Best-effort drop used in failure cleanup paths; errors are logged
    /// and swallowed.
    pub async fn drop_table_quietly(&self, table: &str) {
        if let Err(e) = self.drop_table(table).await {
            warn!(%table, error=%e, "result table cleanup failed");
        }
    }
}

// A column name for the tag that does not collide with the result schema:
// `jobId`, then `jobId0`, `jobId1`, ...
fn pick_job_id_column(schema: &[ColSchema]) -> String {
    let mut candidate = JOB_ID_BASE_NAME.to_string();
    let mut suffix = 0;
    while schema.iter().any(|c| c.name == candidate) {
        candidate = format!("{}{}", JOB_ID_BASE_NAME, suffix);
        suffix += 1;
    }
    candidate
}
