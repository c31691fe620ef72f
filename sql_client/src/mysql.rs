//! `mysql_async`-backed [`SqlConnection`].

use crate::{ColSchema, SqlConfig, SqlConnection, SqlError, SqlResults};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use mysql_async::prelude::Queryable;
use mysql_async::{Opts, OptsBuilder, Pool, Row, Value};
use observability_deps::tracing::debug;

/// Connection pool against the configured MySQL server.
#[derive(Debug)]
pub struct MySqlConnection {
    pool: Pool,
}

impl MySqlConnection {
    /// Build a pool from `config`. Connections are opened lazily.
    pub fn new(config: &SqlConfig) -> Self {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(config.host.clone())
            .tcp_port(config.port)
            .user(Some(config.user.clone()))
            .pass(Some(config.password.clone()))
            .db_name(Some(config.db.clone()));
        if let Some(socket) = &config.socket {
            builder = builder.socket(Some(socket.clone()));
        }
        Self {
            pool: Pool::new(Opts::from(builder)),
        }
    }
}

fn map_error(e: mysql_async::Error) -> SqlError {
    match e {
        mysql_async::Error::Server(server) => {
            SqlError::new(server.code as i32, server.message)
        }
        other => SqlError::connection(other.to_string()),
    }
}

fn value_to_text(value: Value) -> Option<String> {
    match value {
        Value::NULL => None,
        Value::Bytes(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::Int(v) => Some(v.to_string()),
        Value::UInt(v) => Some(v.to_string()),
        Value::Float(v) => Some(v.to_string()),
        Value::Double(v) => Some(v.to_string()),
        other => {
            // temporal values render through their SQL literal form
            let sql = other.as_sql(true);
            Some(sql.trim_matches('\'').to_string())
        }
    }
}

#[async_trait]
impl SqlConnection for MySqlConnection {
    async fn exec(&self, sql: &str) -> Result<(), SqlError> {
        debug!(%sql, "exec");
        let mut conn = self.pool.get_conn().await.map_err(map_error)?;
        conn.query_drop(sql).await.map_err(map_error)
    }

    async fn query(&self, sql: &str) -> Result<SqlResults, SqlError> {
        debug!(%sql, "query");
        let mut conn = self.pool.get_conn().await.map_err(map_error)?;
        let mut result = conn.query_iter(sql).await.map_err(map_error)?;

        let columns = result
            .columns()
            .map(|cols| {
                cols.iter()
                    .map(|c| ColSchema {
                        name: c.name_str().into_owned(),
                        sql_type: format!("{:?}", c.column_type()),
                    })
                    .collect()
            })
            .unwrap_or_default();

        let raw_rows: Vec<Row> = result.collect_and_drop().await.map_err(map_error)?;
        let rows = raw_rows
            .into_iter()
            .map(|row| row.unwrap().into_iter().map(value_to_text).collect())
            .collect();
        Ok(SqlResults { columns, rows })
    }

    async fn load_infile(&self, sql: &str, data: Bytes) -> Result<(), SqlError> {
        debug!(%sql, bytes = data.len(), "load infile");
        let mut conn = self.pool.get_conn().await.map_err(map_error)?;
        conn.set_infile_handler(async move {
            Ok(futures::stream::once(async move { Ok(data) }).boxed())
        });
        conn.query_drop(sql).await.map_err(map_error)
    }
}
