//! Secondary index lookups against the index database.

use async_trait::async_trait;
use chunk_meta::{ChunkId, SecondaryIndex};
use sql_client::SqlConnection;
use std::sync::Arc;

/// [`SecondaryIndex`] over the replicated index tables, one per director
/// table, named `<db>__<table>` and keyed by the director column.
#[derive(Debug)]
pub struct SqlSecondaryIndex {
    conn: Arc<dyn SqlConnection>,
    index_db: String,
}

impl SqlSecondaryIndex {
    /// An index reader over `conn`, with index tables living in
    /// `index_db`.
    pub fn new(conn: Arc<dyn SqlConnection>, index_db: impl Into<String>) -> Self {
        Self {
            conn,
            index_db: index_db.into(),
        }
    }
}

#[async_trait]
impl SecondaryIndex for SqlSecondaryIndex {
    async fn lookup(
        &self,
        db: &str,
        table: &str,
        column: &str,
        values: &[String],
    ) -> chunk_meta::Result<Vec<ChunkId>> {
        if values.is_empty() {
            return Ok(vec![]);
        }
        let sql = format!(
            "SELECT DISTINCT chunkId FROM {}.{}__{} WHERE {} IN ({})",
            self.index_db,
            db,
            table,
            column,
            values.join(",")
        );
        let results =
            self.conn
                .query(&sql)
                .await
                .map_err(|e| chunk_meta::Error::SecondaryIndex {
                    message: e.to_string(),
                })?;
        let mut chunks = vec![];
        for row in &results.rows {
            let cell = row.first().and_then(|c| c.as_deref()).unwrap_or("");
            let chunk = cell
                .parse::<ChunkId>()
                .map_err(|_| chunk_meta::Error::SecondaryIndex {
                    message: format!("malformed chunk id '{}'", cell),
                })?;
            if !chunks.contains(&chunk) {
                chunks.push(chunk);
            }
        }
        chunks.sort_unstable();
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sql_client::{MockSql, SqlResults};

    #[tokio::test]
    async fn queries_the_index_table() {
        let mock = Arc::new(MockSql::new());
        mock.set_result_for(
            "LSST__Object",
            SqlResults {
                columns: vec![],
                rows: vec![vec![Some("7480".to_string())], vec![Some("6630".to_string())]],
            },
        );
        let index = SqlSecondaryIndex::new(Arc::<MockSql>::clone(&mock), "qservMeta");
        let chunks = index
            .lookup("LSST", "Object", "objectId", &["2".into(), "3145".into()])
            .await
            .unwrap();
        assert_eq!(chunks, vec![6630, 7480]);
        assert_eq!(
            mock.executed()[0],
            "SELECT DISTINCT chunkId FROM qservMeta.LSST__Object WHERE objectId IN (2,3145)"
        );
    }

    #[tokio::test]
    async fn empty_values_short_circuit() {
        let mock = Arc::new(MockSql::new());
        let index = SqlSecondaryIndex::new(Arc::<MockSql>::clone(&mock), "qservMeta");
        let chunks = index.lookup("LSST", "Object", "objectId", &[]).await.unwrap();
        assert!(chunks.is_empty());
        assert!(mock.executed().is_empty());
    }
}
