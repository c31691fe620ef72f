//! Typed access over the metadata key-value snapshot.

use crate::kv::KvInterface;
use crate::{ChunkId, Error, Result, UnknownDatabaseSnafu, UnknownTableSnafu};
use observability_deps::tracing::warn;
use snafu::ensure;
use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

/// Typed reader of the metadata layout:
///
/// ```text
/// /DBS/<db>/TABLES/<table>/schema                 comma-separated columns
/// /DBS/<db>/TABLES/<table>/partitioning           "1" when chunked
/// /DBS/<db>/TABLES/<table>/partitioning/subChunks "1" when sub-chunked
/// /DBS/<db>/partitioning/dirTable                 director table name
/// /DBS/<db>/partitioning/dirColName               director key column
/// /DBS/<db>/partitioning/nStripes                 stripe count
/// /DBS/<db>/partitioning/nSubStripes              sub-stripe count
/// /DBS/<db>/CHUNKS/<id>/worker                    owning worker id
/// /DBS/<db>/EMPTYCHUNKS                           comma-separated chunk ids
/// ```
#[derive(Debug, Clone)]
pub struct CssAccess {
    kv: Arc<dyn KvInterface>,
    empty_chunks_override: Option<HashSet<ChunkId>>,
}

impl CssAccess {
    /// Wrap a key-value snapshot.
    pub fn new(kv: Arc<dyn KvInterface>) -> Self {
        Self {
            kv,
            empty_chunks_override: None,
        }
    }

    /// Wrap a snapshot, overriding the empty-chunk list with the contents
    /// of the partitioner's empty chunk file (one chunk id per line).
    ///
    /// A missing file is treated as "no empty chunks" with a logged
    /// warning, matching how deployments run before the partitioner has
    /// published one.
    pub fn with_empty_chunk_path(kv: Arc<dyn KvInterface>, path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let empty = match std::fs::read_to_string(path) {
            Ok(contents) => {
                let mut set = HashSet::new();
                for line in contents.lines() {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    match line.parse::<ChunkId>() {
                        Ok(id) => {
                            set.insert(id);
                        }
                        Err(_) => warn!(%line, path=%path.display(), "skipping malformed empty-chunk entry"),
                    }
                }
                set
            }
            Err(e) => {
                warn!(path=%path.display(), error=%e, "no empty chunk file, assuming none");
                HashSet::new()
            }
        };
        Self {
            kv,
            empty_chunks_override: Some(empty),
        }
    }

    fn require(&self, key: String) -> Result<String> {
        self.kv.get(&key).ok_or(Error::MissingKey { key })
    }

    /// True if the store knows database `db`.
    pub fn contains_db(&self, db: &str) -> bool {
        self.kv.exists(&format!("/DBS/{}", db))
    }

    /// True if the store knows table `db`.`table`.
    pub fn contains_table(&self, db: &str, table: &str) -> bool {
        self.kv.exists(&format!("/DBS/{}/TABLES/{}", db, table))
    }

    /// The declared column names of `db`.`table`.
    pub fn table_columns(&self, db: &str, table: &str) -> Result<Vec<String>> {
        ensure!(self.contains_db(db), UnknownDatabaseSnafu { db });
        ensure!(
            self.contains_table(db, table),
            UnknownTableSnafu { db, table }
        );
        let schema = self.require(format!("/DBS/{}/TABLES/{}/schema", db, table))?;
        Ok(schema
            .split(',')
            .map(|c| c.trim().to_string())
            .filter(|c| !c.is_empty())
            .collect())
    }

    /// The partitioned tables of `db`.
    pub fn partitioned_tables(&self, db: &str) -> Result<Vec<String>> {
        ensure!(self.contains_db(db), UnknownDatabaseSnafu { db });
        let mut out = vec![];
        for table in self.kv.children(&format!("/DBS/{}/TABLES", db)) {
            if self.is_partitioned(db, &table)? {
                out.push(table);
            }
        }
        Ok(out)
    }

    /// True if `db`.`table` is horizontally partitioned into chunks.
    pub fn is_partitioned(&self, db: &str, table: &str) -> Result<bool> {
        ensure!(
            self.contains_table(db, table),
            UnknownTableSnafu { db, table }
        );
        Ok(self
            .kv
            .get(&format!("/DBS/{}/TABLES/{}/partitioning", db, table))
            .map(|v| v == "1")
            .unwrap_or(false))
    }

    /// True if `db`.`table` additionally carries sub-chunk tables.
    pub fn has_sub_chunks(&self, db: &str, table: &str) -> bool {
        self.kv
            .get(&format!(
                "/DBS/{}/TABLES/{}/partitioning/subChunks",
                db, table
            ))
            .map(|v| v == "1")
            .unwrap_or(false)
    }

    /// The director table of `db`.
    pub fn director_table(&self, db: &str) -> Result<String> {
        ensure!(self.contains_db(db), UnknownDatabaseSnafu { db });
        self.require(format!("/DBS/{}/partitioning/dirTable", db))
    }

    /// The director key column of `db`.
    pub fn director_column(&self, db: &str) -> Result<String> {
        ensure!(self.contains_db(db), UnknownDatabaseSnafu { db });
        self.require(format!("/DBS/{}/partitioning/dirColName", db))
    }

    /// The column carrying the chunk id in partitioned tables of `db`
    /// (`chunkId` unless overridden).
    pub fn chunk_column(&self, db: &str) -> String {
        self.kv
            .get(&format!("/DBS/{}/partitioning/chunkColumn", db))
            .unwrap_or_else(|| "chunkId".to_string())
    }

    /// The column carrying the sub-chunk id in sub-chunked tables of `db`
    /// (`subChunkId` unless overridden).
    pub fn sub_chunk_column(&self, db: &str) -> String {
        self.kv
            .get(&format!("/DBS/{}/partitioning/subChunkColumn", db))
            .unwrap_or_else(|| "subChunkId".to_string())
    }

    /// The (stripes, sub-stripes) partitioning of `db`.
    pub fn stripes(&self, db: &str) -> Result<(u32, u32)> {
        let stripes = self.parse_u32(format!("/DBS/{}/partitioning/nStripes", db))?;
        let sub_stripes = self.parse_u32(format!("/DBS/{}/partitioning/nSubStripes", db))?;
        Ok((stripes, sub_stripes))
    }

    fn parse_u32(&self, key: String) -> Result<u32> {
        let value = self.require(key.clone())?;
        value
            .parse()
            .map_err(|_| Error::MalformedValue { key, value })
    }

    /// All chunk ids of `db`, sorted.
    pub fn chunks(&self, db: &str) -> Result<Vec<ChunkId>> {
        ensure!(self.contains_db(db), UnknownDatabaseSnafu { db });
        let mut out = vec![];
        for child in self.kv.children(&format!("/DBS/{}/CHUNKS", db)) {
            let id = child.parse::<ChunkId>().map_err(|_| Error::MalformedValue {
                key: format!("/DBS/{}/CHUNKS/{}", db, child),
                value: child.clone(),
            })?;
            out.push(id);
        }
        out.sort_unstable();
        Ok(out)
    }

    /// The chunk ids of `db` known to hold no rows.
    pub fn empty_chunks(&self, db: &str) -> Result<HashSet<ChunkId>> {
        if let Some(over) = &self.empty_chunks_override {
            return Ok(over.clone());
        }
        let raw = match self.kv.get(&format!("/DBS/{}/EMPTYCHUNKS", db)) {
            Some(raw) => raw,
            None => return Ok(HashSet::new()),
        };
        let mut out = HashSet::new();
        for part in raw.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            out.insert(part.parse::<ChunkId>().map_err(|_| Error::MalformedValue {
                key: format!("/DBS/{}/EMPTYCHUNKS", db),
                value: part.to_string(),
            })?);
        }
        Ok(out)
    }

    /// The worker owning `chunk` of `db`.
    pub fn worker_for_chunk(&self, db: &str, chunk: ChunkId) -> Result<String> {
        self.require(format!("/DBS/{}/CHUNKS/{}/worker", db, chunk))
    }

    /// All registered worker ids.
    pub fn workers(&self) -> Vec<String> {
        self.kv.children("/WORKERS")
    }

    /// The `host:port` endpoint of `worker`.
    pub fn worker_address(&self, worker: &str) -> Result<String> {
        self.require(format!("/WORKERS/{}/address", worker))
    }
}
