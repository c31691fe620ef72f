//! Secondary index lookups: director key value → owning chunk.

use crate::{ChunkId, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt::Debug;

/// The secondary index maps director-key values to the chunks holding
/// their rows, letting an `IN` or `=` restrictor shrink the dispatch set
/// before fan-out.
#[async_trait]
pub trait SecondaryIndex: Debug + Send + Sync {
    /// The chunks of `db`.`table` owning rows whose `column` equals any of
    /// `values`. Unknown values simply contribute no chunks.
    async fn lookup(
        &self,
        db: &str,
        table: &str,
        column: &str,
        values: &[String],
    ) -> Result<Vec<ChunkId>>;
}

/// In-memory [`SecondaryIndex`] for tests and single-node runs.
#[derive(Debug, Default)]
pub struct MemSecondaryIndex {
    // (db, table, column) -> key value -> chunk
    entries: RwLock<HashMap<(String, String, String), HashMap<String, ChunkId>>>,
}

impl MemSecondaryIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the chunk owning one key value.
    pub fn insert(
        &self,
        db: impl Into<String>,
        table: impl Into<String>,
        column: impl Into<String>,
        value: impl Into<String>,
        chunk: ChunkId,
    ) {
        self.entries
            .write()
            .entry((db.into(), table.into(), column.into()))
            .or_default()
            .insert(value.into(), chunk);
    }
}

#[async_trait]
impl SecondaryIndex for MemSecondaryIndex {
    async fn lookup(
        &self,
        db: &str,
        table: &str,
        column: &str,
        values: &[String],
    ) -> Result<Vec<ChunkId>> {
        let entries = self.entries.read();
        let map = entries.get(&(db.to_string(), table.to_string(), column.to_string()));
        let mut out = vec![];
        if let Some(map) = map {
            for value in values {
                if let Some(chunk) = map.get(value) {
                    if !out.contains(chunk) {
                        out.push(*chunk);
                    }
                }
            }
        }
        out.sort_unstable();
        Ok(out)
    }
}
