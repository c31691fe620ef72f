//! Resolution of spatial restrictors to chunk sets.

use crate::ChunkId;
use parking_lot::RwLock;
use query_ir::Restrictor;
use std::collections::HashMap;
use std::fmt::Debug;

/// Maps a spatial restrictor to the set of chunks whose region intersects
/// it.
///
/// The actual spherical geometry lives with the partitioner; the czar only
/// consults the published index. `None` means the restrictor kind is not
/// indexed and must not be used for pruning.
pub trait RegionIndex: Debug + Send + Sync {
    /// Chunks of `db` intersecting `restrictor`, or `None` when unknown.
    fn chunks_for(&self, db: &str, restrictor: &Restrictor) -> Option<Vec<ChunkId>>;
}

/// In-memory [`RegionIndex`] keyed by the restrictor's name and literal
/// parameters.
#[derive(Debug, Default)]
pub struct MemRegionIndex {
    entries: RwLock<HashMap<(String, String, Vec<String>), Vec<ChunkId>>>,
}

impl MemRegionIndex {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the chunk set for one restrictor.
    pub fn insert(&self, db: impl Into<String>, restrictor: Restrictor, chunks: Vec<ChunkId>) {
        self.entries
            .write()
            .insert((db.into(), restrictor.name, restrictor.params), chunks);
    }
}

impl RegionIndex for MemRegionIndex {
    fn chunks_for(&self, db: &str, restrictor: &Restrictor) -> Option<Vec<ChunkId>> {
        self.entries
            .read()
            .get(&(
                db.to_string(),
                restrictor.name.clone(),
                restrictor.params.clone(),
            ))
            .cloned()
    }
}
