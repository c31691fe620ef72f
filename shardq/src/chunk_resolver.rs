//! Resolution of the chunk set to dispatch for one query.

use crate::{MetadataSnafu, Result};
use chunk_meta::{ChunkId, CssAccess, RegionIndex, SecondaryIndex};
use chunk_spec::{ChunkSpec, QueryMapping};
use observability_deps::tracing::debug;
use query_ir::Restrictor;
use snafu::ResultExt;
use std::collections::HashSet;
use std::sync::Arc;

/// Chunk id used for queries over unpartitioned tables; workers treat it
/// as "no chunk substitution".
pub const DUMMY_CHUNK: ChunkId = 1_234_567_890;

/// Computes the chunks a query has to visit: all non-empty chunks of the
/// dominant database, shrunk by every resolvable restrictor.
#[derive(Debug)]
pub struct ChunkResolver {
    css: CssAccess,
    secondary: Arc<dyn SecondaryIndex>,
    region: Arc<dyn RegionIndex>,
}

impl ChunkResolver {
    /// A resolver over the given metadata interfaces.
    pub fn new(
        css: CssAccess,
        secondary: Arc<dyn SecondaryIndex>,
        region: Arc<dyn RegionIndex>,
    ) -> Self {
        Self {
            css,
            secondary,
            region,
        }
    }

    /// The per-chunk dispatch list.
    pub async fn resolve(
        &self,
        db: &str,
        mapping: &QueryMapping,
        restrictors: &[Restrictor],
    ) -> Result<Vec<ChunkSpec>> {
        if !mapping.uses_chunks {
            return Ok(vec![ChunkSpec::simple(DUMMY_CHUNK)]);
        }

        let empty = self.css.empty_chunks(db).context(MetadataSnafu)?;
        let mut chunks: Vec<ChunkId> = self
            .css
            .chunks(db)
            .context(MetadataSnafu)?
            .into_iter()
            .filter(|c| !empty.contains(c))
            .collect();

        for restrictor in restrictors {
            if let Some(allowed) = self.restrictor_chunks(db, restrictor).await? {
                let allowed: HashSet<ChunkId> = allowed.into_iter().collect();
                chunks.retain(|c| allowed.contains(c));
            }
        }
        debug!(%db, count = chunks.len(), "resolved chunk set");

        let sub_chunk_ids: Vec<i32> = if mapping.uses_sub_chunks {
            let (_, sub_stripes) = self.css.stripes(db).context(MetadataSnafu)?;
            (0..sub_stripes as i32).collect()
        } else {
            vec![]
        };

        Ok(chunks
            .into_iter()
            .map(|chunk_id| ChunkSpec {
                chunk_id,
                sub_chunk_ids: sub_chunk_ids.clone(),
            })
            .collect())
    }

    // The chunk set a restrictor allows, or `None` when it cannot prune.
    async fn restrictor_chunks(
        &self,
        db: &str,
        restrictor: &Restrictor,
    ) -> Result<Option<Vec<ChunkId>>> {
        if restrictor.name == "sIndex" {
            let (index_db, table, column) = match restrictor.params.as_slice() {
                [index_db, table, column, ..] => (index_db, table, column),
                _ => return Ok(None),
            };
            let values = restrictor.params[3..].to_vec();
            let chunks = self
                .secondary
                .lookup(index_db, table, column, &values)
                .await
                .context(MetadataSnafu)?;
            return Ok(Some(chunks));
        }
        Ok(self.region.chunks_for(db, restrictor))
    }

    /// The worker owning `chunk`; the dummy chunk lands on the worker of
    /// the lowest real chunk.
    pub fn worker_for(&self, db: &str, chunk: ChunkId) -> Result<String> {
        if chunk == DUMMY_CHUNK {
            let chunks = self.css.chunks(db).context(MetadataSnafu)?;
            let first = chunks.first().ok_or_else(|| crate::Error::Internal {
                message: format!("database {} has no chunks to place work on", db),
            })?;
            return self.css.worker_for_chunk(db, *first).context(MetadataSnafu);
        }
        self.css.worker_for_chunk(db, chunk).context(MetadataSnafu)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chunk_meta::{MemKvInterface, MemRegionIndex, MemSecondaryIndex};

    fn css() -> CssAccess {
        let kv = MemKvInterface::from_pairs([
            ("/DBS/LSST/TABLES/Object/schema", "objectId,ra"),
            ("/DBS/LSST/TABLES/Object/partitioning", "1"),
            ("/DBS/LSST/partitioning/nStripes", "60"),
            ("/DBS/LSST/partitioning/nSubStripes", "3"),
            ("/DBS/LSST/CHUNKS/100/worker", "w1"),
            ("/DBS/LSST/CHUNKS/101/worker", "w2"),
            ("/DBS/LSST/CHUNKS/102/worker", "w1"),
            ("/DBS/LSST/EMPTYCHUNKS", "101"),
        ]);
        CssAccess::new(Arc::new(kv))
    }

    fn resolver(secondary: MemSecondaryIndex, region: MemRegionIndex) -> ChunkResolver {
        ChunkResolver::new(css(), Arc::new(secondary), Arc::new(region))
    }

    fn chunked() -> QueryMapping {
        QueryMapping {
            uses_chunks: true,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn empty_chunks_are_skipped() {
        let r = resolver(MemSecondaryIndex::new(), MemRegionIndex::new());
        let specs = r.resolve("LSST", &chunked(), &[]).await.unwrap();
        let ids: Vec<_> = specs.iter().map(|s| s.chunk_id).collect();
        assert_eq!(ids, vec![100, 102]);
    }

    #[tokio::test]
    async fn sindex_restrictor_shrinks() {
        let secondary = MemSecondaryIndex::new();
        secondary.insert("LSST", "Object", "objectId", "42", 102);
        let r = resolver(secondary, MemRegionIndex::new());
        let restrictor = Restrictor {
            name: "sIndex".to_string(),
            params: vec![
                "LSST".to_string(),
                "Object".to_string(),
                "objectId".to_string(),
                "42".to_string(),
            ],
        };
        let specs = r.resolve("LSST", &chunked(), &[restrictor]).await.unwrap();
        let ids: Vec<_> = specs.iter().map(|s| s.chunk_id).collect();
        assert_eq!(ids, vec![102]);
    }

    #[tokio::test]
    async fn unknown_key_values_empty_the_dispatch_set() {
        let r = resolver(MemSecondaryIndex::new(), MemRegionIndex::new());
        let restrictor = Restrictor {
            name: "sIndex".to_string(),
            params: vec![
                "LSST".to_string(),
                "Object".to_string(),
                "objectId".to_string(),
                "404".to_string(),
            ],
        };
        let specs = r.resolve("LSST", &chunked(), &[restrictor]).await.unwrap();
        assert!(specs.is_empty());
    }

    #[tokio::test]
    async fn area_restrictor_consults_region_index() {
        let region = MemRegionIndex::new();
        let restrictor = Restrictor {
            name: "qserv_areaspec_box".to_string(),
            params: vec!["0".into(), "0".into(), "1".into(), "1".into()],
        };
        region.insert("LSST", restrictor.clone(), vec![100]);
        let r = resolver(MemSecondaryIndex::new(), region);
        let specs = r.resolve("LSST", &chunked(), &[restrictor]).await.unwrap();
        let ids: Vec<_> = specs.iter().map(|s| s.chunk_id).collect();
        assert_eq!(ids, vec![100]);
    }

    #[tokio::test]
    async fn unindexed_area_restrictor_keeps_everything() {
        let r = resolver(MemSecondaryIndex::new(), MemRegionIndex::new());
        let restrictor = Restrictor {
            name: "qserv_areaspec_circle".to_string(),
            params: vec!["1".into(), "2".into(), "0.5".into()],
        };
        let specs = r.resolve("LSST", &chunked(), &[restrictor]).await.unwrap();
        assert_eq!(specs.len(), 2);
    }

    #[tokio::test]
    async fn sub_chunk_ids_from_stripes() {
        let r = resolver(MemSecondaryIndex::new(), MemRegionIndex::new());
        let mapping = QueryMapping {
            uses_chunks: true,
            uses_sub_chunks: true,
            uses_overlap: true,
        };
        let specs = r.resolve("LSST", &mapping, &[]).await.unwrap();
        assert_eq!(specs[0].sub_chunk_ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn unchunked_query_gets_dummy_chunk() {
        let r = resolver(MemSecondaryIndex::new(), MemRegionIndex::new());
        let specs = r
            .resolve("LSST", &QueryMapping::unchunked(), &[])
            .await
            .unwrap();
        assert_eq!(specs.len(), 1);
        assert_eq!(specs[0].chunk_id, DUMMY_CHUNK);
        assert_eq!(r.worker_for("LSST", DUMMY_CHUNK).unwrap(), "w1");
    }
}
