//! Turning parallel templates into concrete per-chunk worker queries.
//!
//! The planner leaves `{chunk}` and `{subChunk}` placeholder tokens inside
//! rewritten table names; this crate substitutes real ids into them, one
//! [`ChunkQuerySpec`] per dispatched chunk.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    missing_docs,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

use std::collections::BTreeMap;

/// The `{chunk}` placeholder token.
pub const CHUNK_TOKEN: &str = "{chunk}";
/// The `{subChunk}` placeholder token.
pub const SUB_CHUNK_TOKEN: &str = "{subChunk}";

/// Which substitutions a set of parallel templates requires.
///
/// Produced by the planner's physical phase alongside the templates, and
/// consumed here when materializing per-chunk SQL.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueryMapping {
    /// Templates contain `{chunk}`.
    pub uses_chunks: bool,
    /// Templates contain `{subChunk}` and expand once per sub-chunk id.
    pub uses_sub_chunks: bool,
    /// A second template runs against the overlap shadow table.
    pub uses_overlap: bool,
}

impl QueryMapping {
    /// A mapping with no substitutions: the query does not touch
    /// partitioned tables and runs as-is.
    pub fn unchunked() -> Self {
        Self::default()
    }

    /// True if at least one substitution applies.
    pub fn has_chunks(&self) -> bool {
        self.uses_chunks
    }
}

/// A chunk to dispatch, with the sub-chunks it covers (empty unless the
/// query requires sub-chunking).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkSpec {
    /// The chunk id.
    pub chunk_id: i32,
    /// Sub-chunk ids covered by this chunk.
    pub sub_chunk_ids: Vec<i32>,
}

impl ChunkSpec {
    /// A chunk with no sub-chunks.
    pub fn simple(chunk_id: i32) -> Self {
        Self {
            chunk_id,
            sub_chunk_ids: vec![],
        }
    }
}

/// The flattened per-chunk artifact: every SQL string to execute at the
/// worker owning `chunk_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkQuerySpec {
    /// Database the queries run against.
    pub db: String,
    /// The chunk id.
    pub chunk_id: i32,
    /// Sub-chunk ids the queries cover, empty for plain chunk queries.
    pub sub_chunk_ids: Vec<i32>,
    /// Concrete SQL strings, deduplicated, in template order.
    pub queries: Vec<String>,
}

/// Materialize one [`ChunkQuerySpec`] per chunk.
///
/// Chunks are deduplicated (later duplicates merge their sub-chunk lists)
/// and the result is ordered by chunk id.
pub fn build_chunk_query_specs(
    db: &str,
    templates: &[String],
    mapping: &QueryMapping,
    chunks: &[ChunkSpec],
) -> Vec<ChunkQuerySpec> {
    let mut merged: BTreeMap<i32, Vec<i32>> = BTreeMap::new();
    for chunk in chunks {
        let entry = merged.entry(chunk.chunk_id).or_default();
        for sub in &chunk.sub_chunk_ids {
            if !entry.contains(sub) {
                entry.push(*sub);
            }
        }
    }

    merged
        .into_iter()
        .map(|(chunk_id, sub_chunk_ids)| {
            let mut queries = vec![];
            for template in templates {
                if mapping.uses_sub_chunks {
                    for sub in &sub_chunk_ids {
                        push_unique(
                            &mut queries,
                            substitute(template, chunk_id, Some(*sub)),
                        );
                    }
                } else {
                    push_unique(&mut queries, substitute(template, chunk_id, None));
                }
            }
            ChunkQuerySpec {
                db: db.to_string(),
                chunk_id,
                sub_chunk_ids,
                queries,
            }
        })
        .collect()
}

fn substitute(template: &str, chunk_id: i32, sub_chunk_id: Option<i32>) -> String {
    let out = template.replace(CHUNK_TOKEN, &chunk_id.to_string());
    match sub_chunk_id {
        Some(sub) => out.replace(SUB_CHUNK_TOKEN, &sub.to_string()),
        None => out,
    }
}

fn push_unique(queries: &mut Vec<String>, query: String) {
    if !queries.contains(&query) {
        queries.push(query);
    }
}
