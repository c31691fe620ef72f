//! Per-query mutable analysis state.

use crate::aliases::{SelectListAliases, TableAliases};
use chunk_meta::CssAccess;
use query_ir::{Restrictor, TableRef};
use std::collections::HashMap;

/// State accumulated while the plugins run.
#[derive(Debug)]
pub struct QueryContext {
    /// Database applied to unqualified table names.
    pub default_db: String,
    /// Database of the first FROM table; decides which partitioning
    /// metadata governs the query.
    pub dominant_db: String,
    /// FROM tables (without joins flattened away) in resolution order.
    pub resolver_tables: Vec<TableRef>,
    /// Alias ↔ (db, table) of the FROM list.
    pub table_aliases: TableAliases,
    /// Alias ↔ select expression of the select list.
    pub select_list_aliases: SelectListAliases,
    /// Chunk-pruning restrictors: spatial ones from the parser plus
    /// secondary-index ones found during analysis.
    pub restrictors: Vec<Restrictor>,
    /// Declared columns of every FROM table, keyed by (db, table).
    pub table_schemas: HashMap<(String, String), Vec<String>>,
    /// Partitioned (db, table) pairs the plan substitutes chunk ids into.
    pub chunked_tables: Vec<(String, String)>,
    /// True once the physical phase decided the query needs per-chunk
    /// dispatch.
    pub has_chunks: bool,
    /// True once the physical phase decided the query needs sub-chunking.
    pub has_sub_chunks: bool,
    css: CssAccess,
}

impl QueryContext {
    /// A fresh context for one query.
    pub fn new(default_db: impl Into<String>, css: CssAccess) -> Self {
        Self {
            default_db: default_db.into(),
            dominant_db: String::new(),
            resolver_tables: vec![],
            table_aliases: TableAliases::default(),
            select_list_aliases: SelectListAliases::default(),
            restrictors: vec![],
            table_schemas: HashMap::new(),
            chunked_tables: vec![],
            has_chunks: false,
            has_sub_chunks: false,
            css,
        }
    }

    /// The cached metadata handle.
    pub fn css(&self) -> &CssAccess {
        &self.css
    }

    /// The declared columns of `db`.`table`, if gathered.
    pub fn columns_of(&self, db: &str, table: &str) -> Option<&[String]> {
        self.table_schemas
            .get(&(db.to_string(), table.to_string()))
            .map(|v| v.as_slice())
    }
}
