//! The plan artifacts produced by analysis.

use chunk_spec::QueryMapping;
use query_ir::{SelectStmt, ValueExpr, ValueFactor};

/// The three statement artifacts of a planned query plus the chunk
/// substitution descriptor.
#[derive(Debug, Clone)]
pub struct Plan {
    /// Statement run once against the unchunked template tables to
    /// validate the query and derive the result schema; always `LIMIT 0`.
    pub preflight: SelectStmt,
    /// Worker-side statements, with chunk placeholder tokens in table
    /// names. More than one entry only for overlap (near-neighbor)
    /// queries.
    pub parallel: Vec<SelectStmt>,
    /// Czar-side statement folding accumulated partial results, `None`
    /// when concatenation already matches the user semantics.
    pub merge: Option<SelectStmt>,
    /// Database whose partitioning governs the dispatch.
    pub dominant_db: String,
    /// Placeholder tokens the parallel statements require.
    pub mapping: QueryMapping,
}

impl Plan {
    /// Seed a plan from the logically rewritten statement.
    pub fn new(stmt: &SelectStmt) -> Self {
        let mut preflight = stmt.clone();
        preflight.set_limit(Some(0));
        Self {
            preflight,
            parallel: vec![stmt.clone()],
            merge: None,
            dominant_db: String::new(),
            mapping: QueryMapping::unchunked(),
        }
    }

    /// Ensure a merge statement exists, seeding it with a pass-through
    /// select over the parallel output columns (`None` only before this
    /// call).
    pub fn ensure_merge(&mut self) -> &mut SelectStmt {
        if self.merge.is_none() {
            let first = &self.parallel[0];
            let mut merge = SelectStmt::new();
            merge.distinct = first.distinct;
            for expr in first.select_list() {
                merge.select_list_mut().push(passthrough_expr(expr));
            }
            self.merge = Some(merge);
        }
        self.merge.as_mut().expect("merge statement present")
    }

    /// True when the merge statement performs real work (anything beyond
    /// dropping the tag column).
    pub fn needs_merge(&self) -> bool {
        self.merge.is_some()
    }
}

// The merge-side reference to one parallel output column: its output name,
// un-aliased.
pub(crate) fn passthrough_expr(expr: &ValueExpr) -> ValueExpr {
    if expr.is_star() {
        return ValueExpr::from_factor(ValueFactor::Star(String::new()));
    }
    let name = match expr.alias() {
        Some(alias) => alias.to_string(),
        None => match expr.column_ref() {
            Some(cr) => cr.column().to_string(),
            None => expr.sql_fragment(),
        },
    };
    ValueExpr::from_column(name)
}
