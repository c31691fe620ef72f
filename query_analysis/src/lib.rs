//! Rule-based analysis of a parsed statement into the chunk-dispatch plan.
//!
//! A fixed sequence of plugins rewrites the statement: a logical phase over
//! the parsed tree, then a physical phase over the [`Plan`] holding the
//! parallel (worker-side) statements and the merge (czar-side) statement.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod aliases;
mod context;
mod plan;
mod plugins;

pub use aliases::{SelectListAliases, TableAliases};
pub use context::QueryContext;
pub use plan::Plan;

use chunk_meta::CssAccess;
use observability_deps::tracing::debug;
use query_ir::SelectStmt;
use snafu::Snafu;

/// Analysis errors.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display(
        "duplicate select expression '{}' at positions{}",
        name,
        positions
    ))]
    DuplicateSelectExpr { name: String, positions: String },

    #[snafu(display("unsupported query: {}", reason))]
    UnsupportedFeature { reason: String },

    #[snafu(display("missing metadata: {}", source))]
    MissingMetadata { source: chunk_meta::Error },

    #[snafu(display("malformed statement: {}", source))]
    BadStatement { source: query_ir::Error },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The product of analysis: the plan, the per-query context, and the ORDER
/// BY text the front-end proxy applies after merging.
#[derive(Debug)]
pub struct AnalyzedQuery {
    /// Plan artifacts for dispatch and merge.
    pub plan: Plan,
    /// Aliases, restrictors and metadata gathered along the way.
    pub context: QueryContext,
    /// ORDER BY clause text for the proxy, "" when absent.
    pub proxy_order_by: String,
}

/// Run the full plugin sequence over `stmt`.
pub fn analyze(mut stmt: SelectStmt, css: CssAccess, default_db: &str) -> Result<AnalyzedQuery> {
    let mut ctx = QueryContext::new(default_db, css);

    plugins::DuplSelectExprPlugin.apply_logical(&mut stmt, &mut ctx)?;
    plugins::TablePlugin.apply_logical(&mut stmt, &mut ctx)?;

    // The proxy re-applies the user's ordering after the merge; capture it
    // from the rewritten statement where select-list aliases are in place.
    let proxy_order_by = stmt.proxy_order_by();

    let mut plan = Plan::new(&stmt);
    plugins::TablePlugin.apply_physical(&mut plan, &mut ctx)?;
    plugins::AggregatePlugin.apply_physical(&mut plan, &mut ctx)?;
    plugins::GroupByPlugin.apply_physical(&mut plan, &mut ctx)?;
    plugins::OrderByPlugin.apply_physical(&mut plan, &mut ctx)?;
    plugins::LimitPlugin.apply_physical(&mut plan, &mut ctx)?;
    plugins::WhereRestrictorPlugin.apply_physical(&mut plan, &mut ctx)?;

    debug!(
        parallel = plan.parallel.len(),
        has_merge = plan.merge.is_some(),
        dominant_db = %plan.dominant_db,
        "analysis complete"
    );
    Ok(AnalyzedQuery {
        plan,
        context: ctx,
        proxy_order_by,
    })
}

#[cfg(test)]
mod tests;
