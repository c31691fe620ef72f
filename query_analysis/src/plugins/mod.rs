//! The fixed plugin sequence.
//!
//! Each plugin has a logical hook (over the parsed statement) and a
//! physical hook (over the [`Plan`]); most implement only one of the two.

mod aggregate;
mod clauses;
mod dupl_select_expr;
mod table;
mod where_restrictor;

pub(crate) use aggregate::AggregatePlugin;
pub(crate) use clauses::{GroupByPlugin, LimitPlugin, OrderByPlugin};
pub(crate) use dupl_select_expr::DuplSelectExprPlugin;
pub(crate) use table::TablePlugin;
pub(crate) use where_restrictor::WhereRestrictorPlugin;
