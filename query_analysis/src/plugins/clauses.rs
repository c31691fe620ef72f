//! GROUP BY, ORDER BY and LIMIT rewrites.

use crate::context::QueryContext;
use crate::plan::Plan;
use crate::{Error, Result};

/// Keeps GROUP BY on the workers for partial grouping and repeats it on
/// the merge so groups split across chunks are folded back together.
#[derive(Debug)]
pub(crate) struct GroupByPlugin;

impl GroupByPlugin {
    pub(crate) fn apply_physical(&self, plan: &mut Plan, _ctx: &mut QueryContext) -> Result<()> {
        if plan.parallel[0].distinct {
            // per-chunk DISTINCT leaves cross-chunk duplicates; the merge
            // pass removes them
            plan.ensure_merge();
        }

        let group_by = match plan.parallel[0].group_by() {
            Some(group_by) => group_by.to_vec(),
            None => return Ok(()),
        };
        for expr in &group_by {
            if expr.alias().is_none() {
                return Err(Error::UnsupportedFeature {
                    reason: format!(
                        "GROUP BY expression '{}' must appear in the select list",
                        expr.sql_fragment()
                    ),
                });
            }
        }
        let merge = plan.ensure_merge();
        *merge.group_by_mut() = Some(group_by);
        Ok(())
    }
}

/// Strips ORDER BY from the plans; ordering is the proxy's job after the
/// merge. The one exception is a top-k query (LIMIT without GROUP BY),
/// where per-chunk ordering keeps the worker-side LIMIT correct.
#[derive(Debug)]
pub(crate) struct OrderByPlugin;

impl OrderByPlugin {
    pub(crate) fn apply_physical(&self, plan: &mut Plan, _ctx: &mut QueryContext) -> Result<()> {
        let keep_on_parallel =
            plan.parallel[0].limit().is_some() && !plan.parallel[0].has_group_by();
        if !keep_on_parallel {
            for stmt in &mut plan.parallel {
                *stmt.order_by_mut() = None;
            }
        }
        if let Some(merge) = &mut plan.merge {
            *merge.order_by_mut() = None;
        }
        Ok(())
    }
}

/// Clamps LIMIT to non-negative and applies it to both sides, except that
/// with GROUP BY present the worker-side LIMIT would truncate groups, so
/// only the merge keeps it.
#[derive(Debug)]
pub(crate) struct LimitPlugin;

impl LimitPlugin {
    pub(crate) fn apply_physical(&self, plan: &mut Plan, _ctx: &mut QueryContext) -> Result<()> {
        let limit = match plan.parallel[0].limit() {
            Some(limit) => limit.max(0),
            None => return Ok(()),
        };
        let has_group_by = plan.parallel[0].has_group_by();
        for stmt in &mut plan.parallel {
            stmt.set_limit(if has_group_by { None } else { Some(limit) });
        }
        plan.ensure_merge().set_limit(Some(limit));
        Ok(())
    }
}
