//! Secondary-index restrictor extraction from the WHERE clause.

use crate::context::QueryContext;
use crate::plan::Plan;
use crate::Result;
use observability_deps::tracing::debug;
use query_ir::{BfTerm, BoolFactor, BoolTerm, CompOp, Restrictor, ValueExpr};

/// Finds `IN` / `=` predicates on the director key column and records an
/// `sIndex` restrictor, so the dispatch set shrinks to the chunks owning
/// the listed key values.
#[derive(Debug)]
pub(crate) struct WhereRestrictorPlugin;

impl WhereRestrictorPlugin {
    pub(crate) fn apply_physical(&self, plan: &mut Plan, ctx: &mut QueryContext) -> Result<()> {
        let tree = match plan.parallel[0]
            .where_clause()
            .and_then(|wc| wc.tree.as_ref())
        {
            Some(tree) => tree,
            None => return Ok(()),
        };

        let mut found = vec![];
        for factor in top_level_factors(tree) {
            for term in &factor.terms {
                if let Some(restrictor) = sindex_restrictor(term, ctx) {
                    found.push(restrictor);
                }
            }
        }
        for restrictor in found {
            debug!(name = %restrictor.name, params = ?restrictor.params, "index restrictor");
            ctx.restrictors.push(restrictor);
        }
        Ok(())
    }
}

// Only predicates that must hold for every returned row can prune chunks,
// so look at top-level AND terms exclusively.
fn top_level_factors(tree: &BoolTerm) -> Vec<&BoolFactor> {
    match tree {
        BoolTerm::Factor(f) => vec![f],
        BoolTerm::And(terms) => terms
            .iter()
            .filter_map(|t| match t {
                BoolTerm::Factor(f) => Some(f),
                _ => None,
            })
            .collect(),
        _ => vec![],
    }
}

fn sindex_restrictor(term: &BfTerm, ctx: &QueryContext) -> Option<Restrictor> {
    let (value, literals) = match term {
        BfTerm::In {
            value,
            candidates,
            negated: false,
        } => {
            let mut literals = vec![];
            for c in candidates {
                literals.push(c.as_literal()?.to_string());
            }
            (value, literals)
        }
        BfTerm::Comp {
            left,
            op: CompOp::Eq,
            right,
        } => (left, vec![right.as_literal()?.to_string()]),
        _ => return None,
    };

    let (db, table) = resolve_table(value, ctx)?;
    let column = value.column_ref()?.column().to_string();
    let css = ctx.css();
    if css.director_table(&db).ok()? != table || css.director_column(&db).ok()? != column {
        return None;
    }

    let mut params = vec![db, table, column];
    params.extend(literals);
    Some(Restrictor {
        name: "sIndex".to_string(),
        params,
    })
}

// The (db, table) a patched column reference points at, via its alias.
fn resolve_table(value: &ValueExpr, ctx: &QueryContext) -> Option<(String, String)> {
    let cr = value.column_ref()?;
    if cr.table().is_empty() {
        return None;
    }
    let (db, table) = ctx.table_aliases.get_by_alias(cr.table())?;
    Some((db.to_string(), table.to_string()))
}
