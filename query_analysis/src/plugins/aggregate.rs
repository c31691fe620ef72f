//! Splitting aggregates into worker-side partials and a czar-side
//! reassembly.

use crate::context::QueryContext;
use crate::plan::{passthrough_expr, Plan};
use crate::{Error, Result};
use query_ir::{BinOp, BoolTerm, ColumnRef, FuncExpr, SelectStmt, ValueExpr, ValueFactor};

/// Rewrites every aggregate call in the select list (and HAVING) into
/// parallel-safe partials computed at the workers and a merge expression
/// reassembling them at the czar. Each generated partial carries a
/// globally unique `QS<N>_<OP>` alias.
#[derive(Debug)]
pub(crate) struct AggregatePlugin;

impl AggregatePlugin {
    pub(crate) fn apply_physical(&self, plan: &mut Plan, _ctx: &mut QueryContext) -> Result<()> {
        // HAVING implies aggregation; the front-end rejects it otherwise.
        let first = &plan.parallel[0];
        if !first.has_aggregate() && first.having().is_none() {
            return Ok(());
        }

        let mut mapper = AggregateMapper::default();
        let mut parallel_select: Vec<ValueExpr> = vec![];
        let mut merge_select: Vec<ValueExpr> = vec![];

        for expr in first.select_list() {
            if !expr.has_aggregate() {
                parallel_select.push(expr.clone());
                merge_select.push(passthrough_expr(expr));
                continue;
            }
            let mut merge_expr = mapper.split(expr, &mut parallel_select)?;
            match expr.alias() {
                Some(alias) => merge_expr.set_alias(alias),
                None => merge_expr.set_alias(expr.sql_fragment()),
            }
            merge_select.push(merge_expr);
        }

        // HAVING applies to reassembled group values, so it can only run at
        // the merge; any aggregate it uses must have its partials shipped.
        let merge_having = match first.having().cloned() {
            None => None,
            Some(mut tree) => {
                mapper.rewrite_bool_term(&mut tree, &mut parallel_select)?;
                Some(tree)
            }
        };

        let mut merge = SelectStmt::new();
        merge.distinct = first.distinct;
        *merge.select_list_mut() = merge_select;
        *merge.having_mut() = merge_having;
        plan.merge = Some(merge);

        for stmt in &mut plan.parallel {
            *stmt.select_list_mut() = parallel_select.clone();
            *stmt.having_mut() = None;
        }
        Ok(())
    }
}

// One aggregate's merge-side rendering: a short factor sequence (two
// factors joined by `/` for AVG, one factor otherwise).
type MergeUnit = Vec<(ValueFactor, BinOp)>;

#[derive(Debug, Default)]
struct AggregateMapper {
    next_id: usize,
    memo: Vec<(FuncExpr, MergeUnit)>,
}

impl AggregateMapper {
    fn next_alias(&mut self, op: &str) -> String {
        self.next_id += 1;
        format!("QS{}_{}", self.next_id, op)
    }

    /// Split one aggregate-bearing expression; partials are appended to
    /// `parallel_out` and the merge-side expression is returned
    /// (un-aliased).
    fn split(
        &mut self,
        expr: &ValueExpr,
        parallel_out: &mut Vec<ValueExpr>,
    ) -> Result<ValueExpr> {
        let mut merge = ValueExpr::new();
        for fo in expr.factor_ops() {
            match &fo.factor {
                ValueFactor::Const(c) => merge.add_value_factor(ValueFactor::Const(c.clone())),
                ValueFactor::AggFunc(f) => self.push_aggregate(f, &mut merge, parallel_out)?,
                _ => {
                    return Err(Error::UnsupportedFeature {
                        reason: format!(
                            "non-aggregate operand mixed with aggregates in '{}'",
                            expr.sql_fragment()
                        ),
                    })
                }
            }
            if fo.op != BinOp::None {
                merge
                    .add_op(fo.op)
                    .expect("factor appended before operator");
            }
        }
        Ok(merge)
    }

    fn push_aggregate(
        &mut self,
        func: &FuncExpr,
        merge: &mut ValueExpr,
        parallel_out: &mut Vec<ValueExpr>,
    ) -> Result<()> {
        if let Some((_, unit)) = self.memo.iter().find(|(f, _)| f == func) {
            append_unit(merge, unit);
            return Ok(());
        }

        let unit: MergeUnit = if func.name_is("COUNT") {
            let alias = self.next_alias("COUNT");
            push_partial(parallel_out, ValueFactor::AggFunc(func.clone()), &alias);
            vec![(sum_of(&alias), BinOp::None)]
        } else if func.name_is("SUM") {
            let alias = self.next_alias("SUM");
            push_partial(parallel_out, ValueFactor::AggFunc(func.clone()), &alias);
            vec![(sum_of(&alias), BinOp::None)]
        } else if func.name_is("MIN") {
            let alias = self.next_alias("MIN");
            push_partial(parallel_out, ValueFactor::AggFunc(func.clone()), &alias);
            vec![(agg_of("MIN", &alias), BinOp::None)]
        } else if func.name_is("MAX") {
            let alias = self.next_alias("MAX");
            push_partial(parallel_out, ValueFactor::AggFunc(func.clone()), &alias);
            vec![(agg_of("MAX", &alias), BinOp::None)]
        } else if func.name_is("AVG") {
            // AVG(x) -> COUNT(x), SUM(x) at workers; SUM/SUM at the merge.
            let count_alias = self.next_alias("COUNT");
            push_partial(
                parallel_out,
                ValueFactor::AggFunc(FuncExpr::new_like(func, "COUNT")),
                &count_alias,
            );
            let sum_alias = self.next_alias("SUM");
            push_partial(
                parallel_out,
                ValueFactor::AggFunc(FuncExpr::new_like(func, "SUM")),
                &sum_alias,
            );
            vec![
                (sum_of(&sum_alias), BinOp::Divide),
                (sum_of(&count_alias), BinOp::None),
            ]
        } else {
            return Err(Error::UnsupportedFeature {
                reason: format!("aggregate function {} cannot be split", func.name()),
            });
        };

        append_unit(merge, &unit);
        self.memo.push((func.clone(), unit));
        Ok(())
    }

    /// Rewrite aggregate calls inside a boolean tree (HAVING) to their
    /// merge-side form.
    fn rewrite_bool_term(
        &mut self,
        tree: &mut BoolTerm,
        parallel_out: &mut Vec<ValueExpr>,
    ) -> Result<()> {
        let mut first_error = None;
        tree.for_each_value_expr_mut(&mut |ve| {
            if !ve.has_aggregate() {
                return;
            }
            match self.split(ve, parallel_out) {
                Ok(merge_expr) => *ve = merge_expr,
                Err(e) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        });
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn push_partial(parallel_out: &mut Vec<ValueExpr>, factor: ValueFactor, alias: &str) {
    let mut expr = ValueExpr::from_factor(factor);
    expr.set_alias(alias);
    parallel_out.push(expr);
}

fn sum_of(column: &str) -> ValueFactor {
    agg_of("SUM", column)
}

fn agg_of(name: &str, column: &str) -> ValueFactor {
    ValueFactor::AggFunc(FuncExpr::new(
        name,
        vec![ValueExpr::from_factor(ValueFactor::ColumnRef(
            ColumnRef::new("", "", column),
        ))],
    ))
}

fn append_unit(merge: &mut ValueExpr, unit: &MergeUnit) {
    for (factor, op) in unit {
        merge.add_value_factor(factor.clone());
        if *op != BinOp::None {
            merge.add_op(*op).expect("factor appended before operator");
        }
    }
}
