//! Adapters for value and boolean expression nodes.

use crate::restrictor::is_areaspec_function;
use crate::{unhandled, unsupported, Result};
use query_ir::{
    BfTerm, BinOp, BoolTerm, ColumnRef, CompOp, FuncExpr, ValueExpr, ValueFactor,
};
use sqlparser::ast as grammar;

// Aggregate calls the planner knows how to split across workers.
const AGGREGATE_NAMES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

pub(crate) fn ident_raw(ident: &grammar::Ident) -> String {
    match ident.quote_style {
        Some(_) => format!("`{}`", ident.value),
        None => ident.value.clone(),
    }
}

fn object_name_raw(name: &grammar::ObjectName) -> Vec<String> {
    name.0.iter().map(ident_raw).collect()
}

fn render_value(value: &grammar::Value) -> Result<String> {
    match value {
        grammar::Value::Number(n, _) => Ok(n.clone()),
        grammar::Value::SingleQuotedString(s) | grammar::Value::DoubleQuotedString(s) => {
            Ok(format!("'{}'", s))
        }
        grammar::Value::Boolean(b) => Ok(if *b { "TRUE" } else { "FALSE" }.to_string()),
        grammar::Value::Null => Ok("NULL".to_string()),
        other => Err(unhandled(format!("literal {}", other))),
    }
}

fn arith_op(op: &grammar::BinaryOperator) -> Option<BinOp> {
    match op {
        grammar::BinaryOperator::Plus => Some(BinOp::Plus),
        grammar::BinaryOperator::Minus => Some(BinOp::Minus),
        grammar::BinaryOperator::Multiply => Some(BinOp::Multiply),
        grammar::BinaryOperator::Divide => Some(BinOp::Divide),
        grammar::BinaryOperator::Modulo => Some(BinOp::Modulo),
        grammar::BinaryOperator::BitwiseAnd => Some(BinOp::BitAnd),
        grammar::BinaryOperator::BitwiseOr => Some(BinOp::BitOr),
        grammar::BinaryOperator::BitwiseXor => Some(BinOp::BitXor),
        _ => None,
    }
}

fn comp_op(op: &grammar::BinaryOperator) -> Option<CompOp> {
    match op {
        grammar::BinaryOperator::Eq => Some(CompOp::Eq),
        grammar::BinaryOperator::NotEq => Some(CompOp::NotEq),
        grammar::BinaryOperator::Lt => Some(CompOp::Lt),
        grammar::BinaryOperator::LtEq => Some(CompOp::LtEq),
        grammar::BinaryOperator::Gt => Some(CompOp::Gt),
        grammar::BinaryOperator::GtEq => Some(CompOp::GtEq),
        grammar::BinaryOperator::Spaceship => Some(CompOp::NullSafeEq),
        _ => None,
    }
}

/// Adapt a grammar expression into a [`ValueExpr`].
pub(crate) fn adapt_value_expr(expr: &grammar::Expr) -> Result<ValueExpr> {
    let mut out = ValueExpr::new();
    append_value_expr(expr, &mut out)?;
    Ok(out)
}

// Flatten the left-associative arithmetic tree into the IR's
// `factor (op factor)*` sequence.
fn append_value_expr(expr: &grammar::Expr, out: &mut ValueExpr) -> Result<()> {
    match expr {
        grammar::Expr::BinaryOp { left, op, right } if arith_op(op).is_some() => {
            append_value_expr(left, out)?;
            out.add_op(arith_op(op).expect("checked arithmetic op"))
                .map_err(|_| unsupported("operator without operand", expr))?;
            append_value_expr(right, out)?;
            Ok(())
        }
        _ => {
            out.add_value_factor(adapt_value_factor(expr)?);
            Ok(())
        }
    }
}

fn adapt_value_factor(expr: &grammar::Expr) -> Result<ValueFactor> {
    match expr {
        grammar::Expr::Identifier(ident) => Ok(ValueFactor::ColumnRef(ColumnRef::new(
            "",
            "",
            ident_raw(ident),
        ))),
        grammar::Expr::CompoundIdentifier(idents) => {
            let parts: Vec<_> = idents.iter().map(ident_raw).collect();
            match parts.as_slice() {
                [table, column] => Ok(ValueFactor::ColumnRef(ColumnRef::new(
                    "",
                    table.as_str(),
                    column.as_str(),
                ))),
                [db, table, column] => Ok(ValueFactor::ColumnRef(ColumnRef::new(
                    db.as_str(),
                    table.as_str(),
                    column.as_str(),
                ))),
                _ => Err(unsupported("column reference with too many parts", expr)),
            }
        }
        grammar::Expr::Value(value) => Ok(ValueFactor::Const(render_value(value)?)),
        grammar::Expr::UnaryOp {
            op: grammar::UnaryOperator::Minus,
            expr: inner,
        } => match inner.as_ref() {
            grammar::Expr::Value(value) => {
                Ok(ValueFactor::Const(format!("-{}", render_value(value)?)))
            }
            _ => Err(unsupported("unary minus on a non-literal", expr)),
        },
        grammar::Expr::Function(function) => adapt_function(function),
        grammar::Expr::Nested(inner) => {
            Ok(ValueFactor::Expr(Box::new(adapt_value_expr(inner)?)))
        }
        grammar::Expr::Subquery(_) | grammar::Expr::Exists { .. } => {
            Err(unsupported("sub-queries in value position", expr))
        }
        other => Err(unhandled(format!("value expression {}", other))),
    }
}

pub(crate) fn adapt_function(function: &grammar::Function) -> Result<ValueFactor> {
    if function.over.is_some() {
        return Err(unsupported("window functions", function));
    }
    if function.distinct {
        return Err(unsupported("DISTINCT inside aggregate calls", function));
    }
    let name_parts = object_name_raw(&function.name);
    let name = match name_parts.as_slice() {
        [single] => single.clone(),
        _ => return Err(unsupported("qualified function names", function)),
    };

    let mut params = vec![];
    for arg in &function.args {
        match arg {
            grammar::FunctionArg::Unnamed(grammar::FunctionArgExpr::Expr(e)) => {
                params.push(adapt_value_expr(e)?)
            }
            grammar::FunctionArg::Unnamed(grammar::FunctionArgExpr::Wildcard) => {
                params.push(ValueExpr::from_factor(ValueFactor::Star(String::new())))
            }
            grammar::FunctionArg::Unnamed(grammar::FunctionArgExpr::QualifiedWildcard(t)) => {
                params.push(ValueExpr::from_factor(ValueFactor::Star(
                    object_name_raw(t).join("."),
                )))
            }
            grammar::FunctionArg::Named { .. } => {
                return Err(unsupported("named function arguments", function))
            }
        }
    }

    let func = FuncExpr::new(name, params);
    if AGGREGATE_NAMES
        .iter()
        .any(|agg| func.name_is(agg))
    {
        Ok(ValueFactor::AggFunc(func))
    } else {
        Ok(ValueFactor::Function(func))
    }
}

/// Adapt a grammar expression in boolean position into a [`BoolTerm`].
pub(crate) fn adapt_bool_term(expr: &grammar::Expr) -> Result<BoolTerm> {
    match expr {
        grammar::Expr::BinaryOp {
            left,
            op: grammar::BinaryOperator::And,
            right,
        } => Ok(BoolTerm::And(vec![
            adapt_bool_term(left)?,
            adapt_bool_term(right)?,
        ])
        .reduced()),
        grammar::Expr::BinaryOp {
            left,
            op: grammar::BinaryOperator::Or,
            right,
        } => Ok(BoolTerm::Or(vec![
            adapt_bool_term(left)?,
            adapt_bool_term(right)?,
        ])
        .reduced()),
        grammar::Expr::BinaryOp { left, op, right } if comp_op(op).is_some() => {
            Ok(BoolTerm::from_bf_term(BfTerm::Comp {
                left: adapt_value_expr(left)?,
                op: comp_op(op).expect("checked comparison op"),
                right: adapt_value_expr(right)?,
            }))
        }
        grammar::Expr::BinaryOp {
            left,
            op: grammar::BinaryOperator::Like,
            right,
        } => Ok(BoolTerm::from_bf_term(BfTerm::Like {
            value: adapt_value_expr(left)?,
            pattern: adapt_value_expr(right)?,
            negated: false,
        })),
        grammar::Expr::BinaryOp {
            left,
            op: grammar::BinaryOperator::NotLike,
            right,
        } => Ok(BoolTerm::from_bf_term(BfTerm::Like {
            value: adapt_value_expr(left)?,
            pattern: adapt_value_expr(right)?,
            negated: true,
        })),
        grammar::Expr::Between {
            expr: value,
            negated,
            low,
            high,
        } => Ok(BoolTerm::from_bf_term(BfTerm::Between {
            value: adapt_value_expr(value)?,
            min: adapt_value_expr(low)?,
            max: adapt_value_expr(high)?,
            negated: *negated,
        })),
        grammar::Expr::InList {
            expr: value,
            list,
            negated,
        } => {
            let mut candidates = vec![];
            for item in list {
                candidates.push(adapt_value_expr(item)?);
            }
            Ok(BoolTerm::from_bf_term(BfTerm::In {
                value: adapt_value_expr(value)?,
                candidates,
                negated: *negated,
            }))
        }
        grammar::Expr::IsNull(value) => Ok(BoolTerm::from_bf_term(BfTerm::Null {
            value: adapt_value_expr(value)?,
            negated: false,
        })),
        grammar::Expr::IsNotNull(value) => Ok(BoolTerm::from_bf_term(BfTerm::Null {
            value: adapt_value_expr(value)?,
            negated: true,
        })),
        grammar::Expr::Nested(inner) => Ok(BoolTerm::from_bf_term(BfTerm::BoolTermFactor(
            Box::new(adapt_bool_term(inner)?),
        ))),
        grammar::Expr::InSubquery { .. } | grammar::Expr::Subquery(_) | grammar::Expr::Exists { .. } => {
            Err(unsupported("sub-queries as predicates", expr))
        }
        grammar::Expr::Function(function) if is_areaspec_function(&function.name) => Err(
            unsupported("spatial restrictors must be top-level AND terms", expr),
        ),
        other => Err(unhandled(format!("boolean expression {}", other))),
    }
}
