//! Detection of spatial restrictor functions in WHERE clauses.

use crate::expr::{adapt_bool_term, adapt_value_expr};
use crate::{unsupported, Result};
use query_ir::{BoolTerm, Restrictor};
use sqlparser::ast as grammar;

// Restrictor pseudo-functions understood by the chunk mapper. They never
// reach the workers as SQL.
const AREASPEC_FUNCTIONS: &[&str] = &[
    "qserv_areaspec_box",
    "qserv_areaspec_circle",
    "qserv_areaspec_ellipse",
    "qserv_areaspec_poly",
    "qserv_areaspec_hull",
];

pub(crate) fn is_areaspec_function(name: &grammar::ObjectName) -> bool {
    match name.0.as_slice() {
        [single] => AREASPEC_FUNCTIONS
            .iter()
            .any(|f| single.value.eq_ignore_ascii_case(f)),
        _ => false,
    }
}

fn adapt_restrictor(function: &grammar::Function) -> Result<Restrictor> {
    let name = function.name.0[0].value.to_ascii_lowercase();
    let mut params = vec![];
    for arg in &function.args {
        let literal = match arg {
            grammar::FunctionArg::Unnamed(grammar::FunctionArgExpr::Expr(e)) => {
                adapt_value_expr(e)?.as_literal().map(str::to_string)
            }
            _ => None,
        };
        match literal {
            Some(value) => params.push(value),
            None => {
                return Err(unsupported(
                    "restrictor arguments must be literal values",
                    function,
                ))
            }
        }
    }
    Ok(Restrictor { name, params })
}

// Walk the top-level AND chain of the selection.
fn collect_conjuncts(expr: &grammar::Expr, out: &mut Vec<grammar::Expr>) {
    match expr {
        grammar::Expr::BinaryOp {
            left,
            op: grammar::BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other.clone()),
    }
}

/// Split a WHERE selection into extracted restrictors and the remaining
/// boolean tree.
///
/// Restrictor functions are recognized only as top-level AND terms; anywhere
/// deeper they are rejected by the boolean adapter.
pub(crate) fn extract(selection: &grammar::Expr) -> Result<(Vec<Restrictor>, Option<BoolTerm>)> {
    let mut conjuncts = vec![];
    collect_conjuncts(selection, &mut conjuncts);

    let mut restrictors = vec![];
    let mut terms = vec![];
    for conjunct in &conjuncts {
        match conjunct {
            grammar::Expr::Function(function) if is_areaspec_function(&function.name) => {
                restrictors.push(adapt_restrictor(function)?)
            }
            other => terms.push(adapt_bool_term(other)?),
        }
    }

    let tree = if terms.is_empty() {
        None
    } else {
        Some(BoolTerm::And(terms).reduced())
    };
    Ok((restrictors, tree))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlparser::dialect::MySqlDialect;
    use sqlparser::parser::Parser;

    fn parse_selection(text: &str) -> grammar::Expr {
        let sql = format!("SELECT 1 FROM t WHERE {}", text);
        let mut stmts = Parser::parse_sql(&MySqlDialect {}, &sql).unwrap();
        match stmts.pop().unwrap() {
            grammar::Statement::Query(q) => match q.body {
                grammar::SetExpr::Select(s) => s.selection.unwrap(),
                _ => panic!("not a select"),
            },
            _ => panic!("not a query"),
        }
    }

    #[test]
    fn extracts_multiple_restrictors() {
        let selection =
            parse_selection("qserv_areaspec_box(0, 0, 1, 1) AND QSERV_AREASPEC_CIRCLE(5, 5, 2)");
        let (restrictors, tree) = extract(&selection).unwrap();
        assert_eq!(restrictors.len(), 2);
        assert_eq!(restrictors[0].name, "qserv_areaspec_box");
        assert_eq!(restrictors[1].name, "qserv_areaspec_circle");
        assert!(tree.is_none());
    }

    #[test]
    fn keeps_residual_condition() {
        let selection = parse_selection("qserv_areaspec_box(0, 0, 1, 1) AND ra > 1 AND decl < 2");
        let (restrictors, tree) = extract(&selection).unwrap();
        assert_eq!(restrictors.len(), 1);
        assert_eq!(tree.unwrap().sql_fragment(), "ra > 1 AND decl < 2");
    }

    #[test]
    fn rejects_non_literal_restrictor_args() {
        let selection = parse_selection("qserv_areaspec_box(ra, 0, 1, 1)");
        assert!(extract(&selection).is_err());
    }

    #[test]
    fn rejects_restrictor_under_or() {
        let selection = parse_selection("qserv_areaspec_box(0, 0, 1, 1) OR ra > 1");
        assert!(extract(&selection).is_err());
    }
}
