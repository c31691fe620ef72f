//! Statement-level adapters: query, select, FROM list.

use crate::expr::{adapt_bool_term, adapt_value_expr, ident_raw};
use crate::restrictor;
use crate::{unhandled, unsupported, Result};
use query_ir::{
    JoinRef, JoinSpec, JoinType, OrderByTerm, OrderDirection, SelectStmt, TableRef, ValueExpr,
    ValueFactor, WhereClause,
};
use sqlparser::ast as grammar;

pub(crate) fn adapt_query(query: grammar::Query) -> Result<SelectStmt> {
    if query.with.is_some() {
        return Err(unsupported("WITH clauses", &query));
    }
    if query.offset.is_some() {
        return Err(unsupported("OFFSET", &query));
    }
    if query.fetch.is_some() {
        return Err(unsupported("FETCH", &query));
    }

    let limit = match &query.limit {
        None => None,
        Some(grammar::Expr::Value(grammar::Value::Number(n, _))) => {
            Some(n.parse::<i64>().map_err(|_| {
                unsupported("LIMIT must be an integer literal", n)
            })?)
        }
        Some(grammar::Expr::UnaryOp {
            op: grammar::UnaryOperator::Minus,
            expr,
        }) => match expr.as_ref() {
            grammar::Expr::Value(grammar::Value::Number(n, _)) => {
                Some(n.parse::<i64>().map(|v| -v).map_err(|_| {
                    unsupported("LIMIT must be an integer literal", n)
                })?)
            }
            other => return Err(unsupported("non-literal LIMIT", other)),
        },
        Some(other) => return Err(unsupported("non-literal LIMIT", other)),
    };

    let select = match *query.body {
        grammar::SetExpr::Select(select) => *select,
        grammar::SetExpr::SetOperation { .. } => {
            return Err(unsupported("set operations (UNION/EXCEPT/INTERSECT)", ""))
        }
        grammar::SetExpr::Query(_) => return Err(unsupported("nested queries", "")),
        other => return Err(unhandled(format!("query body {}", other))),
    };

    let mut stmt = adapt_select(select)?;

    if !query.order_by.is_empty() {
        let mut terms = vec![];
        for ob in &query.order_by {
            if ob.nulls_first.is_some() {
                return Err(unsupported("NULLS FIRST/LAST ordering", &ob.expr));
            }
            terms.push(OrderByTerm {
                expr: adapt_value_expr(&ob.expr)?,
                direction: ob.asc.map(|asc| {
                    if asc {
                        OrderDirection::Asc
                    } else {
                        OrderDirection::Desc
                    }
                }),
            });
        }
        *stmt.order_by_mut() = Some(terms);
    }

    stmt.set_limit(limit);
    Ok(stmt)
}

fn adapt_select(select: grammar::Select) -> Result<SelectStmt> {
    if !select.lateral_views.is_empty() {
        return Err(unsupported("LATERAL VIEW", ""));
    }
    if !select.cluster_by.is_empty() || !select.distribute_by.is_empty() || !select.sort_by.is_empty()
    {
        return Err(unsupported("CLUSTER/DISTRIBUTE/SORT BY", ""));
    }

    let mut stmt = SelectStmt::new();
    stmt.distinct = select.distinct;

    for item in &select.projection {
        stmt.select_list_mut().push(adapt_select_item(item)?);
    }
    if stmt.select_list().is_empty() {
        return Err(unsupported("empty select list", ""));
    }

    for twj in &select.from {
        stmt.from_list_mut().push(adapt_table_with_joins(twj)?);
    }
    if stmt.from_list().is_empty() {
        return Err(unsupported("SELECT without FROM", ""));
    }

    if let Some(selection) = &select.selection {
        let (restrictors, tree) = restrictor::extract(selection)?;
        *stmt.where_clause_mut() = Some(WhereClause { restrictors, tree });
    }

    if !select.group_by.is_empty() {
        let mut group_by = vec![];
        for e in &select.group_by {
            group_by.push(adapt_value_expr(e)?);
        }
        *stmt.group_by_mut() = Some(group_by);
    }

    if let Some(having) = &select.having {
        if !stmt.has_aggregate() {
            return Err(unsupported("HAVING without aggregation", having));
        }
        *stmt.having_mut() = Some(adapt_bool_term(having)?);
    }

    Ok(stmt)
}

fn adapt_select_item(item: &grammar::SelectItem) -> Result<ValueExpr> {
    match item {
        grammar::SelectItem::UnnamedExpr(e) => adapt_value_expr(e),
        grammar::SelectItem::ExprWithAlias { expr, alias } => {
            let mut ve = adapt_value_expr(expr)?;
            ve.set_alias(&alias.value);
            Ok(ve)
        }
        grammar::SelectItem::Wildcard => {
            Ok(ValueExpr::from_factor(ValueFactor::Star(String::new())))
        }
        grammar::SelectItem::QualifiedWildcard(name) => Ok(ValueExpr::from_factor(
            ValueFactor::Star(name.0.iter().map(|i| i.value.clone()).collect::<Vec<_>>().join(".")),
        )),
    }
}

fn adapt_table_with_joins(twj: &grammar::TableWithJoins) -> Result<TableRef> {
    let mut table = adapt_table_factor(&twj.relation)?;
    for join in &twj.joins {
        let right = adapt_table_factor(&join.relation)?;
        let (join_type, constraint) = match &join.join_operator {
            grammar::JoinOperator::Inner(c) => (JoinType::Inner, c),
            grammar::JoinOperator::LeftOuter(c) => (JoinType::Left, c),
            grammar::JoinOperator::RightOuter(c) => (JoinType::Right, c),
            grammar::JoinOperator::FullOuter(_) => {
                return Err(unsupported("FULL OUTER JOIN", &join.relation))
            }
            grammar::JoinOperator::CrossJoin => {
                return Err(unsupported("CROSS JOIN", &join.relation))
            }
            other => return Err(unhandled(format!("join operator {:?}", other))),
        };
        let spec = adapt_join_constraint(constraint)?;
        table.add_join(JoinRef {
            join_type,
            right,
            spec,
        });
    }
    Ok(table)
}

fn adapt_join_constraint(constraint: &grammar::JoinConstraint) -> Result<Option<JoinSpec>> {
    match constraint {
        grammar::JoinConstraint::On(e) => Ok(Some(JoinSpec::On(adapt_bool_term(e)?))),
        grammar::JoinConstraint::Using(idents) => match idents.as_slice() {
            [single] => Ok(Some(JoinSpec::Using(query_ir::ColumnRef::new(
                "",
                "",
                ident_raw(single),
            )))),
            _ => Err(unsupported("USING with more than one column", "")),
        },
        grammar::JoinConstraint::Natural => Err(unsupported("NATURAL JOIN", "")),
        grammar::JoinConstraint::None => Ok(None),
    }
}

fn adapt_table_factor(factor: &grammar::TableFactor) -> Result<TableRef> {
    match factor {
        grammar::TableFactor::Table { name, alias, .. } => {
            let parts: Vec<_> = name.0.iter().map(ident_raw).collect();
            let (db, table) = match parts.as_slice() {
                [table] => (String::new(), table.clone()),
                [db, table] => (db.clone(), table.clone()),
                _ => return Err(unsupported("table name with too many parts", factor)),
            };
            let alias = match alias {
                None => String::new(),
                Some(a) if a.columns.is_empty() => a.name.value.clone(),
                Some(_) => return Err(unsupported("column aliases on tables", factor)),
            };
            Ok(TableRef::new(db, table, alias))
        }
        grammar::TableFactor::Derived { .. } => {
            Err(unsupported("sub-queries in the FROM clause", factor))
        }
        grammar::TableFactor::NestedJoin(_) => {
            Err(unsupported("parenthesized join groups", factor))
        }
        other => Err(unhandled(format!("table factor {}", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_select;

    #[test]
    fn star_select_items() {
        let stmt = parse_select("SELECT * FROM Object").unwrap();
        assert!(stmt.select_list()[0].is_star());

        let stmt = parse_select("SELECT o.* FROM Object o").unwrap();
        assert_eq!(stmt.generate(), "SELECT o.* FROM Object AS o");
    }

    #[test]
    fn table_with_db_and_alias() {
        let stmt = parse_select("SELECT x FROM LSST.Object AS obj").unwrap();
        let table = &stmt.from_list()[0];
        assert_eq!(table.db(), "LSST");
        assert_eq!(table.table(), "Object");
        assert_eq!(table.alias(), "obj");
    }

    #[test]
    fn left_join_on() {
        let stmt = parse_select(
            "SELECT o.ra FROM Object o LEFT JOIN Source s ON o.objectId = s.objectId",
        )
        .unwrap();
        assert_eq!(
            stmt.generate(),
            "SELECT o.ra FROM Object AS o LEFT JOIN Source AS s ON o.objectId = s.objectId"
        );
    }

    #[test]
    fn limit_must_be_literal() {
        assert!(parse_select("SELECT a FROM T LIMIT 10").is_ok());
        assert!(parse_select("SELECT a FROM T LIMIT 2, 10").is_err());
    }
}
