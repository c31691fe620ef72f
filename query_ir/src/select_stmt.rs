//! The SELECT statement root node.

use crate::bool_term::BoolTerm;
use crate::query_template::QueryTemplate;
use crate::table_ref::TableRef;
use crate::value_expr::ValueExpr;

/// Sort direction of an [`OrderByTerm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    /// `ASC`
    Asc,
    /// `DESC`
    Desc,
}

/// One term of an ORDER BY clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderByTerm {
    /// The sorted expression.
    pub expr: ValueExpr,
    /// Explicit direction, if one was written.
    pub direction: Option<OrderDirection>,
}

impl OrderByTerm {
    fn render_to(&self, qt: &mut QueryTemplate) {
        let mut inner = QueryTemplate::new();
        self.expr.render_alias_or_expr(&mut inner);
        if let Some(direction) = self.direction {
            inner.append(match direction {
                OrderDirection::Asc => "ASC",
                OrderDirection::Desc => "DESC",
            });
        }
        qt.append(inner.into_sql());
    }
}

/// A restrictor extracted from the WHERE clause: a named hint that prunes
/// the set of chunks to dispatch (spatial area specs, secondary-index
/// lookups).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Restrictor {
    /// Restrictor kind, e.g. `qserv_areaspec_box` or `sIndex`.
    pub name: String,
    /// Positional string parameters.
    pub params: Vec<String>,
}

/// A WHERE clause: the boolean tree plus any extracted restrictors.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhereClause {
    /// Chunk-pruning restrictors; not rendered into SQL.
    pub restrictors: Vec<Restrictor>,
    /// The boolean condition, `None` when the clause consisted solely of
    /// restrictor functions.
    pub tree: Option<BoolTerm>,
}

impl WhereClause {
    /// True if there is neither a condition nor a restrictor.
    pub fn is_empty(&self) -> bool {
        self.restrictors.is_empty() && self.tree.is_none()
    }
}

/// A parsed (and progressively rewritten) SELECT statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectStmt {
    /// DISTINCT flag.
    pub distinct: bool,
    select_list: Vec<ValueExpr>,
    from_list: Vec<TableRef>,
    where_clause: Option<WhereClause>,
    group_by: Option<Vec<ValueExpr>>,
    having: Option<BoolTerm>,
    order_by: Option<Vec<OrderByTerm>>,
    limit: Option<i64>,
}

impl SelectStmt {
    /// An empty statement, populated by the parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// The SELECT list.
    pub fn select_list(&self) -> &[ValueExpr] {
        &self.select_list
    }

    /// Mutable SELECT list.
    pub fn select_list_mut(&mut self) -> &mut Vec<ValueExpr> {
        &mut self.select_list
    }

    /// The FROM list.
    pub fn from_list(&self) -> &[TableRef] {
        &self.from_list
    }

    /// Mutable FROM list.
    pub fn from_list_mut(&mut self) -> &mut Vec<TableRef> {
        &mut self.from_list
    }

    /// The WHERE clause, if present.
    pub fn where_clause(&self) -> Option<&WhereClause> {
        self.where_clause.as_ref()
    }

    /// Mutable WHERE clause.
    pub fn where_clause_mut(&mut self) -> &mut Option<WhereClause> {
        &mut self.where_clause
    }

    /// The GROUP BY expressions, if present.
    pub fn group_by(&self) -> Option<&[ValueExpr]> {
        self.group_by.as_deref()
    }

    /// Mutable GROUP BY expressions.
    pub fn group_by_mut(&mut self) -> &mut Option<Vec<ValueExpr>> {
        &mut self.group_by
    }

    /// The HAVING term, if present.
    pub fn having(&self) -> Option<&BoolTerm> {
        self.having.as_ref()
    }

    /// Mutable HAVING term.
    pub fn having_mut(&mut self) -> &mut Option<BoolTerm> {
        &mut self.having
    }

    /// The ORDER BY terms, if present.
    pub fn order_by(&self) -> Option<&[OrderByTerm]> {
        self.order_by.as_deref()
    }

    /// Mutable ORDER BY terms.
    pub fn order_by_mut(&mut self) -> &mut Option<Vec<OrderByTerm>> {
        &mut self.order_by
    }

    /// The LIMIT value, if present.
    pub fn limit(&self) -> Option<i64> {
        self.limit
    }

    /// Set or clear the LIMIT value.
    pub fn set_limit(&mut self, limit: Option<i64>) {
        self.limit = limit;
    }

    /// True if a GROUP BY clause is present.
    pub fn has_group_by(&self) -> bool {
        self.group_by.is_some()
    }

    /// True if an ORDER BY clause is present.
    pub fn has_order_by(&self) -> bool {
        self.order_by.is_some()
    }

    /// True if any select expression contains an aggregate call.
    pub fn has_aggregate(&self) -> bool {
        self.select_list.iter().any(|e| e.has_aggregate())
    }

    /// Replace the FROM list with the single bare table `name`.
    ///
    /// Used when pointing the merge statement at the accumulation table.
    pub fn set_from_list_as_table(&mut self, name: &str) {
        self.from_list = vec![TableRef::new("", name, "")];
    }

    /// Apply `f` to every value expression in the statement: select list,
    /// WHERE, GROUP BY, HAVING, ORDER BY, and join ON conditions.
    pub fn for_each_value_expr_mut(&mut self, f: &mut impl FnMut(&mut ValueExpr)) {
        for e in &mut self.select_list {
            f(e);
        }
        if let Some(wc) = &mut self.where_clause {
            if let Some(tree) = &mut wc.tree {
                tree.for_each_value_expr_mut(f);
            }
        }
        if let Some(group_by) = &mut self.group_by {
            for e in group_by {
                f(e);
            }
        }
        if let Some(having) = &mut self.having {
            having.for_each_value_expr_mut(f);
        }
        if let Some(order_by) = &mut self.order_by {
            for t in order_by {
                f(&mut t.expr);
            }
        }
        for table in &mut self.from_list {
            for join in table.joins_mut() {
                if let Some(crate::JoinSpec::On(term)) = &mut join.spec {
                    term.for_each_value_expr_mut(f);
                }
            }
        }
    }

    /// Render the full statement.
    pub fn render_to(&self, qt: &mut QueryTemplate) {
        qt.append("SELECT");
        if self.distinct {
            qt.append("DISTINCT");
        }
        let rendered: Vec<_> = self
            .select_list
            .iter()
            .map(|e| {
                let mut inner = QueryTemplate::new();
                e.render_with_alias(&mut inner);
                inner.into_sql()
            })
            .collect();
        qt.append(rendered.join(", "));

        if !self.from_list.is_empty() {
            qt.append("FROM");
            let rendered: Vec<_> = self
                .from_list
                .iter()
                .map(|t| {
                    let mut inner = QueryTemplate::new();
                    t.render_to(&mut inner);
                    inner.into_sql()
                })
                .collect();
            qt.append(rendered.join(", "));
        }

        if let Some(wc) = &self.where_clause {
            if let Some(tree) = &wc.tree {
                qt.append("WHERE");
                tree.render_to(qt);
            }
        }

        if let Some(group_by) = &self.group_by {
            qt.append("GROUP BY");
            let rendered: Vec<_> = group_by
                .iter()
                .map(|e| {
                    let mut inner = QueryTemplate::new();
                    e.render_alias_or_expr(&mut inner);
                    inner.into_sql()
                })
                .collect();
            qt.append(rendered.join(", "));
        }

        if let Some(having) = &self.having {
            qt.append("HAVING");
            having.render_to(qt);
        }

        if let Some(order_by) = &self.order_by {
            qt.append(self.order_by_fragment(order_by));
        }

        if let Some(limit) = self.limit {
            qt.append("LIMIT");
            qt.append(limit.to_string());
        }
    }

    /// The full SQL text of the statement.
    pub fn generate(&self) -> String {
        let mut qt = QueryTemplate::new();
        self.render_to(&mut qt);
        qt.into_sql()
    }

    /// The ORDER BY clause text to be applied by the front-end proxy after
    /// merging ("" when the statement has no ORDER BY).
    pub fn proxy_order_by(&self) -> String {
        match &self.order_by {
            Some(order_by) => self.order_by_fragment(order_by),
            None => String::new(),
        }
    }

    fn order_by_fragment(&self, order_by: &[OrderByTerm]) -> String {
        let rendered: Vec<_> = order_by
            .iter()
            .map(|t| {
                let mut inner = QueryTemplate::new();
                t.render_to(&mut inner);
                inner.into_sql()
            })
            .collect();
        format!("ORDER BY {}", rendered.join(", "))
    }
}

impl std::fmt::Display for SelectStmt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.generate())
    }
}
