//! Value expressions: `factor (op factor)*` sequences with an optional
//! output alias.

use crate::column_ref::ColumnRef;
use crate::func_expr::FuncExpr;
use crate::identifier::quote_if_needed;
use crate::query_template::QueryTemplate;
use crate::{Error, Result};

/// Binary operator joining two [`ValueFactor`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    /// Terminal marker on the last factor.
    None,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Multiply,
    /// `/`
    Divide,
    /// `DIV`
    Div,
    /// `%`
    Modulo,
    /// `MOD`
    Mod,
    /// `&`
    BitAnd,
    /// `|`
    BitOr,
    /// `^`
    BitXor,
}

impl BinOp {
    fn render(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Div => "DIV",
            Self::Modulo => "%",
            Self::Mod => "MOD",
            Self::BitAnd => "&",
            Self::BitOr => "|",
            Self::BitXor => "^",
        }
    }
}

/// One term of a [`ValueExpr`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueFactor {
    /// A column reference.
    ColumnRef(ColumnRef),
    /// A scalar function call.
    Function(FuncExpr),
    /// An aggregate function call.
    AggFunc(FuncExpr),
    /// `*` or `table.*`; the payload is the (possibly empty) table
    /// qualifier.
    Star(String),
    /// A literal constant, kept as written.
    Const(String),
    /// A parenthesized nested expression.
    Expr(Box<ValueExpr>),
}

impl ValueFactor {
    /// The contained column reference, if this factor is one.
    pub fn column_ref(&self) -> Option<&ColumnRef> {
        match self {
            Self::ColumnRef(cr) => Some(cr),
            _ => None,
        }
    }

    /// Collect column references in this factor.
    pub fn find_column_refs<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        match self {
            Self::ColumnRef(cr) => out.push(cr),
            Self::Function(f) | Self::AggFunc(f) => f.find_column_refs(out),
            Self::Expr(e) => e.find_column_refs(out),
            Self::Star(_) | Self::Const(_) => {}
        }
    }

    fn render_to(&self, qt: &mut QueryTemplate) {
        match self {
            Self::ColumnRef(cr) => cr.render_to(qt),
            Self::Function(f) | Self::AggFunc(f) => f.render_to(qt),
            Self::Star(table) => {
                if table.is_empty() {
                    qt.append("*")
                } else {
                    qt.append(format!("{}.*", quote_if_needed(table)))
                }
            }
            Self::Const(v) => qt.append(v),
            Self::Expr(e) => {
                let mut inner = QueryTemplate::new();
                e.render_to(&mut inner);
                qt.append(format!("({})", inner.sql_fragment()));
            }
        }
    }
}

/// A factor together with the operator joining it to the next factor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FactorOp {
    /// The value term.
    pub factor: ValueFactor,
    /// Operator to the following factor; [`BinOp::None`] on the last one.
    pub op: BinOp,
}

/// An ordered `f1 op1 f2 op2 ...` expression with an optional alias.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValueExpr {
    factor_ops: Vec<FactorOp>,
    alias: Option<String>,
}

impl ValueExpr {
    /// An empty expression; factors are appended during parsing.
    pub fn new() -> Self {
        Self::default()
    }

    /// An expression holding exactly one factor.
    pub fn from_factor(factor: ValueFactor) -> Self {
        Self {
            factor_ops: vec![FactorOp {
                factor,
                op: BinOp::None,
            }],
            alias: None,
        }
    }

    /// A single-factor expression over a bare column name.
    pub fn from_column(column: impl Into<String>) -> Self {
        Self::from_factor(ValueFactor::ColumnRef(ColumnRef::new(
            "",
            "",
            column.into(),
        )))
    }

    /// Append a factor, closing the previous factor's operator slot.
    pub fn add_value_factor(&mut self, factor: ValueFactor) {
        self.factor_ops.push(FactorOp {
            factor,
            op: BinOp::None,
        });
    }

    /// Attach `op` to the most recently appended factor.
    ///
    /// Fails if no factor has been appended yet.
    pub fn add_op(&mut self, op: BinOp) -> Result<()> {
        match self.factor_ops.last_mut() {
            Some(last) => {
                last.op = op;
                Ok(())
            }
            None => Err(Error::OpWithoutFactor),
        }
    }

    /// The output alias, if any.
    pub fn alias(&self) -> Option<&str> {
        self.alias.as_deref()
    }

    /// Set the output alias.
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = Some(alias.into());
    }

    /// Remove the output alias.
    pub fn clear_alias(&mut self) {
        self.alias = None;
    }

    /// The factor sequence.
    pub fn factor_ops(&self) -> &[FactorOp] {
        &self.factor_ops
    }

    /// Mutable access to the factor sequence, for in-place rewrites.
    pub fn factor_ops_mut(&mut self) -> &mut Vec<FactorOp> {
        &mut self.factor_ops
    }

    /// Structural comparison ignoring the alias.
    pub fn compare_value(&self, other: &Self) -> bool {
        self.factor_ops == other.factor_ops
    }

    /// The column reference, if this is a single-factor column-ref
    /// expression.
    pub fn column_ref(&self) -> Option<&ColumnRef> {
        match self.factor_ops.as_slice() {
            [single] => single.factor.column_ref(),
            _ => None,
        }
    }

    /// True if this is a single `*` (or `table.*`) factor.
    pub fn is_star(&self) -> bool {
        matches!(
            self.factor_ops.as_slice(),
            [FactorOp {
                factor: ValueFactor::Star(_),
                ..
            }]
        )
    }

    /// True if any factor, at any nesting depth, is an aggregate call.
    pub fn has_aggregate(&self) -> bool {
        fn factor_has_aggregate(factor: &ValueFactor) -> bool {
            match factor {
                ValueFactor::AggFunc(_) => true,
                ValueFactor::Function(fe) => fe.params.iter().any(ValueExpr::has_aggregate),
                ValueFactor::Expr(e) => e.has_aggregate(),
                ValueFactor::ColumnRef(_) | ValueFactor::Star(_) | ValueFactor::Const(_) => false,
            }
        }
        self.factor_ops
            .iter()
            .any(|fo| factor_has_aggregate(&fo.factor))
    }

    /// The literal value, if this is a single constant factor.
    pub fn as_literal(&self) -> Option<&str> {
        match self.factor_ops.as_slice() {
            [FactorOp {
                factor: ValueFactor::Const(v),
                ..
            }] => Some(v),
            _ => None,
        }
    }

    /// Collect all column references in evaluation order.
    pub fn find_column_refs<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        for fo in &self.factor_ops {
            fo.factor.find_column_refs(out);
        }
    }

    /// Apply `f` to every column reference, recursing into functions and
    /// nested expressions.
    pub fn for_each_column_ref_mut(&mut self, f: &mut impl FnMut(&mut ColumnRef)) {
        for fo in &mut self.factor_ops {
            match &mut fo.factor {
                ValueFactor::ColumnRef(cr) => f(cr),
                ValueFactor::Function(fe) | ValueFactor::AggFunc(fe) => {
                    for param in &mut fe.params {
                        param.for_each_column_ref_mut(f);
                    }
                }
                ValueFactor::Expr(e) => e.for_each_column_ref_mut(f),
                ValueFactor::Star(_) | ValueFactor::Const(_) => {}
            }
        }
    }

    /// Render the bare expression, without the alias.
    pub fn render_to(&self, qt: &mut QueryTemplate) {
        let mut out = QueryTemplate::new();
        for fo in &self.factor_ops {
            fo.factor.render_to(&mut out);
            if fo.op != BinOp::None {
                out.append(fo.op.render());
            }
        }
        qt.append(out.into_sql());
    }

    /// Render `expr AS alias` when an alias is set, the bare expression
    /// otherwise. Used in select lists.
    pub fn render_with_alias(&self, qt: &mut QueryTemplate) {
        let mut out = QueryTemplate::new();
        self.render_to(&mut out);
        if let Some(alias) = &self.alias {
            out.append("AS");
            out.append(quote_if_needed(alias));
        }
        qt.append(out.into_sql());
    }

    /// Render the alias alone when one is set, the bare expression
    /// otherwise. Used in GROUP BY and ORDER BY, which refer to select-list
    /// outputs by name.
    pub fn render_alias_or_expr(&self, qt: &mut QueryTemplate) {
        match &self.alias {
            Some(alias) => qt.append(quote_if_needed(alias)),
            None => self.render_to(qt),
        }
    }

    /// The SQL text of the bare expression.
    pub fn sql_fragment(&self) -> String {
        let mut qt = QueryTemplate::new();
        self.render_to(&mut qt);
        qt.into_sql()
    }
}

impl std::fmt::Display for ValueExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut qt = QueryTemplate::new();
        self.render_with_alias(&mut qt);
        write!(f, "{}", qt.sql_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> ValueFactor {
        ValueFactor::ColumnRef(ColumnRef::new("", "", name))
    }

    #[test]
    fn add_op_requires_factor() {
        let mut e = ValueExpr::new();
        assert!(matches!(e.add_op(BinOp::Plus), Err(Error::OpWithoutFactor)));
        e.add_value_factor(col("a"));
        e.add_op(BinOp::Plus).unwrap();
        e.add_value_factor(col("b"));
        assert_eq!(e.sql_fragment(), "a + b");
    }

    #[test]
    fn compare_value_ignores_alias() {
        let mut a = ValueExpr::from_column("x");
        let b = ValueExpr::from_column("x");
        a.set_alias("out");
        assert!(a.compare_value(&b));
        assert_ne!(a, b);
    }

    #[test]
    fn column_ref_extraction() {
        let e = ValueExpr::from_column("x");
        assert_eq!(e.column_ref().unwrap().column(), "x");

        let mut multi = ValueExpr::from_column("x");
        multi.add_op(BinOp::Plus).unwrap();
        multi.add_value_factor(col("y"));
        assert!(multi.column_ref().is_none());

        let func = ValueExpr::from_factor(ValueFactor::AggFunc(FuncExpr::new_arg1_column(
            "SUM", "x",
        )));
        assert!(func.column_ref().is_none());
        assert!(func.has_aggregate());
    }

    #[test]
    fn render_with_alias_quotes_when_needed() {
        let mut e = ValueExpr::from_column("chunkId");
        e.set_alias("chunkId");
        let mut qt = QueryTemplate::new();
        e.render_with_alias(&mut qt);
        assert_eq!(qt.sql_fragment(), "chunkId AS chunkId");

        let mut e = ValueExpr::from_factor(ValueFactor::Star("LSST.Object".to_string()));
        e.set_alias("LSST.Object");
        let mut qt = QueryTemplate::new();
        e.render_with_alias(&mut qt);
        assert_eq!(qt.sql_fragment(), "`LSST.Object`.* AS `LSST.Object`");
    }

    #[test]
    fn star_and_const_render() {
        assert_eq!(
            ValueExpr::from_factor(ValueFactor::Star(String::new())).sql_fragment(),
            "*"
        );
        assert_eq!(
            ValueExpr::from_factor(ValueFactor::Const("20.0".to_string())).sql_fragment(),
            "20.0"
        );
    }

    #[test]
    fn nested_expr_renders_parenthesized() {
        let mut inner = ValueExpr::from_column("a");
        inner.add_op(BinOp::Plus).unwrap();
        inner.add_value_factor(col("b"));
        let outer = ValueExpr::from_factor(ValueFactor::Expr(Box::new(inner)));
        assert_eq!(outer.sql_fragment(), "(a + b)");
    }
}
