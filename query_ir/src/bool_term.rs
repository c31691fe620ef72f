//! Boolean terms of WHERE / HAVING / ON clauses.

use crate::query_template::QueryTemplate;
use crate::value_expr::ValueExpr;

/// Comparison operator of a [`BfTerm::Comp`] predicate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompOp {
    /// `=`
    Eq,
    /// `<>`
    NotEq,
    /// `<`
    Lt,
    /// `<=`
    LtEq,
    /// `>`
    Gt,
    /// `>=`
    GtEq,
    /// `<=>`
    NullSafeEq,
}

impl CompOp {
    fn render(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::NotEq => "<>",
            Self::Lt => "<",
            Self::LtEq => "<=",
            Self::Gt => ">",
            Self::GtEq => ">=",
            Self::NullSafeEq => "<=>",
        }
    }
}

/// A term within a [`BoolFactor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BfTerm {
    /// Raw text passed through without analysis.
    Pass(String),
    /// A parenthesized list of raw values, `(a,b,c)`.
    PassList(Vec<String>),
    /// A parenthesized nested boolean term.
    BoolTermFactor(Box<BoolTerm>),
    /// `left <op> right`
    Comp {
        /// Left operand.
        left: ValueExpr,
        /// Comparison operator.
        op: CompOp,
        /// Right operand.
        right: ValueExpr,
    },
    /// `value [NOT] BETWEEN min AND max`
    Between {
        /// Tested value.
        value: ValueExpr,
        /// Lower bound.
        min: ValueExpr,
        /// Upper bound.
        max: ValueExpr,
        /// Negated form.
        negated: bool,
    },
    /// `value [NOT] IN (c1,c2,...)`
    In {
        /// Tested value.
        value: ValueExpr,
        /// Candidate list.
        candidates: Vec<ValueExpr>,
        /// Negated form.
        negated: bool,
    },
    /// `value [NOT] LIKE pattern`
    Like {
        /// Tested value.
        value: ValueExpr,
        /// Match pattern.
        pattern: ValueExpr,
        /// Negated form.
        negated: bool,
    },
    /// `value IS [NOT] NULL`
    Null {
        /// Tested value.
        value: ValueExpr,
        /// Negated form.
        negated: bool,
    },
}

impl BfTerm {
    /// Apply `f` to every contained value expression.
    pub fn for_each_value_expr_mut(&mut self, f: &mut impl FnMut(&mut ValueExpr)) {
        match self {
            Self::Pass(_) | Self::PassList(_) => {}
            Self::BoolTermFactor(term) => term.for_each_value_expr_mut(f),
            Self::Comp { left, right, .. } => {
                f(left);
                f(right);
            }
            Self::Between {
                value, min, max, ..
            } => {
                f(value);
                f(min);
                f(max);
            }
            Self::In {
                value, candidates, ..
            } => {
                f(value);
                for c in candidates {
                    f(c);
                }
            }
            Self::Like { value, pattern, .. } => {
                f(value);
                f(pattern);
            }
            Self::Null { value, .. } => f(value),
        }
    }

    fn render_to(&self, qt: &mut QueryTemplate) {
        match self {
            Self::Pass(text) => qt.append(text),
            Self::PassList(values) => qt.append(format!("({})", values.join(","))),
            Self::BoolTermFactor(term) => {
                let mut inner = QueryTemplate::new();
                term.render_to(&mut inner);
                qt.append(format!("({})", inner.sql_fragment()));
            }
            Self::Comp { left, op, right } => {
                left.render_to(qt);
                qt.append(op.render());
                right.render_to(qt);
            }
            Self::Between {
                value,
                min,
                max,
                negated,
            } => {
                value.render_to(qt);
                if *negated {
                    qt.append("NOT");
                }
                qt.append("BETWEEN");
                min.render_to(qt);
                qt.append("AND");
                max.render_to(qt);
            }
            Self::In {
                value,
                candidates,
                negated,
            } => {
                value.render_to(qt);
                if *negated {
                    qt.append("NOT");
                }
                qt.append("IN");
                let rendered: Vec<_> = candidates.iter().map(|c| c.sql_fragment()).collect();
                qt.append(format!("({})", rendered.join(",")));
            }
            Self::Like {
                value,
                pattern,
                negated,
            } => {
                value.render_to(qt);
                if *negated {
                    qt.append("NOT");
                }
                qt.append("LIKE");
                pattern.render_to(qt);
            }
            Self::Null { value, negated } => {
                value.render_to(qt);
                qt.append(if *negated { "IS NOT NULL" } else { "IS NULL" });
            }
        }
    }
}

/// A sequence of [`BfTerm`]s rendered side by side; the leaf level of the
/// boolean tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoolFactor {
    /// The contained terms.
    pub terms: Vec<BfTerm>,
}

impl BoolFactor {
    /// A factor holding a single term.
    pub fn from_term(term: BfTerm) -> Self {
        Self { terms: vec![term] }
    }
}

/// A boolean-valued term of a WHERE / HAVING / ON clause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BoolTerm {
    /// OR-connected children.
    Or(Vec<BoolTerm>),
    /// AND-connected children.
    And(Vec<BoolTerm>),
    /// A leaf factor.
    Factor(BoolFactor),
    /// Unanalyzed raw text passed through verbatim.
    Unknown(String),
}

// Precedence of the connective for parenthesization; higher binds tighter.
fn precedence(term: &BoolTerm) -> u8 {
    match term {
        BoolTerm::Or(_) => 1,
        BoolTerm::And(_) => 2,
        BoolTerm::Factor(_) => 3,
        BoolTerm::Unknown(_) => 0,
    }
}

impl BoolTerm {
    /// Wrap a single predicate term as a boolean term.
    pub fn from_bf_term(term: BfTerm) -> Self {
        Self::Factor(BoolFactor::from_term(term))
    }

    /// Return the reduced form: single-child OR/AND collapse to the child
    /// and nested same-kind terms are flattened.
    pub fn reduced(self) -> Self {
        match self {
            Self::Or(terms) => {
                let mut flat = vec![];
                for t in terms {
                    match t.reduced() {
                        Self::Or(children) => flat.extend(children),
                        other => flat.push(other),
                    }
                }
                if flat.len() == 1 {
                    flat.pop().expect("single element")
                } else {
                    Self::Or(flat)
                }
            }
            Self::And(terms) => {
                let mut flat = vec![];
                for t in terms {
                    match t.reduced() {
                        Self::And(children) => flat.extend(children),
                        other => flat.push(other),
                    }
                }
                if flat.len() == 1 {
                    flat.pop().expect("single element")
                } else {
                    Self::And(flat)
                }
            }
            other => other,
        }
    }

    /// Apply `f` to every value expression in the tree.
    pub fn for_each_value_expr_mut(&mut self, f: &mut impl FnMut(&mut ValueExpr)) {
        match self {
            Self::Or(terms) | Self::And(terms) => {
                for t in terms {
                    t.for_each_value_expr_mut(f);
                }
            }
            Self::Factor(factor) => {
                for t in &mut factor.terms {
                    t.for_each_value_expr_mut(f);
                }
            }
            Self::Unknown(_) => {}
        }
    }

    /// Collect all column references in the tree.
    pub fn find_column_refs<'a>(&'a self, out: &mut Vec<&'a crate::ColumnRef>) {
        // the shared traversal is mutable; mirror it immutably here
        match self {
            Self::Or(terms) | Self::And(terms) => {
                for t in terms {
                    t.find_column_refs(out);
                }
            }
            Self::Factor(factor) => {
                for term in &factor.terms {
                    match term {
                        BfTerm::Pass(_) | BfTerm::PassList(_) => {}
                        BfTerm::BoolTermFactor(t) => t.find_column_refs(out),
                        BfTerm::Comp { left, right, .. } => {
                            left.find_column_refs(out);
                            right.find_column_refs(out);
                        }
                        BfTerm::Between {
                            value, min, max, ..
                        } => {
                            value.find_column_refs(out);
                            min.find_column_refs(out);
                            max.find_column_refs(out);
                        }
                        BfTerm::In {
                            value, candidates, ..
                        } => {
                            value.find_column_refs(out);
                            for c in candidates {
                                c.find_column_refs(out);
                            }
                        }
                        BfTerm::Like { value, pattern, .. } => {
                            value.find_column_refs(out);
                            pattern.find_column_refs(out);
                        }
                        BfTerm::Null { value, .. } => value.find_column_refs(out),
                    }
                }
            }
            Self::Unknown(_) => {}
        }
    }

    /// Render the tree, parenthesizing children that bind looser than their
    /// parent connective.
    pub fn render_to(&self, qt: &mut QueryTemplate) {
        self.render_with_parent(qt, 0)
    }

    fn render_with_parent(&self, qt: &mut QueryTemplate, parent_prec: u8) {
        let own = precedence(self);
        let needs_parens = own < parent_prec;
        let mut inner = QueryTemplate::new();
        match self {
            Self::Or(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        inner.append("OR");
                    }
                    t.render_with_parent(&mut inner, own);
                }
            }
            Self::And(terms) => {
                for (i, t) in terms.iter().enumerate() {
                    if i > 0 {
                        inner.append("AND");
                    }
                    t.render_with_parent(&mut inner, own);
                }
            }
            Self::Factor(factor) => {
                for term in &factor.terms {
                    term.render_to(&mut inner);
                }
            }
            Self::Unknown(text) => inner.append(text),
        }
        if needs_parens {
            qt.append(format!("({})", inner.sql_fragment()));
        } else {
            qt.append(inner.into_sql());
        }
    }

    /// The SQL text of the term.
    pub fn sql_fragment(&self) -> String {
        let mut qt = QueryTemplate::new();
        self.render_to(&mut qt);
        qt.into_sql()
    }
}

impl std::fmt::Display for BoolTerm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value_expr::ValueExpr;

    fn comp(left: &str, op: CompOp, right: &str) -> BoolTerm {
        BoolTerm::from_bf_term(BfTerm::Comp {
            left: ValueExpr::from_column(left),
            op,
            right: ValueExpr::from_factor(crate::ValueFactor::Const(right.to_string())),
        })
    }

    #[test]
    fn single_child_collapses() {
        let t = BoolTerm::And(vec![comp("a", CompOp::Gt, "1")]);
        assert_eq!(t.reduced(), comp("a", CompOp::Gt, "1"));
        let t = BoolTerm::Or(vec![comp("a", CompOp::Gt, "1")]);
        assert_eq!(t.reduced(), comp("a", CompOp::Gt, "1"));
    }

    #[test]
    fn nested_same_kind_flattens() {
        let t = BoolTerm::And(vec![
            BoolTerm::And(vec![comp("a", CompOp::Gt, "1"), comp("b", CompOp::Lt, "2")]),
            comp("c", CompOp::Eq, "3"),
        ]);
        match t.reduced() {
            BoolTerm::And(children) => assert_eq!(children.len(), 3),
            other => panic!("expected And, got {:?}", other),
        }
    }

    #[test]
    fn render_and_or_precedence() {
        let t = BoolTerm::And(vec![
            BoolTerm::Or(vec![comp("a", CompOp::Gt, "1"), comp("b", CompOp::Lt, "2")]),
            comp("c", CompOp::Eq, "3"),
        ]);
        assert_eq!(t.sql_fragment(), "(a > 1 OR b < 2) AND c = 3");
    }

    #[test]
    fn render_predicates() {
        let in_term = BoolTerm::from_bf_term(BfTerm::In {
            value: ValueExpr::from_column("objectId"),
            candidates: vec![
                ValueExpr::from_factor(crate::ValueFactor::Const("2".to_string())),
                ValueExpr::from_factor(crate::ValueFactor::Const("3145".to_string())),
            ],
            negated: false,
        });
        assert_eq!(in_term.sql_fragment(), "objectId IN (2,3145)");

        let between = BoolTerm::from_bf_term(BfTerm::Between {
            value: ValueExpr::from_column("ra"),
            min: ValueExpr::from_factor(crate::ValueFactor::Const("1".to_string())),
            max: ValueExpr::from_factor(crate::ValueFactor::Const("2".to_string())),
            negated: false,
        });
        assert_eq!(between.sql_fragment(), "ra BETWEEN 1 AND 2");

        let null = BoolTerm::from_bf_term(BfTerm::Null {
            value: ValueExpr::from_column("flags"),
            negated: true,
        });
        assert_eq!(null.sql_fragment(), "flags IS NOT NULL");
    }
}
