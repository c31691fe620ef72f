//! Function call expressions.

use crate::column_ref::ColumnRef;
use crate::query_template::QueryTemplate;
use crate::value_expr::{ValueExpr, ValueFactor};

/// A function call, `name(param, param, ...)`.
///
/// Used both for plain scalar functions and (wrapped in
/// [`ValueFactor::AggFunc`]) for aggregate calls; the name keeps the case it
/// was written with.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FuncExpr {
    name: String,
    /// Function parameters, in call order.
    pub params: Vec<ValueExpr>,
}

impl FuncExpr {
    /// Construct a call of `name` with `params`.
    pub fn new(name: impl Into<String>, params: Vec<ValueExpr>) -> Self {
        Self {
            name: name.into(),
            params,
        }
    }

    /// Construct a call of `name` over a single bare column.
    pub fn new_arg1_column(name: impl Into<String>, column: impl Into<String>) -> Self {
        let cr = ColumnRef::new("", "", column.into());
        Self::new(
            name,
            vec![ValueExpr::from_factor(ValueFactor::ColumnRef(cr))],
        )
    }

    /// A call like `src` but renamed, sharing the parameter list.
    pub fn new_like(src: &Self, new_name: impl Into<String>) -> Self {
        Self {
            name: new_name.into(),
            params: src.params.clone(),
        }
    }

    /// The function name as written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Case-insensitive name comparison, for recognizing well-known
    /// functions.
    pub fn name_is(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Collect all column references in the parameter list.
    pub fn find_column_refs<'a>(&'a self, out: &mut Vec<&'a ColumnRef>) {
        for param in &self.params {
            param.find_column_refs(out);
        }
    }

    /// Render `name(p1,p2,...)`.
    pub fn render_to(&self, qt: &mut QueryTemplate) {
        let mut out = String::new();
        out.push_str(&self.name);
        out.push('(');
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                out.push(',');
            }
            let mut inner = QueryTemplate::new();
            param.render_to(&mut inner);
            out.push_str(inner.sql_fragment());
        }
        out.push(')');
        qt.append(out);
    }
}

impl std::fmt::Display for FuncExpr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut qt = QueryTemplate::new();
        self.render_to(&mut qt);
        write!(f, "{}", qt.sql_fragment())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_single_arg() {
        let f = FuncExpr::new_arg1_column("COUNT", "x");
        assert_eq!(f.to_string(), "COUNT(x)");
    }

    #[test]
    fn name_case_preserved_but_matching_insensitive() {
        let f = FuncExpr::new_arg1_column("avg", "x");
        assert_eq!(f.to_string(), "avg(x)");
        assert!(f.name_is("AVG"));
    }
}
