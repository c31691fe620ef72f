//! Table references and joins.

use crate::bool_term::BoolTerm;
use crate::column_ref::ColumnRef;
use crate::identifier::{quote_if_needed, Identifier};
use crate::query_template::QueryTemplate;
use crate::{MissingDbSnafu, Result, UnpopulatedTableSnafu};
use snafu::ensure;

/// The kind of a [`JoinRef`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    /// `JOIN` / `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
    /// `RIGHT JOIN`
    Right,
}

impl JoinType {
    fn render(&self) -> &'static str {
        match self {
            Self::Inner => "JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
        }
    }
}

/// The join condition of a [`JoinRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinSpec {
    /// `ON <bool term>`
    On(BoolTerm),
    /// `USING (<column>)`
    Using(ColumnRef),
}

/// One joined table hanging off a [`TableRef`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinRef {
    /// Join kind.
    pub join_type: JoinType,
    /// The joined table.
    pub right: TableRef,
    /// The join condition, `None` for a comma-style cross product rewritten
    /// upstream.
    pub spec: Option<JoinSpec>,
}

/// A reference to one table in a FROM list, with its chain of joins.
///
/// Invariant: a populated `db` requires a populated `table`;
/// [`TableRef::verify_populated`] enforces that `table` is set and fills in
/// the default database before planning completes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableRef {
    db: Identifier,
    table: Identifier,
    alias: String,
    joins: Vec<JoinRef>,
}

impl TableRef {
    /// Construct from raw name parts.
    pub fn new(
        db: impl Into<Identifier>,
        table: impl Into<Identifier>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
            alias: alias.into(),
            joins: vec![],
        }
    }

    /// The unquoted database name ("" if unset).
    pub fn db(&self) -> &str {
        self.db.value()
    }

    /// The unquoted table name ("" if unset).
    pub fn table(&self) -> &str {
        self.table.value()
    }

    /// The alias ("" if unset).
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// True if an alias is set.
    pub fn has_alias(&self) -> bool {
        !self.alias.is_empty()
    }

    /// Set the database part.
    pub fn set_db(&mut self, db: impl Into<Identifier>) {
        self.db = db.into();
    }

    /// Set the table part.
    pub fn set_table(&mut self, table: impl Into<Identifier>) {
        self.table = table.into();
    }

    /// Set the alias.
    pub fn set_alias(&mut self, alias: impl Into<String>) {
        self.alias = alias.into();
    }

    /// The chain of joins.
    pub fn joins(&self) -> &[JoinRef] {
        &self.joins
    }

    /// Mutable access to the chain of joins.
    pub fn joins_mut(&mut self) -> &mut Vec<JoinRef> {
        &mut self.joins
    }

    /// Append a join.
    pub fn add_join(&mut self, join: JoinRef) {
        self.joins.push(join);
    }

    /// True if there are no joins.
    pub fn is_simple(&self) -> bool {
        self.joins.is_empty()
    }

    /// All (db, table) pairs used by this reference and its joins.
    pub fn related_db_tables(&self) -> Vec<(String, String)> {
        let mut out = vec![(self.db().to_string(), self.table().to_string())];
        for join in &self.joins {
            out.extend(join.right.related_db_tables());
        }
        out
    }

    /// Verify the table is set, filling in `default_db` where the database
    /// is missing. Recurses into joins.
    pub fn verify_populated(&mut self, default_db: &str) -> Result<()> {
        ensure!(!self.table.is_empty(), UnpopulatedTableSnafu);
        if self.db.is_empty() {
            ensure!(
                !default_db.is_empty(),
                MissingDbSnafu {
                    table: self.table.value()
                }
            );
            self.db = Identifier::new(default_db);
        }
        for join in &mut self.joins {
            join.right.verify_populated(default_db)?;
        }
        Ok(())
    }

    /// True if the populated fields of `self` match the corresponding
    /// fields of `rhs`; a populated db requires a populated table.
    pub fn is_subset_of(&self, rhs: &Self) -> bool {
        if self.table.is_empty() && !self.db.is_empty() {
            return false;
        }
        if !self.db.is_empty() && self.db.value() != rhs.db() {
            return false;
        }
        if !self.table.is_empty() && self.table.value() != rhs.table() {
            return false;
        }
        true
    }

    /// Render `db.table [AS alias]` followed by the join chain.
    pub fn render_to(&self, qt: &mut QueryTemplate) {
        let mut name = String::new();
        if !self.db.is_empty() {
            name.push_str(&self.db.to_string());
            name.push('.');
        }
        name.push_str(&self.table.to_string());
        qt.append(name);
        if self.has_alias() {
            qt.append("AS");
            qt.append(quote_if_needed(&self.alias));
        }
        for join in &self.joins {
            qt.append(join.join_type.render());
            join.right.render_to(qt);
            match &join.spec {
                Some(JoinSpec::On(term)) => {
                    qt.append("ON");
                    term.render_to(qt);
                }
                Some(JoinSpec::Using(column)) => {
                    qt.append("USING");
                    let mut inner = QueryTemplate::new();
                    column.render_to(&mut inner);
                    qt.append(format!("({})", inner.sql_fragment()));
                }
                None => {}
            }
        }
    }
}

impl std::fmt::Display for TableRef {
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
    fn verify_populated_fills_default_db() {
        let mut t = TableRef::new("", "Object", "");
        t.verify_populated("LSST").unwrap();
        assert_eq!(t.db(), "LSST");
        assert_eq!(t.table(), "Object");
    }

    #[test]
    fn verify_populated_requires_table() {
        let mut t = TableRef::new("", "", "");
        assert!(t.verify_populated("LSST").is_err());
    }

    #[test]
    fn verify_populated_without_default_requires_db() {
        let mut t = TableRef::new("", "Object", "");
        assert!(t.verify_populated("").is_err());
        let mut t = TableRef::new("LSST", "Object", "");
        t.verify_populated("").unwrap();
    }

    #[test]
    fn render_with_alias() {
        let t = TableRef::new("LSST", "Object_{chunk}", "LSST.Object");
        assert_eq!(t.to_string(), "LSST.Object_{chunk} AS `LSST.Object`");
    }

    #[test]
    fn render_join() {
        let mut left = TableRef::new("LSST", "Object", "o1");
        left.add_join(JoinRef {
            join_type: JoinType::Inner,
            right: TableRef::new("LSST", "Source", "s"),
            spec: Some(JoinSpec::Using(ColumnRef::new("", "", "objectId"))),
        });
        assert_eq!(
            left.to_string(),
            "LSST.Object AS o1 JOIN LSST.Source AS s USING (objectId)"
        );
    }

    #[test]
    fn subset_of() {
        let bare = TableRef::new("", "Object", "");
        let full = TableRef::new("LSST", "Object", "o");
        assert!(bare.is_subset_of(&full));
        assert!(!TableRef::new("", "Source", "").is_subset_of(&full));
    }
}
