//! Column references.

use crate::identifier::Identifier;
use crate::query_template::QueryTemplate;

/// A parsed single column reference, `[[db.]table.]column`.
///
/// The table part is held by value; whether two references name the same
/// relation is decided structurally, see [`ColumnRef::is_subset_of`].
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ColumnRef {
    db: Identifier,
    table: Identifier,
    column: Identifier,
}

impl ColumnRef {
    /// Construct from raw (possibly quoted) name parts.
    pub fn new(
        db: impl Into<Identifier>,
        table: impl Into<Identifier>,
        column: impl Into<Identifier>,
    ) -> Self {
        Self {
            db: db.into(),
            table: table.into(),
            column: column.into(),
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

    /// The unquoted column name.
    pub fn column(&self) -> &str {
        self.column.value()
    }

    /// Replace the database part.
    pub fn set_db(&mut self, db: impl Into<Identifier>) {
        self.db = db.into();
    }

    /// Replace the table part.
    pub fn set_table(&mut self, table: impl Into<Identifier>) {
        self.table = table.into();
    }

    /// Replace the column part.
    pub fn set_column(&mut self, column: impl Into<Identifier>) {
        self.column = column.into();
    }

    /// True if `self` could refer to the same column as the (possibly more
    /// completely qualified) `rhs`.
    ///
    /// Only populated fields are compared, and less significant fields must
    /// be populated before more significant ones: a reference with a db but
    /// no table (on either side) never matches, and the column must be
    /// populated on both sides.
    pub fn is_subset_of(&self, rhs: &Self) -> bool {
        if self.column.is_empty() || rhs.column.is_empty() {
            return false;
        }
        // a populated db requires a populated table
        if self.table.is_empty() && !self.db.is_empty() {
            return false;
        }
        if rhs.table.is_empty() && !rhs.db.is_empty() {
            return false;
        }
        if !self.db.is_empty() && self.db != rhs.db {
            return false;
        }
        if !self.table.is_empty() && self.table != rhs.table {
            return false;
        }
        self.column == rhs.column
    }

    /// Render into `qt`, omitting unset leading parts.
    pub fn render_to(&self, qt: &mut QueryTemplate) {
        let mut out = String::new();
        if !self.db.is_empty() {
            out.push_str(&self.db.to_string());
            out.push('.');
        }
        if !self.table.is_empty() {
            out.push_str(&self.table.to_string());
            out.push('.');
        }
        out.push_str(&self.column.to_string());
        qt.append(out);
    }
}

impl std::fmt::Display for ColumnRef {
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
    fn subset_of_less_qualified() {
        let partial = ColumnRef::new("", "", "objectId");
        let full = ColumnRef::new("db", "T", "objectId");
        assert!(partial.is_subset_of(&full));
        assert!(!full.is_subset_of(&partial));
    }

    #[test]
    fn subset_requires_column() {
        let a = ColumnRef::new("", "T", "");
        let b = ColumnRef::new("", "T", "c");
        assert!(!a.is_subset_of(&b));
        assert!(!b.is_subset_of(&a));
    }

    #[test]
    fn subset_rejects_db_without_table() {
        let a = ColumnRef::new("db", "", "c");
        let b = ColumnRef::new("db", "T", "c");
        assert!(!a.is_subset_of(&b));
    }

    #[test]
    fn subset_field_mismatch() {
        let a = ColumnRef::new("", "U", "c");
        let b = ColumnRef::new("db", "T", "c");
        assert!(!a.is_subset_of(&b));
    }

    #[test]
    fn equal_is_subset_both_ways() {
        let a = ColumnRef::new("db", "T", "c");
        assert!(a.is_subset_of(&a.clone()));
    }

    #[test]
    fn render_skips_empty_parts() {
        assert_eq!(ColumnRef::new("", "", "c").to_string(), "c");
        assert_eq!(ColumnRef::new("", "T", "c").to_string(), "T.c");
        assert_eq!(ColumnRef::new("db", "T", "c").to_string(), "db.T.c");
    }

    #[test]
    fn quoted_parts_round_trip() {
        let c = ColumnRef::new("", "`LSST.Object`", "chunkId");
        assert_eq!(c.to_string(), "`LSST.Object`.chunkId");
        assert_eq!(c.table(), "LSST.Object");
    }
}
