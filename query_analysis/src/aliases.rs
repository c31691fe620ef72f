//! Bidirectional alias maps for tables and select-list expressions.

use query_ir::{ColumnRef, ValueExpr};

/// Alias ↔ (db, table) map for the FROM list.
///
/// Aliases are unique within a statement; `set` refuses duplicates.
#[derive(Debug, Clone, Default)]
pub struct TableAliases {
    entries: Vec<TableAliasEntry>,
}

#[derive(Debug, Clone)]
struct TableAliasEntry {
    alias: String,
    db: String,
    table: String,
}

impl TableAliases {
    /// Register `alias` for `db`.`table`. Returns false (and changes
    /// nothing) when the alias is already taken.
    pub fn set(&mut self, db: impl Into<String>, table: impl Into<String>, alias: impl Into<String>) -> bool {
        let alias = alias.into();
        if self.entries.iter().any(|e| e.alias == alias) {
            return false;
        }
        self.entries.push(TableAliasEntry {
            alias,
            db: db.into(),
            table: table.into(),
        });
        true
    }

    /// The (db, table) named by `alias`.
    pub fn get_by_alias(&self, alias: &str) -> Option<(&str, &str)> {
        self.entries
            .iter()
            .find(|e| e.alias == alias)
            .map(|e| (e.db.as_str(), e.table.as_str()))
    }

    /// The first alias registered for `db`.`table`.
    pub fn get_alias(&self, db: &str, table: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.db == db && e.table == table)
            .map(|e| e.alias.as_str())
    }
}

/// Alias ↔ select-list expression map.
#[derive(Debug, Clone, Default)]
pub struct SelectListAliases {
    entries: Vec<(String, ValueExpr)>,
}

impl SelectListAliases {
    /// Register `alias` for `expr`. Returns false when the alias is
    /// already taken.
    pub fn set(&mut self, alias: impl Into<String>, expr: ValueExpr) -> bool {
        let alias = alias.into();
        if self.entries.iter().any(|(a, _)| *a == alias) {
            return false;
        }
        self.entries.push((alias, expr));
        true
    }

    /// The expression registered under `alias`.
    pub fn get(&self, alias: &str) -> Option<&ValueExpr> {
        self.entries
            .iter()
            .find(|(a, _)| a.as_str() == alias)
            .map(|(_, e)| e)
    }

    /// The alias whose single-factor column-ref expression matches
    /// `column_ref`, preferring an exact match over the first subset match
    /// (an unqualified `objectId` matches a registered `T.objectId`).
    pub fn get_alias_for(&self, column_ref: &ColumnRef) -> Option<(&str, &ValueExpr)> {
        let mut subset_match = None;
        for (alias, expr) in &self.entries {
            if let Some(entry_ref) = expr.column_ref() {
                if entry_ref == column_ref {
                    return Some((alias.as_str(), expr));
                }
                if subset_match.is_none() && column_ref.is_subset_of(entry_ref) {
                    subset_match = Some((alias.as_str(), expr));
                }
            }
        }
        subset_match
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_aliases_reject_duplicates() {
        let mut aliases = TableAliases::default();
        assert!(aliases.set("LSST", "Object", "o"));
        assert!(!aliases.set("LSST", "Source", "o"));
        assert_eq!(aliases.get_by_alias("o"), Some(("LSST", "Object")));
        assert_eq!(aliases.get_alias("LSST", "Object"), Some("o"));
        assert_eq!(aliases.get_alias("LSST", "Source"), None);
    }

    #[test]
    fn select_aliases_reject_duplicates() {
        let mut aliases = SelectListAliases::default();
        assert!(aliases.set("f1", ValueExpr::from_column("chunkId")));
        assert!(!aliases.set("f1", ValueExpr::from_column("other")));
        assert!(aliases.get("f1").is_some());
        assert!(aliases.get("f2").is_none());
    }

    #[test]
    fn alias_by_subset_prefers_exact() {
        let mut aliases = SelectListAliases::default();
        let qualified = ValueExpr::from_factor(query_ir::ValueFactor::ColumnRef(
            ColumnRef::new("db", "T", "objectId"),
        ));
        let bare = ValueExpr::from_column("objectId");
        aliases.set("qualified", qualified);
        aliases.set("bare", bare);

        // exact match wins
        let (alias, _) = aliases
            .get_alias_for(&ColumnRef::new("", "", "objectId"))
            .unwrap();
        assert_eq!(alias, "bare");

        // subset match when no exact one exists
        let (alias, _) = aliases
            .get_alias_for(&ColumnRef::new("", "T", "objectId"))
            .unwrap();
        assert_eq!(alias, "qualified");

        assert!(aliases
            .get_alias_for(&ColumnRef::new("", "U", "objectId"))
            .is_none());
    }
}
