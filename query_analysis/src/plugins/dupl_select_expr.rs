//! Rejection of duplicate select-list output names.

use crate::context::QueryContext;
use crate::{Error, Result};
use query_ir::SelectStmt;
use std::collections::BTreeMap;

/// Rejects a query whose select list would produce two columns with the
/// same resolved name (case-insensitive). Runs first, on the untouched
/// statement.
#[derive(Debug)]
pub(crate) struct DuplSelectExprPlugin;

impl DuplSelectExprPlugin {
    pub(crate) fn apply_logical(
        &self,
        stmt: &mut SelectStmt,
        _ctx: &mut QueryContext,
    ) -> Result<()> {
        // resolved output name: the alias when one is written, the bare
        // column name for plain column references; other expressions get
        // distinct synthetic aliases later and cannot collide.
        let mut positions: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (index, expr) in stmt.select_list().iter().enumerate() {
            let name = match expr.alias() {
                Some(alias) => Some(alias.to_ascii_lowercase()),
                None => expr
                    .column_ref()
                    .map(|cr| cr.column().to_ascii_lowercase()),
            };
            if let Some(name) = name {
                positions.entry(name).or_default().push(index + 1);
            }
        }

        for (name, occurrences) in positions {
            if occurrences.len() > 1 {
                let positions = occurrences
                    .iter()
                    .map(|p| format!(" {}", p))
                    .collect::<String>();
                return Err(Error::DuplicateSelectExpr { name, positions });
            }
        }
        Ok(())
    }
}
