//! FROM-list resolution, alias assignment and chunk-name rewriting.

use crate::context::QueryContext;
use crate::plan::Plan;
use crate::{BadStatementSnafu, Error, MissingMetadataSnafu, Result};
use observability_deps::tracing::debug;
use query_ir::{ColumnRef, SelectStmt, TableRef, ValueExpr, ValueFactor};
use snafu::ResultExt;

/// Resolves table references, assigns table and select-list aliases,
/// patches column references to use them, and (in the physical phase)
/// rewrites partitioned table names into chunk-substitutable patterns.
#[derive(Debug)]
pub(crate) struct TablePlugin;

impl TablePlugin {
    pub(crate) fn apply_logical(
        &self,
        stmt: &mut SelectStmt,
        ctx: &mut QueryContext,
    ) -> Result<()> {
        // Fill in the default database and demand fully named tables.
        let default_db = ctx.default_db.clone();
        for table in stmt.from_list_mut() {
            table.verify_populated(&default_db).context(BadStatementSnafu)?;
        }

        // The first FROM table's database dominates the query.
        ctx.dominant_db = stmt.from_list()[0].db().to_string();

        // Give every table an alias; unnamed ones get `db.table`. The
        // resolver list records tables (joins included) in lookup order.
        let mut flat_tables = vec![];
        for table in stmt.from_list_mut() {
            alias_table_tree(table, ctx, &mut flat_tables)?;
        }
        ctx.resolver_tables = flat_tables;

        // Top-level schema of every referenced table, for resolving
        // unqualified columns.
        for table in &ctx.resolver_tables {
            let key = (table.db().to_string(), table.table().to_string());
            if ctx.table_schemas.contains_key(&key) {
                continue;
            }
            let columns = ctx
                .css()
                .table_columns(table.db(), table.table())
                .context(MissingMetadataSnafu)?;
            ctx.table_schemas.insert(key, columns);
        }

        // Every non-star select expression gets an output alias equal to
        // its written form, so worker outputs have stable names.
        for expr in stmt.select_list_mut() {
            if expr.alias().is_none() && !expr.is_star() {
                expr.set_alias(expr.sql_fragment());
            }
        }

        // Patch select-list column references to table aliases, then
        // register the aliased expressions for lookup from other clauses.
        for expr in stmt.select_list_mut() {
            expr.for_each_column_ref_mut(&mut |cr| patch_column_ref(cr, ctx));
        }
        for expr in stmt.select_list() {
            if let Some(alias) = expr.alias() {
                ctx.select_list_aliases.set(alias, expr.clone());
            }
        }

        // Patch the remaining clauses (WHERE, GROUP BY, HAVING, ORDER BY,
        // join ON conditions) and the star factors. Select-list entries are
        // visited again; already-patched references are left alone.
        stmt.for_each_value_expr_mut(&mut |expr| {
            expr.for_each_column_ref_mut(&mut |cr| patch_column_ref(cr, ctx));
        });
        patch_stars(stmt, ctx);

        // GROUP BY and ORDER BY entries naming a select-list output are
        // replaced with the aliased expression so they render as the
        // alias.
        let ctx_ref = &*ctx;
        if let Some(group_by) = stmt.group_by_mut() {
            for expr in group_by {
                substitute_select_alias(expr, ctx_ref);
            }
        }
        if let Some(order_by) = stmt.order_by_mut() {
            for term in order_by {
                substitute_select_alias(&mut term.expr, ctx_ref);
            }
        }

        // Spatial restrictors extracted by the parser move onto the
        // context for chunk pruning.
        if let Some(wc) = stmt.where_clause() {
            ctx.restrictors.extend(wc.restrictors.iter().cloned());
        }

        debug!(
            dominant_db = %ctx.dominant_db,
            tables = ctx.resolver_tables.len(),
            "table analysis complete"
        );
        Ok(())
    }

    pub(crate) fn apply_physical(&self, plan: &mut Plan, ctx: &mut QueryContext) -> Result<()> {
        plan.dominant_db = ctx.dominant_db.clone();

        // Which (db, table) pairs are partitioned, and is any of them
        // referenced twice (a self-join needing overlap)?
        let mut partitioned = vec![];
        let mut self_join = None;
        for table in &ctx.resolver_tables {
            let is_part = ctx
                .css()
                .is_partitioned(table.db(), table.table())
                .context(MissingMetadataSnafu)?;
            if !is_part {
                continue;
            }
            let key = (table.db().to_string(), table.table().to_string());
            if partitioned.contains(&key) {
                if ctx.css().has_sub_chunks(table.db(), table.table()) {
                    self_join = Some(key.clone());
                } else {
                    return Err(Error::UnsupportedFeature {
                        reason: format!(
                            "self-join of partitioned table {}.{} without sub-chunking",
                            key.0, key.1
                        ),
                    });
                }
            }
            partitioned.push(key);
        }

        if partitioned.is_empty() {
            return Ok(());
        }
        ctx.has_chunks = true;
        for key in &partitioned {
            if !ctx.chunked_tables.contains(key) {
                ctx.chunked_tables.push(key.clone());
            }
        }
        plan.mapping.uses_chunks = true;

        match self_join {
            None => {
                let stmt = &mut plan.parallel[0];
                rewrite_tables(stmt, &partitioned, |table, _occurrence| {
                    format!("{}_{{chunk}}", table)
                });
            }
            Some(director) => {
                // Near-neighbor self-join: every occurrence reads the
                // sub-chunk table; a second statement reads the overlap
                // shadow of the second occurrence of the director.
                ctx.has_sub_chunks = true;
                plan.mapping.uses_sub_chunks = true;
                plan.mapping.uses_overlap = true;

                let mut overlap_stmt = plan.parallel[0].clone();
                rewrite_tables(&mut plan.parallel[0], &partitioned, |table, _occurrence| {
                    format!("{}_{{chunk}}_{{subChunk}}", table)
                });
                let director_table = director.1;
                let mut director_seen = 0;
                rewrite_tables(&mut overlap_stmt, &partitioned, move |table, _occurrence| {
                    if table == director_table {
                        director_seen += 1;
                        if director_seen == 2 {
                            return format!("{}_{{chunk}}FullOverlap_{{subChunk}}", table);
                        }
                    }
                    format!("{}_{{chunk}}_{{subChunk}}", table)
                });
                plan.parallel.push(overlap_stmt);
            }
        }
        Ok(())
    }
}

// Assign aliases through a table and its joins, record them in the context
// maps and collect the flattened table list.
fn alias_table_tree(
    table: &mut TableRef,
    ctx: &mut QueryContext,
    flat: &mut Vec<TableRef>,
) -> Result<()> {
    if !table.has_alias() {
        table.set_alias(format!("{}.{}", table.db(), table.table()));
    }
    if !ctx
        .table_aliases
        .set(table.db(), table.table(), table.alias())
    {
        return Err(Error::UnsupportedFeature {
            reason: format!("duplicate table alias '{}'", table.alias()),
        });
    }
    flat.push(TableRef::new(table.db(), table.table(), table.alias()));
    for join in table.joins_mut() {
        alias_table_tree(&mut join.right, ctx, flat)?;
    }
    Ok(())
}

// Point a column reference at the alias of the FROM table it belongs to.
fn patch_column_ref(cr: &mut ColumnRef, ctx: &QueryContext) {
    if cr.table().is_empty() {
        // Unqualified: the first FROM table whose schema has the column.
        for table in &ctx.resolver_tables {
            let has_column = ctx
                .columns_of(table.db(), table.table())
                .map(|cols| cols.iter().any(|c| c.as_str() == cr.column()))
                .unwrap_or(false);
            if has_column {
                set_alias_qualifier(cr, table.alias());
                return;
            }
        }
        return;
    }

    // Already alias-qualified?
    if cr.db().is_empty() && ctx.table_aliases.get_by_alias(cr.table()).is_some() {
        return;
    }

    // Qualified by table name (with the default database where needed).
    let db = if cr.db().is_empty() {
        ctx.default_db.as_str()
    } else {
        cr.db()
    };
    if let Some(alias) = ctx.table_aliases.get_alias(db, cr.table()) {
        let alias = alias.to_string();
        set_alias_qualifier(cr, &alias);
    }
}

fn set_alias_qualifier(cr: &mut ColumnRef, alias: &str) {
    cr.set_db("");
    // a dotted alias must render quoted
    if alias.contains('.') {
        cr.set_table(format!("`{}`", alias));
    } else {
        cr.set_table(alias);
    }
}

// Point star factors at table aliases.
fn patch_stars(stmt: &mut SelectStmt, ctx: &QueryContext) {
    let single_alias = match ctx.resolver_tables.as_slice() {
        [single] => Some(single.alias().to_string()),
        _ => None,
    };
    for expr in stmt.select_list_mut() {
        for fo in expr.factor_ops_mut() {
            if let ValueFactor::Star(qualifier) = &mut fo.factor {
                if qualifier.is_empty() {
                    if let Some(alias) = &single_alias {
                        *qualifier = alias.clone();
                    }
                } else if !qualifier.contains('.') {
                    // table-name qualifier -> alias
                    if let Some(alias) =
                        ctx.table_aliases.get_alias(&ctx.default_db, qualifier)
                    {
                        *qualifier = alias.to_string();
                    }
                }
            }
        }
    }
}

// Replace a GROUP BY / ORDER BY expression with the select-list expression
// it names, preferring exact column matches over subset matches.
fn substitute_select_alias(expr: &mut ValueExpr, ctx: &QueryContext) {
    let found = match expr.column_ref() {
        Some(cr) => ctx
            .select_list_aliases
            .get_alias_for(cr)
            .map(|(_, e)| e.clone()),
        None => None,
    };
    if let Some(replacement) = found {
        *expr = replacement;
    }
}

// Rewrite the names of partitioned tables in a statement's FROM list. The
// pattern callback receives the table name and its 1-based occurrence
// count among partitioned references.
fn rewrite_tables(
    stmt: &mut SelectStmt,
    partitioned: &[(String, String)],
    mut pattern: impl FnMut(&str, usize) -> String,
) {
    let mut occurrence = 0;
    for table in stmt.from_list_mut() {
        rewrite_table_tree(table, partitioned, &mut pattern, &mut occurrence);
    }
}

fn rewrite_table_tree(
    table: &mut TableRef,
    partitioned: &[(String, String)],
    pattern: &mut impl FnMut(&str, usize) -> String,
    occurrence: &mut usize,
) {
    let key = (table.db().to_string(), table.table().to_string());
    if partitioned.contains(&key) {
        *occurrence += 1;
        let new_name = pattern(table.table(), *occurrence);
        table.set_table(new_name);
    }
    for join in table.joins_mut() {
        rewrite_table_tree(&mut join.right, partitioned, pattern, occurrence);
    }
}
