//! SQL text → IR front-end.
//!
//! The grammar work is delegated to the `sqlparser` crate; this crate walks
//! the resulting tree with one adapter function per node kind, building the
//! [`query_ir`] statement. Every adapter is a total function over its node's
//! variants: dialect features the engine cannot execute are rejected here
//! with the offending fragment embedded in the error, and genuinely
//! unhandled node kinds surface as [`Error::AdapterOrder`].
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod expr;
mod restrictor;
mod walker;

use query_ir::SelectStmt;
use snafu::{ResultExt, Snafu};
use sqlparser::ast as grammar;
use sqlparser::dialect::MySqlDialect;
use sqlparser::parser::Parser;

/// Parser front-end errors.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("syntax error: {}", source))]
    Syntax {
        source: sqlparser::parser::ParserError,
    },

    #[snafu(display("expected exactly one statement, found {}", count))]
    StatementCount { count: usize },

    #[snafu(display("only SELECT statements are supported"))]
    NotSelect,

    #[snafu(display("unhandled grammar node: {}", node))]
    AdapterOrder { node: String },

    #[snafu(display("unsupported SQL: {} in '{}'", reason, fragment))]
    AdapterExecution { reason: String, fragment: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) fn unsupported(reason: impl Into<String>, fragment: impl ToString) -> Error {
    Error::AdapterExecution {
        reason: reason.into(),
        fragment: fragment.to_string(),
    }
}

pub(crate) fn unhandled(node: impl Into<String>) -> Error {
    Error::AdapterOrder { node: node.into() }
}

/// Parse a single SELECT statement into the IR.
pub fn parse_select(sql: &str) -> Result<SelectStmt> {
    let mut statements = Parser::parse_sql(&MySqlDialect {}, sql).context(SyntaxSnafu)?;
    if statements.len() != 1 {
        return Err(Error::StatementCount {
            count: statements.len(),
        });
    }
    match statements.pop().expect("one statement") {
        grammar::Statement::Query(query) => walker::adapt_query(*query),
        _ => Err(Error::NotSelect),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_simple() {
        let stmt = parse_select("SELECT chunkId FROM LSST.Object WHERE bMagF > 20.0").unwrap();
        assert_eq!(
            stmt.generate(),
            "SELECT chunkId FROM LSST.Object WHERE bMagF > 20.0"
        );
    }

    #[test]
    fn round_trip_aggregates_and_group_by() {
        let stmt = parse_select(
            "select sum(pm_declErr), chunkId, avg(bMagF2) bmf2 \
             from LSST.Object where bMagF > 20.0 GROUP BY chunkId",
        )
        .unwrap();
        assert!(stmt.has_aggregate());
        assert!(stmt.has_group_by());
        assert_eq!(
            stmt.generate(),
            "SELECT sum(pm_declErr), chunkId, avg(bMagF2) AS bmf2 \
             FROM LSST.Object WHERE bMagF > 20.0 GROUP BY chunkId"
        );
    }

    #[test]
    fn round_trip_in_list() {
        let stmt = parse_select(
            "SELECT COUNT(*) AS N FROM Source WHERE objectId IN (386950783579546, 386942193651348)",
        )
        .unwrap();
        assert_eq!(
            stmt.generate(),
            "SELECT COUNT(*) AS N FROM Source \
             WHERE objectId IN (386950783579546,386942193651348)"
        );
    }

    #[test]
    fn round_trip_order_by_limit() {
        let stmt =
            parse_select("SELECT ra, decl FROM Object ORDER BY ra DESC, decl LIMIT 10").unwrap();
        assert_eq!(
            stmt.generate(),
            "SELECT ra, decl FROM Object ORDER BY ra DESC, decl LIMIT 10"
        );
        assert_eq!(stmt.proxy_order_by(), "ORDER BY ra DESC, decl");
    }

    #[test]
    fn round_trip_join_using() {
        let stmt = parse_select(
            "SELECT o.ra FROM Object o JOIN Source s USING (objectId) WHERE s.flux > 3",
        )
        .unwrap();
        assert_eq!(
            stmt.generate(),
            "SELECT o.ra FROM Object AS o JOIN Source AS s USING (objectId) WHERE s.flux > 3"
        );
    }

    #[test]
    fn round_trip_quoted_identifiers() {
        let stmt = parse_select("SELECT `select` FROM `weird table`").unwrap();
        assert_eq!(stmt.generate(), "SELECT `select` FROM `weird table`");
    }

    #[test]
    fn distinct_flag() {
        let stmt = parse_select("SELECT DISTINCT filterId FROM Science_Ccd_Exposure").unwrap();
        assert!(stmt.distinct);
        assert_eq!(
            stmt.generate(),
            "SELECT DISTINCT filterId FROM Science_Ccd_Exposure"
        );
    }

    #[test]
    fn restrictor_captured_not_rendered() {
        let stmt = parse_select(
            "SELECT ra FROM Object WHERE qserv_areaspec_box(0.1, 0.2, 0.3, 0.4) AND ra > 1",
        )
        .unwrap();
        let wc = stmt.where_clause().unwrap();
        assert_eq!(wc.restrictors.len(), 1);
        assert_eq!(wc.restrictors[0].name, "qserv_areaspec_box");
        assert_eq!(wc.restrictors[0].params, vec!["0.1", "0.2", "0.3", "0.4"]);
        assert_eq!(stmt.generate(), "SELECT ra FROM Object WHERE ra > 1");
    }

    #[test]
    fn restrictor_alone_leaves_no_tree() {
        let stmt =
            parse_select("SELECT ra FROM Object WHERE qserv_areaspec_circle(1, 2, 0.5)").unwrap();
        let wc = stmt.where_clause().unwrap();
        assert_eq!(wc.restrictors.len(), 1);
        assert!(wc.tree.is_none());
        assert_eq!(stmt.generate(), "SELECT ra FROM Object");
    }

    #[test]
    fn rejects_non_select() {
        let err = parse_select("DELETE FROM Object WHERE ra > 1").unwrap_err();
        assert!(matches!(err, Error::NotSelect));
    }

    #[test]
    fn rejects_subquery_predicate() {
        let err = parse_select(
            "SELECT ra FROM Object WHERE objectId IN (SELECT objectId FROM Source)",
        )
        .unwrap_err();
        assert!(matches!(err, Error::AdapterExecution { .. }), "{}", err);
    }

    #[test]
    fn rejects_cross_join() {
        let err = parse_select("SELECT a FROM Object CROSS JOIN Source").unwrap_err();
        assert!(matches!(err, Error::AdapterExecution { .. }), "{}", err);
    }

    #[test]
    fn rejects_having_without_aggregate() {
        let err = parse_select("SELECT ra FROM Object HAVING ra > 1").unwrap_err();
        assert!(matches!(err, Error::AdapterExecution { .. }), "{}", err);
    }

    #[test]
    fn accepts_having_with_aggregate() {
        let stmt = parse_select(
            "SELECT chunkId, COUNT(*) AS n FROM Object GROUP BY chunkId HAVING COUNT(*) > 5",
        )
        .unwrap();
        assert!(stmt.having().is_some());
        assert_eq!(
            stmt.generate(),
            "SELECT chunkId, COUNT(*) AS n FROM Object \
             GROUP BY chunkId HAVING COUNT(*) > 5"
        );
    }

    #[test]
    fn rejects_union() {
        let err = parse_select("SELECT a FROM T UNION SELECT a FROM U").unwrap_err();
        assert!(matches!(err, Error::AdapterExecution { .. }), "{}", err);
    }

    #[test]
    fn comma_join_becomes_from_list() {
        let stmt = parse_select(
            "SELECT o1.objectId, o2.objectId FROM Object o1, Object o2 \
             WHERE o1.objectId <> o2.objectId",
        )
        .unwrap();
        assert_eq!(stmt.from_list().len(), 2);
        assert_eq!(
            stmt.generate(),
            "SELECT o1.objectId, o2.objectId FROM Object AS o1, Object AS o2 \
             WHERE o1.objectId <> o2.objectId"
        );
    }

    #[test]
    fn arithmetic_expression() {
        let stmt = parse_select("SELECT ra + decl AS s FROM Object").unwrap();
        assert_eq!(stmt.generate(), "SELECT ra + decl AS s FROM Object");
    }

    #[test]
    fn between_and_null_predicates() {
        let stmt = parse_select(
            "SELECT ra FROM Object WHERE ra BETWEEN 1 AND 2 AND decl IS NOT NULL",
        )
        .unwrap();
        assert_eq!(
            stmt.generate(),
            "SELECT ra FROM Object WHERE ra BETWEEN 1 AND 2 AND decl IS NOT NULL"
        );
    }
}
