//! Typed intermediate representation of the supported SQL dialect.
//!
//! The IR is a plain owned tree: nodes hold their children by value and
//! cloning is always a deep structural copy. Table references are compared
//! structurally (see [`ColumnRef::is_subset_of`]) instead of holding
//! back-references into the FROM list, which keeps the tree free of cycles
//! and aliasing.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod bool_term;
mod column_ref;
mod func_expr;
mod identifier;
mod query_template;
mod select_stmt;
mod table_ref;
mod value_expr;

pub use bool_term::{BfTerm, BoolFactor, BoolTerm, CompOp};
pub use column_ref::ColumnRef;
pub use func_expr::FuncExpr;
pub use identifier::{Identifier, QuoteMode};
pub use query_template::QueryTemplate;
pub use select_stmt::{OrderByTerm, OrderDirection, Restrictor, SelectStmt, WhereClause};
pub use table_ref::{JoinRef, JoinSpec, JoinType, TableRef};
pub use value_expr::{BinOp, FactorOp, ValueExpr, ValueFactor};

use snafu::Snafu;

/// Errors constructing or manipulating IR nodes.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("operator added to an expression with no factors"))]
    OpWithoutFactor,

    #[snafu(display("table reference has a database but no table: {}", db))]
    DbWithoutTable { db: String },

    #[snafu(display("table reference has no table and no default database applies"))]
    UnpopulatedTable,

    #[snafu(display("no database for table {} and no default database applies", table))]
    MissingDb { table: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;
