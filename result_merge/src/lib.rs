//! Streaming ingestion of worker result frames into the per-query result
//! table, with invalid-attempt scrubbing, a result-size ceiling and final
//! merge execution.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod invalid;
mod merger;
mod result_table;
mod rows;

pub use invalid::InvalidAttemptMgr;
pub use merger::{InfileMerger, InfileMergerConfig};
pub use result_table::ResultTableManager;

use snafu::Snafu;

/// Merge errors. Fatal for the query: no partial result table survives a
/// failed merge.
#[derive(Debug, Clone, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("result database connection failed: {}", message))]
    MysqlConnect { message: String },

    #[snafu(display("result database statement failed: {}", source))]
    MysqlExec { source: sql_client::SqlError },

    #[snafu(display("cannot import response header: {}", message))]
    HeaderImport { message: String },

    #[snafu(display("cannot import result rows: {}", message))]
    ResultImport { message: String },

    #[snafu(display("cannot create result table {}: {}", table, message))]
    CreateTable { table: String, message: String },

    #[snafu(display(
        "result table too large: {} MB exceeds the {} MB ceiling",
        size_mb,
        max_mb
    ))]
    ResultTooLarge { size_mb: u64, max_mb: u64 },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;
