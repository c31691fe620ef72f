//! The czar: coordinator of the sharded SQL engine.
//!
//! Takes a user SELECT, plans it into per-chunk worker queries, fans them
//! out, merges the streamed results and hands back a single result table.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod chunk_resolver;
mod config;
mod czar;
mod registry;
mod secondary_sql;
mod user_query;

pub use config::{ConfigMap, CzarConfig};
pub use czar::{Czar, CzarDeps, SessionId};
pub use registry::CzarRegistry;
pub use secondary_sql::SqlSecondaryIndex;
pub use user_query::{QueryStatus, UserQuery};

use snafu::Snafu;

/// Top-level query errors, folding the per-layer kinds.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("configuration error: {}", message))]
    Config { message: String },

    #[snafu(display("parse error: {}", source))]
    Parse { source: sql_frontend::Error },

    #[snafu(display("analysis error: {}", source))]
    Analysis { source: query_analysis::Error },

    #[snafu(display("metadata error: {}", source))]
    Metadata { source: chunk_meta::Error },

    #[snafu(display("merge error: {}", source))]
    Merge { source: result_merge::Error },

    #[snafu(display("unknown session {}", session_id))]
    UnknownSession { session_id: u64 },

    #[snafu(display("czar '{}' is already registered and active", name))]
    AlreadyRegistered { name: String },

    #[snafu(display("registration failed: {}", source))]
    Registration { source: sql_client::SqlError },

    #[snafu(display("internal error: {}", message))]
    Internal { message: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;
