//! Access to the central metadata store (CSS) consulted during planning:
//! which tables are partitioned, the director table and its key column,
//! stripe counts, empty chunks, and chunk placement.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod css;
mod kv;
mod region;
mod secondary;

pub use css::CssAccess;
pub use kv::{KvInterface, MemKvInterface};
pub use region::{MemRegionIndex, RegionIndex};
pub use secondary::{MemSecondaryIndex, SecondaryIndex};

use snafu::Snafu;

/// Integer id of a chunk.
pub type ChunkId = i32;

/// Metadata access errors.
#[derive(Debug, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("no metadata for database {}", db))]
    UnknownDatabase { db: String },

    #[snafu(display("no metadata for table {}.{}", db, table))]
    UnknownTable { db: String, table: String },

    #[snafu(display("missing metadata key {}", key))]
    MissingKey { key: String },

    #[snafu(display("malformed metadata at {}: {}", key, value))]
    MalformedValue { key: String, value: String },

    #[snafu(display("cannot read empty chunk file {}: {}", path, source))]
    EmptyChunkFile {
        path: String,
        source: std::io::Error,
    },

    #[snafu(display("secondary index lookup failed: {}", message))]
    SecondaryIndex { message: String },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;
