//! Crate that pins the tracing version used across the workspace.
//!
//! Every other crate gets its logging macros from here instead of depending
//! on `tracing` directly, so that the version (and the compile-time max
//! level) is decided in exactly one place.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_docs)]

/// The tracing crate re-exported for use by dependent crates.
pub use tracing;
