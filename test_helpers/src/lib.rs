//! Shared helpers for tests across the workspace.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(clippy::explicit_iter_loop, clippy::use_self, clippy::clone_on_ref_ptr)]

use parking_lot::Once;
use tracing_subscriber::EnvFilter;

static LOG_SETUP: Once = Once::new();

/// Start tracing output for a test if the `RUST_LOG` environment variable is
/// set. Does nothing otherwise, so quiet test runs stay quiet.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

/// Unconditionally start tracing output for a test, honoring `RUST_LOG` for
/// the filter. Safe to call from many tests; only the first call installs
/// the subscriber.
pub fn start_logging() {
    LOG_SETUP.call_once(|| {
        tracing_log::LogTracer::init().expect("log forwarder install");
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .finish();
        observability_deps::tracing::subscriber::set_global_default(subscriber)
            .expect("subscriber install");
    });
}

/// Assert that `actual` contains the substring `expected`, with a readable
/// failure message.
#[macro_export]
macro_rules! assert_contains {
    ($actual:expr, $expected:expr) => {{
        let actual = $actual.to_string();
        let expected = $expected.to_string();
        assert!(
            actual.contains(&expected),
            "expected {:?} to contain {:?}",
            actual,
            expected
        )
    }};
}

/// Assert that `actual` does not contain the substring `expected`.
#[macro_export]
macro_rules! assert_not_contains {
    ($actual:expr, $expected:expr) => {{
        let actual = $actual.to_string();
        let expected = $expected.to_string();
        assert!(
            !actual.contains(&expected),
            "expected {:?} to not contain {:?}",
            actual,
            expected
        )
    }};
}
