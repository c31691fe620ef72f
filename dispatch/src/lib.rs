//! Fan-out of one user query to its workers: request lifecycle, connection
//! multiplexing and completion tracking.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod admin;
mod executive;
mod message_store;
mod messenger;
mod request;

pub use admin::{request_status, request_stop, service_request};
pub use executive::{ExecStatus, Executive, ExecutiveConfig, JobSpec, ResponseHandler};
pub use message_store::{MessageStore, Severity, StoredMessage};
pub use messenger::{Messenger, SendOutcome, TcpConnector, WorkerConnector, WorkerStream};
pub use request::{ExtendedState, JobRequest, RequestId, RequestState};

use snafu::Snafu;

/// Dispatch-layer errors.
#[derive(Debug, Clone, Snafu)]
#[allow(missing_docs)]
pub enum Error {
    #[snafu(display("client-side failure talking to worker {}: {}", worker, message))]
    ClientError { worker: String, message: String },

    #[snafu(display("request {} expired after {}ms", id, elapsed_ms))]
    Timeout { id: u64, elapsed_ms: u64 },

    #[snafu(display("request {} cancelled", id))]
    Cancelled { id: u64 },

    #[snafu(display("worker {} reported error {} for chunk {}: {}", worker, code, chunk_id, message))]
    Worker {
        worker: String,
        chunk_id: i32,
        code: u32,
        message: String,
    },
}

#[allow(missing_docs)]
pub type Result<T, E = Error> = std::result::Result<T, E>;
