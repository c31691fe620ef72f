//! Worker wire protocol: message types and framing.
//!
//! A frame on the wire is the triple
//!
//! ```text
//! [1 byte]  length H of the serialized header
//! [H bytes] FrameHeader (carries the payload length P)
//! [P bytes] payload message
//! ```
//!
//! Messages are hand-written prost structs; there is no build-time
//! code generation.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(
    missing_debug_implementations,
    clippy::explicit_iter_loop,
    clippy::use_self,
    clippy::clone_on_ref_ptr
)]

mod frame;
mod job_id;
mod messages;

pub use frame::{encode_frame, read_frame, write_frame, FrameError, MAX_HEADER_LEN};
pub use job_id::{AttemptOverflow, JobIdAttempt, MAX_ATTEMPTS};
pub use messages::*;

use prost::Message;

/// A fully decoded worker response.
#[derive(Debug, Clone)]
pub struct WorkerResponse {
    /// The frame header the payload arrived under.
    pub header: FrameHeader,
    /// The decoded result payload.
    pub result: ResultPayload,
}

impl WorkerResponse {
    /// Decode a response payload under `header`.
    pub fn decode(header: FrameHeader, payload: &[u8]) -> Result<Self, prost::DecodeError> {
        Ok(Self {
            header,
            result: ResultPayload::decode(payload)?,
        })
    }
}
