//! The per-worker request record and its state machine states.

use parking_lot::Mutex;
use shardq_time::Time;
use std::sync::atomic::{AtomicU32, Ordering};
use tokio_util::sync::CancellationToken;

/// Request id, unique per czar process.
pub type RequestId = u64;

/// Coarse lifecycle state of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    /// Constructed, not yet dispatched.
    Created,
    /// Dispatched, awaiting its response.
    InProgress,
    /// Terminal.
    Finished,
}

/// The terminal (or progress) detail accompanying [`RequestState`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtendedState {
    /// Not finished yet.
    None,
    /// Completed successfully.
    Success,
    /// Client-side communication failure.
    ClientError,
    /// Worker accepted and queued the request.
    ServerQueued,
    /// Worker is executing the request.
    ServerInProgress,
    /// Worker is cancelling the request.
    ServerIsCancelling,
    /// Worker reported an execution error.
    ServerError,
    /// Worker cancelled the request.
    ServerCancelled,
    /// Worker response was unusable.
    ServerBad,
    /// The expiration timer fired before a response arrived.
    Expired,
    /// A worker-side timeout expired.
    TimeoutExpired,
    /// Cancelled by the user.
    Cancelled,
}

/// Timing of one request as observed by the czar.
#[derive(Debug, Clone, Copy)]
pub struct RequestTiming {
    /// When the request was created.
    pub created: Time,
    /// When the first dispatch attempt started.
    pub started: Option<Time>,
    /// When the request reached a terminal state.
    pub finished: Option<Time>,
}

/// One chunk-query request bound to a worker.
#[derive(Debug)]
pub struct JobRequest {
    /// Request id (doubles as the wire correlation id).
    pub id: RequestId,
    /// Job id within the user query.
    pub job_id: u64,
    /// The chunk this request covers.
    pub chunk_id: i32,
    /// The worker owning the chunk.
    pub worker: String,
    /// Dispatch priority (lower runs earlier); currently informational.
    pub priority: i32,
    attempt: AtomicU32,
    state: Mutex<(RequestState, ExtendedState)>,
    timing: Mutex<RequestTiming>,
    cancel: CancellationToken,
}

impl JobRequest {
    /// A fresh request in `Created` state.
    pub fn new(id: RequestId, job_id: u64, chunk_id: i32, worker: String, created: Time) -> Self {
        Self {
            id,
            job_id,
            chunk_id,
            worker,
            priority: 0,
            attempt: AtomicU32::new(0),
            state: Mutex::new((RequestState::Created, ExtendedState::None)),
            timing: Mutex::new(RequestTiming {
                created,
                started: None,
                finished: None,
            }),
            cancel: CancellationToken::new(),
        }
    }

    /// The current attempt number, starting at 0.
    pub fn attempt_count(&self) -> u32 {
        self.attempt.load(Ordering::SeqCst)
    }

    /// Move to the next attempt; returns the new attempt number.
    pub fn bump_attempt(&self) -> u32 {
        self.attempt.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// The (state, extended state) pair.
    pub fn state(&self) -> (RequestState, ExtendedState) {
        *self.state.lock()
    }

    /// Mark the request dispatched.
    pub fn mark_started(&self, now: Time) {
        *self.state.lock() = (RequestState::InProgress, ExtendedState::None);
        let mut timing = self.timing.lock();
        if timing.started.is_none() {
            timing.started = Some(now);
        }
    }

    /// Move to the terminal state. The first terminal transition wins;
    /// later ones are ignored.
    pub fn finish(&self, extended: ExtendedState, now: Time) {
        let mut state = self.state.lock();
        if state.0 == RequestState::Finished {
            return;
        }
        *state = (RequestState::Finished, extended);
        let mut timing = self.timing.lock();
        if timing.finished.is_none() {
            timing.finished = Some(now);
        }
    }

    /// True once terminal.
    pub fn is_finished(&self) -> bool {
        self.state.lock().0 == RequestState::Finished
    }

    /// The cancellation token observed by the request driver.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Request cancellation; the driver completes the transition.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A copy of the timing record.
    pub fn timing(&self) -> RequestTiming {
        *self.timing.lock()
    }
}
