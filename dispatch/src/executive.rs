//! The per-query executive: owns the outstanding request set and drives
//! each request's state machine.

use crate::message_store::{MessageStore, Severity};
use crate::messenger::{encode_request, Messenger, SendOutcome};
use crate::request::{ExtendedState, JobRequest, RequestId};
use async_trait::async_trait;
use backoff::{Backoff, BackoffConfig};
use observability_deps::tracing::{debug, info, warn};
use parking_lot::Mutex;
use prost::Message;
use shardq_time::TimeProvider;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use wire_types::{
    FrameHeader, ManagementRequest, ManagementType, QueuedType, SqlRequest, WorkerResponse,
    MAX_ATTEMPTS,
};

/// Receives completed responses; implemented by the result merger.
#[async_trait]
pub trait ResponseHandler: Debug + Send + Sync {
    /// Ingest one successful response. An error is fatal for the query.
    async fn handle_response(&self, response: WorkerResponse) -> Result<(), String>;

    /// Invalidate one job attempt so that any of its rows (present or
    /// in flight) are scrubbed.
    fn prep_scrub(&self, job_id: u64, attempt_count: u32);
}

/// Executive tuning.
#[derive(Debug, Clone)]
pub struct ExecutiveConfig {
    /// Per-request expiration interval.
    pub expiration: Duration,
    /// Backoff between dispatch retries.
    pub retry_backoff: BackoffConfig,
}

impl Default for ExecutiveConfig {
    fn default() -> Self {
        Self {
            expiration: Duration::from_secs(3600),
            retry_backoff: BackoffConfig::default(),
        }
    }
}

/// One chunk's worth of work for one worker.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Job id within the user query.
    pub job_id: u64,
    /// Chunk to execute against.
    pub chunk_id: i32,
    /// Sub-chunk ids, empty unless sub-chunking applies.
    pub sub_chunk_ids: Vec<i32>,
    /// The worker owning the chunk.
    pub worker: String,
    /// Database of the chunk tables.
    pub db: String,
    /// The SQL strings to run.
    pub queries: Vec<String>,
}

/// Aggregate completion state returned by [`Executive::join`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecStatus {
    /// Requests that finished successfully.
    pub succeeded: usize,
    /// Requests that finished in any failure state.
    pub failed: usize,
    /// True when the query was cancelled.
    pub cancelled: bool,
}

impl ExecStatus {
    /// True when every request succeeded and nothing was cancelled.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && !self.cancelled
    }
}

/// Owns the request set of one user query.
#[derive(Debug)]
pub struct Executive {
    config: ExecutiveConfig,
    messenger: Arc<Messenger>,
    handler: Arc<dyn ResponseHandler>,
    message_store: Arc<MessageStore>,
    time_provider: Arc<dyn TimeProvider>,
    requests: Mutex<HashMap<RequestId, Arc<JobRequest>>>,
    next_request_id: AtomicU64,
    outstanding: AtomicUsize,
    succeeded: AtomicUsize,
    failed: AtomicUsize,
    cancelled: AtomicBool,
    completion: Notify,
}

impl Executive {
    /// A fresh executive for one user query.
    pub fn new(
        config: ExecutiveConfig,
        messenger: Arc<Messenger>,
        handler: Arc<dyn ResponseHandler>,
        message_store: Arc<MessageStore>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            messenger,
            handler,
            message_store,
            time_provider,
            requests: Mutex::new(HashMap::new()),
            next_request_id: AtomicU64::new(1),
            outstanding: AtomicUsize::new(0),
            succeeded: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            completion: Notify::new(),
        })
    }

    /// Register one job and start driving it. Returns its request id.
    pub fn add_job(self: &Arc<Self>, spec: JobSpec) -> RequestId {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let request = Arc::new(JobRequest::new(
            id,
            spec.job_id,
            spec.chunk_id,
            spec.worker.clone(),
            self.time_provider.now(),
        ));
        self.requests.lock().insert(id, Arc::clone(&request));
        self.outstanding.fetch_add(1, Ordering::SeqCst);

        let executive = Arc::clone(self);
        tokio::spawn(async move {
            executive.drive(request, spec).await;
            if executive.outstanding.fetch_sub(1, Ordering::SeqCst) == 1 {
                executive.completion.notify_waiters();
            }
        });
        id
    }

    /// The request registered under `id`.
    pub fn request(&self, id: RequestId) -> Option<Arc<JobRequest>> {
        self.requests.lock().get(&id).map(Arc::clone)
    }

    /// All registered requests.
    pub fn requests(&self) -> Vec<Arc<JobRequest>> {
        self.requests.lock().values().map(Arc::clone).collect()
    }

    /// Wait until every registered request reached a terminal state.
    pub async fn join(&self) -> ExecStatus {
        loop {
            let notified = self.completion.notified();
            if self.outstanding.load(Ordering::SeqCst) == 0 {
                break;
            }
            notified.await;
        }
        ExecStatus {
            succeeded: self.succeeded.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            cancelled: self.cancelled.load(Ordering::SeqCst),
        }
    }

    /// Cancel the query: every live request is cancelled, its attempts are
    /// invalidated, and workers that might still be processing get a stop
    /// frame.
    pub fn cancel(self: &Arc<Self>) {
        if self.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        info!("cancelling user query");
        let requests = self.requests();
        for request in requests {
            // scrub every attempt this job ever made, so late responses
            // are discarded on arrival
            for attempt in 0..=request.attempt_count().min(MAX_ATTEMPTS - 1) {
                self.handler.prep_scrub(request.job_id, attempt);
            }
            self.messenger.cancel(&request.worker, request.id);
            request.cancel();
            if !request.is_finished() {
                self.send_stop(&request.worker, request.id);
            }
        }
        self.message_store
            .add(-1, 0, Severity::Info, "query cancelled by user");
    }

    /// True once [`Executive::cancel`] ran.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// The per-query event log.
    pub fn message_store(&self) -> &Arc<MessageStore> {
        &self.message_store
    }

    // Fire-and-forget a management STOP frame for `target_id`.
    fn send_stop(self: &Arc<Self>, worker: &str, target_id: RequestId) {
        let id = self.next_request_id.fetch_add(1, Ordering::SeqCst);
        let header = FrameHeader::management(id, ManagementType::Stop);
        let payload = ManagementRequest { target_id }.encode_to_vec();
        let frame = match encode_request(&header, &payload) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(error=%e, "cannot encode stop frame");
                return;
            }
        };
        let messenger = Arc::clone(&self.messenger);
        let worker = worker.to_string();
        tokio::spawn(async move {
            let _ = messenger.send(&worker, id, frame).await;
        });
    }

    async fn drive(self: &Arc<Self>, request: Arc<JobRequest>, spec: JobSpec) {
        let mut retry_backoff = Backoff::new(&self.config.retry_backoff);
        loop {
            let attempt = request.attempt_count();
            request.mark_started(self.time_provider.now());
            debug!(id = request.id, chunk = request.chunk_id, attempt, "dispatching");

            let header = FrameHeader::queued(request.id, QueuedType::Sql);
            let payload = SqlRequest {
                job_id: request.job_id,
                attempt_count: attempt,
                db: spec.db.clone(),
                chunk_id: spec.chunk_id,
                sub_chunk_ids: spec.sub_chunk_ids.clone(),
                queries: spec.queries.clone(),
            }
            .encode_to_vec();
            let frame = match encode_request(&header, &payload) {
                Ok(frame) => frame,
                Err(e) => {
                    self.finish_failed(&request, ExtendedState::ClientError, 0, e.to_string());
                    return;
                }
            };

            let send = self.messenger.send(&request.worker, request.id, frame);
            let outcome = tokio::select! {
                _ = request.cancellation_token().cancelled() => {
                    request.finish(ExtendedState::Cancelled, self.time_provider.now());
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                timed = tokio::time::timeout(self.config.expiration, send) => match timed {
                    Err(_elapsed) => {
                        // past its expiration interval: terminal, and the
                        // worker is told to stop working on it
                        self.send_stop(&request.worker, request.id);
                        let error = crate::Error::Timeout {
                            id: request.id,
                            elapsed_ms: self.config.expiration.as_millis() as u64,
                        };
                        self.finish_failed(
                            &request,
                            ExtendedState::Expired,
                            0,
                            error.to_string(),
                        );
                        return;
                    }
                    Ok(outcome) => outcome,
                },
            };

            match outcome {
                SendOutcome::Cancelled => {
                    request.finish(ExtendedState::Cancelled, self.time_provider.now());
                    self.failed.fetch_add(1, Ordering::SeqCst);
                    return;
                }
                SendOutcome::ClientError(message) => {
                    if attempt + 1 >= MAX_ATTEMPTS {
                        let error = crate::Error::ClientError {
                            worker: request.worker.clone(),
                            message: format!("retries exhausted: {}", message),
                        };
                        self.finish_failed(
                            &request,
                            ExtendedState::ClientError,
                            0,
                            error.to_string(),
                        );
                        return;
                    }
                    // the previous attempt may have written rows; it must
                    // be invalid before the retry is in flight
                    self.handler.prep_scrub(request.job_id, attempt);
                    request.bump_attempt();
                    debug!(id = request.id, attempt = attempt + 1, %message, "retrying after client error");
                    tokio::time::sleep(retry_backoff.next()).await;
                    continue;
                }
                SendOutcome::Response(response_header, payload) => {
                    let response = match WorkerResponse::decode(response_header, &payload) {
                        Ok(response) => response,
                        Err(e) => {
                            self.finish_failed(
                                &request,
                                ExtendedState::ServerBad,
                                0,
                                format!("undecodable response: {}", e),
                            );
                            return;
                        }
                    };
                    if response.result.has_error() {
                        let code = response.result.errorcode.unwrap_or(0);
                        let message = response
                            .result
                            .errormsg
                            .clone()
                            .unwrap_or_else(|| "unspecified worker error".to_string());
                        let error = crate::Error::Worker {
                            worker: request.worker.clone(),
                            chunk_id: request.chunk_id,
                            code,
                            message,
                        };
                        self.finish_failed(
                            &request,
                            ExtendedState::ServerError,
                            code as i32,
                            error.to_string(),
                        );
                        return;
                    }
                    match self.handler.handle_response(response).await {
                        Ok(()) => {
                            request.finish(ExtendedState::Success, self.time_provider.now());
                            self.succeeded.fetch_add(1, Ordering::SeqCst);
                        }
                        Err(message) => {
                            self.finish_failed(
                                &request,
                                ExtendedState::ServerBad,
                                0,
                                format!("merge failed: {}", message),
                            );
                        }
                    }
                    return;
                }
            }
        }
    }

    fn finish_failed(
        &self,
        request: &JobRequest,
        extended: ExtendedState,
        code: i32,
        message: String,
    ) {
        warn!(id = request.id, chunk = request.chunk_id, ?extended, %message, "request failed");
        request.finish(extended, self.time_provider.now());
        self.failed.fetch_add(1, Ordering::SeqCst);
        self.message_store
            .add(request.chunk_id, code, Severity::Error, message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messenger::{WorkerConnector, WorkerStream};
    use crate::request::RequestState;
    use shardq_time::SystemProvider;
    use wire_types::{read_frame, write_frame, FrameType, ResultPayload, Row};

    #[derive(Debug, Default)]
    struct TestHandler {
        responses: Mutex<Vec<WorkerResponse>>,
        scrubbed: Mutex<Vec<(u64, u32)>>,
        fail_with: Mutex<Option<String>>,
    }

    #[async_trait]
    impl ResponseHandler for TestHandler {
        async fn handle_response(&self, response: WorkerResponse) -> Result<(), String> {
            if let Some(message) = self.fail_with.lock().clone() {
                return Err(message);
            }
            self.responses.lock().push(response);
            Ok(())
        }

        fn prep_scrub(&self, job_id: u64, attempt_count: u32) {
            self.scrubbed.lock().push((job_id, attempt_count));
        }
    }

    #[derive(Debug, Clone, Copy)]
    enum WorkerScript {
        RespondRows(usize),
        RespondError(u32),
        DropFirstConnection,
        DelayMillis(u64),
    }

    #[derive(Debug)]
    struct ScriptedConnector {
        script: WorkerScript,
        connects: Arc<Mutex<usize>>,
        seen: Arc<Mutex<Vec<FrameHeader>>>,
    }

    impl ScriptedConnector {
        fn new(script: WorkerScript) -> Self {
            Self {
                script,
                connects: Arc::new(Mutex::new(0)),
                seen: Arc::new(Mutex::new(vec![])),
            }
        }
    }

    #[async_trait]
    impl WorkerConnector for ScriptedConnector {
        async fn connect(&self, _worker: &str) -> std::io::Result<Box<dyn WorkerStream>> {
            let connect_no = {
                let mut connects = self.connects.lock();
                *connects += 1;
                *connects
            };
            let (ours, mut theirs) = tokio::io::duplex(256 * 1024);
            let script = self.script;
            let seen = Arc::clone(&self.seen);
            tokio::spawn(async move {
                loop {
                    let (header, payload) = match read_frame(&mut theirs).await {
                        Ok(frame) => frame,
                        Err(_) => return,
                    };
                    seen.lock().push(header.clone());
                    if header.frame_type == FrameType::Management as i32 {
                        let reply = ResultPayload::default();
                        write_frame(&mut theirs, &header, &reply.encode_to_vec())
                            .await
                            .ok();
                        continue;
                    }

                    let request = SqlRequest::decode(payload.as_ref()).expect("sql request");
                    let mut reply = ResultPayload {
                        job_id: request.job_id,
                        attempt_count: request.attempt_count,
                        ..Default::default()
                    };
                    match script {
                        WorkerScript::DropFirstConnection if connect_no == 1 => return,
                        WorkerScript::DropFirstConnection | WorkerScript::RespondRows(_) => {
                            let n = match script {
                                WorkerScript::RespondRows(n) => n,
                                _ => 1,
                            };
                            reply.rows = vec![Row::default(); n];
                            reply.row_count = n as u32;
                        }
                        WorkerScript::RespondError(code) => {
                            reply.errorcode = Some(code);
                            reply.errormsg = Some("disk full".to_string());
                        }
                        WorkerScript::DelayMillis(millis) => {
                            tokio::time::sleep(Duration::from_millis(millis)).await;
                        }
                    }
                    write_frame(&mut theirs, &header, &reply.encode_to_vec())
                        .await
                        .ok();
                }
            });
            Ok(Box::new(ours))
        }
    }

    fn executive_with(
        script: WorkerScript,
        config: ExecutiveConfig,
    ) -> (Arc<Executive>, Arc<TestHandler>, Arc<ScriptedConnector>) {
        test_helpers::maybe_start_logging();
        let connector = Arc::new(ScriptedConnector::new(script));
        let messenger = Arc::new(Messenger::new(Arc::<ScriptedConnector>::clone(&connector)));
        let handler = Arc::new(TestHandler::default());
        let time: Arc<dyn TimeProvider> = Arc::new(SystemProvider::new());
        let store = Arc::new(MessageStore::new(Arc::clone(&time)));
        let executive = Executive::new(
            config,
            messenger,
            Arc::<TestHandler>::clone(&handler),
            store,
            time,
        );
        (executive, handler, connector)
    }

    fn spec(job_id: u64, chunk_id: i32, worker: &str) -> JobSpec {
        JobSpec {
            job_id,
            chunk_id,
            sub_chunk_ids: vec![],
            worker: worker.to_string(),
            db: "LSST".to_string(),
            queries: vec![format!("SELECT * FROM T_{}", chunk_id)],
        }
    }

    #[tokio::test]
    async fn fan_out_success() {
        let (executive, handler, _) =
            executive_with(WorkerScript::RespondRows(2), ExecutiveConfig::default());
        for (job, chunk) in [(0u64, 100), (1, 101), (2, 102)] {
            executive.add_job(spec(job, chunk, "w1"));
        }
        let status = executive.join().await;
        assert!(status.is_success());
        assert_eq!(status.succeeded, 3);

        let responses = handler.responses.lock();
        assert_eq!(responses.len(), 3);
        for request in executive.requests() {
            assert_eq!(
                request.state(),
                (RequestState::Finished, ExtendedState::Success)
            );
        }
    }

    #[tokio::test]
    async fn worker_error_attributed_once() {
        let (executive, _, _) =
            executive_with(WorkerScript::RespondError(7), ExecutiveConfig::default());
        executive.add_job(spec(0, 100, "w1"));
        let status = executive.join().await;
        assert!(!status.is_success());
        assert_eq!(status.failed, 1);

        let errors = executive.message_store().errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].chunk_id, 100);
        assert_eq!(errors[0].code, 7);
        assert!(errors[0].message.contains("disk full"));

        let request = &executive.requests()[0];
        assert_eq!(
            request.state(),
            (RequestState::Finished, ExtendedState::ServerError)
        );
    }

    #[tokio::test]
    async fn client_error_retries_and_scrubs_previous_attempt() {
        let config = ExecutiveConfig {
            retry_backoff: BackoffConfig {
                init_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(2),
                base: 1.1,
            },
            ..Default::default()
        };
        let (executive, handler, _) =
            executive_with(WorkerScript::DropFirstConnection, config);
        executive.add_job(spec(4, 100, "w1"));
        let status = executive.join().await;
        assert!(status.is_success(), "{:?}", status);

        // the failed attempt 0 was invalidated before attempt 1 went out
        assert_eq!(handler.scrubbed.lock().as_slice(), &[(4, 0)]);
        let responses = handler.responses.lock();
        assert_eq!(responses[0].result.attempt_count, 1);
        assert_eq!(executive.requests()[0].attempt_count(), 1);
    }

    #[tokio::test]
    async fn cancel_finishes_everything_cancelled() {
        let (executive, handler, _) = executive_with(
            WorkerScript::DelayMillis(60_000),
            ExecutiveConfig::default(),
        );
        for (job, chunk) in [(0u64, 100), (1, 101)] {
            executive.add_job(spec(job, chunk, "w1"));
        }
        // give the drivers a chance to dispatch
        tokio::time::sleep(Duration::from_millis(50)).await;
        executive.cancel();
        let status = executive.join().await;
        assert!(status.cancelled);
        assert_eq!(status.failed, 2);
        for request in executive.requests() {
            assert_eq!(
                request.state(),
                (RequestState::Finished, ExtendedState::Cancelled)
            );
        }
        // every attempt of every job was invalidated
        let scrubbed = handler.scrubbed.lock();
        assert!(scrubbed.contains(&(0, 0)));
        assert!(scrubbed.contains(&(1, 0)));
    }

    #[tokio::test]
    async fn expiration_stops_the_worker() {
        let config = ExecutiveConfig {
            expiration: Duration::from_millis(50),
            ..Default::default()
        };
        let (executive, _, connector) =
            executive_with(WorkerScript::DelayMillis(200), config);
        executive.add_job(spec(0, 100, "w1"));
        let status = executive.join().await;
        assert_eq!(status.failed, 1);
        assert_eq!(
            executive.requests()[0].state(),
            (RequestState::Finished, ExtendedState::Expired)
        );

        // the worker eventually sees the STOP management frame
        for _ in 0..50 {
            let stop_seen = connector
                .seen
                .lock()
                .iter()
                .any(|h| h.frame_type == FrameType::Management as i32);
            if stop_seen {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("no STOP frame reached the worker");
    }

    #[tokio::test]
    async fn merge_failure_fails_the_query() {
        let (executive, handler, _) =
            executive_with(WorkerScript::RespondRows(1), ExecutiveConfig::default());
        *handler.fail_with.lock() = Some("result table too large".to_string());
        executive.add_job(spec(0, 100, "w1"));
        let status = executive.join().await;
        assert!(!status.is_success());
        let errors = executive.message_store().errors();
        assert!(errors[0].message.contains("result table too large"));
    }
}
