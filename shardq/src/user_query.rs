//! One user query from analysis through merge.

use crate::chunk_resolver::ChunkResolver;
use crate::Result;
use async_trait::async_trait;
use dispatch::{Executive, JobSpec, MessageStore, ResponseHandler, StoredMessage};
use observability_deps::tracing::{debug, info};
use parking_lot::Mutex;
use query_analysis::AnalyzedQuery;
use result_merge::InfileMerger;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use wire_types::WorkerResponse;

/// Final disposition of one user query.
#[derive(Debug, Clone)]
pub enum QueryStatus {
    /// All requests merged and the result table is ready.
    Success {
        /// The user-visible result table.
        result_table: String,
    },
    /// The query failed; the result table was dropped.
    Failed {
        /// Top-level error message.
        message: String,
        /// Underlying causes, in occurrence order.
        errors: Vec<StoredMessage>,
    },
    /// The user cancelled; the result table was dropped.
    Cancelled,
}

// Bridges completed responses from the executive into the merger.
#[derive(Debug)]
struct MergeAdapter {
    merger: Arc<InfileMerger>,
}

#[async_trait]
impl ResponseHandler for MergeAdapter {
    async fn handle_response(&self, response: WorkerResponse) -> Result<(), String> {
        self.merger
            .merge(&response)
            .await
            .map_err(|e| e.to_string())
    }

    fn prep_scrub(&self, job_id: u64, attempt_count: u32) {
        // an out-of-range attempt can only come from a worker bug; the
        // response carrying it is rejected at merge time
        let _ = self.merger.prep_scrub(job_id, attempt_count);
    }
}

/// The state of one submitted query.
#[derive(Debug)]
pub struct UserQuery {
    session_id: u64,
    analyzed: AnalyzedQuery,
    executive: Arc<Executive>,
    merger: Arc<InfileMerger>,
    message_store: Arc<MessageStore>,
    submitted: AtomicBool,
    status: Mutex<Option<QueryStatus>>,
}

impl UserQuery {
    pub(crate) fn new(
        session_id: u64,
        analyzed: AnalyzedQuery,
        executive: Arc<Executive>,
        merger: Arc<InfileMerger>,
        message_store: Arc<MessageStore>,
    ) -> Self {
        Self {
            session_id,
            analyzed,
            executive,
            merger,
            message_store,
            submitted: AtomicBool::new(false),
            status: Mutex::new(None),
        }
    }

    pub(crate) fn response_handler(merger: &Arc<InfileMerger>) -> Arc<dyn ResponseHandler> {
        Arc::new(MergeAdapter {
            merger: Arc::clone(merger),
        })
    }

    /// The session id.
    pub fn session_id(&self) -> u64 {
        self.session_id
    }

    /// The plan and context of this query.
    pub fn analyzed(&self) -> &AnalyzedQuery {
        &self.analyzed
    }

    /// The result table this query writes.
    pub fn result_table(&self) -> &str {
        self.merger.target_table()
    }

    /// The dispatched requests, for status inspection.
    pub fn executive_requests(&self) -> Vec<Arc<dispatch::JobRequest>> {
        self.executive.requests()
    }

    /// Resolve the chunk set and hand one job per chunk to the executive.
    /// Returns the number of dispatched jobs.
    pub async fn submit(&self, resolver: &ChunkResolver) -> Result<usize> {
        if self.submitted.swap(true, Ordering::SeqCst) {
            return Ok(self.executive.requests().len());
        }
        let plan = &self.analyzed.plan;
        let db = plan.dominant_db.clone();
        let templates: Vec<String> = plan.parallel.iter().map(|s| s.generate()).collect();

        let chunks = resolver
            .resolve(&db, &plan.mapping, &self.analyzed.context.restrictors)
            .await?;
        let specs = chunk_spec::build_chunk_query_specs(&db, &templates, &plan.mapping, &chunks);

        for (job_id, spec) in specs.iter().enumerate() {
            let worker = resolver.worker_for(&db, spec.chunk_id)?;
            self.executive.add_job(JobSpec {
                job_id: job_id as u64,
                chunk_id: spec.chunk_id,
                sub_chunk_ids: spec.sub_chunk_ids.clone(),
                worker,
                db: db.clone(),
                queries: spec.queries.clone(),
            });
        }
        info!(
            session = self.session_id,
            jobs = specs.len(),
            "query submitted"
        );
        Ok(specs.len())
    }

    /// Wait for all requests, then finalize or clean up. Idempotent: a
    /// second call returns the settled status.
    pub async fn join(&self) -> QueryStatus {
        if let Some(status) = self.status.lock().clone() {
            return status;
        }
        let exec_status = self.executive.join().await;
        debug!(session = self.session_id, ?exec_status, "requests complete");

        let status = if self.executive.is_cancelled() {
            self.merger.drop_result_tables().await;
            QueryStatus::Cancelled
        } else if !exec_status.is_success() {
            self.merger.drop_result_tables().await;
            let errors = self.message_store.errors();
            let message = errors
                .first()
                .map(|m| m.message.clone())
                .unwrap_or_else(|| "query failed".to_string());
            QueryStatus::Failed { message, errors }
        } else {
            match self.merger.finalize().await {
                Ok(()) => QueryStatus::Success {
                    result_table: self.merger.target_table().to_string(),
                },
                Err(e) => {
                    self.merger.drop_result_tables().await;
                    QueryStatus::Failed {
                        message: e.to_string(),
                        errors: self.message_store.errors(),
                    }
                }
            }
        };
        *self.status.lock() = Some(status.clone());
        status
    }

    /// Cancel all outstanding requests; `join` settles the cleanup.
    pub fn cancel(&self) {
        self.executive.cancel();
    }
}
