//! The czar process object: session registry and the exposed core
//! operations.

use crate::chunk_resolver::ChunkResolver;
use crate::config::CzarConfig;
use crate::registry::CzarRegistry;
use crate::user_query::{QueryStatus, UserQuery};
use crate::{AnalysisSnafu, Error, ParseSnafu, Result};
use chunk_meta::{CssAccess, RegionIndex, SecondaryIndex};
use dispatch::{Executive, ExecutiveConfig, MessageStore, Messenger, WorkerConnector};
use observability_deps::tracing::{debug, info};
use parking_lot::Mutex;
use result_merge::{InfileMerger, InfileMergerConfig};
use shardq_time::TimeProvider;
use snafu::ResultExt;
use sql_client::SqlConnection;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Id of one user-query session on this czar.
pub type SessionId = u64;

/// The external collaborators a czar talks to.
#[derive(Debug)]
pub struct CzarDeps {
    /// Partitioning metadata.
    pub css: CssAccess,
    /// Director-key → chunk index.
    pub secondary: Arc<dyn SecondaryIndex>,
    /// Spatial restrictor → chunk index.
    pub region: Arc<dyn RegionIndex>,
    /// Worker transport.
    pub connector: Arc<dyn WorkerConnector>,
    /// Result database connection.
    pub result_conn: Arc<dyn SqlConnection>,
    /// Query-metadata database connection.
    pub qmeta_conn: Arc<dyn SqlConnection>,
    /// Clock.
    pub time_provider: Arc<dyn TimeProvider>,
    /// Process metric registry.
    pub metrics: Arc<metric::Registry>,
}

/// The coordinator. One instance per process; immutable once built.
#[derive(Debug)]
pub struct Czar {
    name: String,
    uuid: Uuid,
    config: CzarConfig,
    css: CssAccess,
    messenger: Arc<Messenger>,
    resolver: ChunkResolver,
    result_conn: Arc<dyn SqlConnection>,
    time_provider: Arc<dyn TimeProvider>,
    metrics: Arc<metric::Registry>,
    executive_config: ExecutiveConfig,
    sessions: Mutex<HashMap<SessionId, Arc<UserQuery>>>,
    next_session_id: AtomicU64,
}

impl Czar {
    /// Register `name` and build the czar. Fails when a czar of that name
    /// is already active.
    pub async fn new(name: impl Into<String>, config: CzarConfig, deps: CzarDeps) -> Result<Self> {
        let name = name.into();
        let registry = CzarRegistry::new(Arc::clone(&deps.qmeta_conn));
        let uuid = registry.register(&name).await?;

        let messenger = Arc::new(Messenger::new(Arc::clone(&deps.connector)));
        let resolver = ChunkResolver::new(
            deps.css.clone(),
            Arc::clone(&deps.secondary),
            Arc::clone(&deps.region),
        );
        info!(%name, %uuid, "czar up");
        Ok(Self {
            name,
            uuid,
            config,
            css: deps.css,
            messenger,
            resolver,
            result_conn: deps.result_conn,
            time_provider: deps.time_provider,
            metrics: deps.metrics,
            executive_config: ExecutiveConfig::default(),
            sessions: Mutex::new(HashMap::new()),
            next_session_id: AtomicU64::new(1),
        })
    }

    /// The czar name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The czar instance id.
    pub fn uuid(&self) -> Uuid {
        self.uuid
    }

    /// Parse and analyze `sql`, wire up the session, and return its id
    /// together with the proxy-side ORDER BY text.
    ///
    /// `result_table` may be empty to let the merger pick a unique name.
    pub fn new_user_query(
        &self,
        sql: &str,
        default_db: &str,
        result_table: &str,
    ) -> Result<(SessionId, String)> {
        let stmt = sql_frontend::parse_select(sql).context(ParseSnafu)?;
        let analyzed =
            query_analysis::analyze(stmt, self.css.clone(), default_db).context(AnalysisSnafu)?;
        let proxy_order_by = analyzed.proxy_order_by.clone();

        let message_store = Arc::new(MessageStore::new(Arc::clone(&self.time_provider)));
        let merger = Arc::new(InfileMerger::new(
            InfileMergerConfig {
                target_table: result_table.to_string(),
                merge_stmt: analyzed.plan.merge.clone(),
                max_result_table_size_mb: self.config.max_result_table_size_mb,
            },
            Arc::clone(&self.result_conn),
            self.config.result_db.db.clone(),
            Arc::clone(&self.time_provider),
            &self.metrics,
        ));
        let executive = Executive::new(
            self.executive_config.clone(),
            Arc::clone(&self.messenger),
            UserQuery::response_handler(&merger),
            Arc::clone(&message_store),
            Arc::clone(&self.time_provider),
        );

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        let query = Arc::new(UserQuery::new(
            session_id,
            analyzed,
            executive,
            merger,
            message_store,
        ));
        self.sessions.lock().insert(session_id, query);
        debug!(session_id, %sql, "session created");
        Ok((session_id, proxy_order_by))
    }

    /// Fan the session's chunk queries out to the workers.
    pub async fn submit(&self, session_id: SessionId) -> Result<usize> {
        let query = self.session(session_id)?;
        query.submit(&self.resolver).await
    }

    /// Wait for the session to settle and return its status.
    pub async fn join(&self, session_id: SessionId) -> Result<QueryStatus> {
        let query = self.session(session_id)?;
        Ok(query.join().await)
    }

    /// Cancel the session's outstanding work.
    pub fn cancel(&self, session_id: SessionId) -> Result<()> {
        let query = self.session(session_id)?;
        query.cancel();
        Ok(())
    }

    /// The session object, for inspection.
    pub fn session(&self, session_id: SessionId) -> Result<Arc<UserQuery>> {
        self.sessions
            .lock()
            .get(&session_id)
            .map(Arc::clone)
            .ok_or(Error::UnknownSession { session_id })
    }
}
