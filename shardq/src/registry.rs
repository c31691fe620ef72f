//! Czar registration in the query-metadata database.

use crate::{Error, RegistrationSnafu, Result};
use observability_deps::tracing::info;
use snafu::ResultExt;
use sql_client::SqlConnection;
use std::sync::Arc;
use uuid::Uuid;

/// Registers the czar's identity at startup.
///
/// A czar name maps to at most one active instance; registering a name
/// that is already active fails instead of taking over.
#[derive(Debug)]
pub struct CzarRegistry {
    conn: Arc<dyn SqlConnection>,
}

impl CzarRegistry {
    /// A registry over the metadata database connection.
    pub fn new(conn: Arc<dyn SqlConnection>) -> Self {
        Self { conn }
    }

    /// Register `name` with a fresh instance id. Fails when an active row
    /// for the name exists.
    pub async fn register(&self, name: &str) -> Result<Uuid> {
        let existing = self
            .conn
            .query(&format!(
                "SELECT czarId FROM czar WHERE czarName = '{}' AND active = 1",
                name
            ))
            .await
            .context(RegistrationSnafu)?;
        if !existing.rows.is_empty() {
            return Err(Error::AlreadyRegistered {
                name: name.to_string(),
            });
        }

        let id = Uuid::new_v4();
        self.conn
            .exec(&format!(
                "INSERT INTO czar (czarName, czarUuid, active) VALUES ('{}', '{}', 1)",
                name, id
            ))
            .await
            .context(RegistrationSnafu)?;
        info!(%name, uuid = %id, "czar registered");
        Ok(id)
    }

    /// Mark `name` inactive on shutdown.
    pub async fn deactivate(&self, name: &str) -> Result<()> {
        self.conn
            .exec(&format!(
                "UPDATE czar SET active = 0 WHERE czarName = '{}'",
                name
            ))
            .await
            .context(RegistrationSnafu)
    }
}
