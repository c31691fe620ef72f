//! Startup configuration from a flat string map.

use crate::{Error, Result};
use observability_deps::tracing::warn;
use sql_client::SqlConfig;
use std::collections::BTreeMap;
use std::str::FromStr;

/// A string-keyed configuration map with warn-and-default lookups.
#[derive(Debug, Clone, Default)]
pub struct ConfigMap {
    map: BTreeMap<String, String>,
}

impl ConfigMap {
    /// Wrap an existing map.
    pub fn new(map: BTreeMap<String, String>) -> Self {
        Self { map }
    }

    /// Parse `key value` (or `key=value`) lines.
    pub fn from_lines(text: &str) -> Self {
        let mut map = BTreeMap::new();
        for line in text.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = match line.split_once('=') {
                Some(pair) => pair,
                None => match line.split_once(char::is_whitespace) {
                    Some(pair) => pair,
                    None => continue,
                },
            };
            map.insert(key.trim().to_string(), value.trim().to_string());
        }
        Self { map }
    }

    /// The value at `key`, or `default` with a logged warning.
    pub fn get(&self, key: &str, default: &str) -> String {
        match self.map.get(key) {
            Some(value) => value.clone(),
            None => {
                warn!(key, default, "config key missing, using default");
                default.to_string()
            }
        }
    }

    /// The parsed value at `key`, or `default` with a logged warning when
    /// missing. A present but malformed value is an error.
    pub fn get_typed<T: FromStr>(&self, key: &str, default: T) -> Result<T> {
        match self.map.get(key) {
            None => {
                warn!(key, "config key missing, using default");
                Ok(default)
            }
            Some(value) => value.parse().map_err(|_| Error::Config {
                message: format!("malformed value '{}' for key {}", value, key),
            }),
        }
    }
}

/// Parsed czar configuration.
#[derive(Debug, Clone)]
pub struct CzarConfig {
    /// Worker front-end endpoint.
    pub frontend: String,
    /// Result database connection.
    pub result_db: SqlConfig,
    /// Query-metadata database connection.
    pub qmeta: SqlConfig,
    /// Metadata store technology (`mem` is the only built-in).
    pub css_technology: String,
    /// Metadata store connection string (a snapshot file for `mem`).
    pub css_connection: String,
    /// Metadata store operation timeout in milliseconds.
    pub css_timeout_ms: u32,
    /// Path to the partitioner's empty-chunk file.
    pub empty_chunk_path: String,
    /// Result size ceiling per query.
    pub max_result_table_size_mb: u64,
}

impl CzarConfig {
    /// Read the configuration, falling back to documented defaults with a
    /// logged warning per missing key.
    pub fn from_map(cm: &ConfigMap) -> Result<Self> {
        let result_db = SqlConfig {
            host: String::new(),
            port: 0,
            user: cm.get("resultdb.user", "qsmaster"),
            password: String::new(),
            db: cm.get("resultdb.db", "qservResult"),
            socket: Some(cm.get("resultdb.unix_socket", "/u1/local/mysql.sock")),
        };
        let qmeta_socket = cm.get("qmeta.unix_socket", "");
        let qmeta = SqlConfig {
            host: cm.get("qmeta.host", ""),
            port: cm.get_typed("qmeta.port", 0u16)?,
            user: cm.get("qmeta.user", "qsmaster"),
            password: cm.get("qmeta.passwd", ""),
            db: cm.get("qmeta.db", "qservMeta"),
            socket: if qmeta_socket.is_empty() {
                None
            } else {
                Some(qmeta_socket)
            },
        };
        Ok(Self {
            frontend: cm.get("frontend.xrootd", "localhost:1094"),
            result_db,
            qmeta,
            css_technology: cm.get("css.technology", "mem"),
            css_connection: cm.get("css.connection", ""),
            css_timeout_ms: cm.get_typed("css.timeout", 10_000u32)?,
            empty_chunk_path: cm.get("partitioner.emptychunkpath", "."),
            max_result_table_size_mb: cm.get_typed("resultdb.maxtablesize_mb", 5000u64)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_for_missing_keys() {
        let config = CzarConfig::from_map(&ConfigMap::default()).unwrap();
        assert_eq!(config.frontend, "localhost:1094");
        assert_eq!(config.result_db.user, "qsmaster");
        assert_eq!(config.result_db.db, "qservResult");
        assert_eq!(
            config.result_db.socket.as_deref(),
            Some("/u1/local/mysql.sock")
        );
        assert_eq!(config.qmeta.db, "qservMeta");
        assert_eq!(config.css_timeout_ms, 10_000);
        assert_eq!(config.empty_chunk_path, ".");
        assert_eq!(config.max_result_table_size_mb, 5000);
    }

    #[test]
    fn values_override_defaults() {
        let cm = ConfigMap::from_lines(
            "frontend.xrootd = czar-proxy:2131\n\
             # a comment\n\
             qmeta.port 3306\n\
             resultdb.maxtablesize_mb = 100\n",
        );
        let config = CzarConfig::from_map(&cm).unwrap();
        assert_eq!(config.frontend, "czar-proxy:2131");
        assert_eq!(config.qmeta.port, 3306);
        assert_eq!(config.max_result_table_size_mb, 100);
    }

    #[test]
    fn malformed_typed_value_is_config_error() {
        let cm = ConfigMap::from_lines("qmeta.port = not-a-port\n");
        assert!(matches!(
            CzarConfig::from_map(&cm),
            Err(Error::Config { .. })
        ));
    }
}
