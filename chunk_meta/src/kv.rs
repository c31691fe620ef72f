//! The key-value interface the CSS is published through.

use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::fmt::Debug;

/// A read-only view of the metadata key-value store.
///
/// Keys are `/`-separated paths; values are flat strings. The store is a
/// snapshot: planning never observes a partially applied update.
pub trait KvInterface: Debug + Send + Sync {
    /// The value at `key`, or `None`.
    fn get(&self, key: &str) -> Option<String>;

    /// Direct child names under the `/`-separated path `key`.
    fn children(&self, key: &str) -> Vec<String>;

    /// True if `key` exists (possibly only as an interior path node).
    fn exists(&self, key: &str) -> bool;
}

/// In-memory [`KvInterface`], used by tests and by deployments that load
/// the metadata snapshot from configuration.
#[derive(Debug, Default)]
pub struct MemKvInterface {
    data: RwLock<BTreeMap<String, String>>,
}

impl MemKvInterface {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store seeded with `pairs`.
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let store = Self::new();
        for (k, v) in pairs {
            store.set(k, v);
        }
        store
    }

    /// Insert or replace a key.
    pub fn set(&self, key: impl Into<String>, value: impl Into<String>) {
        self.data.write().insert(key.into(), value.into());
    }
}

impl KvInterface for MemKvInterface {
    fn get(&self, key: &str) -> Option<String> {
        self.data.read().get(key).cloned()
    }

    fn children(&self, key: &str) -> Vec<String> {
        let prefix = format!("{}/", key.trim_end_matches('/'));
        let data = self.data.read();
        let mut out: Vec<String> = data
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .map(|(k, _)| {
                let rest = &k[prefix.len()..];
                match rest.find('/') {
                    Some(idx) => rest[..idx].to_string(),
                    None => rest.to_string(),
                }
            })
            .collect();
        out.dedup();
        out
    }

    fn exists(&self, key: &str) -> bool {
        let data = self.data.read();
        if data.contains_key(key) {
            return true;
        }
        let prefix = format!("{}/", key.trim_end_matches('/'));
        data.range(prefix.clone()..)
            .next()
            .map(|(k, _)| k.starts_with(&prefix))
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_and_exists() {
        let kv = MemKvInterface::from_pairs([("/DBS/LSST/TABLES/Object/schema", "ra,decl")]);
        assert_eq!(
            kv.get("/DBS/LSST/TABLES/Object/schema").as_deref(),
            Some("ra,decl")
        );
        assert!(kv.exists("/DBS/LSST"));
        assert!(kv.exists("/DBS/LSST/TABLES/Object"));
        assert!(!kv.exists("/DBS/Other"));
    }

    #[test]
    fn children_lists_unique_names() {
        let kv = MemKvInterface::from_pairs([
            ("/DBS/LSST/TABLES/Object/schema", "a"),
            ("/DBS/LSST/TABLES/Object/partitioning", "1"),
            ("/DBS/LSST/TABLES/Source/schema", "b"),
        ]);
        assert_eq!(kv.children("/DBS/LSST/TABLES"), vec!["Object", "Source"]);
    }
}
