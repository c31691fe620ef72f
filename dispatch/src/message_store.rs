//! Per-query event log, surfaced as the multi-error list of a failed
//! query.

use parking_lot::Mutex;
use shardq_time::{Time, TimeProvider};
use std::sync::Arc;

/// Severity of a stored message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Informational progress event.
    Info,
    /// An error contributing to query failure.
    Error,
}

/// One recorded event.
#[derive(Debug, Clone)]
pub struct StoredMessage {
    /// The chunk the event concerns, or -1 for query-level events.
    pub chunk_id: i32,
    /// Numeric code (worker error codes pass through here).
    pub code: i32,
    /// Event severity.
    pub severity: Severity,
    /// Human-readable text.
    pub message: String,
    /// When the event was recorded.
    pub timestamp: Time,
}

/// Collects events of one user query in insertion order.
#[derive(Debug)]
pub struct MessageStore {
    time_provider: Arc<dyn TimeProvider>,
    messages: Mutex<Vec<StoredMessage>>,
}

impl MessageStore {
    /// An empty store.
    pub fn new(time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            time_provider,
            messages: Mutex::new(vec![]),
        }
    }

    /// Record one event.
    pub fn add(&self, chunk_id: i32, code: i32, severity: Severity, message: impl Into<String>) {
        self.messages.lock().push(StoredMessage {
            chunk_id,
            code,
            severity,
            message: message.into(),
            timestamp: self.time_provider.now(),
        });
    }

    /// All events, in insertion order.
    pub fn messages(&self) -> Vec<StoredMessage> {
        self.messages.lock().clone()
    }

    /// Only the error events, in insertion order.
    pub fn errors(&self) -> Vec<StoredMessage> {
        self.messages
            .lock()
            .iter()
            .filter(|m| m.severity == Severity::Error)
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shardq_time::{MockProvider, Time};

    #[test]
    fn insertion_order_and_severity_filter() {
        let time = Arc::new(MockProvider::new(Time::from_timestamp_nanos(0)));
        let store = MessageStore::new(Arc::<MockProvider>::clone(&time));
        store.add(100, 0, Severity::Info, "dispatched");
        time.inc(std::time::Duration::from_millis(5));
        store.add(100, 7, Severity::Error, "disk full");
        store.add(101, 0, Severity::Info, "dispatched");

        let all = store.messages();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].message, "dispatched");
        assert!(all[1].timestamp > all[0].timestamp);

        let errors = store.errors();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].chunk_id, 100);
        assert_eq!(errors[0].code, 7);
    }
}
