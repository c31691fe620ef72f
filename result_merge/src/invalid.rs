//! Tracking of invalidated job attempts and the row-delete protocol.
//!
//! Deleting rows of retried attempts is expensive and only safe while
//! nothing writes to the table, so writers are counted and deletes wait
//! for the count to drain. One mutex guards the whole state; waiters are
//! woken through a notifier.

use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::future::Future;
use tokio::sync::Notify;
use wire_types::JobIdAttempt;

#[derive(Debug, Default)]
struct State {
    /// Attempts explicitly invalidated.
    invalid: BTreeSet<i64>,
    /// Invalidated attempts that previously wrote rows: the delete set.
    invalid_with_rows: BTreeSet<i64>,
    /// Attempts that wrote at least one row.
    have_rows: BTreeSet<i64>,
    /// Writers currently appending to the table.
    concurrent_merge_count: usize,
    /// New writers block while a delete pass wants the table.
    wait: bool,
}

/// Shared invalid-attempt bookkeeping of one result table.
#[derive(Debug, Default)]
pub struct InvalidAttemptMgr {
    state: Mutex<State>,
    notify: Notify,
}

impl InvalidAttemptMgr {
    /// Fresh bookkeeping with nothing invalidated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a writer for `attempt`.
    ///
    /// Returns true when the attempt is invalid (the caller must discard
    /// the rows without writing). Blocks while a row delete is pending,
    /// and re-checks validity afterwards.
    pub async fn incr_concurrent_merge_count(&self, attempt: JobIdAttempt) -> bool {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if state.invalid.contains(&attempt.value()) {
                    return true;
                }
                if !state.wait {
                    state.have_rows.insert(attempt.value());
                    state.concurrent_merge_count += 1;
                    return false;
                }
            }
            notified.await;
        }
    }

    /// Unregister a writer; wakes a pending delete when the count drains.
    pub fn decr_concurrent_merge_count(&self) {
        let mut state = self.state.lock();
        assert!(state.concurrent_merge_count > 0);
        state.concurrent_merge_count -= 1;
        if state.concurrent_merge_count == 0 {
            self.notify.notify_waiters();
        }
    }

    /// Invalidate `attempt`. Returns true when the attempt had written
    /// rows, i.e. the table needs a delete pass.
    pub fn prep_scrub(&self, attempt: JobIdAttempt) -> bool {
        let mut state = self.state.lock();
        state.invalid.insert(attempt.value());
        let has_rows = state.have_rows.contains(&attempt.value());
        if has_rows {
            state.invalid_with_rows.insert(attempt.value());
        }
        has_rows
    }

    /// True if `attempt` has been invalidated.
    pub fn is_invalid(&self, attempt: JobIdAttempt) -> bool {
        self.state.lock().invalid.contains(&attempt.value())
    }

    /// Stop new writers, wait for running ones, and hand the delete set to
    /// `delete`. On success the delete set is cleared. Returns the delete
    /// outcome (true when nothing needed deleting).
    pub async fn hold_merging_for_row_delete<F, Fut>(&self, delete: F) -> bool
    where
        F: FnOnce(BTreeSet<i64>) -> Fut,
        Fut: Future<Output = bool>,
    {
        {
            let mut state = self.state.lock();
            if state.invalid_with_rows.is_empty() {
                return true;
            }
            state.wait = true;
        }

        loop {
            let notified = self.notify.notified();
            {
                let state = self.state.lock();
                if state.concurrent_merge_count == 0 {
                    break;
                }
            }
            notified.await;
        }

        let to_delete = self.state.lock().invalid_with_rows.clone();
        let ok = delete(to_delete).await;

        {
            let mut state = self.state.lock();
            if ok {
                state.invalid_with_rows.clear();
            }
            state.wait = false;
        }
        self.notify.notify_waiters();
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn attempt(job: u64, n: u32) -> JobIdAttempt {
        JobIdAttempt::try_new(job, n).unwrap()
    }

    #[tokio::test]
    async fn invalid_attempts_are_discarded() {
        let mgr = InvalidAttemptMgr::new();
        assert!(!mgr.prep_scrub(attempt(1, 0)));
        assert!(mgr.incr_concurrent_merge_count(attempt(1, 0)).await);
        assert!(!mgr.incr_concurrent_merge_count(attempt(1, 1)).await);
        mgr.decr_concurrent_merge_count();
    }

    #[tokio::test]
    async fn scrub_after_rows_fills_delete_set() {
        let mgr = InvalidAttemptMgr::new();
        assert!(!mgr.incr_concurrent_merge_count(attempt(2, 0)).await);
        mgr.decr_concurrent_merge_count();

        // wrote rows, so invalidation demands a delete pass
        assert!(mgr.prep_scrub(attempt(2, 0)));

        let deleted = Arc::new(Mutex::new(BTreeSet::new()));
        let captured = Arc::clone(&deleted);
        let ok = mgr
            .hold_merging_for_row_delete(|set| async move {
                *captured.lock() = set;
                true
            })
            .await;
        assert!(ok);
        assert_eq!(
            deleted.lock().iter().copied().collect::<Vec<_>>(),
            vec![attempt(2, 0).value()]
        );

        // second pass has nothing to do and never calls the delete fn
        let ok = mgr
            .hold_merging_for_row_delete(|_| async move { panic!("not called") })
            .await;
        assert!(ok);
    }

    #[tokio::test]
    async fn delete_waits_for_writers() {
        let mgr = Arc::new(InvalidAttemptMgr::new());
        assert!(!mgr.incr_concurrent_merge_count(attempt(3, 0)).await);
        mgr.prep_scrub(attempt(3, 0));

        let ran = Arc::new(AtomicBool::new(false));
        let mgr2 = Arc::clone(&mgr);
        let ran2 = Arc::clone(&ran);
        let hold = tokio::spawn(async move {
            mgr2.hold_merging_for_row_delete(|_| async move {
                ran2.store(true, Ordering::SeqCst);
                true
            })
            .await
        });

        // the delete cannot run while a writer is registered
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!ran.load(Ordering::SeqCst));

        mgr.decr_concurrent_merge_count();
        assert!(hold.await.unwrap());
        assert!(ran.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn writers_blocked_during_delete_recheck_validity() {
        let mgr = Arc::new(InvalidAttemptMgr::new());
        assert!(!mgr.incr_concurrent_merge_count(attempt(4, 0)).await);
        mgr.prep_scrub(attempt(4, 0));
        mgr.decr_concurrent_merge_count();

        // run a delete; while it holds the table, attempt another write of
        // the now-invalid attempt
        let mgr2 = Arc::clone(&mgr);
        let ok = mgr2
            .hold_merging_for_row_delete(|_| async move { true })
            .await;
        assert!(ok);
        assert!(mgr.incr_concurrent_merge_count(attempt(4, 0)).await);
    }
}
