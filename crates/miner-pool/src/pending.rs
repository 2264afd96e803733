//! Pending request table
//!
//! Every request sent to a worker is recorded here until exactly one of:
//! - its response arrives ([`PendingTable::resolve`])
//! - its deadline runs out ([`PendingTable::sweep`])
//! - its worker disconnects, when the pool fails such requests fast
//!   ([`PendingTable::fail_session`])
//! - the send itself fails ([`PendingTable::remove`])

use crate::config::TimeoutPolicy;
use crate::error::PoolError;
use miner_protocol::{ResponseEnvelope, SessionId};
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Reply channel of one request
pub type Reply = oneshot::Sender<Result<Value, PoolError>>;

/// One in-flight request
#[derive(Debug)]
pub struct PendingRequest {
    /// Session the request was sent to
    pub session_id: SessionId,
    /// Start of the current grace period
    pub submitted_at: Instant,
    /// Deadline extensions left
    pub retries_left: u32,
    reply: Reply,
}

/// Result of one timeout sweep
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepOutcome {
    /// Requests whose deadline was extended
    pub extended: usize,
    /// Requests rejected with a timeout
    pub expired: usize,
}

/// Requests awaiting a response, keyed by request id
#[derive(Debug, Default)]
pub struct PendingTable {
    inner: Mutex<HashMap<u64, PendingRequest>>,
}

impl PendingTable {
    /// Empty table
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a request and return the receiver of its settlement
    pub fn insert(
        &self,
        request_id: u64,
        session_id: SessionId,
        retries: u32,
    ) -> oneshot::Receiver<Result<Value, PoolError>> {
        let (reply, rx) = oneshot::channel();
        self.inner.lock().insert(
            request_id,
            PendingRequest {
                session_id,
                submitted_at: Instant::now(),
                retries_left: retries,
                reply,
            },
        );
        rx
    }

    /// Settle the request a response belongs to
    ///
    /// Returns `false` when no request matches (late or unknown response).
    pub fn resolve(&self, response: ResponseEnvelope) -> bool {
        let Some(pending) = self.inner.lock().remove(&response.request_id) else {
            return false;
        };
        let result = response.into_result().map_err(PoolError::from);
        // The caller may have stopped waiting
        let _ = pending.reply.send(result);
        true
    }

    /// Drop a request without settling it
    pub fn remove(&self, request_id: u64) -> bool {
        self.inner.lock().remove(&request_id).is_some()
    }

    /// Reject every request of a session with `WorkerDisconnected`
    pub fn fail_session(&self, session_id: SessionId) -> usize {
        let failed: Vec<PendingRequest> = {
            let mut inner = self.inner.lock();
            let ids: Vec<u64> = inner
                .iter()
                .filter(|(_, p)| p.session_id == session_id)
                .map(|(id, _)| *id)
                .collect();
            ids.iter().filter_map(|id| inner.remove(id)).collect()
        };
        let count = failed.len();
        for pending in failed {
            let _ = pending
                .reply
                .send(Err(PoolError::WorkerDisconnected(session_id)));
        }
        count
    }

    /// Number of requests in flight for one session
    #[must_use]
    pub fn count_session(&self, session_id: SessionId) -> usize {
        self.inner
            .lock()
            .values()
            .filter(|p| p.session_id == session_id)
            .count()
    }

    /// Extend or expire requests older than `grace`
    pub fn sweep(&self, now: Instant, grace: Duration, policy: TimeoutPolicy) -> SweepOutcome {
        let mut outcome = SweepOutcome::default();
        let mut expired = Vec::new();
        {
            let mut inner = self.inner.lock();
            let stale: Vec<u64> = inner
                .iter()
                .filter(|(_, p)| now.saturating_duration_since(p.submitted_at) > grace)
                .map(|(id, _)| *id)
                .collect();
            for id in stale {
                let extend = policy == TimeoutPolicy::ExtendDeadline
                    && inner.get(&id).is_some_and(|p| p.retries_left > 0);
                if extend {
                    if let Some(pending) = inner.get_mut(&id) {
                        pending.retries_left -= 1;
                        pending.submitted_at = now;
                        outcome.extended += 1;
                    }
                } else if let Some(pending) = inner.remove(&id) {
                    expired.push((id, pending));
                }
            }
        }

        outcome.expired = expired.len();
        for (request_id, pending) in expired {
            tracing::warn!(request_id, session_id = %pending.session_id, "request timed out");
            let _ = pending.reply.send(Err(PoolError::Timeout { request_id }));
        }
        outcome
    }

    /// Number of requests in flight
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// Whether nothing is in flight
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use miner_protocol::ErrorKind;
    use serde_json::json;
    use tokio_test::{assert_pending, assert_ready, task};

    const GRACE: Duration = Duration::from_secs(120);

    #[tokio::test]
    async fn resolves_once() {
        let table = PendingTable::new();
        let rx = table.insert(1, SessionId(1), 10);

        assert!(table.resolve(ResponseEnvelope::success(1, json!({"ok": true}))));
        assert!(!table.resolve(ResponseEnvelope::success(1, json!({"ok": false}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"ok": true}));
        assert!(table.is_empty());
    }

    #[test]
    fn reply_stays_pending_until_resolved() {
        let table = PendingTable::new();
        let mut rx = task::spawn(table.insert(2, SessionId(1), 10));
        assert_pending!(rx.poll());

        table.resolve(ResponseEnvelope::success(2, json!([1, 2])));
        assert!(rx.is_woken());
        let reply = assert_ready!(rx.poll());
        assert_eq!(reply.unwrap().unwrap(), json!([1, 2]));
    }

    #[tokio::test]
    async fn error_responses_become_pool_errors() {
        let table = PendingTable::new();
        let rx = table.insert(4, SessionId(1), 10);
        table.resolve(ResponseEnvelope::failure(4, ErrorKind::NotFound, "subset 9 not found"));
        assert_eq!(
            rx.await.unwrap().unwrap_err(),
            PoolError::NotFound("subset 9 not found".into())
        );
    }

    #[tokio::test(start_paused = true)]
    async fn extend_deadline_until_retries_run_out() {
        let table = PendingTable::new();
        let mut rx = table.insert(7, SessionId(1), 2);
        let start = Instant::now();

        let early = table.sweep(start + GRACE, GRACE, TimeoutPolicy::ExtendDeadline);
        assert_eq!(early, SweepOutcome::default());

        let mut now = start;
        for _ in 0..2 {
            now += GRACE + Duration::from_secs(1);
            let outcome = table.sweep(now, GRACE, TimeoutPolicy::ExtendDeadline);
            assert_eq!(outcome.extended, 1);
            assert!(rx.try_recv().is_err());
        }

        now += GRACE + Duration::from_secs(1);
        let outcome = table.sweep(now, GRACE, TimeoutPolicy::ExtendDeadline);
        assert_eq!(outcome.expired, 1);
        assert_eq!(
            rx.await.unwrap().unwrap_err(),
            PoolError::Timeout { request_id: 7 }
        );
        assert!(table.is_empty());
        assert!(!table.resolve(ResponseEnvelope::success(7, json!(null))));
    }

    #[tokio::test(start_paused = true)]
    async fn no_retry_expires_first_time() {
        let table = PendingTable::new();
        let rx = table.insert(3, SessionId(1), 10);
        let outcome = table.sweep(
            Instant::now() + GRACE + Duration::from_millis(1),
            GRACE,
            TimeoutPolicy::NoRetry,
        );
        assert_eq!(outcome.expired, 1);
        assert!(matches!(rx.await.unwrap(), Err(PoolError::Timeout { request_id: 3 })));
    }

    #[tokio::test]
    async fn session_failure_only_touches_that_session() {
        let table = PendingTable::new();
        let a = table.insert(1, SessionId(1), 10);
        let _b = table.insert(2, SessionId(2), 10);

        assert_eq!(table.count_session(SessionId(1)), 1);
        assert_eq!(table.fail_session(SessionId(1)), 1);
        assert_eq!(table.count_session(SessionId(1)), 0);
        assert_eq!(
            a.await.unwrap().unwrap_err(),
            PoolError::WorkerDisconnected(SessionId(1))
        );
        assert_eq!(table.len(), 1);
        assert!(table.remove(2));
        assert!(!table.remove(2));
    }
}
