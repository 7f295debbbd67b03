//! Per-session turn serialization
//!
//! Two webhook deliveries for the same user must not interleave their
//! read-generate-write cycles. Each session id maps to one async mutex;
//! a turn holds it from session load to final write. Locks are never
//! removed - the map grows with the set of active sessions, which is
//! bounded per tenant.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Default)]
pub struct SessionLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    pub fn lock_for(&self, session_id: &str) -> Arc<Mutex<()>> {
        self.locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_session_shares_one_lock() {
        let locks = SessionLocks::new();
        let a = locks.lock_for("line_agent_user");
        let b = locks.lock_for("line_agent_user");
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn different_sessions_get_different_locks() {
        let locks = SessionLocks::new();
        let a = locks.lock_for("line_agent_alice");
        let b = locks.lock_for("line_agent_bob");
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn turns_on_one_session_serialize() {
        let locks = Arc::new(SessionLocks::new());
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..4 {
            let locks = locks.clone();
            let order = order.clone();
            handles.push(tokio::spawn(async move {
                let lock = locks.lock_for("line_a_u");
                let _guard = lock.lock().await;
                order.lock().await.push(("start", i));
                tokio::task::yield_now().await;
                order.lock().await.push(("end", i));
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        // Every start is immediately followed by the matching end.
        let order = order.lock().await;
        for pair in order.chunks(2) {
            assert_eq!(pair[0].1, pair[1].1);
            assert_eq!(pair[0].0, "start");
            assert_eq!(pair[1].0, "end");
        }
    }
}
