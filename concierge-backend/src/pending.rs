//! Pending onboarding drafts
//!
//! Extracted-but-unconfirmed agent configs, keyed by admin id. Entries
//! expire on a TTL instead of accumulating forever; a confirm after expiry
//! just asks the admin to re-run extraction.

use moka::sync::Cache;
use std::time::Duration;

use crate::models::RawAgentConfig;

pub struct PendingConfigStore {
    cache: Cache<String, RawAgentConfig>,
}

impl PendingConfigStore {
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(10_000)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    pub fn put(&self, admin_id: &str, config: RawAgentConfig) {
        self.cache.insert(admin_id.to_string(), config);
    }

    pub fn peek(&self, admin_id: &str) -> Option<RawAgentConfig> {
        self.cache.get(admin_id)
    }

    /// Remove and return the draft; a confirm consumes it.
    pub fn take(&self, admin_id: &str) -> Option<RawAgentConfig> {
        let config = self.cache.get(admin_id);
        if config.is_some() {
            self.cache.invalidate(admin_id);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str) -> RawAgentConfig {
        RawAgentConfig {
            merchant_name: name.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn take_consumes_the_draft() {
        let store = PendingConfigStore::new(Duration::from_secs(60));
        store.put("admin-1", draft("Cafe Luna"));

        assert_eq!(store.peek("admin-1").unwrap().merchant_name, "Cafe Luna");
        assert_eq!(store.take("admin-1").unwrap().merchant_name, "Cafe Luna");
        assert!(store.take("admin-1").is_none());
    }

    #[test]
    fn drafts_expire_after_ttl() {
        let store = PendingConfigStore::new(Duration::from_millis(50));
        store.put("admin-1", draft("Cafe Luna"));
        std::thread::sleep(Duration::from_millis(120));
        assert!(store.peek("admin-1").is_none());
    }

    #[test]
    fn drafts_are_per_admin() {
        let store = PendingConfigStore::new(Duration::from_secs(60));
        store.put("admin-1", draft("Cafe Luna"));
        store.put("admin-2", draft("Bike Shop"));

        assert_eq!(store.take("admin-1").unwrap().merchant_name, "Cafe Luna");
        assert_eq!(store.peek("admin-2").unwrap().merchant_name, "Bike Shop");
    }
}
