//! In-memory coordination store for single-process runs and tests.
//!
//! State is not shared across processes and is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::backend::{CoordinationStore, StoreResult};

#[derive(Debug, Default)]
struct State {
    /// Blacklisted identity -> expiry.
    bad: HashMap<String, Instant>,
    /// Key -> (value, expiry).
    values: HashMap<String, (String, Instant)>,
}

/// Lock-based in-memory store.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryStore {
    async fn mark_bad(&self, identity: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.write().await;
        let now = Instant::now();
        state.bad.retain(|_, expiry| *expiry > now);
        state.bad.insert(identity.to_string(), now + ttl);
        Ok(())
    }

    async fn bad_identities(&self) -> StoreResult<Vec<String>> {
        let state = self.state.read().await;
        let now = Instant::now();
        let mut live: Vec<String> = state
            .bad
            .iter()
            .filter(|(_, expiry)| **expiry > now)
            .map(|(identity, _)| identity.clone())
            .collect();
        live.sort();
        Ok(live)
    }

    async fn clear_bad(&self) -> StoreResult<()> {
        self.state.write().await.bad.clear();
        Ok(())
    }

    async fn acquire_once(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut state = self.state.write().await;
        let now = Instant::now();
        if let Some((_, expiry)) = state.values.get(key) {
            if *expiry > now {
                return Ok(false);
            }
        }
        state
            .values
            .insert(key.to_string(), ("1".to_string(), now + ttl));
        Ok(true)
    }

    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()> {
        let mut state = self.state.write().await;
        state
            .values
            .insert(key.to_string(), (value.to_string(), Instant::now() + ttl));
        Ok(())
    }

    async fn get_value(&self, key: &str) -> StoreResult<Option<String>> {
        let state = self.state.read().await;
        Ok(state
            .values
            .get(key)
            .filter(|(_, expiry)| *expiry > Instant::now())
            .map(|(value, _)| value.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_blacklist_entries_expire() {
        let store = InMemoryStore::new();
        store
            .mark_bad("10.0.0.1", Duration::from_secs(60))
            .await
            .unwrap();
        store
            .mark_bad("10.0.0.2", Duration::from_millis(10))
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;

        assert_eq!(store.bad_identities().await.unwrap(), vec!["10.0.0.1"]);

        store.clear_bad().await.unwrap();
        assert!(store.bad_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_acquire_once_is_exclusive_until_expiry() {
        let store = InMemoryStore::new();
        let ttl = Duration::from_millis(20);

        assert!(store.acquire_once("lock", ttl).await.unwrap());
        assert!(!store.acquire_once("lock", ttl).await.unwrap());

        tokio::time::sleep(Duration::from_millis(40)).await;
        assert!(store.acquire_once("lock", ttl).await.unwrap());
    }

    #[tokio::test]
    async fn test_values_round_trip() {
        let store = InMemoryStore::new();
        assert!(store.get_value("start").await.unwrap().is_none());
        store
            .set_value("start", "1700000000", Duration::from_secs(60))
            .await
            .unwrap();
        assert_eq!(
            store.get_value("start").await.unwrap().as_deref(),
            Some("1700000000")
        );
    }
}
