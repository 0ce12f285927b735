//! Egress identity pool with a fleet-wide, time-bounded blacklist.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::coordination::CoordinationStore;

/// Default time an identity stays blacklisted after a failure.
pub const DEFAULT_BAD_TTL: Duration = Duration::from_secs(30 * 60);

/// The set of egress identities (IP addresses) available to the fetcher.
///
/// Blacklist membership is always read from the shared store; nothing is
/// cached in-process between calls.
#[derive(Clone)]
pub struct IdentityPool {
    identities: Arc<Vec<String>>,
    store: Arc<dyn CoordinationStore>,
    bad_ttl: Duration,
}

impl IdentityPool {
    pub fn new(identities: Vec<String>, store: Arc<dyn CoordinationStore>) -> Self {
        Self {
            identities: Arc::new(identities),
            store,
            bad_ttl: DEFAULT_BAD_TTL,
        }
    }

    /// Override how long a failing identity stays blacklisted.
    pub fn with_bad_ttl(mut self, ttl: Duration) -> Self {
        self.bad_ttl = ttl;
        self
    }

    /// Every configured identity.
    pub fn all(&self) -> &[String] {
        &self.identities
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    /// Identities that are neither in `local_bad` nor on the shared blacklist.
    ///
    /// If that leaves nothing, the shared blacklist and `local_bad` are both
    /// cleared and the full list is returned, so a non-empty pool always
    /// yields at least one candidate.
    pub async fn usable(&self, local_bad: &mut HashSet<String>) -> Vec<String> {
        let shared_bad: HashSet<String> = match self.store.bad_identities().await {
            Ok(bad) => bad.into_iter().collect(),
            Err(e) => {
                warn!("Could not read identity blacklist, ignoring it: {}", e);
                HashSet::new()
            }
        };

        let usable: Vec<String> = self
            .identities
            .iter()
            .filter(|id| !local_bad.contains(*id) && !shared_bad.contains(*id))
            .cloned()
            .collect();

        if !usable.is_empty() {
            return usable;
        }

        debug!(
            "All {} identities blacklisted, resetting pool",
            self.identities.len()
        );
        self.clear().await;
        local_bad.clear();
        self.identities.to_vec()
    }

    /// Blacklist an identity for the configured TTL, visible to every worker.
    pub async fn mark_bad(&self, identity: &str) {
        if let Err(e) = self.store.mark_bad(identity, self.bad_ttl).await {
            warn!("Failed to blacklist identity {}: {}", identity, e);
        }
    }

    /// Drop the whole shared blacklist.
    pub async fn clear(&self) {
        if let Err(e) = self.store.clear_bad().await {
            warn!("Failed to clear identity blacklist: {}", e);
        }
    }
}

/// Load identities from a file with one address per line.
///
/// Blank lines and lines starting with `#` are skipped.
pub fn load_identities(path: &Path) -> std::io::Result<Vec<String>> {
    let content = std::fs::read_to_string(path)?;
    Ok(parse_identities(&content))
}

fn parse_identities(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordination::InMemoryStore;

    fn pool(ids: &[&str]) -> (IdentityPool, Arc<InMemoryStore>) {
        let store = Arc::new(InMemoryStore::new());
        let pool = IdentityPool::new(ids.iter().map(|s| s.to_string()).collect(), store.clone());
        (pool, store)
    }

    #[tokio::test]
    async fn test_usable_excludes_local_and_shared_bad() {
        let (pool, _store) = pool(&["a", "b", "c", "d"]);
        pool.mark_bad("b").await;

        let mut local: HashSet<String> = ["c".to_string()].into_iter().collect();
        let usable = pool.usable(&mut local).await;

        assert_eq!(usable, vec!["a", "d"]);
        assert!(local.contains("c"));
    }

    #[tokio::test]
    async fn test_usable_never_empty() {
        let (pool, store) = pool(&["a", "b"]);
        pool.mark_bad("a").await;
        let mut local: HashSet<String> = ["b".to_string()].into_iter().collect();

        let usable = pool.usable(&mut local).await;

        assert_eq!(usable, vec!["a", "b"]);
        assert!(local.is_empty());
        assert!(store.bad_identities().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_blacklist_shared_between_pool_handles() {
        let (pool, _store) = pool(&["a", "b"]);
        let other = pool.clone();
        other.mark_bad("a").await;

        let mut local = HashSet::new();
        assert_eq!(pool.usable(&mut local).await, vec!["b"]);
    }

    #[test]
    fn test_parse_identities_skips_blanks_and_comments() {
        let ids = parse_identities("10.0.0.1\n\n  10.0.0.2  \n# spare\n10.0.0.3\n");
        assert_eq!(ids, vec!["10.0.0.1", "10.0.0.2", "10.0.0.3"]);
    }
}
