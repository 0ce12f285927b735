//! Shared coordination store.
//!
//! Backends:
//! - `InMemoryStore`: single process, used by tests and local runs
//! - `RedisStore`: shared by every server in the fleet (`redis-backend` feature)

pub mod backend;
pub mod memory;
#[cfg(feature = "redis-backend")]
pub mod redis;

use std::sync::Arc;

pub use backend::{CoordinationStore, StoreError, StoreResult};
pub use memory::InMemoryStore;
#[cfg(feature = "redis-backend")]
pub use self::redis::RedisStore;

/// Open the coordination store named by `url`.
///
/// `None` selects the in-memory store, which only coordinates tasks inside
/// this process.
pub async fn connect(url: Option<&str>) -> StoreResult<Arc<dyn CoordinationStore>> {
    match url {
        None => Ok(Arc::new(InMemoryStore::new())),
        #[cfg(feature = "redis-backend")]
        Some(url) => Ok(Arc::new(RedisStore::new(url).await?)),
        #[cfg(not(feature = "redis-backend"))]
        Some(url) => Err(StoreError::Unavailable(format!(
            "{} requires the redis-backend feature",
            url
        ))),
    }
}
