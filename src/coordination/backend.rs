//! Pluggable backend trait for the shared coordination store.
//!
//! The relational store carries durable job state; everything short-lived
//! that the fleet must agree on (the identity blacklist, the daily run-once
//! lock, the job start marker) lives behind this trait.

use std::time::Duration;

use async_trait::async_trait;

/// Result type for coordination store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from coordination store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Store error: {0}")]
    Backend(String),
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Trait for coordination store backends.
///
/// Implementations must be safe to share across tasks and processes; every
/// operation is a single-key atomic operation on the underlying store.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Blacklist an identity until `ttl` has elapsed.
    async fn mark_bad(&self, identity: &str, ttl: Duration) -> StoreResult<()>;

    /// Identities whose blacklist entry has not yet expired.
    async fn bad_identities(&self) -> StoreResult<Vec<String>>;

    /// Remove every blacklist entry.
    async fn clear_bad(&self) -> StoreResult<()>;

    /// Set `key` only if it is absent, expiring after `ttl`.
    ///
    /// Returns `true` if this call created the key.
    async fn acquire_once(&self, key: &str, ttl: Duration) -> StoreResult<bool>;

    /// Set `key` to `value`, expiring after `ttl`.
    async fn set_value(&self, key: &str, value: &str, ttl: Duration) -> StoreResult<()>;

    /// Get the value of `key`, if present and unexpired.
    async fn get_value(&self, key: &str) -> StoreResult<Option<String>>;
}
