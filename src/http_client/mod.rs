//! Resilient fetcher: bounded retry across rotating egress identities.
//!
//! This is the only component that talks to the upstream site. A logical
//! fetch either returns a 200 page or fails with [`FetchError::Exhausted`];
//! partial success is never reported.

mod upstream;
mod user_agent;

pub use upstream::{IdentityMode, ReqwestUpstream, Upstream, UpstreamResponse};
pub use user_agent::random_user_agent;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::identity::IdentityPool;

/// Errors from the fetch layer.
#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("{url}: gave up after {attempts} attempts (last: {last})")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("no egress identities configured")]
    NoIdentities,
    #[error("{url}: HTTP {status}")]
    Status { url: String, status: u16 },
}

/// Identity-level retry policy for one logical fetch.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    /// Backoff for attempt `k` is `min(base + step * k, cap)` plus jitter.
    #[serde(with = "secs")]
    pub backoff_base: Duration,
    #[serde(with = "secs")]
    pub backoff_step: Duration,
    #[serde(with = "secs")]
    pub backoff_cap: Duration,
    #[serde(with = "secs")]
    pub backoff_jitter: Duration,
    /// Pause after every successful response.
    #[serde(with = "secs")]
    pub courtesy_min: Duration,
    #[serde(with = "secs")]
    pub courtesy_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 20,
            backoff_base: Duration::from_secs(10),
            backoff_step: Duration::from_secs(3),
            backoff_cap: Duration::from_secs(25),
            backoff_jitter: Duration::from_secs(5),
            courtesy_min: Duration::from_secs(1),
            courtesy_max: Duration::from_secs(3),
        }
    }
}

impl RetryPolicy {
    /// A policy with no delays, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_base: Duration::ZERO,
            backoff_step: Duration::ZERO,
            backoff_cap: Duration::ZERO,
            backoff_jitter: Duration::ZERO,
            courtesy_min: Duration::ZERO,
            courtesy_max: Duration::ZERO,
        }
    }

    /// Deterministic part of the backoff after failed attempt `attempt` (0-based).
    pub fn backoff_floor(&self, attempt: u32) -> Duration {
        self.backoff_base
            .saturating_add(self.backoff_step.saturating_mul(attempt))
            .min(self.backoff_cap)
    }

    /// Backoff after failed attempt `attempt`, jitter included.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.backoff_floor(attempt) + uniform(Duration::ZERO, self.backoff_jitter)
    }

    /// Pause after a successful response.
    pub fn courtesy(&self) -> Duration {
        uniform(self.courtesy_min, self.courtesy_max)
    }
}

fn uniform(low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    let secs = rand::thread_rng().gen_range(low.as_secs_f64()..=high.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// A successful page and the identity that fetched it.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub body: String,
    pub identity: String,
}

/// Fetches pages through the identity pool with bounded retry.
#[derive(Clone)]
pub struct Fetcher {
    upstream: Arc<dyn Upstream>,
    pool: IdentityPool,
    policy: RetryPolicy,
}

impl Fetcher {
    pub fn new(upstream: Arc<dyn Upstream>, pool: IdentityPool, policy: RetryPolicy) -> Self {
        Self {
            upstream,
            pool,
            policy,
        }
    }

    pub fn pool(&self) -> &IdentityPool {
        &self.pool
    }

    pub fn upstream(&self) -> &Arc<dyn Upstream> {
        &self.upstream
    }

    /// Fetch `url`, rotating identities until a 200 or the attempt budget runs out.
    ///
    /// `local_bad` is the caller's own record of identities that failed during
    /// this keyword; it is consulted alongside the shared blacklist and may be
    /// cleared when the pool resets.
    pub async fn fetch(
        &self,
        url: &str,
        local_bad: &mut HashSet<String>,
    ) -> Result<FetchedPage, FetchError> {
        if self.pool.is_empty() {
            return Err(FetchError::NoIdentities);
        }

        let mut last = String::from("no attempt made");
        for attempt in 0..self.policy.max_attempts {
            let candidates = self.pool.usable(local_bad).await;
            let (identity, user_agent) = {
                let mut rng = rand::thread_rng();
                let identity = candidates
                    .choose(&mut rng)
                    .cloned()
                    .ok_or(FetchError::NoIdentities)?;
                (identity, random_user_agent())
            };

            match self.upstream.get(url, &identity, &user_agent).await {
                Ok(response) if response.status == 200 => {
                    tokio::time::sleep(self.policy.courtesy()).await;
                    return Ok(FetchedPage {
                        body: response.body,
                        identity,
                    });
                }
                Ok(response) => {
                    last = format!("HTTP {}", response.status);
                }
                Err(e) => {
                    last = e.to_string();
                }
            }

            debug!(
                "Attempt {}/{} for {} via {} failed: {}",
                attempt + 1,
                self.policy.max_attempts,
                url,
                identity,
                last
            );
            local_bad.insert(identity.clone());
            self.pool.mark_bad(&identity).await;
            tokio::time::sleep(self.policy.backoff(attempt)).await;
        }

        warn!(
            "Giving up on {} after {} attempts",
            url, self.policy.max_attempts
        );
        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.policy.max_attempts,
            last,
        })
    }

    /// One request through one random identity.
    ///
    /// Nothing is retried and the blacklist is left alone; a non-200
    /// answer is returned as [`FetchError::Status`].
    pub async fn fetch_once(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let identity = {
            let mut rng = rand::thread_rng();
            self.pool
                .all()
                .choose(&mut rng)
                .cloned()
                .ok_or(FetchError::NoIdentities)?
        };

        let response = self
            .upstream
            .get(url, &identity, &random_user_agent())
            .await?;
        if response.status != 200 {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: response.status,
            });
        }
        Ok(FetchedPage {
            body: response.body,
            identity,
        })
    }
}

/// Serde adapter for durations written as (fractional) seconds.
pub(crate) mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}
