//! One keyword as a unit of work with its own redispatch budget.

use std::time::Duration;

use serde::Deserialize;
use tracing::{error, warn};

use crate::crawler::{KeywordProcessor, ProcessError};
use crate::http_client::secs;
use crate::models::{KeywordOutcome, ReportRow};
use crate::repository::{KeywordRepository, UrlCatalogRepository};

/// Task-level retry policy, independent of the per-fetch identity retries.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TaskPolicy {
    /// Redispatches after the first attempt.
    pub max_retries: u32,
    /// Countdown before retry `n` is `min(base * 2^n, cap)`.
    #[serde(with = "secs")]
    pub countdown_base: Duration,
    #[serde(with = "secs")]
    pub countdown_cap: Duration,
    /// Wall-clock ceiling for a single attempt.
    #[serde(with = "secs")]
    pub time_limit: Duration,
    /// Attempts at persisting a shard before giving up.
    pub aggregate_attempts: u32,
    #[serde(with = "secs")]
    pub aggregate_delay: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            max_retries: 10,
            countdown_base: Duration::from_secs(3),
            countdown_cap: Duration::from_secs(10),
            time_limit: Duration::from_secs(20 * 60),
            aggregate_attempts: 3,
            aggregate_delay: Duration::from_secs(5),
        }
    }
}

impl TaskPolicy {
    /// No countdowns, for tests.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            countdown_base: Duration::ZERO,
            countdown_cap: Duration::ZERO,
            aggregate_delay: Duration::ZERO,
            ..Default::default()
        }
    }

    pub fn countdown(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.countdown_base
            .saturating_mul(factor)
            .min(self.countdown_cap)
    }
}

/// Runs the keyword pipeline for one keyword id, retrying whole attempts.
#[derive(Clone)]
pub struct KeywordTask {
    processor: KeywordProcessor,
    keywords: KeywordRepository,
    urls: UrlCatalogRepository,
    policy: TaskPolicy,
}

impl KeywordTask {
    pub fn new(
        processor: KeywordProcessor,
        keywords: KeywordRepository,
        urls: UrlCatalogRepository,
        policy: TaskPolicy,
    ) -> Self {
        Self {
            processor,
            keywords,
            urls,
            policy,
        }
    }

    pub fn policy(&self) -> &TaskPolicy {
        &self.policy
    }

    /// Always resolves: a row on success, a failed placeholder once the
    /// retry budget is spent.
    pub async fn run(&self, keyword_id: i32) -> KeywordOutcome {
        for retry in 0..=self.policy.max_retries {
            match tokio::time::timeout(self.policy.time_limit, self.attempt(keyword_id)).await {
                Ok(Ok(row)) => return KeywordOutcome::success(keyword_id, row),
                Ok(Err(e)) => warn!(
                    "Keyword {} attempt {} failed: {}",
                    keyword_id,
                    retry + 1,
                    e
                ),
                Err(_) => warn!(
                    "Keyword {} attempt {} exceeded {:?}",
                    keyword_id,
                    retry + 1,
                    self.policy.time_limit
                ),
            }

            if retry < self.policy.max_retries {
                tokio::time::sleep(self.policy.countdown(retry)).await;
            }
        }

        error!(
            "Keyword {} failed after {} attempts",
            keyword_id,
            self.policy.max_retries + 1
        );
        KeywordOutcome::failed(keyword_id)
    }

    async fn attempt(&self, keyword_id: i32) -> Result<ReportRow, ProcessError> {
        let keyword = self
            .keywords
            .get(keyword_id)
            .await?
            .ok_or(ProcessError::UnknownKeyword(keyword_id))?;
        let registered = self.urls.list_for_keyword(&keyword.keyword).await?;
        self.processor.process(&keyword, &registered).await
    }
}
