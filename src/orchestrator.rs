//! Daily and manual entry points that turn the keyword catalog into a
//! dispatched shard.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::Serialize;
use tracing::{info, warn};

use crate::coordination::CoordinationStore;
use crate::dispatch::{DispatchHandle, Dispatcher};
use crate::identity::IdentityPool;
use crate::partition::shard;
use crate::repository::{JobRepository, KeywordRepository};

/// Run-once lock lifetime; longer than any expected job.
pub const LOCK_TTL: Duration = Duration::from_secs(22 * 60 * 60);
/// Lifetime of the start-of-run marker.
pub const START_MARKER_TTL: Duration = Duration::from_secs(24 * 60 * 60);
pub const START_MARKER_KEY: &str = "job_started_at";

/// What was handed to the dispatcher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub server_id: usize,
    pub total_servers: usize,
    pub my_keywords: usize,
    pub total_keywords: usize,
    pub job_id: i32,
    pub job_date: NaiveDate,
    pub job_created: bool,
}

/// Result of one orchestration call.
#[derive(Debug)]
pub enum RunOutcome {
    /// This server already ran for the day.
    AlreadyRunning { server_id: usize },
    NoKeywords,
    /// The shard for this server is empty.
    NoKeywordsForServer { server_id: usize },
    Dispatched {
        summary: DispatchSummary,
        handle: DispatchHandle,
    },
}

impl RunOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::AlreadyRunning { .. } => "ALREADY_RUNNING",
            Self::NoKeywords => "NO_KEYWORDS",
            Self::NoKeywordsForServer { .. } => "NO_KEYWORDS_FOR_SERVER",
            Self::Dispatched { .. } => "DISPATCHED",
        }
    }
}

/// Fleet position of this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FleetPosition {
    pub server_id: usize,
    pub total_servers: usize,
}

pub struct Orchestrator {
    store: Arc<dyn CoordinationStore>,
    identities: IdentityPool,
    keywords: KeywordRepository,
    jobs: JobRepository,
    dispatcher: Dispatcher,
    fleet: FleetPosition,
    offset: FixedOffset,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn CoordinationStore>,
        identities: IdentityPool,
        keywords: KeywordRepository,
        jobs: JobRepository,
        dispatcher: Dispatcher,
        fleet: FleetPosition,
        offset: FixedOffset,
    ) -> Self {
        Self {
            store,
            identities,
            keywords,
            jobs,
            dispatcher,
            fleet,
            offset,
        }
    }

    pub fn fleet(&self) -> FleetPosition {
        self.fleet
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    /// The job day `now` falls on, in the configured offset.
    pub fn job_date(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    pub fn today(&self) -> NaiveDate {
        self.job_date(Utc::now())
    }

    /// The scheduled daily run. `force` skips the run-once lock.
    pub async fn run_daily(&self, force: bool) -> anyhow::Result<RunOutcome> {
        let date = self.today();
        let server_id = self.fleet.server_id;

        if !force {
            let lock_key = format!("orchestrator_lock:{}:{}", server_id, date.format("%Y-%m-%d"));
            if !self.store.acquire_once(&lock_key, LOCK_TTL).await? {
                info!("Server {} already ran for {}", server_id, date);
                return Ok(RunOutcome::AlreadyRunning { server_id });
            }
        }

        self.identities.clear().await;

        if let Err(e) = self
            .store
            .set_value(START_MARKER_KEY, &Utc::now().to_rfc3339(), START_MARKER_TTL)
            .await
        {
            warn!("Failed to record start marker: {}", e);
        }

        let all_ids = self.keywords.list_ids(None).await?;
        self.start(date, all_ids).await
    }

    /// Manual dispatch over the first `limit` keywords; no run-once lock.
    pub async fn dispatch_manual(&self, limit: i64) -> anyhow::Result<RunOutcome> {
        self.identities.clear().await;
        let all_ids = self.keywords.list_ids(Some(limit)).await?;
        self.start(self.today(), all_ids).await
    }

    async fn start(&self, date: NaiveDate, all_ids: Vec<i32>) -> anyhow::Result<RunOutcome> {
        let FleetPosition {
            server_id,
            total_servers,
        } = self.fleet;

        if all_ids.is_empty() {
            return Ok(RunOutcome::NoKeywords);
        }

        let (job, job_created) = self
            .jobs
            .get_or_create(date, i32::try_from(all_ids.len())?, i32::try_from(total_servers)?)
            .await?;
        if job_created {
            info!(
                "Created job {} for {} ({} keywords, {} servers)",
                job.id,
                date,
                all_ids.len(),
                total_servers
            );
        }

        let mine = shard(&all_ids, total_servers, server_id);
        if mine.is_empty() {
            return Ok(RunOutcome::NoKeywordsForServer { server_id });
        }

        let summary = DispatchSummary {
            server_id,
            total_servers,
            my_keywords: mine.len(),
            total_keywords: all_ids.len(),
            job_id: job.id,
            job_date: date,
            job_created,
        };
        let handle = self
            .dispatcher
            .dispatch(job.id, i32::try_from(server_id)?, mine);

        Ok(RunOutcome::Dispatched { summary, handle })
    }
}
