//! Wiring of the long-lived components from resolved settings.

use std::sync::Arc;

use anyhow::Context;

use crate::completion::CompletionTrigger;
use crate::config::{MailTarget, Settings};
use crate::coordination::{self, CoordinationStore};
use crate::crawler::{
    KeywordProcessor, KinExtractor, NullVolumeLookup, SearchAdClient, UrlMatcher, VolumeLookup,
};
use crate::dispatch::{Dispatcher, KeywordTask};
use crate::http_client::{Fetcher, ReqwestUpstream, Upstream};
use crate::identity::{load_identities, IdentityPool};
use crate::orchestrator::{FleetPosition, Orchestrator};
use crate::report::{HttpRelaySender, OutboxSender, ReportSender};
use crate::repository::DbContext;

/// Everything a command or the admin server needs.
#[derive(Clone)]
pub struct App {
    pub settings: Settings,
    pub db: DbContext,
    pub store: Arc<dyn CoordinationStore>,
    pub processor: KeywordProcessor,
    pub trigger: CompletionTrigger,
    pub sender: Arc<dyn ReportSender>,
    pub orchestrator: Arc<Orchestrator>,
}

impl App {
    /// Open the stores and build the pipeline against the real upstream.
    pub async fn build(settings: Settings) -> anyhow::Result<Self> {
        let upstream: Arc<dyn Upstream> = Arc::new(ReqwestUpstream::new(
            settings.request_timeout,
            settings.identity_mode,
        )?);
        let sender: Arc<dyn ReportSender> = match &settings.mail {
            MailTarget::Relay(url) => Arc::new(HttpRelaySender::new(url, settings.request_timeout)?),
            MailTarget::Outbox(dir) => Arc::new(OutboxSender::new(dir)),
        };
        let volume: Arc<dyn VolumeLookup> = match &settings.volume {
            Some(credentials) => Arc::new(SearchAdClient::new(
                credentials.clone(),
                settings.request_timeout,
            )?),
            None => {
                tracing::warn!("No ad API credentials configured; search volumes will be 0");
                Arc::new(NullVolumeLookup)
            }
        };

        let db = DbContext::from_url(&settings.database_url)?;
        db.init_schema()
            .await
            .context("failed to initialize database schema")?;
        let store = coordination::connect(settings.coordination_url.as_deref()).await?;

        Self::assemble(settings, db, store, upstream, volume, sender)
    }

    /// Build from explicit collaborators; the stores must already be open.
    pub fn assemble(
        settings: Settings,
        db: DbContext,
        store: Arc<dyn CoordinationStore>,
        upstream: Arc<dyn Upstream>,
        volume: Arc<dyn VolumeLookup>,
        sender: Arc<dyn ReportSender>,
    ) -> anyhow::Result<Self> {
        let mut identities = settings.identities.clone();
        if let Some(ref path) = settings.identity_file {
            let loaded = load_identities(path)
                .with_context(|| format!("failed to read identity file {}", path.display()))?;
            identities.extend(loaded);
        }
        if identities.is_empty() {
            tracing::warn!("No egress identities configured; every fetch will fail");
        }

        let pool =
            IdentityPool::new(identities, store.clone()).with_bad_ttl(settings.bad_identity_ttl);
        let fetcher = Fetcher::new(upstream, pool.clone(), settings.retry.clone());
        let processor = KeywordProcessor::new(
            fetcher,
            volume,
            Arc::new(KinExtractor::new()?),
            Arc::new(UrlMatcher::new()?),
            settings.utc_offset,
        );

        let trigger = CompletionTrigger::new(db.jobs(), settings.report.clone(), sender.clone());
        let task = KeywordTask::new(
            processor.clone(),
            db.keywords(),
            db.urls(),
            settings.task.clone(),
        );
        let dispatcher = Dispatcher::new(task, trigger.clone(), settings.workers);

        let orchestrator = Arc::new(Orchestrator::new(
            store.clone(),
            pool,
            db.keywords(),
            db.jobs(),
            dispatcher,
            FleetPosition {
                server_id: settings.server_id,
                total_servers: settings.total_servers,
            },
            settings.utc_offset,
        ));

        Ok(Self {
            settings,
            db,
            store,
            processor,
            trigger,
            sender,
            orchestrator,
        })
    }
}
