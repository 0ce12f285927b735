//! Count-based completion check and the single-flight report trigger.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::{CrawlJob, KeywordOutcome};
use crate::report::{build_report, ReportError, ReportSender, ReportTemplate};
use crate::repository::{DieselError, JobRepository};

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("database error: {0}")]
    Database(#[from] DieselError),

    #[error("job {0} not found")]
    JobNotFound(i32),
}

/// What one aggregation (or manual check) observed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CompletionOutcome {
    /// Results are still missing; other shards are in flight.
    ServerDone {
        server_id: Option<i32>,
        completed: i64,
        total: i64,
    },
    /// Another caller already claimed the report.
    AlreadySent,
    ReportSent {
        succeeded: usize,
        failed: usize,
        elapsed: String,
    },
    /// The claim was rolled back after the report could not be delivered.
    EmailFailed { error: String, succeeded: usize },
}

impl CompletionOutcome {
    pub fn label(&self) -> String {
        match self {
            Self::ServerDone {
                server_id: Some(id),
                ..
            } => format!("SERVER_{}_DONE", id),
            Self::ServerDone { server_id: None, .. } => "INCOMPLETE".to_string(),
            Self::AlreadySent => "REPORT_ALREADY_SENT".to_string(),
            Self::ReportSent { .. } => "REPORT_SENT".to_string(),
            Self::EmailFailed { .. } => "EMAIL_FAILED".to_string(),
        }
    }
}

/// Persists shard results and fires the report exactly once per job.
#[derive(Clone)]
pub struct CompletionTrigger {
    jobs: JobRepository,
    template: ReportTemplate,
    sender: Arc<dyn ReportSender>,
}

impl CompletionTrigger {
    pub fn new(jobs: JobRepository, template: ReportTemplate, sender: Arc<dyn ReportSender>) -> Self {
        Self {
            jobs,
            template,
            sender,
        }
    }

    /// Persist one shard's outcomes (idempotently) and run the completion check.
    pub async fn aggregate(
        &self,
        job_id: i32,
        server_id: i32,
        outcomes: &[KeywordOutcome],
    ) -> Result<CompletionOutcome, CompletionError> {
        let inserted = self.jobs.insert_results(job_id, server_id, outcomes).await?;
        info!(
            "Server {} persisted {}/{} results for job {}",
            server_id,
            inserted,
            outcomes.len(),
            job_id
        );
        self.check_as(job_id, Some(server_id)).await
    }

    /// Re-run the completion check without persisting anything.
    pub async fn check(&self, job_id: i32) -> Result<CompletionOutcome, CompletionError> {
        self.check_as(job_id, None).await
    }

    async fn check_as(
        &self,
        job_id: i32,
        server_id: Option<i32>,
    ) -> Result<CompletionOutcome, CompletionError> {
        let job = self
            .jobs
            .get(job_id)
            .await?
            .ok_or(CompletionError::JobNotFound(job_id))?;

        let completed = self.jobs.count_results(job_id).await?;
        let total = i64::from(job.total_keywords);
        if completed < total {
            return Ok(CompletionOutcome::ServerDone {
                server_id,
                completed,
                total,
            });
        }

        let completed_at = Utc::now();
        if !self.jobs.claim_report(job_id, completed_at).await? {
            return Ok(CompletionOutcome::AlreadySent);
        }
        info!("Job {} complete ({} results), sending report", job_id, completed);

        let mut succeeded = 0;
        let delivered = self.deliver(&job, completed_at, &mut succeeded).await;

        match delivered {
            Ok((failed, elapsed)) => Ok(CompletionOutcome::ReportSent {
                succeeded,
                failed,
                elapsed,
            }),
            Err(e) => {
                error!("Report for job {} failed: {}", job_id, e);
                match self.jobs.release_report(job_id).await {
                    Ok(true) => {}
                    Ok(false) => warn!("Report claim for job {} was already released", job_id),
                    Err(release) => error!(
                        "Could not release report claim for job {}: {}",
                        job_id, release
                    ),
                }
                Ok(CompletionOutcome::EmailFailed {
                    error: e.to_string(),
                    succeeded,
                })
            }
        }
    }

    /// Everything after a won claim; any error here must release the claim.
    async fn deliver(
        &self,
        job: &CrawlJob,
        completed_at: DateTime<Utc>,
        succeeded: &mut usize,
    ) -> Result<(usize, String), ReportError> {
        let outcomes = self.jobs.list_outcomes(job.id).await?;
        *succeeded = outcomes.iter().filter(|o| o.is_success()).count();

        let report = build_report(&self.template, job, &outcomes, completed_at)?;
        self.sender.send(&report).await?;
        Ok((report.failed, report.elapsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ReportRow;
    use crate::report::Report;
    use crate::repository::DbContext;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use diesel_async::SimpleAsyncConnection;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tempfile::tempdir;

    #[derive(Default)]
    struct CountingSender {
        sent: AtomicUsize,
        fail: AtomicBool,
    }

    #[async_trait]
    impl ReportSender for CountingSender {
        async fn send(&self, _report: &Report) -> Result<(), ReportError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(ReportError::Delivery("smtp down".to_string()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn setup(total: i32) -> (tempfile::TempDir, JobRepository, i32) {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let jobs = ctx.jobs();
        let (job, _) = jobs
            .get_or_create(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), total, 2)
            .await
            .unwrap();
        (dir, jobs, job.id)
    }

    fn outcomes(ids: &[i32]) -> Vec<KeywordOutcome> {
        ids.iter()
            .map(|&id| KeywordOutcome::success(id, ReportRow::default()))
            .collect()
    }

    #[tokio::test]
    async fn test_partial_shard_reports_server_done() {
        let (_dir, jobs, job_id) = setup(4).await;
        let sender = Arc::new(CountingSender::default());
        let trigger = CompletionTrigger::new(jobs, ReportTemplate::default(), sender.clone());

        let outcome = trigger.aggregate(job_id, 0, &outcomes(&[1, 3])).await.unwrap();
        assert_eq!(
            outcome,
            CompletionOutcome::ServerDone {
                server_id: Some(0),
                completed: 2,
                total: 4
            }
        );
        assert_eq!(outcome.label(), "SERVER_0_DONE");
        assert_eq!(sender.sent.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_last_shard_sends_once() {
        let (_dir, jobs, job_id) = setup(4).await;
        let sender = Arc::new(CountingSender::default());
        let trigger = CompletionTrigger::new(jobs, ReportTemplate::default(), sender.clone());

        trigger.aggregate(job_id, 0, &outcomes(&[1, 3])).await.unwrap();
        let mut last = outcomes(&[2]);
        last.push(KeywordOutcome::failed(4));
        let outcome = trigger.aggregate(job_id, 1, &last).await.unwrap();

        match outcome {
            CompletionOutcome::ReportSent {
                succeeded, failed, ..
            } => {
                assert_eq!(succeeded, 3);
                assert_eq!(failed, 1);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }

        // Redelivered aggregation is idempotent and does not resend.
        let again = trigger.aggregate(job_id, 1, &last).await.unwrap();
        assert_eq!(again, CompletionOutcome::AlreadySent);
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_send_rolls_back_and_check_retries() {
        let (_dir, jobs, job_id) = setup(2).await;
        let sender = Arc::new(CountingSender::default());
        sender.fail.store(true, Ordering::SeqCst);
        let trigger =
            CompletionTrigger::new(jobs.clone(), ReportTemplate::default(), sender.clone());

        let outcome = trigger.aggregate(job_id, 0, &outcomes(&[1, 2])).await.unwrap();
        match outcome {
            CompletionOutcome::EmailFailed { error, succeeded } => {
                assert!(error.contains("smtp down"));
                assert_eq!(succeeded, 2);
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
        let job = jobs.get(job_id).await.unwrap().unwrap();
        assert!(!job.report_sent);
        assert!(job.completed_at.is_none());

        sender.fail.store(false, Ordering::SeqCst);
        let retried = trigger.check(job_id).await.unwrap();
        assert!(matches!(retried, CompletionOutcome::ReportSent { .. }));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 1);
        assert!(jobs.get(job_id).await.unwrap().unwrap().report_sent);
    }

    async fn execute(ctx: &DbContext, sql: &str) -> Result<(), DieselError> {
        crate::with_conn!(ctx.pool(), conn => conn.batch_execute(sql).await)
    }

    #[tokio::test]
    async fn test_unreadable_results_release_claim() {
        let dir = tempdir().unwrap();
        let ctx = DbContext::new(&dir.path().join("test.db"));
        ctx.init_schema().await.unwrap();
        let jobs = ctx.jobs();
        let (job, _) = jobs
            .get_or_create(NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(), 1, 1)
            .await
            .unwrap();

        // A result row whose payload cannot be decoded: it counts toward
        // completion but loading the outcomes fails after the claim.
        let sql = format!(
            "DROP TABLE crawl_results;
             CREATE TABLE crawl_results (
                 id INTEGER PRIMARY KEY AUTOINCREMENT,
                 job_id INTEGER NOT NULL,
                 keyword_id INTEGER NOT NULL,
                 server_id INTEGER NOT NULL,
                 status TEXT NOT NULL,
                 payload TEXT,
                 created_at TEXT NOT NULL
             );
             INSERT INTO crawl_results (job_id, keyword_id, server_id, status, payload, created_at)
             VALUES ({}, 1, 0, 'success', NULL, '2024-06-01T00:00:00Z');",
            job.id
        );
        execute(&ctx, &sql).await.unwrap();

        let sender = Arc::new(CountingSender::default());
        let trigger = CompletionTrigger::new(jobs.clone(), ReportTemplate::default(), sender.clone());

        let outcome = trigger.check(job.id).await.unwrap();
        assert!(matches!(outcome, CompletionOutcome::EmailFailed { succeeded: 0, .. }));
        assert_eq!(sender.sent.load(Ordering::SeqCst), 0);

        let job = jobs.get(job.id).await.unwrap().unwrap();
        assert!(!job.report_sent);
        assert!(job.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_check_unknown_job() {
        let (_dir, jobs, _) = setup(1).await;
        let trigger = CompletionTrigger::new(
            jobs,
            ReportTemplate::default(),
            Arc::new(CountingSender::default()),
        );
        assert!(matches!(
            trigger.check(999).await,
            Err(CompletionError::JobNotFound(999))
        ));
    }

    #[test]
    fn test_outcome_serializes_with_status_tag() {
        let json = serde_json::to_value(CompletionOutcome::AlreadySent).unwrap();
        assert_eq!(json["status"], "ALREADY_SENT");
    }
}
