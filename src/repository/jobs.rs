//! Daily job registry and result persistence.
//!
//! The two operations that carry the fleet's correctness are here:
//! insert-ignore of per-keyword results keyed by `(job_id, keyword_id)`, and
//! the conditional `report_sent` transition that lets exactly one caller
//! claim the report.

use chrono::{DateTime, NaiveDate, Utc};
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{CrawlJobRecord, CrawlResultRecord, NewCrawlJob, NewCrawlResult};
use super::pool::{DbPool, DieselError};
use super::util::{format_job_date, parse_datetime, parse_datetime_opt, parse_job_date};
use crate::models::{CrawlJob, JobStatus, KeywordOutcome, OutcomeStatus, ReportRow};
use crate::schema::{crawl_jobs, crawl_results};
use crate::with_conn;

/// Payload stored for keywords that produced no row.
const EMPTY_PAYLOAD: &str = "[]";

impl From<CrawlJobRecord> for CrawlJob {
    fn from(record: CrawlJobRecord) -> Self {
        CrawlJob {
            id: record.id,
            job_date: parse_job_date(&record.job_date),
            total_keywords: record.total_keywords,
            total_servers: record.total_servers,
            report_sent: record.report_sent != 0,
            started_at: parse_datetime(&record.started_at),
            completed_at: parse_datetime_opt(record.completed_at),
        }
    }
}

impl From<CrawlResultRecord> for KeywordOutcome {
    fn from(record: CrawlResultRecord) -> Self {
        let status = OutcomeStatus::from_str(&record.status).unwrap_or(OutcomeStatus::Failed);
        let row = match status {
            OutcomeStatus::Success => serde_json::from_str::<ReportRow>(&record.payload).ok(),
            OutcomeStatus::Failed => None,
        };
        KeywordOutcome {
            keyword_id: record.keyword_id,
            row,
            status,
        }
    }
}

/// Repository for `crawl_jobs` and `crawl_results`.
#[derive(Clone)]
pub struct JobRepository {
    pool: DbPool,
}

impl JobRepository {
    /// Create a new job repository.
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get the job for `date`, creating it if no server has yet.
    ///
    /// Racing creators all observe the first row; fields of an existing job
    /// are never overwritten. The flag is `true` only for the caller whose
    /// insert created the row.
    pub async fn get_or_create(
        &self,
        date: NaiveDate,
        total_keywords: i32,
        total_servers: i32,
    ) -> Result<(CrawlJob, bool), DieselError> {
        let job_date = format_job_date(date);
        let now = Utc::now().to_rfc3339();

        with_conn!(self.pool, conn => {
            let inserted = diesel::insert_into(crawl_jobs::table)
                .values(NewCrawlJob {
                    job_date: &job_date,
                    total_keywords,
                    total_servers,
                    report_sent: 0,
                    started_at: &now,
                })
                .on_conflict(crawl_jobs::job_date)
                .do_nothing()
                .execute(&mut conn)
                .await?;

            crawl_jobs::table
                .filter(crawl_jobs::job_date.eq(&job_date))
                .select(CrawlJobRecord::as_select())
                .first::<CrawlJobRecord>(&mut conn)
                .await
                .map(|record| (CrawlJob::from(record), inserted == 1))
        })
    }

    /// Get the job for a date.
    pub async fn get_by_date(&self, date: NaiveDate) -> Result<Option<CrawlJob>, DieselError> {
        let job_date = format_job_date(date);

        with_conn!(self.pool, conn => {
            crawl_jobs::table
                .filter(crawl_jobs::job_date.eq(&job_date))
                .select(CrawlJobRecord::as_select())
                .first::<CrawlJobRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(CrawlJob::from))
        })
    }

    /// Get a job by id.
    pub async fn get(&self, job_id: i32) -> Result<Option<CrawlJob>, DieselError> {
        with_conn!(self.pool, conn => {
            crawl_jobs::table
                .find(job_id)
                .select(CrawlJobRecord::as_select())
                .first::<CrawlJobRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(CrawlJob::from))
        })
    }

    /// Persist outcomes for a job, ignoring keywords already recorded.
    ///
    /// Returns the number of rows actually inserted. Replaying the same
    /// outcomes inserts nothing.
    pub async fn insert_results(
        &self,
        job_id: i32,
        server_id: i32,
        outcomes: &[KeywordOutcome],
    ) -> Result<usize, DieselError> {
        let now = Utc::now().to_rfc3339();
        let encoded: Vec<(i32, &'static str, String)> = outcomes
            .iter()
            .map(|o| {
                let payload = o
                    .row
                    .as_ref()
                    .and_then(|row| serde_json::to_string(row).ok())
                    .unwrap_or_else(|| EMPTY_PAYLOAD.to_string());
                (o.keyword_id, o.status.as_str(), payload)
            })
            .collect();

        with_conn!(self.pool, conn => {
            let mut inserted = 0;
            for (keyword_id, status, payload) in &encoded {
                inserted += diesel::insert_into(crawl_results::table)
                    .values(NewCrawlResult {
                        job_id,
                        keyword_id: *keyword_id,
                        server_id,
                        status,
                        payload,
                        created_at: &now,
                    })
                    .on_conflict((crawl_results::job_id, crawl_results::keyword_id))
                    .do_nothing()
                    .execute(&mut conn)
                    .await?;
            }
            Ok(inserted)
        })
    }

    /// Number of results persisted for a job, across all servers.
    pub async fn count_results(&self, job_id: i32) -> Result<i64, DieselError> {
        with_conn!(self.pool, conn => {
            crawl_results::table
                .filter(crawl_results::job_id.eq(job_id))
                .count()
                .get_result::<i64>(&mut conn)
                .await
        })
    }

    /// Atomically flip `report_sent` from false to true.
    ///
    /// Returns `true` only for the single caller whose update matched.
    pub async fn claim_report(
        &self,
        job_id: i32,
        completed_at: DateTime<Utc>,
    ) -> Result<bool, DieselError> {
        let completed_at = completed_at.to_rfc3339();

        with_conn!(self.pool, conn => {
            let updated = diesel::update(
                crawl_jobs::table
                    .filter(crawl_jobs::id.eq(job_id))
                    .filter(crawl_jobs::report_sent.eq(0)),
            )
            .set((
                crawl_jobs::report_sent.eq(1),
                crawl_jobs::completed_at.eq(Some(completed_at)),
            ))
            .execute(&mut conn)
            .await?;

            Ok(updated == 1)
        })
    }

    /// Undo a claim after a failed send so a later check can retry.
    pub async fn release_report(&self, job_id: i32) -> Result<bool, DieselError> {
        with_conn!(self.pool, conn => {
            let updated = diesel::update(
                crawl_jobs::table
                    .filter(crawl_jobs::id.eq(job_id))
                    .filter(crawl_jobs::report_sent.eq(1)),
            )
            .set((
                crawl_jobs::report_sent.eq(0),
                crawl_jobs::completed_at.eq(None::<String>),
            ))
            .execute(&mut conn)
            .await?;

            Ok(updated == 1)
        })
    }

    /// All outcomes for a job ordered by keyword id.
    pub async fn list_outcomes(&self, job_id: i32) -> Result<Vec<KeywordOutcome>, DieselError> {
        with_conn!(self.pool, conn => {
            crawl_results::table
                .filter(crawl_results::job_id.eq(job_id))
                .order(crawl_results::keyword_id.asc())
                .select(CrawlResultRecord::as_select())
                .load::<CrawlResultRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(KeywordOutcome::from).collect())
        })
    }

    /// Progress summary for the job on `date`.
    pub async fn status(&self, date: NaiveDate) -> Result<Option<JobStatus>, DieselError> {
        let Some(job) = self.get_by_date(date).await? else {
            return Ok(None);
        };
        let job_id = job.id;

        let (persisted, succeeded) = with_conn!(self.pool, conn => {
            let persisted: i64 = crawl_results::table
                .filter(crawl_results::job_id.eq(job_id))
                .count()
                .get_result(&mut conn)
                .await?;
            let succeeded: i64 = crawl_results::table
                .filter(crawl_results::job_id.eq(job_id))
                .filter(crawl_results::status.eq(OutcomeStatus::Success.as_str()))
                .count()
                .get_result(&mut conn)
                .await?;
            Ok::<_, DieselError>((persisted, succeeded))
        })?;

        Ok(Some(JobStatus {
            job,
            persisted,
            succeeded,
            failed: persisted - succeeded,
        }))
    }
}
