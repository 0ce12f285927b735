//! Daily crawl job and per-keyword outcome models.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::ReportRow;

/// The durable record of one day's job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlJob {
    pub id: i32,
    pub job_date: NaiveDate,
    pub total_keywords: i32,
    pub total_servers: i32,
    pub report_sent: bool,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

/// Whether a keyword produced a row or exhausted its retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Failed,
}

impl OutcomeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "success" => Some(Self::Success),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// Result of one keyword task.
///
/// A failed keyword still yields an outcome (with no row) so it counts toward
/// job completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordOutcome {
    pub keyword_id: i32,
    pub row: Option<ReportRow>,
    pub status: OutcomeStatus,
}

impl KeywordOutcome {
    pub fn success(keyword_id: i32, row: ReportRow) -> Self {
        Self {
            keyword_id,
            row: Some(row),
            status: OutcomeStatus::Success,
        }
    }

    pub fn failed(keyword_id: i32) -> Self {
        Self {
            keyword_id,
            row: None,
            status: OutcomeStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

/// Summary of a job's progress.
#[derive(Debug, Clone, Serialize)]
pub struct JobStatus {
    pub job: CrawlJob,
    pub persisted: i64,
    pub succeeded: i64,
    pub failed: i64,
}

impl JobStatus {
    pub fn is_complete(&self) -> bool {
        self.persisted >= self.job.total_keywords as i64
    }
}
