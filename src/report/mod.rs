//! Consolidated daily report: spreadsheet rendering and delivery.

mod mail;
mod xlsx;

pub use mail::{HttpRelaySender, OutboxSender, ReportSender};
pub use xlsx::{write_workbook, XLSX_MIME};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CrawlJob, KeywordOutcome, COLUMNS, COLUMN_COUNT};

/// Errors from building or delivering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    #[error("spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("delivery failed: {0}")]
    Delivery(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),
}

/// File name, subject and addressing of the outgoing report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportTemplate {
    pub filename: String,
    pub subject: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
}

impl Default for ReportTemplate {
    fn default() -> Self {
        Self {
            filename: "1그룹_지식인통검.xlsx".to_string(),
            subject: "[지식인통검(1그룹)] 결과 파일 송부".to_string(),
            recipients: Vec::new(),
            cc: Vec::new(),
        }
    }
}

/// A rendered report ready for delivery.
#[derive(Debug, Clone)]
pub struct Report {
    pub filename: String,
    pub subject: String,
    pub body: String,
    pub recipients: Vec<String>,
    pub cc: Vec<String>,
    pub attachment: Vec<u8>,
    pub content_type: &'static str,
    pub succeeded: usize,
    pub failed: usize,
    pub elapsed: String,
}

/// Render the job's outcomes into a report.
///
/// `outcomes` must already be ordered by keyword id. Failed keywords become
/// empty rows so row positions still line up with the catalog.
pub fn build_report(
    template: &ReportTemplate,
    job: &CrawlJob,
    outcomes: &[KeywordOutcome],
    completed_at: DateTime<Utc>,
) -> Result<Report, ReportError> {
    let rows: Vec<_> = outcomes
        .iter()
        .map(|outcome| match &outcome.row {
            Some(row) => row.cells(),
            None => Vec::with_capacity(COLUMN_COUNT),
        })
        .collect();

    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let failed = outcomes.len() - succeeded;
    let elapsed = format_elapsed(completed_at.signed_duration_since(job.started_at));

    let attachment = write_workbook(&COLUMNS, &rows)?;

    let body = format!(
        "{} 크롤링 결과를 첨부합니다.\n\n\
         - 성공: {}건\n\
         - 실패: {}건\n\
         - 소요 시간: {}\n\
         - 서버 수: {}\n",
        job.job_date.format("%Y-%m-%d"),
        succeeded,
        failed,
        elapsed,
        job.total_servers,
    );

    Ok(Report {
        filename: template.filename.clone(),
        subject: template.subject.clone(),
        body,
        recipients: template.recipients.clone(),
        cc: template.cc.clone(),
        attachment,
        content_type: XLSX_MIME,
        succeeded,
        failed,
        elapsed,
    })
}

/// Render a duration as `{h}h {m}m {s}s`. Negative spans clamp to zero.
pub fn format_elapsed(elapsed: chrono::Duration) -> String {
    let total = elapsed.num_seconds().max(0);
    format!("{}h {}m {}s", total / 3600, (total % 3600) / 60, total % 60)
}
