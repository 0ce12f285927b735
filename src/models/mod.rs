//! Data models for serpwatch.

mod catalog;
mod job;
mod row;

pub use catalog::{Keyword, KeywordEntry, RegisteredUrl, RegisteredUrlEntry};
pub use job::{CrawlJob, JobStatus, KeywordOutcome, OutcomeStatus};
pub use row::{Cell, ReportRow, COLUMNS, COLUMN_COUNT};
