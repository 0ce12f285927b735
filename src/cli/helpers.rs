//! Shared helper functions for CLI commands.

use chrono::NaiveDate;
use console::style;

use serpwatch::completion::CompletionOutcome;

/// Parse a `YYYY-MM-DD` argument, falling back to `today`.
pub fn parse_date(arg: Option<&str>, today: NaiveDate) -> anyhow::Result<NaiveDate> {
    match arg {
        Some(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .map_err(|e| anyhow::anyhow!("invalid date '{}': {}", s, e)),
        None => Ok(today),
    }
}

/// Print a completion outcome for humans.
pub fn print_completion(outcome: &CompletionOutcome) {
    match outcome {
        CompletionOutcome::ServerDone {
            completed, total, ..
        } => println!(
            "{} {} ({}/{} results persisted, waiting on other servers)",
            style("…").yellow(),
            outcome.label(),
            completed,
            total
        ),
        CompletionOutcome::AlreadySent => println!(
            "{} Report was already sent by another server",
            style("✓").green()
        ),
        CompletionOutcome::ReportSent {
            succeeded,
            failed,
            elapsed,
        } => println!(
            "{} Report sent: {} succeeded, {} failed, elapsed {}",
            style("✓").green(),
            succeeded,
            failed,
            elapsed
        ),
        CompletionOutcome::EmailFailed { error, succeeded } => println!(
            "{} Report delivery failed ({} succeeded): {}\n  Retry with `serpwatch report check`",
            style("✗").red(),
            succeeded,
            error
        ),
    }
}
