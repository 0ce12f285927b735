//! Report and status commands.

use chrono::Utc;
use console::style;

use serpwatch::app::App;
use serpwatch::config::Settings;
use serpwatch::repository::DbContext;

use super::helpers::{parse_date, print_completion};

/// Manual completion re-check; sends the report if the job is done and unsent.
pub async fn cmd_check(settings: Settings, date: Option<&str>) -> anyhow::Result<()> {
    let app = App::build(settings).await?;
    let date = parse_date(date, app.orchestrator.today())?;

    let Some(job) = app.db.jobs().get_by_date(date).await? else {
        println!("{} No job for {}", style("!").yellow(), date);
        return Ok(());
    };

    let outcome = app.trigger.check(job.id).await?;
    print_completion(&outcome);
    Ok(())
}

/// Show persisted progress for a day's job.
pub async fn cmd_status(settings: Settings, date: Option<&str>, json: bool) -> anyhow::Result<()> {
    let today = Utc::now().with_timezone(&settings.utc_offset).date_naive();
    let date = parse_date(date, today)?;

    let ctx = DbContext::from_url(&settings.database_url)?;
    ctx.init_schema().await?;

    let Some(status) = ctx.jobs().status(date).await? else {
        if json {
            println!("null");
        } else {
            println!("{} No job for {}", style("!").yellow(), date);
        }
        return Ok(());
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&status)?);
        return Ok(());
    }

    let job = &status.job;
    println!("{} Job {} for {}", style("→").cyan(), job.id, job.job_date);
    println!("  Servers:    {}", job.total_servers);
    println!(
        "  Persisted:  {}/{} ({} succeeded, {} failed)",
        status.persisted, job.total_keywords, status.succeeded, status.failed
    );
    println!("  Started:    {}", job.started_at.to_rfc3339());
    match job.completed_at {
        Some(done) => println!("  Completed:  {}", done.to_rfc3339()),
        None => println!("  Completed:  -"),
    }
    let sent = if job.report_sent {
        style("yes").green()
    } else if status.is_complete() {
        style("no (run `serpwatch report check`)").red()
    } else {
        style("no").yellow()
    };
    println!("  Report:     {}", sent);
    Ok(())
}
