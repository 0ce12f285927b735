//! Collection commands: one-shot run, daemon, and the ad-hoc crawl and mail tests.

use std::sync::Arc;

use console::style;

use serpwatch::app::App;
use serpwatch::config::Settings;
use serpwatch::diagnostics::{crawl_test, run_test, split_keywords, test_template};
use serpwatch::orchestrator::RunOutcome;
use serpwatch::scheduler::start_scheduler;

use super::helpers::print_completion;

/// Run the collection once and wait for this server's aggregation.
pub async fn cmd_run(
    settings: Settings,
    limit: Option<i64>,
    force: bool,
    json: bool,
) -> anyhow::Result<()> {
    let app = App::build(settings).await?;

    let outcome = match limit {
        Some(limit) => app.orchestrator.dispatch_manual(limit).await?,
        None => app.orchestrator.run_daily(force).await?,
    };

    let (summary, handle) = match outcome {
        RunOutcome::Dispatched { summary, handle } => (summary, handle),
        other => {
            if json {
                println!("{}", serde_json::json!({ "status": other.label() }));
            } else {
                println!("{} {}", style("!").yellow(), other.label());
            }
            return Ok(());
        }
    };

    if !json {
        println!(
            "{} Server {}/{} dispatched {} of {} keywords (job {}{})",
            style("→").cyan(),
            summary.server_id,
            summary.total_servers,
            summary.my_keywords,
            summary.total_keywords,
            summary.job_id,
            if summary.job_created { ", new" } else { "" }
        );
    }

    let done = handle.wait().await?;
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "dispatch": summary,
                "label": done.label(),
                "outcome": done,
            }))?
        );
    } else {
        print_completion(&done);
    }
    Ok(())
}

/// Run the scheduler until Ctrl+C, optionally serving the admin API.
pub async fn cmd_daemon(settings: Settings, serve: Option<String>) -> anyhow::Result<()> {
    let schedule = settings.schedule.clone();
    let app = App::build(settings).await?;

    let mut scheduler = start_scheduler(Arc::clone(&app.orchestrator), &schedule).await?;
    println!(
        "{} Daily collection scheduled ({}, UTC) for server {}",
        style("→").cyan(),
        schedule,
        app.settings.server_id
    );
    println!("  Press Ctrl+C to stop");

    let server = serve.map(|bind| {
        let app = app.clone();
        tokio::spawn(async move {
            if let Err(e) = serpwatch::server::serve(app, &bind).await {
                tracing::error!("Admin server stopped: {}", e);
            }
        })
    });

    tokio::signal::ctrl_c().await?;
    println!("{} Shutting down", style("→").cyan());

    if let Some(server) = server {
        server.abort();
    }
    scheduler.shutdown().await?;
    Ok(())
}

/// Run the keyword pipeline directly for ad-hoc keywords.
pub async fn cmd_crawl_test(settings: Settings, keywords: &str) -> anyhow::Result<()> {
    let keywords = split_keywords(keywords);
    if keywords.is_empty() {
        anyhow::bail!("no keywords given (example: serpwatch crawl-test \"kw1,kw2\")");
    }

    let app = App::build(settings).await?;
    let result = crawl_test(&app.processor, &app.db.urls(), &keywords).await;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

/// Crawl ad-hoc keywords and mail the resulting workbook.
pub async fn cmd_run_test(settings: Settings, keywords: &str) -> anyhow::Result<()> {
    let keywords = split_keywords(keywords);
    if keywords.is_empty() {
        anyhow::bail!("no keywords given (example: serpwatch run-test \"kw1,kw2\")");
    }

    let app = App::build(settings).await?;
    let template = test_template(&app.settings.report);
    let result = run_test(
        &app.processor,
        &app.db.urls(),
        &keywords,
        &template,
        app.sender.as_ref(),
        app.orchestrator.today(),
    )
    .await?;

    println!(
        "{} Sent {} to {} ({} ok, {} failed, {})",
        style("✓").green(),
        result.filename,
        result.recipients.join(", "),
        result.succeeded,
        result.failed,
        result.elapsed
    );
    Ok(())
}
