//! Catalog import commands.

use std::path::Path;

use console::style;

use serpwatch::catalog::{read_keywords, read_urls};
use serpwatch::config::Settings;
use serpwatch::repository::DbContext;

async fn context(settings: &Settings) -> anyhow::Result<DbContext> {
    let ctx = DbContext::from_url(&settings.database_url)?;
    ctx.init_schema().await?;
    Ok(ctx)
}

/// Replace the keyword catalog from `file`.
pub async fn cmd_keywords(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let entries = read_keywords(file).await?;
    let inserted = context(settings).await?.keywords().replace_all(&entries).await?;
    println!(
        "{} Keyword catalog replaced: {} keywords from {}",
        style("✓").green(),
        inserted,
        file.display()
    );
    Ok(())
}

/// Replace the registered URL catalog from `file`.
pub async fn cmd_urls(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    let entries = read_urls(file).await?;
    let inserted = context(settings).await?.urls().replace_all(&entries).await?;
    println!(
        "{} URL catalog replaced: {} URLs from {}",
        style("✓").green(),
        inserted,
        file.display()
    );
    Ok(())
}
