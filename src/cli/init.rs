//! Initialize command.

use console::style;

use serpwatch::config::Settings;
use serpwatch::repository::DbContext;

/// Create the database schema.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let ctx = DbContext::from_url(&settings.database_url)?;
    ctx.init_schema().await?;

    let tables = ctx.list_tables().await?;
    println!(
        "{} Initialized database {} ({} tables)",
        style("✓").green(),
        settings.database_url,
        tables.len()
    );
    Ok(())
}
