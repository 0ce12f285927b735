//! Web server command.

use console::style;

use serpwatch::app::App;
use serpwatch::config::Settings;

/// Start the admin server.
pub async fn cmd_serve(settings: Settings, bind: Option<String>) -> anyhow::Result<()> {
    let bind = bind.unwrap_or_else(|| settings.bind.clone());
    let app = App::build(settings).await?;

    println!("{} Starting serpwatch admin server at http://{}", style("→").cyan(), bind);
    println!("  Press Ctrl+C to stop");

    serpwatch::server::serve(app, &bind).await
}
