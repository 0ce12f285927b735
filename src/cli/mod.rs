//! CLI parser and command dispatch.

mod catalog;
mod helpers;
mod init;
mod report;
mod run;
mod serve;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use serpwatch::config::load_settings;

#[derive(Parser)]
#[command(name = "serpwatch")]
#[command(about = "Distributed search result page monitoring")]
#[command(version)]
pub struct Cli {
    /// Config file path (overrides auto-discovery)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database schema
    Init,

    /// Run the daily collection on its schedule until interrupted
    Daemon {
        /// Also serve the admin API on this address
        #[arg(long)]
        serve: Option<String>,
    },

    /// Run the collection once now and wait for this server's shard
    Run {
        /// Manual dispatch over the first N keywords (skips the daily lock)
        #[arg(short, long)]
        limit: Option<i64>,
        /// Ignore the daily run-once lock
        #[arg(long)]
        force: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Replace a catalog from a file
    Catalog {
        #[command(subcommand)]
        command: CatalogCommands,
    },

    /// Report operations
    Report {
        #[command(subcommand)]
        command: ReportCommands,
    },

    /// Show job progress for a day
    Status {
        /// Job day (YYYY-MM-DD), today by default
        #[arg(long)]
        date: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the keyword pipeline directly and print the rows (no persistence)
    CrawlTest {
        /// Comma separated keywords
        keywords: String,
    },

    /// Crawl ad-hoc keywords and mail the workbook (no job, no persistence)
    RunTest {
        /// Comma separated keywords
        keywords: String,
    },

    /// Start the admin API server
    Serve {
        /// Bind address (host:port)
        bind: Option<String>,
    },
}

#[derive(Subcommand)]
enum CatalogCommands {
    /// Replace the keyword catalog (product, keyword, priority)
    Keywords {
        /// JSON, YAML, or tab/comma separated file with a header row
        file: PathBuf,
    },
    /// Replace the registered URL catalog (url, product, conversion keyword, content type, keyword)
    Urls {
        /// JSON, YAML, or tab/comma separated file with a header row
        file: PathBuf,
    },
}

#[derive(Subcommand)]
enum ReportCommands {
    /// Re-run the completion check and send the report if the job is done
    Check {
        /// Job day (YYYY-MM-DD), today by default
        #[arg(long)]
        date: Option<String>,
    },
}

/// Parse arguments, load settings, and run the selected command.
pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let settings = load_settings(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Init => init::cmd_init(&settings).await,
        Commands::Daemon { serve } => run::cmd_daemon(settings, serve).await,
        Commands::Run { limit, force, json } => run::cmd_run(settings, limit, force, json).await,
        Commands::Catalog { command } => match command {
            CatalogCommands::Keywords { file } => catalog::cmd_keywords(&settings, &file).await,
            CatalogCommands::Urls { file } => catalog::cmd_urls(&settings, &file).await,
        },
        Commands::Report { command } => match command {
            ReportCommands::Check { date } => report::cmd_check(settings, date.as_deref()).await,
        },
        Commands::Status { date, json } => report::cmd_status(settings, date.as_deref(), json).await,
        Commands::CrawlTest { keywords } => run::cmd_crawl_test(settings, &keywords).await,
        Commands::RunTest { keywords } => run::cmd_run_test(settings, &keywords).await,
        Commands::Serve { bind } => serve::cmd_serve(settings, bind).await,
    }
}
