//! Chatscribe: record live chat rooms and their viewer lists into SQLite.

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use tracing::{error, info, warn};

use chatscribe_browser::{ChromeBrowser, LaunchOptions};
use chatscribe_cli::{dump, logging};
use chatscribe_core::{Browser, CancellationSignal, ScraperConfig};
use chatscribe_runtime::{run_fleet, TaskKind};
use chatscribe_store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "chatscribe", version)]
#[command(about = "Records live chat rooms and their viewer lists")]
struct Cli {
    /// Verbose output (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Custom config file location
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Follow the configured chats until interrupted
    Scrape,
    /// Save the viewer list of every configured chat and exit
    Viewers,
    /// List every chat in the database
    Targets,
    /// Dump the viewer lists into text files, one per chat
    DumpViewers { directory: PathBuf },
    /// Dump the saved chat of one room into a text file
    DumpChat { handle: String, directory: PathBuf },
    /// Dump all chats to stdout
    DumpAll {
        /// Leave timestamps out of the output
        #[arg(long)]
        no_timestamps: bool,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let config = ScraperConfig::resolve(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Command::Scrape => scrape(&config, TaskKind::Chat).await,
        Command::Viewers => scrape(&config, TaskKind::ViewerSnapshot).await,
        Command::Targets => {
            let store = open_store(&config)?;
            let mut out = std::io::stdout().lock();
            for row in store.list_targets()? {
                writeln!(out, "{}", row.handle)?;
            }
            Ok(())
        }
        Command::DumpViewers { directory } => {
            let store = open_store(&config)?;
            dump::dump_viewer_lists(&store, &directory)?;
            Ok(())
        }
        Command::DumpChat { handle, directory } => {
            let store = open_store(&config)?;
            dump::dump_chat(&store, &handle, &directory)?;
            Ok(())
        }
        Command::DumpAll { no_timestamps } => {
            let store = open_store(&config)?;
            let entries = store.all_chat()?;
            let mut out = std::io::stdout().lock();
            dump::write_all(&entries, !no_timestamps, &mut out)?;
            Ok(())
        }
    }
}

fn open_store(config: &ScraperConfig) -> anyhow::Result<SqliteStore> {
    SqliteStore::open(&config.db_path).with_context(|| format!("opening {}", config.db_path))
}

/// Run every configured target. Exits non-zero when all of them failed.
async fn scrape(config: &ScraperConfig, kind: TaskKind) -> anyhow::Result<()> {
    let browser = Arc::new(
        ChromeBrowser::start(LaunchOptions::from_config(config))
            .await
            .context("starting browser")?,
    );

    let result = run_fleet(config, kind, browser.clone(), CancellationSignal::new()).await;
    if let Err(e) = browser.shutdown().await {
        warn!("Browser shutdown failed: {}", e);
    }
    let report = result?;

    info!(
        "{} targets done, {} failed, {} records stored",
        report.outcomes.len(),
        report.failures().count(),
        report.records()
    );
    if report.all_failed() {
        error!("Every target failed");
        std::process::exit(1);
    }
    Ok(())
}
