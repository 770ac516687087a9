use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use podroll::config::{AppPaths, Config};
use podroll::feed::{subscribe, HttpFetcher};
use podroll::refresh::{Orchestrator, RefreshOptions};
use podroll::storage::{Database, DatabaseError};

#[derive(Parser, Debug)]
#[command(name = "podroll", about = "Podcast feed aggregator", version)]
struct Args {
    /// Application directory (default: ~/.podroll.d)
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Subscribe to a feed
    Add {
        /// Feed URL (http or https)
        url: String,
    },
    /// List subscribed feeds
    List,
    /// List stored episodes of a feed
    Episodes {
        feed_id: i64,
    },
    /// Turn automatic refresh on or off for a feed
    Autorefresh {
        feed_id: i64,
        #[arg(value_enum)]
        state: Toggle,
    },
    /// Run one refresh cycle over all auto-refresh feeds
    Refresh,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Toggle {
    On,
    Off,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let paths = match args.base_dir {
        Some(base) => AppPaths::new(base),
        None => AppPaths::from_home()?,
    };
    paths.ensure()?;

    let config = Config::load(&paths.settings()).context("Failed to load settings")?;
    podroll::logging::init(&config.log_level, &paths.log_file())?;

    let options = RefreshOptions::from_config(&config);
    let db = open_database(&paths, options.pool_size).await?;
    let fetcher = HttpFetcher::new(Duration::from_secs(config.fetch_timeout_secs))
        .context("Failed to create HTTP client")?;

    match args.command {
        Command::Add { url } => {
            let feed = subscribe(&db, &fetcher, &url, &paths.downloads())
                .await
                .with_context(|| format!("Failed to add feed '{}'", url))?;
            println!("Added feed {}: {}", feed.id, feed.title);
            println!("Episodes will be saved in {}", feed.folder.display());
        }
        Command::List => {
            let mut conn = db.connection().await?;
            let feeds = conn.feed_get_all().await.context("Failed to load feeds")?;
            if feeds.is_empty() {
                println!("No feeds. Add one with: podroll add <URL>");
            }
            for feed in feeds {
                println!(
                    "{:>4}  {}  {}  {}",
                    feed.id,
                    if feed.autorefresh { "auto" } else { "    " },
                    feed.last_refresh.format("%Y-%m-%d %H:%M"),
                    feed.title
                );
            }
        }
        Command::Episodes { feed_id } => {
            let mut conn = db.connection().await?;
            conn.feed_get_by_id(feed_id)
                .await?
                .with_context(|| format!("No feed with id {}", feed_id))?;
            for episode in conn.episode_get_by_feed(feed_id).await? {
                println!(
                    "{}  {:>4}  {}",
                    episode.published.format("%Y-%m-%d"),
                    episode.number,
                    episode.title
                );
            }
        }
        Command::Autorefresh { feed_id, state } => {
            let enabled = matches!(state, Toggle::On);
            let mut conn = db.connection().await?;
            conn.feed_get_by_id(feed_id)
                .await?
                .with_context(|| format!("No feed with id {}", feed_id))?;
            conn.feed_set_autorefresh(feed_id, enabled).await?;
            println!(
                "Auto-refresh {} for feed {}",
                if enabled { "enabled" } else { "disabled" },
                feed_id
            );
        }
        Command::Refresh => {
            let orchestrator = Orchestrator::new(db.clone(), Arc::new(fetcher), options);
            orchestrator.refresh_all().await;

            let mut conn = db.connection().await?;
            let total = conn.episode_get_all().await?.len();
            println!("Refresh finished, {} episodes stored", total);
        }
    }

    Ok(())
}

/// One connection per worker plus one for the coordinator.
async fn open_database(paths: &AppPaths, workers: usize) -> Result<Database> {
    let db_path = paths.database();
    let db_path = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let max_connections = u32::try_from(workers + 1).unwrap_or(u32::MAX);

    match Database::open(db_path, max_connections).await {
        Ok(db) => Ok(db),
        Err(DatabaseError::InstanceLocked) => {
            eprintln!("Error: The database is in use by another process. Please close it and try again.");
            std::process::exit(1);
        }
        Err(e) => Err(anyhow::anyhow!("Failed to open database: {}", e)),
    }
}
