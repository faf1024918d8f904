use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use news_aggregator::aggregator::{start_background_refresh, Aggregator};
use news_aggregator::cli::{Cli, Command};
use news_aggregator::config::Config;
use news_aggregator::db::Database;
use news_aggregator::fetcher::FeedFetcher;
use news_aggregator::routes::{self, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "news_aggregator=info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    // Load configuration
    let config = Config::load(&cli.config)?;
    info!("Loaded {} websites from configuration", config.websites.len());

    // Initialize database
    let db = Database::new(&cli.database_url).await?;
    db.initialize().await?;
    db.sync_websites(&config.websites).await?;
    info!("Database initialized");

    let db = Arc::new(db);

    let fetcher = FeedFetcher::new(Duration::from_secs(config.request_timeout))?;
    let aggregator = Arc::new(Aggregator::new(
        db.clone(),
        fetcher,
        config.max_concurrency,
    ));

    if cli.command() == Command::Scrape {
        let report = aggregator.aggregate_all().await?;
        info!(
            "Inserted {} new items from {} websites ({} failed)",
            report.inserted, report.websites, report.failed
        );
        return Ok(());
    }

    // Start background refresh task
    let bg_aggregator = aggregator.clone();
    let refresh_interval = config.refresh_interval;
    tokio::spawn(async move {
        start_background_refresh(bg_aggregator, refresh_interval).await;
    });

    let state = Arc::new(AppState {
        db: db.clone(),
        aggregator: aggregator.clone(),
    });
    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    info!("Server starting on http://{}", config.listen_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
