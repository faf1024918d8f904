use std::sync::Arc;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::db::{Database, NewNews, Website};
use crate::fetcher::FeedFetcher;
use crate::parser::parse_feed;

/// Outcome of one aggregation pass.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AggregationReport {
    pub websites: usize,
    pub failed: usize,
    pub parsed: usize,
    pub inserted: u64,
}

pub struct Aggregator {
    fetcher: FeedFetcher,
    db: Arc<Database>,
    max_concurrency: usize,
    refreshing: Arc<RwLock<bool>>,
}

impl Aggregator {
    pub fn new(db: Arc<Database>, fetcher: FeedFetcher, max_concurrency: usize) -> Self {
        Self {
            fetcher,
            db,
            max_concurrency: max_concurrency.max(1),
            refreshing: Arc::new(RwLock::new(false)),
        }
    }

    pub async fn is_refreshing(&self) -> bool {
        *self.refreshing.read().await
    }

    /// Run one pass unless another is already in flight, in which case
    /// `None` is returned without touching the feeds.
    pub async fn refresh_all(&self) -> anyhow::Result<Option<AggregationReport>> {
        {
            let mut refreshing = self.refreshing.write().await;
            if *refreshing {
                info!("Refresh already in progress, skipping");
                return Ok(None);
            }
            *refreshing = true;
        }

        let result = self.aggregate_all().await;

        {
            let mut refreshing = self.refreshing.write().await;
            *refreshing = false;
        }

        result.map(Some)
    }

    /// Fetch and parse every website concurrently, then write the merged
    /// batch once all of them have finished.
    pub async fn aggregate_all(&self) -> anyhow::Result<AggregationReport> {
        let websites = self.db.get_all_websites().await?;
        let mut report = AggregationReport {
            websites: websites.len(),
            ..AggregationReport::default()
        };
        info!("Aggregating {} websites", report.websites);

        let results: Vec<Option<Vec<NewNews>>> = stream::iter(websites)
            .map(|website| async move { self.collect_website(&website).await })
            .buffer_unordered(self.max_concurrency)
            .collect()
            .await;

        let mut batch = Vec::new();
        for result in results {
            match result {
                Some(news) => batch.extend(news),
                None => report.failed += 1,
            }
        }
        report.parsed = batch.len();

        report.inserted = self.db.insert_new_news(&batch).await?;

        info!(
            websites = report.websites,
            failed = report.failed,
            parsed = report.parsed,
            inserted = report.inserted,
            "Aggregation complete"
        );
        Ok(report)
    }

    /// `None` when the feed could not be fetched or was not readable XML.
    async fn collect_website(&self, website: &Website) -> Option<Vec<NewNews>> {
        let body = self.fetcher.fetch(&website.rss_url).await?;

        let parsed = match parse_feed(&body, &website.selectors()) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(website = %website.name, error = %e, "Failed to parse feed");
                return None;
            }
        };

        info!("Parsed {} items for website '{}'", parsed.len(), website.name);

        Some(
            parsed
                .into_iter()
                .map(|item| NewNews {
                    website_id: website.id,
                    title: item.title,
                    link: item.link,
                    content: item.content,
                    guid: item.guid,
                    author: item.author,
                    published: item.published,
                })
                .collect(),
        )
    }
}

/// Sleep between scheduled passes; never shorter than one minute.
fn refresh_period(interval_minutes: u64) -> Duration {
    Duration::from_secs(interval_minutes.max(1).saturating_mul(60))
}

pub async fn start_background_refresh(aggregator: Arc<Aggregator>, interval_minutes: u64) {
    let interval = refresh_period(interval_minutes);

    info!("Starting initial aggregation");
    if let Err(e) = aggregator.refresh_all().await {
        error!("Initial aggregation failed: {}", e);
    }

    loop {
        tokio::time::sleep(interval).await;
        info!("Starting scheduled aggregation");
        if let Err(e) = aggregator.refresh_all().await {
            error!("Scheduled aggregation failed: {}", e);
        }
    }
}
