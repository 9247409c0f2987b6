mod fetcher;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};

use crate::error::Result;
use crate::models::FeedItem;

pub use fetcher::{parse_feed, FeedFetcher};

/// A feed as just retrieved from its source.
#[derive(Debug, Clone, Default)]
pub struct FetchedFeed {
    pub title: String,
    pub items: Vec<FeedItem>,
}

/// Where feed contents come from.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed>;
}

/// Fetches several feeds, at most `concurrency` at a time. Results come back in
/// completion order, paired with their url.
pub async fn fetch_all(
    source: &dyn FeedSource,
    urls: Vec<String>,
    concurrency: usize,
) -> Vec<(String, Result<FetchedFeed>)> {
    stream::iter(urls)
        .map(|url| async move {
            let result = source.fetch(&url).await;
            match &result {
                Ok(feed) => tracing::debug!("Fetched {} items from {}", feed.items.len(), url),
                Err(e) => tracing::debug!("Failed to fetch {}: {}", url, e),
            }
            (url, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await
}
