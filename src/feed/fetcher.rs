use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use feed_rs::parser;
use reqwest::Client;

use crate::error::Result;
use crate::models::FeedItem;

use super::{FeedSource, FetchedFeed};

pub struct FeedFetcher {
    client: Client,
}

impl FeedFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .user_agent(concat!("homeboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait]
impl FeedSource for FeedFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(anyhow::anyhow!("Failed to fetch feed: HTTP {}", response.status()).into());
        }

        let bytes = response.bytes().await?;
        parse_feed(&bytes[..], Utc::now())
    }
}

/// Parses an RSS/Atom/JSON feed document. Entries without a date are stamped with
/// `fetched_at`.
pub fn parse_feed(bytes: &[u8], fetched_at: DateTime<Utc>) -> Result<FetchedFeed> {
    let feed = parser::parse(bytes)?;

    let title = feed.title.map(|t| t.content).unwrap_or_default();
    let items = feed
        .entries
        .into_iter()
        .map(|entry| FeedItem {
            guid: entry.id,
            title: entry
                .title
                .map(|t| t.content)
                .unwrap_or_else(|| "Untitled".to_string()),
            published: entry.published.or(entry.updated).unwrap_or(fetched_at),
            link: entry
                .links
                .first()
                .map(|l| l.href.clone())
                .unwrap_or_default(),
        })
        .collect();

    Ok(FetchedFeed { title, items })
}
