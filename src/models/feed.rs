use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A syndication source cached locally.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feed {
    pub id: i64,
    pub url: String,
    pub next_retrieval: DateTime<Utc>,
    #[serde(default)]
    pub title: String,
}

impl Feed {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now > self.next_retrieval
    }
}

/// An item of a feed; the guid is unique within its feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedItem {
    pub guid: String,
    pub title: String,
    pub published: DateTime<Utc>,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemForUser {
    #[serde(flatten)]
    pub item: FeedItem,
    pub read: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewItem {
    pub title: String,
    pub published: DateTime<Utc>,
    pub link: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreviewResult {
    pub title: String,
    pub items: Vec<PreviewItem>,
}
