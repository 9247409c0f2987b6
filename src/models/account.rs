use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ItemForUser;

/// Kind of service offered by a third party.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Service {
    Email,
    SocialFeed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderDescription {
    pub name: String,
    pub title: String,
    pub link: String,
    pub services: Vec<Service>,
}

/// OAuth2 token as returned by the provider. Opaque to the core.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Token {
    pub access_token: String,
    #[serde(default)]
    pub token_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

/// A linked third-party account.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ExternalAccount {
    pub id: i64,
    pub provider_name: String,
    pub account_id: String,
    #[serde(skip)]
    pub token: Token,
}

impl ExternalAccount {
    /// Identity of the account across databases (ids are not stable).
    pub fn key(&self) -> String {
        format!("{}:{}", self.provider_name, self.account_id)
    }
}

/// An email or conversation, as cached for an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailItem {
    #[serde(flatten)]
    pub item: ItemForUser,
    pub from: String,
    pub snippet: String,
}

impl EmailItem {
    pub fn guid(&self) -> &str {
        &self.item.item.guid
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailQuery {
    #[serde(default)]
    pub category: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmailPage {
    pub items: Vec<EmailItem>,
    #[serde(rename = "nextpage", default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
    pub result_size_estimate: i64,
}

/// A thread as listed by a provider: its guid and the provider-assigned version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadRef {
    pub guid: String,
    pub version: u64,
}

#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    pub threads: Vec<ThreadRef>,
    pub next_page_token: Option<String>,
    pub result_size_estimate: i64,
}
