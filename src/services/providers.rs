use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AppError, Result};
use crate::models::{
    EmailItem, EmailQuery, ExternalAccount, ProviderDescription, Service, ThreadPage, Token,
};

/// A third-party mail service reached through OAuth2.
#[async_trait]
pub trait EmailProvider: Send + Sync {
    fn description(&self) -> ProviderDescription;

    /// Where to send the user to grant access; `state` comes back on the callback.
    fn auth_code_url(&self, state: &str) -> String;

    async fn exchange_code(&self, code: &str) -> Result<Token>;

    async fn current_email_address(&self, account: &ExternalAccount) -> Result<String>;

    /// One page of threads with the provider-assigned version of each.
    async fn list_threads(
        &self,
        account: &ExternalAccount,
        query: &EmailQuery,
        page_token: Option<&str>,
    ) -> Result<ThreadPage>;

    /// The full item for a listed thread, or `None` when it vanished meanwhile.
    async fn fetch_item(&self, account: &ExternalAccount, guid: &str) -> Result<Option<EmailItem>>;
}

/// Providers by name.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, Arc<dyn EmailProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, provider: Arc<dyn EmailProvider>) {
        let name = provider.description().name;
        tracing::debug!("Registered provider {}", name);
        self.providers.insert(name, provider);
    }

    pub fn get(&self, name: &str) -> Result<&Arc<dyn EmailProvider>> {
        self.providers
            .get(name)
            .ok_or_else(|| AppError::NotFound(format!("unknown service: {name}")))
    }

    /// The provider behind `name`, if it offers email.
    pub fn email(&self, name: &str) -> Result<&Arc<dyn EmailProvider>> {
        let provider = self.get(name)?;
        if !provider.description().services.contains(&Service::Email) {
            return Err(AppError::InvalidInput(format!(
                "email service not available: {name}"
            )));
        }
        Ok(provider)
    }

    pub fn descriptions(&self) -> Vec<ProviderDescription> {
        self.providers.values().map(|p| p.description()).collect()
    }
}
