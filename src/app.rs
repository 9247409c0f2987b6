use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use crate::config::Config;
use crate::db::{self, layout, run_in_transaction, Repository};
use crate::error::{AppError, Result, ResultExt};
use crate::feed::{fetch_all, FeedFetcher, FeedSource};
use crate::models::{
    EmailPage, EmailQuery, ExternalAccount, Feed, FeedItem, ItemForUser, Layout, PreviewItem,
    PreviewResult, ProviderDescription, Snapshot, Tab, TabSummary, User, UserData, Widget,
    WidgetConfig, WidgetSettings, ANONYMOUS_USER_ID,
};
use crate::services::{Identity, ProviderRegistry};

/// Columns of a freshly created tab.
const NEW_TAB_COLUMNS: usize = 4;

/// Outcome of [`App::refresh_user_feeds`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshSummary {
    pub refreshed: usize,
    pub failed: usize,
}

/// The dashboard use cases. Every user-scoped operation checks the caller first.
pub struct App {
    repository: Arc<dyn Repository>,
    feeds: Arc<dyn FeedSource>,
    providers: ProviderRegistry,
    default_display_count: usize,
    feed_refresh: chrono::Duration,
    feed_item_limit: usize,
    fetch_concurrency: usize,
}

impl App {
    pub async fn new(config: &Config) -> Result<Self> {
        let repository = db::open(&config.storage).await?;
        let feeds = Arc::new(FeedFetcher::new(Duration::from_secs(
            config.request_timeout_secs,
        ))?);

        Ok(Self::from_parts(config, repository, feeds))
    }

    pub fn from_parts(
        config: &Config,
        repository: Arc<dyn Repository>,
        feeds: Arc<dyn FeedSource>,
    ) -> Self {
        Self {
            repository,
            feeds,
            providers: ProviderRegistry::new(),
            default_display_count: config.default_display_count,
            feed_refresh: chrono::Duration::minutes(i64::from(config.feed_refresh_minutes)),
            feed_item_limit: config.feed_item_limit,
            fetch_concurrency: config.fetch_concurrency,
        }
    }

    pub fn with_providers(mut self, providers: ProviderRegistry) -> Self {
        self.providers = providers;
        self
    }

    pub fn repository(&self) -> &Arc<dyn Repository> {
        &self.repository
    }

    // Users

    /// The user and their tabs. A caller seen for the first time is stored from its profile.
    pub async fn user(&self, caller: &dyn Identity, user_id: &str) -> Result<UserData> {
        caller.ensure_can_access(user_id)?;

        let user = match self.repository.get_user(user_id).await {
            Ok(user) => user,
            Err(err) if self.repository.is_not_found(&err) && caller.user_id() == user_id => {
                let user = User::from(caller.profile());
                self.repository
                    .store_user(&user)
                    .await
                    .context("storing user in datastore failed")?;
                tracing::info!("Created user {}", user.user_id);
                user
            }
            Err(err) => return Err(err).context("retrieving user from datastore failed"),
        };

        let tabs = self
            .repository
            .get_tabs(user_id)
            .await
            .context("retrieving tabs from datastore failed")?;

        Ok(UserData { user, tabs })
    }

    pub async fn backup_user(&self, caller: &dyn Identity, user_id: &str) -> Result<Snapshot> {
        caller.ensure_can_access(user_id)?;

        let user = self
            .repository
            .get_user(user_id)
            .await
            .context("retrieving user from datastore failed")?;
        let tabs = self.user_tabs(user_id).await?;

        let mut feeds = Vec::new();
        for feed_id in feed_ids(&tabs) {
            let feed = self
                .repository
                .get_feed(feed_id)
                .await
                .with_context(|| format!("retrieving feed {feed_id} failed"))?;
            feeds.push(feed);
        }

        let accounts = self
            .repository
            .get_accounts(user_id)
            .await
            .context("retrieving accounts from datastore failed")?;

        tracing::info!(
            "Backed up {} tabs, {} feeds and {} accounts of {}",
            tabs.len(),
            feeds.len(),
            accounts.len(),
            user_id
        );
        Ok(Snapshot {
            user,
            tabs,
            feeds,
            accounts,
        })
    }

    /// Recreates the tabs of a snapshot for a user that has none yet.
    ///
    /// Accounts are not restored (their tokens are not part of a snapshot); every account
    /// the snapshot refers to must already be linked again. Feed and account ids inside
    /// widget configs are mapped to the ids of this database.
    pub async fn restore_user(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        snapshot: Snapshot,
    ) -> Result<()> {
        caller.ensure_can_access(user_id)?;

        if snapshot.user.user_id != user_id {
            return Err(AppError::InvalidInput(format!(
                "snapshot belongs to {}, not {user_id}",
                snapshot.user.user_id
            )));
        }

        let existing = self
            .repository
            .get_tabs(user_id)
            .await
            .context("retrieving tabs from datastore failed")?;
        if !existing.is_empty() {
            return Err(AppError::InvalidInput(format!(
                "user {user_id} already has {} tabs",
                existing.len()
            )));
        }

        let linked: HashMap<String, i64> = self
            .repository
            .get_accounts(user_id)
            .await
            .context("retrieving accounts from datastore failed")?
            .into_iter()
            .map(|account| (account.key(), account.id))
            .collect();

        let mut account_ids = HashMap::new();
        for account in &snapshot.accounts {
            let id = linked.get(&account.key()).ok_or_else(|| {
                AppError::InvalidInput(format!(
                    "account {} must be linked before restoring",
                    account.key()
                ))
            })?;
            account_ids.insert(account.id, *id);
        }

        let user_id = user_id.to_string();
        let tab_count = snapshot.tabs.len();
        run_in_transaction(self.repository.as_ref(), move |tx| async move {
            let mut feed_ids = HashMap::new();
            for feed in &snapshot.feeds {
                let id = tx
                    .get_or_create_feed_id(&feed.url)
                    .await
                    .context("getting or creating feed failed")?;
                feed_ids.insert(feed.id, id);
            }

            for tab in snapshot.tabs {
                let mut restored = Tab::new(tab.summary.title, 0);
                tx.store_tab(&mut restored)
                    .await
                    .context("saving tab in datastore failed")?;
                tx.allow_tab_access(&user_id, restored.id())
                    .await
                    .context("granting tab access failed")?;

                let mut columns = Vec::with_capacity(tab.widgets.len());
                for column in tab.widgets {
                    let mut restored_column = Vec::with_capacity(column.len());
                    for mut widget in column {
                        widget.id = 0;
                        match &mut widget.config {
                            WidgetConfig::Feed(cfg) => {
                                cfg.feed_id = remap(&feed_ids, cfg.feed_id, "feed")?;
                            }
                            WidgetConfig::Email(cfg) => {
                                cfg.account_id = remap(&account_ids, cfg.account_id, "account")?;
                            }
                        }
                        tx.store_widget(restored.id(), &mut widget)
                            .await
                            .context("saving widget in datastore failed")?;
                        restored_column.push(widget);
                    }
                    columns.push(restored_column);
                }

                restored.widgets = columns;
                tx.store_tab(&mut restored)
                    .await
                    .context("saving tab in datastore failed")?;
            }
            Ok(())
        })
        .await?;

        tracing::info!("Restored {} tabs", tab_count);
        Ok(())
    }

    // External services and accounts

    pub fn services(&self) -> Vec<ProviderDescription> {
        self.providers.descriptions()
    }

    pub async fn associated_account(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        account_id: i64,
    ) -> Result<ExternalAccount> {
        caller.ensure_can_access(user_id)?;
        self.repository
            .get_account(user_id, account_id)
            .await
            .context("retrieving account from datastore failed")
    }

    pub async fn associated_accounts(
        &self,
        caller: &dyn Identity,
        user_id: &str,
    ) -> Result<Vec<ExternalAccount>> {
        caller.ensure_can_access(user_id)?;
        self.repository
            .get_accounts(user_id)
            .await
            .context("retrieving accounts from datastore failed")
    }

    /// The user's accounts at one provider.
    pub async fn associated_service_accounts(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        service: &str,
    ) -> Result<Vec<ExternalAccount>> {
        let accounts = self.associated_accounts(caller, user_id).await?;
        Ok(accounts
            .into_iter()
            .filter(|account| account.provider_name == service)
            .collect())
    }

    pub async fn revoke_account(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        account_id: i64,
    ) -> Result<()> {
        caller.ensure_can_access(user_id)?;
        self.repository
            .delete_account(user_id, account_id)
            .await
            .context("deleting account failed")?;
        tracing::info!("Revoked account {} of {}", account_id, user_id);
        Ok(())
    }

    // Tabs

    /// Admins pass even without an explicit grant.
    async fn ensure_tab_access(&self, caller: &dyn Identity, tab_id: i64) -> Result<()> {
        match self
            .repository
            .is_tab_access_allowed(caller.user_id(), tab_id)
            .await
        {
            Ok(()) => Ok(()),
            Err(err) if caller.is_admin() && err.is_not_authorized() => Ok(()),
            Err(err) => Err(err),
        }
    }

    pub async fn tab(&self, caller: &dyn Identity, tab_id: i64) -> Result<Tab> {
        self.ensure_tab_access(caller, tab_id).await?;
        self.repository
            .get_tab(tab_id)
            .await
            .context("retrieving tab from datastore failed")
    }

    /// Renames a tab; the layout is left alone.
    pub async fn edit_tab(
        &self,
        caller: &dyn Identity,
        tab_id: i64,
        summary: TabSummary,
    ) -> Result<TabSummary> {
        self.ensure_tab_access(caller, tab_id).await?;

        run_in_transaction(self.repository.as_ref(), move |tx| async move {
            let mut tab = tx
                .get_tab(tab_id)
                .await
                .context("retrieving tab from datastore failed")?;
            tab.summary.title = summary.title;
            tx.store_tab(&mut tab)
                .await
                .context("saving tab in datastore failed")?;
            Ok(tab.summary)
        })
        .await
    }

    pub async fn delete_tab(&self, caller: &dyn Identity, tab_id: i64) -> Result<()> {
        self.ensure_tab_access(caller, tab_id).await?;
        self.repository
            .delete_tab(tab_id)
            .await
            .context("deleting tab failed")?;
        tracing::info!("Deleted tab {}", tab_id);
        Ok(())
    }

    /// Creates an empty tab and grants the caller access to it.
    pub async fn new_tab(&self, caller: &dyn Identity, title: &str) -> Result<Tab> {
        if caller.user_id() == ANONYMOUS_USER_ID {
            return Err(AppError::NotAuthorized("anonymous callers cannot own tabs".into()));
        }

        let user_id = caller.user_id().to_string();
        let title = title.to_string();
        let tab = run_in_transaction(self.repository.as_ref(), move |tx| async move {
            let mut tab = Tab::new(title, NEW_TAB_COLUMNS);
            tx.store_tab(&mut tab)
                .await
                .context("saving tab in datastore failed")?;
            tx.allow_tab_access(&user_id, tab.id())
                .await
                .context("granting tab access failed")?;
            Ok(tab)
        })
        .await?;

        tracing::info!("Created tab {} for {}", tab.id(), caller.user_id());
        Ok(tab)
    }

    pub async fn update_layout(
        &self,
        caller: &dyn Identity,
        tab_id: i64,
        layout: Layout,
    ) -> Result<Layout> {
        self.ensure_tab_access(caller, tab_id).await?;
        self.repository
            .update_tab_layout(tab_id, &layout)
            .await
            .context("updating tab layout failed")?;
        Ok(layout)
    }

    // Widgets

    pub async fn widget(&self, caller: &dyn Identity, tab_id: i64, widget_id: i64) -> Result<Widget> {
        let tab = self.tab(caller, tab_id).await?;
        tab.widget(widget_id)
            .cloned()
            .ok_or_else(|| AppError::NotFound(format!("widget {widget_id} in tab {tab_id}")))
    }

    /// Stores a new widget at the end of the tab's first column.
    ///
    /// Feed widgets get their feed created on demand and default their title from it;
    /// email widgets must point at one of the caller's accounts.
    pub async fn new_widget(
        &self,
        caller: &dyn Identity,
        tab_id: i64,
        mut widget: Widget,
    ) -> Result<Widget> {
        self.ensure_tab_access(caller, tab_id).await?;

        widget.id = 0;
        match &mut widget.config {
            WidgetConfig::Feed(cfg) => {
                validate_feed_url(&cfg.url)?;
                if cfg.common.display_count == 0 {
                    cfg.common.display_count = self.default_display_count;
                }
                cfg.feed_id = self
                    .repository
                    .get_or_create_feed_id(&cfg.url)
                    .await
                    .context("getting or creating feed failed")?;
                if cfg.common.title.is_empty() {
                    let (feed, _) = self.feed(cfg.feed_id, false).await?;
                    cfg.common.title = feed.title;
                }
            }
            WidgetConfig::Email(cfg) => {
                let account = self
                    .repository
                    .get_account(caller.user_id(), cfg.account_id)
                    .await
                    .context("retrieving account from datastore failed")?;
                let description = self.providers.get(&account.provider_name)?.description();
                if cfg.common.title.is_empty() {
                    cfg.common.title = description.title;
                }
                if cfg.common.link.is_empty() {
                    cfg.common.link = description.link;
                }
            }
        }

        let widget = run_in_transaction(self.repository.as_ref(), move |tx| async move {
            let mut tab = tx
                .get_tab(tab_id)
                .await
                .context("retrieving tab from datastore failed")?;
            tx.store_widget(tab_id, &mut widget)
                .await
                .context("saving widget in datastore failed")?;
            layout::append(&mut tab, widget.clone());
            tx.store_tab(&mut tab)
                .await
                .context("saving tab in datastore failed")?;
            Ok(widget)
        })
        .await?;

        tracing::debug!("Added {} widget {} to tab {}", widget.kind(), widget.id, tab_id);
        Ok(widget)
    }

    /// Takes the widget out of the layout and deletes it, both or neither.
    pub async fn delete_widget(
        &self,
        caller: &dyn Identity,
        tab_id: i64,
        widget_id: i64,
    ) -> Result<()> {
        self.ensure_tab_access(caller, tab_id).await?;

        run_in_transaction(self.repository.as_ref(), move |tx| async move {
            tx.delete_widget_from_tab(tab_id, widget_id)
                .await
                .context("removing widget from tab failed")?;
            tx.delete_widget(tab_id, widget_id)
                .await
                .context("deleting widget failed")
        })
        .await
    }

    /// Changes title and display count; the kind-specific part stays as stored.
    pub async fn edit_widget(
        &self,
        caller: &dyn Identity,
        tab_id: i64,
        widget_id: i64,
        settings: WidgetSettings,
    ) -> Result<Widget> {
        self.ensure_tab_access(caller, tab_id).await?;

        let mut widget = self
            .repository
            .get_widget(tab_id, widget_id)
            .await
            .context("retrieving widget from datastore failed")?;
        let common = widget.config.common_mut();
        common.title = settings.title;
        common.display_count = settings.display_count;

        self.repository
            .store_widget(tab_id, &mut widget)
            .await
            .context("saving widget in datastore failed")?;
        Ok(widget)
    }

    // Feeds

    /// Fetches a feed without storing anything.
    pub async fn preview(&self, url: &str) -> Result<PreviewResult> {
        validate_feed_url(url)?;
        let fetched = self
            .feeds
            .fetch(url)
            .await
            .with_context(|| format!("fetching feed {url} failed"))?;

        Ok(PreviewResult {
            title: fetched.title,
            items: fetched
                .items
                .into_iter()
                .map(|item| PreviewItem {
                    title: item.title,
                    published: item.published,
                    link: item.link,
                })
                .collect(),
        })
    }

    /// Items of a feed with the user's read flags, newest first.
    pub async fn feed_items(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        feed_id: i64,
    ) -> Result<Vec<ItemForUser>> {
        caller.ensure_can_access(user_id)?;

        let (_, mut items) = self.feed(feed_id, true).await?;
        if items.is_empty() {
            return Err(AppError::NotFound(format!("no items in feed {feed_id}")));
        }
        items.truncate(self.feed_item_limit);

        let guids: Vec<String> = items.iter().map(|item| item.guid.clone()).collect();
        let read = self
            .repository
            .are_items_read(user_id, feed_id, &guids)
            .await
            .context("retrieving read states failed")?;

        Ok(items
            .into_iter()
            .zip(read)
            .map(|(item, read)| ItemForUser { item, read })
            .collect())
    }

    pub async fn mark_as_read(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        feed_id: i64,
        guids: &[String],
        read: bool,
    ) -> Result<()> {
        caller.ensure_can_access(user_id)?;
        self.repository
            .set_items_read(user_id, feed_id, guids, read)
            .await
            .context("storing read states failed")
    }

    /// Loads a feed, refreshing it from its source when due. A refresh is returned right
    /// away and stored in the background.
    async fn feed(&self, feed_id: i64, load_items: bool) -> Result<(Feed, Vec<FeedItem>)> {
        let mut feed = self
            .repository
            .get_feed(feed_id)
            .await
            .context("retrieving feed from datastore failed")?;

        let now = Utc::now();
        if feed.is_due(now) {
            tracing::debug!("Refreshing feed {} from {}", feed.id, feed.url);
            let fetched = self
                .feeds
                .fetch(&feed.url)
                .await
                .with_context(|| format!("fetching feed {} failed", feed.url))?;

            feed.next_retrieval = now + self.feed_refresh;
            if !fetched.title.is_empty() {
                feed.title = fetched.title;
            }
            let mut items = fetched.items;
            items.sort_by(|a, b| b.published.cmp(&a.published));

            self.spawn_store_feed(feed.clone(), items.clone());
            return Ok((feed, items));
        }

        let items = if load_items {
            self.repository
                .get_feed_items(feed_id)
                .await
                .context("retrieving feed items failed")?
        } else {
            Vec::new()
        };
        Ok((feed, items))
    }

    fn spawn_store_feed(&self, mut feed: Feed, items: Vec<FeedItem>) -> JoinHandle<()> {
        let repository = Arc::clone(&self.repository);
        tokio::spawn(async move {
            match repository.store_feed(&mut feed, &items).await {
                Ok(()) => tracing::debug!("Stored {} items of feed {}", items.len(), feed.id),
                Err(e) => tracing::error!("Failed to store feed {}: {}", feed.url, e),
            }
        })
    }

    /// Refreshes every feed on the user's tabs, a few at a time, and stores the results.
    pub async fn refresh_user_feeds(
        &self,
        caller: &dyn Identity,
        user_id: &str,
    ) -> Result<RefreshSummary> {
        caller.ensure_can_access(user_id)?;

        let tabs = self.user_tabs(user_id).await?;
        let mut feeds = HashMap::new();
        for feed_id in feed_ids(&tabs) {
            let feed = self
                .repository
                .get_feed(feed_id)
                .await
                .with_context(|| format!("retrieving feed {feed_id} failed"))?;
            feeds.insert(feed.url.clone(), feed);
        }

        let urls = feeds.keys().cloned().collect();
        let results = fetch_all(self.feeds.as_ref(), urls, self.fetch_concurrency).await;

        let now = Utc::now();
        let mut summary = RefreshSummary::default();
        for (url, result) in results {
            let Some(mut feed) = feeds.remove(&url) else {
                continue;
            };
            let fetched = match result {
                Ok(fetched) => fetched,
                Err(e) => {
                    tracing::warn!("Failed to refresh {}: {}", url, e);
                    summary.failed += 1;
                    continue;
                }
            };

            feed.next_retrieval = now + self.feed_refresh;
            if !fetched.title.is_empty() {
                feed.title = fetched.title;
            }
            match self.repository.store_feed(&mut feed, &fetched.items).await {
                Ok(()) => summary.refreshed += 1,
                Err(e) => {
                    tracing::error!("Failed to store feed {}: {}", url, e);
                    summary.failed += 1;
                }
            }
        }

        tracing::info!(
            "Refreshed {} feeds of {} ({} failed)",
            summary.refreshed,
            user_id,
            summary.failed
        );
        Ok(summary)
    }

    // Email

    /// One page of the account's mail. Threads whose cached version is current are served
    /// from the cache; the others are fetched and cached.
    pub async fn emails(
        &self,
        caller: &dyn Identity,
        user_id: &str,
        account_id: i64,
        query: &EmailQuery,
        page_token: Option<&str>,
    ) -> Result<EmailPage> {
        caller.ensure_can_access(user_id)?;

        let account = self
            .repository
            .get_account(user_id, account_id)
            .await
            .context("retrieving account from datastore failed")?;
        let provider = self.providers.email(&account.provider_name)?;

        let page = provider
            .list_threads(&account, query, page_token)
            .await
            .context("listing threads failed")?;

        let mut items = Vec::with_capacity(page.threads.len());
        let mut fetched = 0;
        for thread in &page.threads {
            let cached = self
                .repository
                .get_email_item(account.id, &thread.guid, thread.version)
                .await
                .context("retrieving cached email failed")?;
            if let Some(item) = cached {
                items.push(item);
                continue;
            }

            let Some(item) = provider
                .fetch_item(&account, &thread.guid)
                .await
                .with_context(|| format!("fetching thread {} failed", thread.guid))?
            else {
                tracing::debug!("Thread {} disappeared before it was fetched", thread.guid);
                continue;
            };
            self.repository
                .store_email_item(account.id, thread.version, &item)
                .await
                .context("caching email failed")?;
            fetched += 1;
            items.push(item);
        }

        tracing::debug!(
            "Served {} emails of account {} ({} fetched)",
            items.len(),
            account.id,
            fetched
        );
        Ok(EmailPage {
            items,
            next_page_token: page.next_page_token,
            result_size_estimate: page.result_size_estimate,
        })
    }

    // OAuth2

    /// Starts linking an account: remembers a fresh state code for the caller and returns
    /// the provider URL to send them to.
    pub async fn service_register(&self, caller: &dyn Identity, service: &str) -> Result<String> {
        if caller.user_id() == ANONYMOUS_USER_ID {
            return Err(AppError::NotAuthorized(
                "anonymous callers cannot link accounts".into(),
            ));
        }
        let provider = self.providers.get(service)?;

        let state = format!("hb-{}", Uuid::new_v4().simple());
        self.repository
            .store_temporary_code(caller.user_id(), service, &state)
            .await
            .context("storing temporary code failed")?;

        Ok(provider.auth_code_url(&state))
    }

    /// Finishes linking an account once the provider redirects back with `state` and `code`.
    pub async fn handle_oauth2_callback(
        &self,
        service: &str,
        state: &str,
        code: &str,
    ) -> Result<ExternalAccount> {
        let user_id = match self
            .repository
            .get_user_from_temporary_code(service, state)
            .await
        {
            Ok(user_id) if !user_id.is_empty() => user_id,
            Ok(_) => return Err(AppError::NotAuthorized("unknown oauth2 state".into())),
            Err(err) if self.repository.is_not_found(&err) => {
                return Err(AppError::NotAuthorized("unknown oauth2 state".into()))
            }
            Err(err) => return Err(err).context("resolving oauth2 state failed"),
        };

        if code.is_empty() {
            return Err(AppError::InvalidInput("missing authorization code".into()));
        }

        let provider = self.providers.email(service)?;
        let token = provider
            .exchange_code(code)
            .await
            .context("exchanging authorization code failed")?;

        self.repository
            .delete_temporary_code(&user_id, service)
            .await
            .context("deleting temporary code failed")?;

        let mut account = ExternalAccount {
            id: 0,
            provider_name: service.to_string(),
            account_id: String::new(),
            token,
        };
        account.account_id = provider
            .current_email_address(&account)
            .await
            .context("retrieving email address failed")?;

        self.repository
            .store_account(&user_id, &mut account)
            .await
            .context("storing account failed")?;

        tracing::info!("Linked {} for {}", account.key(), user_id);
        Ok(account)
    }

    async fn user_tabs(&self, user_id: &str) -> Result<Vec<Tab>> {
        let summaries = self
            .repository
            .get_tabs(user_id)
            .await
            .context("retrieving tabs from datastore failed")?;

        let mut tabs = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let tab = self
                .repository
                .get_tab(summary.id)
                .await
                .with_context(|| format!("retrieving tab {} failed", summary.id))?;
            tabs.push(tab);
        }
        Ok(tabs)
    }
}

fn feed_ids(tabs: &[Tab]) -> BTreeSet<i64> {
    tabs.iter()
        .flat_map(Tab::widgets)
        .filter_map(|widget| match &widget.config {
            WidgetConfig::Feed(cfg) => Some(cfg.feed_id),
            WidgetConfig::Email(_) => None,
        })
        .collect()
}

fn remap(ids: &HashMap<i64, i64>, id: i64, what: &str) -> Result<i64> {
    ids.get(&id)
        .copied()
        .ok_or_else(|| AppError::InvalidInput(format!("snapshot refers to unknown {what} {id}")))
}

fn validate_feed_url(url: &str) -> Result<()> {
    let parsed =
        Url::parse(url).map_err(|e| AppError::InvalidInput(format!("invalid feed url {url:?}: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        scheme => Err(AppError::InvalidInput(format!(
            "unsupported feed url scheme: {scheme}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tokio_test::{assert_err, assert_ok};

    use crate::db::{Locked, SqliteRepository};
    use crate::error::ErrorKind;
    use crate::feed::FetchedFeed;
    use crate::models::{
        EmailConfig, EmailItem, FeedConfig, Service, ThreadPage, ThreadRef, Token,
    };
    use crate::services::{Caller, EmailProvider};

    #[derive(Default)]
    struct StaticSource {
        feeds: Mutex<HashMap<String, FetchedFeed>>,
        fetches: AtomicUsize,
    }

    impl StaticSource {
        fn with_feed(url: &str, title: &str, guids: &[&str]) -> Self {
            let source = Self::default();
            source.set(url, title, guids);
            source
        }

        fn set(&self, url: &str, title: &str, guids: &[&str]) {
            let items = guids
                .iter()
                .enumerate()
                .map(|(n, guid)| FeedItem {
                    guid: guid.to_string(),
                    title: format!("Item {guid}"),
                    published: Utc.with_ymd_and_hms(2024, 3, 1, n as u32, 0, 0).unwrap(),
                    link: format!("{url}/{guid}"),
                })
                .collect();
            self.feeds.lock().unwrap().insert(
                url.to_string(),
                FetchedFeed {
                    title: title.to_string(),
                    items,
                },
            );
        }
    }

    #[async_trait]
    impl FeedSource for StaticSource {
        async fn fetch(&self, url: &str) -> Result<FetchedFeed> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.feeds
                .lock()
                .unwrap()
                .get(url)
                .cloned()
                .ok_or_else(|| AppError::Provider(format!("{url} is unreachable")))
        }
    }

    #[derive(Default)]
    struct FakeMail {
        threads: Mutex<Vec<ThreadRef>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl EmailProvider for FakeMail {
        fn description(&self) -> ProviderDescription {
            ProviderDescription {
                name: "mail".into(),
                title: "Mail".into(),
                link: "http://mail.example.com".into(),
                services: vec![Service::Email],
            }
        }

        fn auth_code_url(&self, state: &str) -> String {
            format!("http://mail.example.com/auth?state={state}")
        }

        async fn exchange_code(&self, code: &str) -> Result<Token> {
            Ok(Token {
                access_token: format!("token-for-{code}"),
                ..Token::default()
            })
        }

        async fn current_email_address(&self, _account: &ExternalAccount) -> Result<String> {
            Ok("alice@example.com".into())
        }

        async fn list_threads(
            &self,
            _account: &ExternalAccount,
            _query: &EmailQuery,
            _page_token: Option<&str>,
        ) -> Result<ThreadPage> {
            let threads = self.threads.lock().unwrap().clone();
            Ok(ThreadPage {
                result_size_estimate: threads.len() as i64,
                threads,
                next_page_token: Some("page-2".into()),
            })
        }

        async fn fetch_item(
            &self,
            _account: &ExternalAccount,
            guid: &str,
        ) -> Result<Option<EmailItem>> {
            let n = self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(Some(EmailItem {
                item: ItemForUser {
                    item: FeedItem {
                        guid: guid.to_string(),
                        title: format!("Subject {guid} #{n}"),
                        published: Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap(),
                        link: format!("http://mail.example.com/{guid}"),
                    },
                    read: false,
                },
                from: "bob@example.com".into(),
                snippet: "hello".into(),
            }))
        }
    }

    const NEWS: &str = "http://example.com/rss";

    async fn app_with(source: StaticSource, mail: Arc<FakeMail>) -> App {
        let repository: Arc<dyn Repository> = Arc::new(Locked::new(
            SqliteRepository::open_in_memory().await.unwrap(),
        ));
        let mut providers = ProviderRegistry::new();
        providers.register(mail);
        App::from_parts(&Config::default(), repository, Arc::new(source)).with_providers(providers)
    }

    async fn app() -> App {
        app_with(
            StaticSource::with_feed(NEWS, "Example News", &["a", "b", "c"]),
            Arc::new(FakeMail::default()),
        )
        .await
    }

    fn feed_widget(url: &str) -> Widget {
        Widget::feed(
            0,
            FeedConfig {
                url: url.to_string(),
                ..FeedConfig::default()
            },
        )
    }

    async fn link_mail_account(app: &App, caller: &Caller) -> ExternalAccount {
        let url = app.service_register(caller, "mail").await.unwrap();
        let state = url.split("state=").nth(1).unwrap().to_string();
        app.handle_oauth2_callback("mail", &state, "code-1")
            .await
            .unwrap()
    }

    async fn wait_for_stored_items(app: &App, feed_id: i64) -> Vec<FeedItem> {
        for _ in 0..100 {
            let items = app.repository().get_feed_items(feed_id).await.unwrap();
            if !items.is_empty() {
                return items;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("feed {feed_id} was never stored");
    }

    #[tokio::test]
    async fn first_access_creates_the_user() {
        let app = app().await;
        let alice = Caller::new(
            crate::models::UserProfile {
                id: "alice".into(),
                display_name: "Alice".into(),
                email: "alice@example.com".into(),
            },
            false,
        );

        let data = app.user(&alice, "alice").await.unwrap();
        assert_eq!(data.user.display_name, "Alice");
        assert!(data.tabs.is_empty());

        let stored = app.repository().get_user("alice").await.unwrap();
        assert_eq!(stored.email, "alice@example.com");
    }

    #[tokio::test]
    async fn admins_do_not_create_other_users() {
        let app = app().await;
        let err = app.user(&Caller::admin("root"), "alice").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn new_tab_has_four_columns_and_access() {
        let app = app().await;
        let alice = Caller::user("alice");

        let tab = app.new_tab(&alice, "News").await.unwrap();
        assert_eq!(tab.summary.title, "News");
        assert_eq!(tab.layout(), vec![Vec::<i64>::new(); 4]);

        let data = app.user(&alice, "alice").await.unwrap();
        assert_eq!(data.tabs, vec![tab.summary.clone()]);
        assert_err!(app.new_tab(&Caller::anonymous(), "Nope").await);
    }

    #[tokio::test]
    async fn new_feed_widget_gets_feed_and_defaults() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();

        let widget = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        let WidgetConfig::Feed(cfg) = &widget.config else {
            panic!("expected a feed widget");
        };
        assert_eq!(cfg.common.title, "Example News");
        assert_eq!(cfg.common.display_count, 5);
        assert_eq!(
            cfg.feed_id,
            app.repository().get_or_create_feed_id(NEWS).await.unwrap()
        );

        let tab = app.tab(&alice, tab.id()).await.unwrap();
        assert_eq!(tab.layout()[0], vec![widget.id]);
        assert_eq!(app.widget(&alice, tab.id(), widget.id).await.unwrap(), widget);
    }

    #[tokio::test]
    async fn feed_widget_needs_a_web_url() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();

        let err = app
            .new_widget(&alice, tab.id(), feed_widget("file:///etc/passwd"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = app
            .new_widget(&alice, tab.id(), feed_widget("not a url"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn other_users_cannot_touch_a_tab() {
        let app = app().await;
        let alice = Caller::user("alice");
        let bob = Caller::user("bob");
        let tab = app.new_tab(&alice, "News").await.unwrap();
        let widget = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        assert!(app.tab(&bob, tab.id()).await.unwrap_err().is_not_authorized());
        assert!(app
            .new_widget(&bob, tab.id(), feed_widget(NEWS))
            .await
            .unwrap_err()
            .is_not_authorized());
        assert!(app
            .delete_widget(&bob, tab.id(), widget.id)
            .await
            .unwrap_err()
            .is_not_authorized());
        assert!(app
            .update_layout(&bob, tab.id(), vec![vec![], vec![widget.id]])
            .await
            .unwrap_err()
            .is_not_authorized());
        assert!(app
            .delete_tab(&bob, tab.id())
            .await
            .unwrap_err()
            .is_not_authorized());

        let unchanged = app.tab(&alice, tab.id()).await.unwrap();
        assert_eq!(unchanged.layout(), tab_layout_with(widget.id));
    }

    fn tab_layout_with(widget_id: i64) -> Layout {
        vec![vec![widget_id], vec![], vec![], vec![]]
    }

    #[tokio::test]
    async fn admins_reach_every_tab() {
        let app = app().await;
        let tab = app.new_tab(&Caller::user("alice"), "News").await.unwrap();

        let seen = app.tab(&Caller::admin("root"), tab.id()).await.unwrap();
        assert_eq!(seen.summary, tab.summary);
    }

    #[tokio::test]
    async fn edit_tab_keeps_the_layout() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();
        let widget = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        let summary = app
            .edit_tab(
                &alice,
                tab.id(),
                TabSummary {
                    id: 0,
                    title: "Headlines".into(),
                },
            )
            .await
            .unwrap();
        assert_eq!(summary.id, tab.id());

        let tab = app.tab(&alice, tab.id()).await.unwrap();
        assert_eq!(tab.summary.title, "Headlines");
        assert_eq!(tab.layout(), tab_layout_with(widget.id));
    }

    #[tokio::test]
    async fn layout_updates_must_be_permutations() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();
        let first = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();
        let second = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        let moved = vec![vec![second.id], vec![first.id], vec![], vec![]];
        assert_eq!(
            app.update_layout(&alice, tab.id(), moved.clone()).await.unwrap(),
            moved
        );

        let err = app
            .update_layout(&alice, tab.id(), vec![vec![99]])
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert_eq!(app.tab(&alice, tab.id()).await.unwrap().layout(), moved);
    }

    #[tokio::test]
    async fn delete_widget_clears_layout_and_row() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();
        let widget = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        assert_ok!(app.delete_widget(&alice, tab.id(), widget.id).await);

        assert_eq!(app.tab(&alice, tab.id()).await.unwrap().layout()[0], Vec::<i64>::new());
        assert!(app
            .repository()
            .get_widget(tab.id(), widget.id)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(app
            .delete_widget(&alice, tab.id(), widget.id)
            .await
            .unwrap_err()
            .is_not_found());
    }

    #[tokio::test]
    async fn edit_widget_changes_only_common_settings() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();
        let widget = app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        let edited = app
            .edit_widget(
                &alice,
                tab.id(),
                widget.id,
                WidgetSettings {
                    title: "Daily".into(),
                    display_count: 12,
                    link: "http://ignored.example.com".into(),
                },
            )
            .await
            .unwrap();

        let WidgetConfig::Feed(cfg) = &edited.config else {
            panic!("expected a feed widget");
        };
        assert_eq!(cfg.common.title, "Daily");
        assert_eq!(cfg.common.display_count, 12);
        assert!(cfg.common.link.is_empty());
        assert_eq!(cfg.url, NEWS);
    }

    #[tokio::test]
    async fn feed_items_refresh_once_then_come_from_storage() {
        let source = StaticSource::with_feed(NEWS, "Example News", &["a", "b", "c"]);
        let app = app_with(source, Arc::new(FakeMail::default())).await;
        let alice = Caller::user("alice");
        let feed_id = app.repository().get_or_create_feed_id(NEWS).await.unwrap();

        let items = app.feed_items(&alice, "alice", feed_id).await.unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].item.guid, "c");
        assert!(items.iter().all(|item| !item.read));

        wait_for_stored_items(&app, feed_id).await;
        let again = app.feed_items(&alice, "alice", feed_id).await.unwrap();
        assert_eq!(again, items);

        let feed = app.repository().get_feed(feed_id).await.unwrap();
        assert_eq!(feed.title, "Example News");
        assert!(!feed.is_due(Utc::now()));
    }

    #[tokio::test]
    async fn feed_items_are_capped_and_empty_feeds_are_not_found() {
        let source = StaticSource::with_feed(NEWS, "Example News", &["a", "b", "c"]);
        source.set("http://example.com/empty", "Empty", &[]);
        let repository: Arc<dyn Repository> =
            Arc::new(SqliteRepository::open_in_memory().await.unwrap());
        let config = Config {
            feed_item_limit: 2,
            ..Config::default()
        };
        let app = App::from_parts(&config, repository, Arc::new(source));
        let alice = Caller::user("alice");

        let feed_id = app.repository().get_or_create_feed_id(NEWS).await.unwrap();
        assert_eq!(app.feed_items(&alice, "alice", feed_id).await.unwrap().len(), 2);

        let empty = app
            .repository()
            .get_or_create_feed_id("http://example.com/empty")
            .await
            .unwrap();
        let err = app.feed_items(&alice, "alice", empty).await.unwrap_err();
        assert!(err.is_not_found());

        assert!(app
            .feed_items(&Caller::user("bob"), "alice", feed_id)
            .await
            .unwrap_err()
            .is_not_authorized());
    }

    #[tokio::test]
    async fn marked_items_show_as_read() {
        let app = app().await;
        let alice = Caller::user("alice");
        let feed_id = app.repository().get_or_create_feed_id(NEWS).await.unwrap();

        app.feed_items(&alice, "alice", feed_id).await.unwrap();
        wait_for_stored_items(&app, feed_id).await;

        app.mark_as_read(&alice, "alice", feed_id, &["a".to_string()], true)
            .await
            .unwrap();
        let items = app.feed_items(&alice, "alice", feed_id).await.unwrap();
        let read: Vec<_> = items
            .iter()
            .map(|item| (item.item.guid.as_str(), item.read))
            .collect();
        assert_eq!(read, vec![("c", false), ("b", false), ("a", true)]);
    }

    #[tokio::test]
    async fn preview_does_not_store() {
        let app = app().await;
        let preview = app.preview(NEWS).await.unwrap();
        assert_eq!(preview.title, "Example News");
        assert_eq!(preview.items.len(), 3);

        assert!(app.preview("http://example.com/missing").await.is_err());
        assert!(app.repository().get_tabs("alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn refresh_counts_successes_and_failures() {
        let app = app().await;
        let alice = Caller::user("alice");
        let tab = app.new_tab(&alice, "News").await.unwrap();
        app.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();

        let broken = Widget::feed(
            0,
            FeedConfig {
                common: WidgetSettings {
                    title: "Broken".into(),
                    ..WidgetSettings::default()
                },
                url: "http://broken.example.com/rss".into(),
                ..FeedConfig::default()
            },
        );
        app.new_widget(&alice, tab.id(), broken).await.unwrap();

        let summary = app.refresh_user_feeds(&alice, "alice").await.unwrap();
        assert_eq!(
            summary,
            RefreshSummary {
                refreshed: 1,
                failed: 1
            }
        );
    }

    #[tokio::test]
    async fn oauth_flow_links_an_account_once() {
        let app = app().await;
        let alice = Caller::user("alice");

        let url = app.service_register(&alice, "mail").await.unwrap();
        assert!(url.starts_with("http://mail.example.com/auth?state=hb-"));
        let state = url.split("state=").nth(1).unwrap();

        let err = app
            .handle_oauth2_callback("mail", state, "")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let account = app
            .handle_oauth2_callback("mail", state, "code-1")
            .await
            .unwrap();
        assert_eq!(account.account_id, "alice@example.com");
        assert_eq!(account.token.access_token, "token-for-code-1");

        let err = app
            .handle_oauth2_callback("mail", state, "code-1")
            .await
            .unwrap_err();
        assert!(err.is_not_authorized());

        let accounts = app
            .associated_service_accounts(&alice, "alice", "mail")
            .await
            .unwrap();
        assert_eq!(accounts.len(), 1);
        assert!(app
            .associated_service_accounts(&alice, "alice", "other")
            .await
            .unwrap()
            .is_empty());

        assert_eq!(app.services().len(), 1);
        assert!(app.service_register(&alice, "nope").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn revoked_accounts_are_gone() {
        let app = app().await;
        let alice = Caller::user("alice");
        let account = link_mail_account(&app, &alice).await;

        assert_ok!(app.associated_account(&alice, "alice", account.id).await);
        assert!(app
            .revoke_account(&Caller::user("bob"), "alice", account.id)
            .await
            .unwrap_err()
            .is_not_authorized());

        app.revoke_account(&alice, "alice", account.id).await.unwrap();
        assert!(app.associated_accounts(&alice, "alice").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn email_widget_defaults_from_provider() {
        let app = app().await;
        let alice = Caller::user("alice");
        let account = link_mail_account(&app, &alice).await;
        let tab = app.new_tab(&alice, "Mail").await.unwrap();

        let widget = app
            .new_widget(
                &alice,
                tab.id(),
                Widget::email(
                    0,
                    EmailConfig {
                        account_id: account.id,
                        ..EmailConfig::default()
                    },
                ),
            )
            .await
            .unwrap();
        assert_eq!(widget.config.common().title, "Mail");
        assert_eq!(widget.config.common().link, "http://mail.example.com");

        let err = app
            .new_widget(
                &alice,
                tab.id(),
                Widget::email(
                    0,
                    EmailConfig {
                        account_id: account.id + 100,
                        ..EmailConfig::default()
                    },
                ),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn emails_are_served_from_cache_until_their_version_moves() {
        let mail = Arc::new(FakeMail::default());
        *mail.threads.lock().unwrap() = vec![
            ThreadRef {
                guid: "t1".into(),
                version: 5,
            },
            ThreadRef {
                guid: "t2".into(),
                version: 1,
            },
        ];
        let app = app_with(StaticSource::default(), Arc::clone(&mail)).await;
        let alice = Caller::user("alice");
        let account = link_mail_account(&app, &alice).await;
        let query = EmailQuery::default();

        let page = app
            .emails(&alice, "alice", account.id, &query, None)
            .await
            .unwrap();
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.next_page_token.as_deref(), Some("page-2"));
        assert_eq!(mail.fetches.load(Ordering::SeqCst), 2);

        let cached = app
            .emails(&alice, "alice", account.id, &query, None)
            .await
            .unwrap();
        assert_eq!(cached.items, page.items);
        assert_eq!(mail.fetches.load(Ordering::SeqCst), 2);

        mail.threads.lock().unwrap()[0].version = 7;
        let refreshed = app
            .emails(&alice, "alice", account.id, &query, None)
            .await
            .unwrap();
        assert_eq!(mail.fetches.load(Ordering::SeqCst), 3);
        assert_eq!(refreshed.items[0].item.item.title, "Subject t1 #2");
        assert_eq!(refreshed.items[1], page.items[1]);
    }

    #[tokio::test]
    async fn backup_restores_into_an_empty_board() {
        let alice = Caller::user("alice");
        let source = || StaticSource::with_feed(NEWS, "Example News", &["a"]);

        let old = app_with(source(), Arc::new(FakeMail::default())).await;
        old.user(&alice, "alice").await.unwrap();
        let account = link_mail_account(&old, &alice).await;
        let tab = old.new_tab(&alice, "Everything").await.unwrap();
        let feed = old.new_widget(&alice, tab.id(), feed_widget(NEWS)).await.unwrap();
        let mail = old
            .new_widget(
                &alice,
                tab.id(),
                Widget::email(
                    0,
                    EmailConfig {
                        account_id: account.id,
                        ..EmailConfig::default()
                    },
                ),
            )
            .await
            .unwrap();
        old.update_layout(&alice, tab.id(), vec![vec![feed.id], vec![mail.id], vec![], vec![]])
            .await
            .unwrap();

        let snapshot = old.backup_user(&alice, "alice").await.unwrap();
        assert_eq!(snapshot.tabs.len(), 1);
        assert_eq!(snapshot.feeds.len(), 1);
        assert_eq!(snapshot.accounts.len(), 1);

        let new = app_with(source(), Arc::new(FakeMail::default())).await;
        new.repository().get_or_create_feed_id("http://other.example.com").await.unwrap();

        let err = new
            .restore_user(&alice, "alice", snapshot.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let relinked = link_mail_account(&new, &alice).await;
        new.restore_user(&alice, "alice", snapshot.clone()).await.unwrap();

        let tabs = new.user(&alice, "alice").await.unwrap().tabs;
        assert_eq!(tabs.len(), 1);
        let restored = new.tab(&alice, tabs[0].id).await.unwrap();
        assert_eq!(restored.summary.title, "Everything");
        assert_eq!(restored.widgets[0].len(), 1);
        assert_eq!(restored.widgets[1].len(), 1);

        let WidgetConfig::Feed(cfg) = &restored.widgets[0][0].config else {
            panic!("expected a feed widget");
        };
        assert_eq!(
            cfg.feed_id,
            new.repository().get_or_create_feed_id(NEWS).await.unwrap()
        );
        let WidgetConfig::Email(cfg) = &restored.widgets[1][0].config else {
            panic!("expected an email widget");
        };
        assert_eq!(cfg.account_id, relinked.id);

        let err = new.restore_user(&alice, "alice", snapshot).await.unwrap_err();
        assert!(err.to_string().contains("already has 1 tabs"));
    }

    #[tokio::test]
    async fn restore_checks_the_owner() {
        let app = app().await;
        let snapshot = Snapshot {
            user: User {
                user_id: "bob".into(),
                ..User::default()
            },
            ..Snapshot::default()
        };

        let err = app
            .restore_user(&Caller::user("alice"), "alice", snapshot.clone())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);

        let err = app
            .restore_user(&Caller::user("alice"), "bob", snapshot)
            .await
            .unwrap_err();
        assert!(err.is_not_authorized());
    }
}
