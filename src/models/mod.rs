mod account;
mod feed;
mod snapshot;
mod tab;
mod user;

pub use account::{
    EmailItem, EmailPage, EmailQuery, ExternalAccount, ProviderDescription, Service, ThreadPage,
    ThreadRef, Token,
};
pub use feed::{Feed, FeedItem, ItemForUser, PreviewItem, PreviewResult};
pub use snapshot::Snapshot;
pub use tab::{
    EmailConfig, FeedConfig, Layout, RawWidget, Tab, TabSummary, Widget, WidgetConfig,
    WidgetKind, WidgetSettings,
};
pub use user::{User, UserData, UserProfile, ANONYMOUS_USER_ID};
