use serde::{Deserialize, Serialize};

use super::{ExternalAccount, Feed, Tab, User};

/// Configuration of one user, used for backup and restore.
/// Items and read states are not part of it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub user: User,
    #[serde(default)]
    pub tabs: Vec<Tab>,
    #[serde(default)]
    pub feeds: Vec<Feed>,
    #[serde(default)]
    pub accounts: Vec<ExternalAccount>,
}
