use serde::{Deserialize, Serialize};

use super::TabSummary;

/// Used when a request reaches the core without a logged-in user.
pub const ANONYMOUS_USER_ID: &str = "<anonymous>";

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct User {
    pub user_id: String,
    pub display_name: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub is_admin: bool,
}

/// What the session layer knows about the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    pub email: String,
}

impl From<UserProfile> for User {
    fn from(profile: UserProfile) -> Self {
        Self {
            user_id: profile.id,
            display_name: profile.display_name,
            email: profile.email,
            is_admin: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserData {
    pub user: User,
    pub tabs: Vec<TabSummary>,
}
