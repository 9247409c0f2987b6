use crate::error::{AppError, Result};
use crate::models::{UserProfile, ANONYMOUS_USER_ID};

/// What the session layer knows about whoever issued the current request.
pub trait Identity: Send + Sync {
    fn user_id(&self) -> &str;

    fn is_admin(&self) -> bool;

    fn profile(&self) -> UserProfile;

    /// Passes when the caller is `user_id` or an admin.
    fn ensure_can_access(&self, user_id: &str) -> Result<()> {
        if self.user_id() == user_id || self.is_admin() {
            return Ok(());
        }
        Err(AppError::NotAuthorized(format!(
            "access denied to user: {user_id} (access by {})",
            self.user_id()
        )))
    }
}

/// A per-request identity handed to the core by the host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    profile: UserProfile,
    admin: bool,
}

impl Caller {
    pub fn new(profile: UserProfile, admin: bool) -> Self {
        Self { profile, admin }
    }

    /// A regular user known only by id.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self::new(
            UserProfile {
                id: user_id.into(),
                display_name: String::new(),
                email: String::new(),
            },
            false,
        )
    }

    pub fn admin(user_id: impl Into<String>) -> Self {
        Self {
            admin: true,
            ..Self::user(user_id)
        }
    }

    pub fn anonymous() -> Self {
        Self::user(ANONYMOUS_USER_ID)
    }
}

impl Identity for Caller {
    fn user_id(&self) -> &str {
        &self.profile.id
    }

    fn is_admin(&self) -> bool {
        self.admin
    }

    fn profile(&self) -> UserProfile {
        self.profile.clone()
    }
}
