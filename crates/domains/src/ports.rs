//! # Ports
//!
//! Every adapter must implement these traits to be wired into the binary.
//! Owned arguments (`Option<PostId>`, `Option<String>`) keep the traits
//! mockable.

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    AccessToken, Account, AccountKey, App, Post, PostId, RemoteAccount, Visibility,
    VisibilityExposure,
};

/// Durable, de-duplicated collection of posts per account.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait PostRepository: Send + Sync {
    /// Bulk insert; ids already present are skipped and do not count.
    async fn insert_posts(&self, account: &AccountKey, posts: &[Post]) -> Result<u64>;

    /// Greatest stored id for the account, `None` when nothing is stored.
    async fn newest_id(&self, account: &AccountKey) -> Result<Option<PostId>>;

    /// Least stored id for the account, `None` when nothing is stored.
    async fn oldest_id(&self, account: &AccountKey) -> Result<Option<PostId>>;

    /// Newest first, optionally restricted to bodies containing `text_filter`.
    async fn list_by_account(
        &self,
        account: &AccountKey,
        text_filter: Option<String>,
    ) -> Result<Vec<Post>>;

    /// Newest first, restricted to the given visibilities.
    async fn list_by_account_with_visibility(
        &self,
        account: &AccountKey,
        allowed: &[Visibility],
    ) -> Result<Vec<Post>>;
}

/// Per-account rows: fetch flags and profile settings.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// `false` when the account has no row.
    async fn is_all_fetched(&self, account: &AccountKey) -> Result<bool>;

    /// Idempotent; never resets the flag. `NotFound` when the account has no row.
    async fn mark_all_fetched(&self, account: &AccountKey) -> Result<()>;

    /// Inserts the account with default flags if absent. Returns whether a row was created.
    async fn ensure_exists(&self, id: &str, user_name: &str, host: &str) -> Result<bool>;

    async fn find(&self, account: &AccountKey) -> Result<Option<Account>>;

    async fn find_by_user_name(&self, user_name: &str, host: &str) -> Result<Option<Account>>;

    async fn set_public(&self, account: &AccountKey, public: bool) -> Result<()>;

    async fn set_visibility_exposure(
        &self,
        account: &AccountKey,
        exposure: VisibilityExposure,
    ) -> Result<()>;
}

/// OAuth client registrations keyed by host.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait AppRepository: Send + Sync {
    async fn find_by_host(&self, host: &str) -> Result<Option<App>>;
    async fn insert(&self, app: &App) -> Result<()>;
}

/// Paginated access to a remote account's posts.
///
/// Pages are bounded in size and ordered newest first. An empty page means
/// there is nothing further in the requested direction.
#[cfg_attr(feature = "testing", mockall::automock)]
#[async_trait]
pub trait RemotePostSource: Send + Sync {
    /// Posts strictly newer than `since`; `None` fetches the newest page.
    async fn fetch_since(
        &self,
        account: &AccountKey,
        token: &AccessToken,
        since: Option<PostId>,
    ) -> Result<Vec<Post>>;

    /// Posts strictly older than `before`; `None` fetches the newest page.
    async fn fetch_before(
        &self,
        account: &AccountKey,
        token: &AccessToken,
        before: Option<PostId>,
    ) -> Result<Vec<Post>>;

    /// Resolves the owner of `token` on `host`.
    async fn verify_credentials(&self, host: &str, token: &AccessToken) -> Result<RemoteAccount>;
}
