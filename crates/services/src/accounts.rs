//! Login bookkeeping, profile settings and the read side of the archive.

use std::sync::Arc;

use domains::{
    AccessToken, Account, AccountKey, AccountRepository, DomainError, Post, PostRepository,
    RemotePostSource, Result, Visibility, VisibilityExposure,
};
use serde::Serialize;
use tracing::{info, instrument};

/// Outcome of a successful login against the remote instance.
#[derive(Debug, Clone, Serialize)]
pub struct LoginOutcome {
    pub account: Account,
    /// `true` on the first login of this account
    pub created: bool,
}

/// What the account owner sees.
#[derive(Debug, Clone)]
pub struct ArchiveView {
    pub account: Account,
    pub posts: Vec<Post>,
}

/// What anonymous visitors see on a public profile.
#[derive(Debug, Clone)]
pub struct PublicProfile {
    pub host: String,
    pub user_name: String,
    pub posts: Vec<Post>,
}

pub struct AccountService {
    accounts: Arc<dyn AccountRepository>,
    posts: Arc<dyn PostRepository>,
    remote: Arc<dyn RemotePostSource>,
}

impl AccountService {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        posts: Arc<dyn PostRepository>,
        remote: Arc<dyn RemotePostSource>,
    ) -> Self {
        Self {
            accounts,
            posts,
            remote,
        }
    }

    /// Asks the remote who owns `token` and returns the mirrored account key.
    pub async fn resolve(&self, host: &str, token: &AccessToken) -> Result<AccountKey> {
        validate_host(host)?;
        let remote = self.remote.verify_credentials(host, token).await?;
        Ok(AccountKey::new(remote.id, host))
    }

    /// Records the account locally on first login.
    #[instrument(skip(self, token))]
    pub async fn register_login(&self, host: &str, token: &AccessToken) -> Result<LoginOutcome> {
        validate_host(host)?;
        let remote = self.remote.verify_credentials(host, token).await?;
        let created = self
            .accounts
            .ensure_exists(&remote.id, &remote.user_name, host)
            .await?;
        if created {
            info!(account_id = %remote.id, user_name = %remote.user_name, "first login, account created");
        }

        let key = AccountKey::new(remote.id, host);
        let account = self.require(&key).await?;
        Ok(LoginOutcome { account, created })
    }

    /// The owner's archive, optionally filtered by a body substring.
    pub async fn archive(&self, key: &AccountKey, text_filter: Option<&str>) -> Result<ArchiveView> {
        let account = self.require(key).await?;
        let filter = text_filter
            .filter(|f| !f.is_empty())
            .map(str::to_string);
        let posts = self.posts.list_by_account(key, filter).await?;
        Ok(ArchiveView { account, posts })
    }

    pub async fn set_public(&self, key: &AccountKey, public: bool) -> Result<()> {
        self.accounts.set_public(key, public).await?;
        info!(account = %key, public, "profile visibility changed");
        Ok(())
    }

    pub async fn set_visibility_exposure(
        &self,
        key: &AccountKey,
        exposure: VisibilityExposure,
    ) -> Result<()> {
        self.accounts.set_visibility_exposure(key, exposure).await?;
        info!(account = %key, ?exposure, "exposed visibilities changed");
        Ok(())
    }

    /// Posts of a public profile, restricted to the visibilities its owner
    /// chose to expose. Private profiles are indistinguishable from missing ones.
    pub async fn public_profile(&self, host: &str, user_name: &str) -> Result<PublicProfile> {
        let account = self
            .accounts
            .find_by_user_name(user_name, host)
            .await?
            .filter(|a| a.public)
            .ok_or_else(|| DomainError::not_found("profile", format!("{user_name}@{host}")))?;

        let allowed = Visibility::exposed_by(&account.exposure);
        let posts = self
            .posts
            .list_by_account_with_visibility(&account.key(), &allowed)
            .await?;

        Ok(PublicProfile {
            host: account.host,
            user_name: account.user_name,
            posts,
        })
    }

    async fn require(&self, key: &AccountKey) -> Result<Account> {
        self.accounts
            .find(key)
            .await?
            .ok_or_else(|| DomainError::not_found("account", key))
    }
}

/// A host is a bare authority such as `mastodon.social` or `localhost:3000`.
pub fn validate_host(host: &str) -> Result<()> {
    let bad = host.is_empty()
        || host.contains("://")
        || host
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '/' | '?' | '#' | '@'));
    if bad {
        return Err(DomainError::Validation(format!("invalid instance host '{host}'")));
    }
    Ok(())
}
