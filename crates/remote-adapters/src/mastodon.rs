//! # Mastodon REST client
//!
//! Implements [`RemotePostSource`] on top of
//! `/api/v1/accounts/verify_credentials` and `/api/v1/accounts/{id}/statuses`.
//! The same client serves every host; the host comes with each call.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domains::{
    AccessToken, AccountKey, DomainError, Post, PostId, RemoteAccount, RemotePostSource, Result,
    Visibility,
};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::error::{status_error, transport_error};

/// The largest page Mastodon hands out for account statuses.
pub const MAX_PAGE_SIZE: u32 = 40;

#[derive(Debug, Clone)]
pub struct MastodonConfig {
    /// `https` in production; tests point it at plain-HTTP mock servers.
    pub scheme: String,
    pub page_size: u32,
    pub request_timeout: Duration,
    pub user_agent: String,
}

impl Default for MastodonConfig {
    fn default() -> Self {
        Self {
            scheme: "https".into(),
            page_size: MAX_PAGE_SIZE,
            request_timeout: Duration::from_secs(30),
            user_agent: concat!("statuslog/", env!("CARGO_PKG_VERSION")).into(),
        }
    }
}

/// Which side of the cursor a page is requested from.
#[derive(Debug, Clone, Copy)]
enum Direction {
    Newer,
    Older,
}

impl Direction {
    fn param(self) -> &'static str {
        match self {
            // min_id yields the page adjacent to the cursor, so a backlog of
            // several pages is walked without skipping any
            Direction::Newer => "min_id",
            Direction::Older => "max_id",
        }
    }
}

pub struct MastodonClient {
    http: Client,
    config: MastodonConfig,
}

impl MastodonClient {
    pub fn new(config: MastodonConfig) -> Result<Self> {
        if config.page_size == 0 || config.page_size > MAX_PAGE_SIZE {
            return Err(DomainError::Validation(format!(
                "page size must be within 1..={MAX_PAGE_SIZE}, got {}",
                config.page_size
            )));
        }
        let http = Client::builder()
            .timeout(config.request_timeout)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(transport_error)?;
        Ok(Self { http, config })
    }

    fn endpoint(&self, host: &str, path: &str) -> Result<Url> {
        let base = format!("{}://{}/", self.config.scheme, host);
        Url::parse(&base)
            .and_then(|base| base.join(path))
            .map_err(|e| DomainError::Validation(format!("invalid instance host '{host}': {e}")))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, token: &AccessToken, what: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token.expose())
            .send()
            .await
            .map_err(transport_error)
            .inspect_err(|e| warn!(what, error = %e, "remote instance unreachable"))?;

        let status = response.status();
        if !status.is_success() {
            let err = status_error(status, response.headers(), what);
            match &err {
                DomainError::RateLimited { retry_after } => {
                    warn!(what, ?retry_after, "remote instance is rate limiting")
                }
                DomainError::Auth(_) => warn!(what, %status, "remote instance rejected the token"),
                _ => warn!(what, %status, "remote request failed"),
            }
            return Err(err);
        }

        response.json::<T>().await.map_err(transport_error)
    }

    async fn fetch_page(
        &self,
        account: &AccountKey,
        token: &AccessToken,
        direction: Direction,
        cursor: Option<PostId>,
    ) -> Result<Vec<Post>> {
        let mut url = self.endpoint(
            &account.host,
            &format!("api/v1/accounts/{}/statuses", account.id),
        )?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("limit", &self.config.page_size.to_string());
            if let Some(cursor) = &cursor {
                query.append_pair(direction.param(), cursor.as_str());
            }
        }

        let statuses: Vec<StatusDto> = self.get_json(url, token, "account statuses").await?;
        let received = statuses.len();
        let mut posts: Vec<Post> = statuses
            .into_iter()
            .filter(|s| s.account.id == account.id)
            .map(|s| s.into_post(account))
            .collect();
        posts.sort_by(|a, b| b.id.cmp(&a.id));

        // an empty page means the history is exhausted; a page of nothing but
        // foreign posts must not be mistaken for one
        if received > 0 && posts.is_empty() {
            return Err(DomainError::Transport(format!(
                "remote returned {received} statuses, none of them from account {}",
                account.id
            )));
        }

        debug!(
            account = %account,
            ?direction,
            cursor = cursor.as_ref().map(PostId::as_str),
            received,
            kept = posts.len(),
            "fetched status page"
        );
        Ok(posts)
    }
}

#[async_trait]
impl RemotePostSource for MastodonClient {
    async fn fetch_since(
        &self,
        account: &AccountKey,
        token: &AccessToken,
        since: Option<PostId>,
    ) -> Result<Vec<Post>> {
        self.fetch_page(account, token, Direction::Newer, since).await
    }

    async fn fetch_before(
        &self,
        account: &AccountKey,
        token: &AccessToken,
        before: Option<PostId>,
    ) -> Result<Vec<Post>> {
        self.fetch_page(account, token, Direction::Older, before).await
    }

    #[instrument(skip(self, token))]
    async fn verify_credentials(&self, host: &str, token: &AccessToken) -> Result<RemoteAccount> {
        let url = self.endpoint(host, "api/v1/accounts/verify_credentials")?;
        let me: CredentialAccountDto = self.get_json(url, token, "verify credentials").await?;
        Ok(RemoteAccount {
            id: me.id,
            user_name: me.username,
        })
    }
}

#[derive(Debug, Deserialize)]
struct CredentialAccountDto {
    id: String,
    username: String,
}

#[derive(Debug, Deserialize)]
struct StatusAccountDto {
    id: String,
}

#[derive(Debug, Deserialize)]
struct StatusDto {
    id: String,
    created_at: DateTime<Utc>,
    visibility: Visibility,
    #[serde(default)]
    content: String,
    uri: String,
    url: Option<String>,
    account: StatusAccountDto,
}

impl StatusDto {
    fn into_post(self, account: &AccountKey) -> Post {
        Post {
            id: PostId::new(self.id),
            account_id: account.id.clone(),
            host: account.host.clone(),
            text: self.content,
            url: self.url.unwrap_or(self.uri),
            created_at: self.created_at,
            visibility: self.visibility,
        }
    }
}
