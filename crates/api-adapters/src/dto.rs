//! Request and response bodies.
//!
//! Timestamps leave the service rendered in the configured display zone;
//! everything below this layer stays in UTC.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use domains::{Account, FetchState, Post, Visibility, VisibilityExposure};
use serde::{Deserialize, Serialize};
use services::{ArchiveView, LoginOutcome, PublicProfile};

#[derive(Debug, Serialize)]
pub struct PostDto {
    pub id: String,
    pub text: String,
    pub url: String,
    /// RFC 3339 in the display zone
    pub created_at: String,
    pub visibility: Visibility,
}

impl PostDto {
    pub fn from_post(post: Post, tz: Tz) -> Self {
        Self {
            id: post.id.into_inner(),
            text: post.text,
            url: post.url,
            created_at: render_time(post.created_at, tz),
            visibility: post.visibility,
        }
    }
}

pub fn render_time(at: DateTime<Utc>, tz: Tz) -> String {
    at.with_timezone(&tz).to_rfc3339()
}

fn posts(posts: Vec<Post>, tz: Tz) -> Vec<PostDto> {
    posts.into_iter().map(|p| PostDto::from_post(p, tz)).collect()
}

#[derive(Debug, Serialize)]
pub struct AccountDto {
    pub id: String,
    pub host: String,
    pub user_name: String,
    pub public: bool,
    pub all_fetched: bool,
    pub exposure: VisibilityExposure,
}

impl From<Account> for AccountDto {
    fn from(a: Account) -> Self {
        Self {
            id: a.id,
            host: a.host,
            user_name: a.user_name,
            public: a.public,
            all_fetched: a.all_fetched,
            exposure: a.exposure,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionDto {
    pub account: AccountDto,
    pub created: bool,
}

impl From<LoginOutcome> for SessionDto {
    fn from(outcome: LoginOutcome) -> Self {
        Self {
            account: outcome.account.into(),
            created: outcome.created,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ArchiveDto {
    pub account: AccountDto,
    pub all_fetched: bool,
    pub public: bool,
    pub posts: Vec<PostDto>,
}

impl ArchiveDto {
    pub fn new(view: ArchiveView, tz: Tz) -> Self {
        Self {
            all_fetched: view.account.all_fetched,
            public: view.account.public,
            account: view.account.into(),
            posts: posts(view.posts, tz),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PublicProfileDto {
    pub host: String,
    pub user_name: String,
    pub posts: Vec<PostDto>,
}

impl PublicProfileDto {
    pub fn new(profile: PublicProfile, tz: Tz) -> Self {
        Self {
            host: profile.host,
            user_name: profile.user_name,
            posts: posts(profile.posts, tz),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FetchStateDto {
    pub all_fetched: bool,
    pub state: FetchState,
}

impl From<FetchState> for FetchStateDto {
    fn from(state: FetchState) -> Self {
        Self {
            all_fetched: state == FetchState::Complete,
            state,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ArchiveQuery {
    pub q: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PublicRequest {
    pub public: bool,
}

#[derive(Debug, Deserialize)]
pub struct VisibilityRequest {
    #[serde(default)]
    pub unlisted: bool,
    #[serde(default)]
    pub private: bool,
    #[serde(default)]
    pub direct: bool,
}

impl From<VisibilityRequest> for VisibilityExposure {
    fn from(r: VisibilityRequest) -> Self {
        Self {
            show_unlisted: r.unlisted,
            show_private: r.private,
            show_direct: r.direct,
        }
    }
}
