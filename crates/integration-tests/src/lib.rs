//! # integration-tests
//!
//! Fixtures shared by the cross-crate tests: a scripted remote instance and a
//! sync harness over an in-memory SQLite archive.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, TimeZone, Utc};
use domains::{
    AccessToken, AccountKey, AccountRepository, DomainError, Post, PostId, PostRepository,
    RemoteAccount, RemotePostSource, Result, Visibility,
};
use services::{FixedInterval, PacingPolicy, SyncService};
use storage_adapters::SqliteArchive;
use tokio_util::sync::CancellationToken;

pub const HOST: &str = "fake.example";
pub const ACCOUNT_ID: &str = "7";
pub const USER_NAME: &str = "bob";
pub const TOKEN: &str = "fake-token";

pub fn key() -> AccountKey {
    AccountKey::new(ACCOUNT_ID, HOST)
}

pub fn token() -> AccessToken {
    AccessToken::new(TOKEN)
}

pub fn post(id: u64) -> Post {
    let visibility = match id % 4 {
        0 => Visibility::Public,
        1 => Visibility::Unlisted,
        2 => Visibility::Private,
        _ => Visibility::Direct,
    };
    Post {
        id: PostId::from(id.to_string()),
        account_id: ACCOUNT_ID.into(),
        host: HOST.into(),
        text: format!("post {id}"),
        url: format!("https://{HOST}/@{USER_NAME}/{id}"),
        created_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
            + ChronoDuration::minutes(id as i64),
        visibility,
    }
}

#[derive(Default)]
struct Script {
    /// Newest first.
    history: Vec<Post>,
    page_size: usize,
    /// 1-based index of the `fetch_before` call that fails.
    fail_before_call: Option<usize>,
    before_calls: usize,
    since_calls: usize,
}

/// An in-memory remote instance with Mastodon's paging rules: `since`
/// returns the page adjacent to the cursor, `before` the newest page older
/// than it, both newest first.
pub struct FakeInstance {
    script: Mutex<Script>,
}

impl FakeInstance {
    /// History of posts `1..=len`.
    pub fn with_history(len: u64, page_size: usize) -> Self {
        let history = (1..=len).rev().map(post).collect();
        Self {
            script: Mutex::new(Script {
                history,
                page_size,
                ..Script::default()
            }),
        }
    }

    /// Adds newer posts at the head of the remote timeline.
    pub fn publish(&self, ids: impl IntoIterator<Item = u64>) {
        let mut script = self.script.lock().unwrap();
        for id in ids {
            script.history.push(post(id));
        }
        script.history.sort_by(|a, b| b.id.cmp(&a.id));
    }

    pub fn fail_on_before_call(&self, call: usize) {
        self.script.lock().unwrap().fail_before_call = Some(call);
    }

    pub fn clear_failure(&self) {
        self.script.lock().unwrap().fail_before_call = None;
    }

    pub fn before_calls(&self) -> usize {
        self.script.lock().unwrap().before_calls
    }

    pub fn since_calls(&self) -> usize {
        self.script.lock().unwrap().since_calls
    }
}

#[async_trait]
impl RemotePostSource for FakeInstance {
    async fn fetch_since(
        &self,
        _account: &AccountKey,
        _token: &AccessToken,
        since: Option<PostId>,
    ) -> Result<Vec<Post>> {
        let mut script = self.script.lock().unwrap();
        script.since_calls += 1;
        let newer: Vec<Post> = script
            .history
            .iter()
            .filter(|p| since.as_ref().map_or(true, |s| &p.id > s))
            .cloned()
            .collect();
        let page = match since {
            None => newer.into_iter().take(script.page_size).collect(),
            Some(_) => {
                let skip = newer.len().saturating_sub(script.page_size);
                newer.into_iter().skip(skip).collect()
            }
        };
        Ok(page)
    }

    async fn fetch_before(
        &self,
        _account: &AccountKey,
        _token: &AccessToken,
        before: Option<PostId>,
    ) -> Result<Vec<Post>> {
        let mut script = self.script.lock().unwrap();
        script.before_calls += 1;
        if script.fail_before_call == Some(script.before_calls) {
            return Err(DomainError::Transport("connection reset by peer".into()));
        }
        Ok(script
            .history
            .iter()
            .filter(|p| before.as_ref().map_or(true, |b| &p.id < b))
            .take(script.page_size)
            .cloned()
            .collect())
    }

    async fn verify_credentials(&self, _host: &str, token: &AccessToken) -> Result<RemoteAccount> {
        if token.expose() != TOKEN {
            return Err(DomainError::Auth("token rejected".into()));
        }
        Ok(RemoteAccount {
            id: ACCOUNT_ID.into(),
            user_name: USER_NAME.into(),
        })
    }
}

/// Cancels `token` once `pages` pacing waits have happened.
pub struct CancelAfterPages {
    pub token: CancellationToken,
    pub pages: usize,
    seen: AtomicUsize,
}

impl CancelAfterPages {
    pub fn new(token: CancellationToken, pages: usize) -> Self {
        Self {
            token,
            pages,
            seen: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl PacingPolicy for CancelAfterPages {
    async fn pause(&self) {
        if self.seen.fetch_add(1, Ordering::SeqCst) + 1 >= self.pages {
            self.token.cancel();
        }
    }
}

pub struct Harness {
    pub archive: SqliteArchive,
    pub remote: Arc<FakeInstance>,
    pub sync: SyncService,
}

impl Harness {
    pub async fn new(remote: FakeInstance) -> Self {
        Self::with_pacing(remote, Arc::new(FixedInterval(std::time::Duration::ZERO))).await
    }

    pub async fn with_pacing(remote: FakeInstance, pacing: Arc<dyn PacingPolicy>) -> Self {
        let archive = SqliteArchive::in_memory().await.unwrap();
        archive.migrate().await.unwrap();
        archive
            .ensure_exists(ACCOUNT_ID, USER_NAME, HOST)
            .await
            .unwrap();
        Self::over(archive, remote, pacing)
    }

    /// No account row; inserts for it violate the foreign key.
    pub async fn without_account(remote: FakeInstance) -> Self {
        let archive = SqliteArchive::in_memory().await.unwrap();
        archive.migrate().await.unwrap();
        Self::over(
            archive,
            remote,
            Arc::new(FixedInterval(std::time::Duration::ZERO)),
        )
    }

    fn over(archive: SqliteArchive, remote: FakeInstance, pacing: Arc<dyn PacingPolicy>) -> Self {
        let remote = Arc::new(remote);
        let sync = SyncService::new(
            Arc::new(archive.clone()),
            Arc::new(archive.clone()),
            remote.clone(),
            pacing,
        );
        Self {
            archive,
            remote,
            sync,
        }
    }

    /// Stored ids, newest first.
    pub async fn stored_ids(&self) -> Vec<u64> {
        self.archive
            .list_by_account(&key(), None)
            .await
            .unwrap()
            .iter()
            .map(|p| p.id.as_str().parse().unwrap())
            .collect()
    }

    pub async fn all_fetched(&self) -> bool {
        self.archive.is_all_fetched(&key()).await.unwrap()
    }
}
