//! # Sync Engine
//!
//! Mirrors a remote account's posts into the local store in two directions:
//! head-sync catches up with the newest posts one page per call, tail-sync
//! walks backwards through history until the remote returns an empty page.
//!
//! The engine keeps no cursor of its own. Every iteration re-reads the extreme
//! id from the store, so a pass that dies half way resumes from whatever was
//! committed last.

use std::sync::Arc;

use domains::{
    AccessToken, Account, AccountKey, AccountRepository, DomainError, FetchState, Post, PostId,
    PostRepository, RemotePostSource, Result,
};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument};

use crate::pacing::PacingPolicy;

/// Result of one head-sync call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HeadSync {
    pub inserted_count: u64,
    /// `false` when the remote had nothing newer than the stored head
    pub had_new_posts: bool,
}

/// Result of one tail-sync pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TailSync {
    /// `true` once the remote history is exhausted; `false` if cancelled
    pub completed: bool,
    pub inserted_total: u64,
}

pub struct SyncService {
    posts: Arc<dyn PostRepository>,
    accounts: Arc<dyn AccountRepository>,
    remote: Arc<dyn RemotePostSource>,
    pacing: Arc<dyn PacingPolicy>,
}

impl SyncService {
    pub fn new(
        posts: Arc<dyn PostRepository>,
        accounts: Arc<dyn AccountRepository>,
        remote: Arc<dyn RemotePostSource>,
        pacing: Arc<dyn PacingPolicy>,
    ) -> Self {
        Self {
            posts,
            accounts,
            remote,
            pacing,
        }
    }

    /// Fetches at most one page of posts newer than the stored head.
    ///
    /// Never touches `all_fetched` and never loops; polling cadence is the
    /// caller's business.
    #[instrument(skip(self, token), fields(account = %account))]
    pub async fn sync_head(&self, account: &AccountKey, token: &AccessToken) -> Result<HeadSync> {
        self.require_account(account).await?;
        let newest = self.posts.newest_id(account).await?;
        debug!(cursor = ?newest, "requesting posts newer than head");

        let page = self.remote.fetch_since(account, token, newest).await?;

        if page.is_empty() {
            info!("no new posts");
            return Ok(HeadSync {
                inserted_count: 0,
                had_new_posts: false,
            });
        }

        let inserted_count = self
            .posts
            .insert_posts(account, &page)
            .await
            .inspect_err(|e| error!(error = %e, "failed to store head page"))?;
        info!(page_size = page.len(), inserted_count, "head-sync stored page");

        Ok(HeadSync {
            inserted_count,
            had_new_posts: true,
        })
    }

    /// Backfills history until the remote reports an empty page, then marks
    /// the account fully fetched.
    ///
    /// Any remote or storage failure aborts the pass with every earlier page
    /// still committed and `all_fetched` untouched. Cancellation is observed
    /// between pages and during the pacing wait.
    #[instrument(skip(self, token, cancel), fields(account = %account))]
    pub async fn sync_tail(
        &self,
        account: &AccountKey,
        token: &AccessToken,
        cancel: &CancellationToken,
    ) -> Result<TailSync> {
        if self.require_account(account).await?.all_fetched {
            debug!("history already complete, skipping remote");
            return Ok(TailSync {
                completed: true,
                inserted_total: 0,
            });
        }

        let mut inserted_total = 0;
        let mut pages = 0u32;

        loop {
            if cancel.is_cancelled() {
                info!(pages, inserted_total, "tail-sync cancelled");
                return Ok(TailSync {
                    completed: false,
                    inserted_total,
                });
            }

            let oldest = self.posts.oldest_id(account).await?;
            debug!(cursor = ?oldest, "requesting posts older than tail");

            let page = self
                .remote
                .fetch_before(account, token, oldest.clone())
                .await?;

            if page.is_empty() {
                self.accounts.mark_all_fetched(account).await?;
                info!(pages, inserted_total, "tail-sync reached end of history");
                return Ok(TailSync {
                    completed: true,
                    inserted_total,
                });
            }

            if let Some(cursor) = &oldest {
                ensure_page_moves_past(cursor, &page)?;
            }

            let inserted = self
                .posts
                .insert_posts(account, &page)
                .await
                .inspect_err(|e| error!(error = %e, "failed to store backfill page"))?;
            if inserted == 0 && self.posts.oldest_id(account).await? == oldest {
                // every id on the page is already stored, under another account
                return Err(DomainError::Conflict(format!(
                    "backfill page of {} posts stored nothing and left the cursor at {oldest:?}",
                    page.len()
                )));
            }
            inserted_total += inserted;
            pages += 1;
            debug!(page_size = page.len(), inserted, "tail-sync stored page");

            tokio::select! {
                _ = cancel.cancelled() => {
                    info!(pages, inserted_total, "tail-sync cancelled during pacing");
                    return Ok(TailSync { completed: false, inserted_total });
                }
                _ = self.pacing.pause() => {}
            }
        }
    }

    /// Syncing needs the account row; posts reference it.
    async fn require_account(&self, account: &AccountKey) -> Result<Account> {
        self.accounts
            .find(account)
            .await?
            .ok_or_else(|| DomainError::not_found("account", account))
    }

    pub async fn is_all_fetched(&self, account: &AccountKey) -> Result<bool> {
        self.accounts.is_all_fetched(account).await
    }

    pub async fn fetch_state(&self, account: &AccountKey) -> Result<FetchState> {
        if self.accounts.is_all_fetched(account).await? {
            return Ok(FetchState::Complete);
        }
        Ok(match self.posts.newest_id(account).await? {
            Some(_) => FetchState::Partial,
            None => FetchState::Empty,
        })
    }
}

/// A page that holds nothing older than the cursor would make the loop spin
/// forever on the same request.
fn ensure_page_moves_past(cursor: &PostId, page: &[Post]) -> Result<()> {
    if page.iter().any(|p| &p.id < cursor) {
        return Ok(());
    }
    Err(DomainError::Transport(format!(
        "remote returned no posts older than {cursor}"
    )))
}
