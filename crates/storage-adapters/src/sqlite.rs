//! # SQLite archive
//!
//! Implements the repository ports over an embedded SQLite database.
//! Used for single-user deployments and by the test suites.

use std::str::FromStr;

use async_trait::async_trait;
use domains::{
    Account, AccountKey, AccountRepository, App, AppRepository, DomainError, Post, PostId,
    PostRepository, Result, Visibility, VisibilityExposure,
};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use tracing::debug;

use crate::error::{migrate_error, storage_error};
use crate::PoolSettings;

/// Id ordering that matches numeric order for decimal ids of any length.
const NEWEST_FIRST: &str = "ORDER BY LENGTH(id) DESC, id DESC";
const OLDEST_FIRST: &str = "ORDER BY LENGTH(id) ASC, id ASC";

#[derive(Clone)]
pub struct SqliteArchive {
    pool: SqlitePool,
}

impl SqliteArchive {
    /// Connects to `url` (e.g. `sqlite://statuslog.db`), creating the file if needed.
    pub async fn connect(url: &str, settings: PoolSettings) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(storage_error)?
            .create_if_missing(true)
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect_with(options)
            .await
            .map_err(storage_error)?;
        Ok(Self { pool })
    }

    /// A private in-memory database. A single connection is kept alive for
    /// the lifetime of the pool, otherwise every new connection would see an
    /// empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(storage_error)?
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(storage_error)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/sqlite")
            .run(&self.pool)
            .await
            .map_err(migrate_error)
    }
}

fn row_to_post(row: &SqliteRow) -> Result<Post> {
    let visibility: String = row.try_get("visibility").map_err(storage_error)?;
    Ok(Post {
        id: PostId::new(row.try_get::<String, _>("id").map_err(storage_error)?),
        account_id: row.try_get("account_id").map_err(storage_error)?,
        host: row.try_get("host").map_err(storage_error)?,
        text: row.try_get("text").map_err(storage_error)?,
        url: row.try_get("url").map_err(storage_error)?,
        created_at: row.try_get("created_at").map_err(storage_error)?,
        visibility: Visibility::from_str(&visibility)
            .map_err(|e| DomainError::Storage(e.to_string()))?,
    })
}

fn row_to_account(row: &SqliteRow) -> Result<Account> {
    Ok(Account {
        id: row.try_get("id").map_err(storage_error)?,
        host: row.try_get("host").map_err(storage_error)?,
        user_name: row.try_get("user_name").map_err(storage_error)?,
        public: row.try_get("public").map_err(storage_error)?,
        all_fetched: row.try_get("all_fetched").map_err(storage_error)?,
        exposure: VisibilityExposure {
            show_unlisted: row.try_get("show_unlisted").map_err(storage_error)?,
            show_private: row.try_get("show_private").map_err(storage_error)?,
            show_direct: row.try_get("show_direct").map_err(storage_error)?,
        },
    })
}

const ACCOUNT_COLUMNS: &str =
    "id, host, user_name, public, all_fetched, show_unlisted, show_private, show_direct";

#[async_trait]
impl PostRepository for SqliteArchive {
    /// A single multi-row statement, so a page is stored entirely or not at all.
    async fn insert_posts(&self, account: &AccountKey, posts: &[Post]) -> Result<u64> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(
            "INSERT INTO status (id, account_id, host, text, url, created_at, visibility) ",
        );
        qb.push_values(posts, |mut b, post| {
            b.push_bind(post.id.as_str().to_owned())
                .push_bind(account.id.clone())
                .push_bind(account.host.clone())
                .push_bind(post.text.clone())
                .push_bind(post.url.clone())
                .push_bind(post.created_at)
                .push_bind(post.visibility.as_str());
        });
        qb.push(" ON CONFLICT (id) DO NOTHING");

        let result = qb
            .build()
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        debug!(account = %account, offered = posts.len(), inserted = result.rows_affected(), "stored posts");
        Ok(result.rows_affected())
    }

    async fn newest_id(&self, account: &AccountKey) -> Result<Option<PostId>> {
        let sql = format!("SELECT id FROM status WHERE account_id = ? AND host = ? {NEWEST_FIRST} LIMIT 1");
        let id: Option<String> = sqlx::query_scalar(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(id.map(PostId::new))
    }

    async fn oldest_id(&self, account: &AccountKey) -> Result<Option<PostId>> {
        let sql = format!("SELECT id FROM status WHERE account_id = ? AND host = ? {OLDEST_FIRST} LIMIT 1");
        let id: Option<String> = sqlx::query_scalar(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(id.map(PostId::new))
    }

    async fn list_by_account(
        &self,
        account: &AccountKey,
        text_filter: Option<String>,
    ) -> Result<Vec<Post>> {
        let rows = match text_filter {
            Some(needle) => {
                let sql = format!(
                    "SELECT * FROM status WHERE account_id = ? AND host = ? AND instr(text, ?) > 0 {NEWEST_FIRST}"
                );
                sqlx::query(&sql)
                    .bind(&account.id)
                    .bind(&account.host)
                    .bind(needle)
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                let sql = format!("SELECT * FROM status WHERE account_id = ? AND host = ? {NEWEST_FIRST}");
                sqlx::query(&sql)
                    .bind(&account.id)
                    .bind(&account.host)
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(storage_error)?;

        rows.iter().map(row_to_post).collect()
    }

    async fn list_by_account_with_visibility(
        &self,
        account: &AccountKey,
        allowed: &[Visibility],
    ) -> Result<Vec<Post>> {
        if allowed.is_empty() {
            return Ok(Vec::new());
        }

        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT * FROM status WHERE account_id = ");
        qb.push_bind(account.id.clone())
            .push(" AND host = ")
            .push_bind(account.host.clone())
            .push(" AND visibility IN (");
        let mut separated = qb.separated(", ");
        for visibility in allowed {
            separated.push_bind(visibility.as_str());
        }
        separated.push_unseparated(") ");
        qb.push(NEWEST_FIRST);

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(row_to_post).collect()
    }
}

#[async_trait]
impl AccountRepository for SqliteArchive {
    async fn is_all_fetched(&self, account: &AccountKey) -> Result<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT all_fetched FROM account WHERE id = ? AND host = ?")
                .bind(&account.id)
                .bind(&account.host)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(flag.unwrap_or(false))
    }

    async fn mark_all_fetched(&self, account: &AccountKey) -> Result<()> {
        let result = sqlx::query("UPDATE account SET all_fetched = 1 WHERE id = ? AND host = ?")
            .bind(&account.id)
            .bind(&account.host)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("account", account));
        }
        Ok(())
    }

    async fn ensure_exists(&self, id: &str, user_name: &str, host: &str) -> Result<bool> {
        let result = sqlx::query(
            "INSERT INTO account (id, host, user_name) VALUES (?, ?, ?) ON CONFLICT (id, host) DO NOTHING",
        )
        .bind(id)
        .bind(host)
        .bind(user_name)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        Ok(result.rows_affected() == 1)
    }

    async fn find(&self, account: &AccountKey) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = ? AND host = ?");
        let row = sqlx::query(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_by_user_name(&self, user_name: &str, host: &str) -> Result<Option<Account>> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE user_name = ? AND host = ?");
        let row = sqlx::query(&sql)
            .bind(user_name)
            .bind(host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn set_public(&self, account: &AccountKey, public: bool) -> Result<()> {
        let result = sqlx::query("UPDATE account SET public = ? WHERE id = ? AND host = ?")
            .bind(public)
            .bind(&account.id)
            .bind(&account.host)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("account", account));
        }
        Ok(())
    }

    async fn set_visibility_exposure(
        &self,
        account: &AccountKey,
        exposure: VisibilityExposure,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE account SET show_unlisted = ?, show_private = ?, show_direct = ? WHERE id = ? AND host = ?",
        )
        .bind(exposure.show_unlisted)
        .bind(exposure.show_private)
        .bind(exposure.show_direct)
        .bind(&account.id)
        .bind(&account.host)
        .execute(&self.pool)
        .await
        .map_err(storage_error)?;
        if result.rows_affected() == 0 {
            return Err(DomainError::not_found("account", account));
        }
        Ok(())
    }
}

#[async_trait]
impl AppRepository for SqliteArchive {
    async fn find_by_host(&self, host: &str) -> Result<Option<App>> {
        let row = sqlx::query("SELECT host, client_id, client_secret FROM app WHERE host = ?")
            .bind(host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.map(|row| {
            Ok(App {
                host: row.try_get("host").map_err(storage_error)?,
                client_id: row.try_get("client_id").map_err(storage_error)?,
                client_secret: row.try_get("client_secret").map_err(storage_error)?,
            })
        })
        .transpose()
    }

    async fn insert(&self, app: &App) -> Result<()> {
        sqlx::query("INSERT INTO app (host, client_id, client_secret) VALUES (?, ?, ?)")
            .bind(&app.host)
            .bind(&app.client_id)
            .bind(&app.client_secret)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
