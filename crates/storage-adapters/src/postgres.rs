//! # PostgreSQL archive
//!
//! Implements the repository ports over a shared PostgreSQL pool.
//! Ids are compared under the "C" collation so that equal-length decimal ids
//! sort by value regardless of the database locale.

use std::str::FromStr;

use async_trait::async_trait;
use domains::{
    Account, AccountKey, AccountRepository, App, AppRepository, DomainError, Post, PostId,
    PostRepository, Result, Visibility, VisibilityExposure,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use tracing::{debug, info};

use crate::error::{migrate_error, storage_error};
use crate::PoolSettings;

const NEWEST_FIRST: &str = r#"ORDER BY LENGTH(id) DESC, id COLLATE "C" DESC"#;
const OLDEST_FIRST: &str = r#"ORDER BY LENGTH(id) ASC, id COLLATE "C" ASC"#;

const ACCOUNT_COLUMNS: &str =
    "id, host, user_name, public, all_fetched, show_unlisted, show_private, show_direct";

#[derive(Clone)]
pub struct PgArchive {
    pool: PgPool,
}

impl PgArchive {
    pub async fn connect(url: &str, settings: PoolSettings) -> Result<Self> {
        info!(
            max_connections = settings.max_connections,
            acquire_timeout = ?settings.acquire_timeout,
            "connecting to postgres"
        );
        let pool = PgPoolOptions::new()
            .max_connections(settings.max_connections)
            .acquire_timeout(settings.acquire_timeout)
            .connect(url)
            .await
            .map_err(storage_error)?;
        Ok(Self { pool })
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations/postgres")
            .run(&self.pool)
            .await
            .map_err(migrate_error)
    }
}

fn row_to_post(row: &PgRow) -> Result<Post> {
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

fn row_to_account(row: &PgRow) -> Result<Account> {
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

#[async_trait]
impl PostRepository for PgArchive {
    async fn insert_posts(&self, account: &AccountKey, posts: &[Post]) -> Result<u64> {
        if posts.is_empty() {
            return Ok(0);
        }

        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new(
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
        let sql = format!(
            "SELECT id FROM status WHERE account_id = $1 AND host = $2 {NEWEST_FIRST} LIMIT 1"
        );
        let id: Option<String> = sqlx::query_scalar(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(id.map(PostId::new))
    }

    async fn oldest_id(&self, account: &AccountKey) -> Result<Option<PostId>> {
        let sql = format!(
            "SELECT id FROM status WHERE account_id = $1 AND host = $2 {OLDEST_FIRST} LIMIT 1"
        );
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
        // strpos(text, NULL) is NULL, so a missing filter falls through to TRUE
        let sql = format!(
            "SELECT * FROM status WHERE account_id = $1 AND host = $2 \
             AND ($3::TEXT IS NULL OR strpos(text, $3) > 0) {NEWEST_FIRST}"
        );
        let rows = sqlx::query(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .bind(text_filter)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(row_to_post).collect()
    }

    async fn list_by_account_with_visibility(
        &self,
        account: &AccountKey,
        allowed: &[Visibility],
    ) -> Result<Vec<Post>> {
        let allowed: Vec<String> = allowed.iter().map(|v| v.as_str().to_string()).collect();
        let sql = format!(
            "SELECT * FROM status WHERE account_id = $1 AND host = $2 \
             AND visibility = ANY($3) {NEWEST_FIRST}"
        );
        let rows = sqlx::query(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .bind(allowed)
            .fetch_all(&self.pool)
            .await
            .map_err(storage_error)?;
        rows.iter().map(row_to_post).collect()
    }
}

#[async_trait]
impl AccountRepository for PgArchive {
    async fn is_all_fetched(&self, account: &AccountKey) -> Result<bool> {
        let flag: Option<bool> =
            sqlx::query_scalar("SELECT all_fetched FROM account WHERE id = $1 AND host = $2")
                .bind(&account.id)
                .bind(&account.host)
                .fetch_optional(&self.pool)
                .await
                .map_err(storage_error)?;
        Ok(flag.unwrap_or(false))
    }

    async fn mark_all_fetched(&self, account: &AccountKey) -> Result<()> {
        let result = sqlx::query("UPDATE account SET all_fetched = TRUE WHERE id = $1 AND host = $2")
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
            "INSERT INTO account (id, host, user_name) VALUES ($1, $2, $3) \
             ON CONFLICT (id, host) DO NOTHING",
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
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE id = $1 AND host = $2");
        let row = sqlx::query(&sql)
            .bind(&account.id)
            .bind(&account.host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn find_by_user_name(&self, user_name: &str, host: &str) -> Result<Option<Account>> {
        let sql =
            format!("SELECT {ACCOUNT_COLUMNS} FROM account WHERE user_name = $1 AND host = $2");
        let row = sqlx::query(&sql)
            .bind(user_name)
            .bind(host)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage_error)?;
        row.as_ref().map(row_to_account).transpose()
    }

    async fn set_public(&self, account: &AccountKey, public: bool) -> Result<()> {
        let result = sqlx::query("UPDATE account SET public = $1 WHERE id = $2 AND host = $3")
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
            "UPDATE account SET show_unlisted = $1, show_private = $2, show_direct = $3 \
             WHERE id = $4 AND host = $5",
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
impl AppRepository for PgArchive {
    async fn find_by_host(&self, host: &str) -> Result<Option<App>> {
        let row = sqlx::query("SELECT host, client_id, client_secret FROM app WHERE host = $1")
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
        sqlx::query("INSERT INTO app (host, client_id, client_secret) VALUES ($1, $2, $3)")
            .bind(&app.host)
            .bind(&app.client_id)
            .bind(&app.client_secret)
            .execute(&self.pool)
            .await
            .map_err(storage_error)?;
        Ok(())
    }
}
