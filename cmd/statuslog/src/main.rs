//! # statuslog
//!
//! Loads settings, connects the archive, wires the adapters into the
//! services and serves the HTTP API until interrupted.

use std::sync::Arc;

use anyhow::{bail, Context};
use api_adapters::{router, AppState};
use configs::{LogFormat, LogSettings, Settings};
use domains::{AccountRepository, PostRepository};
use remote_adapters::{MastodonClient, MastodonConfig};
use secrecy::ExposeSecret;
use services::{AccountService, FixedInterval, SyncService};
use storage_adapters::PoolSettings;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

#[cfg(feature = "db-postgres")]
use storage_adapters::PgArchive;
#[cfg(feature = "db-sqlite")]
use storage_adapters::SqliteArchive;

/// The two repository ports the services need, backed by one store.
struct Archive {
    posts: Arc<dyn PostRepository>,
    accounts: Arc<dyn AccountRepository>,
}

impl Archive {
    fn new<A>(archive: A) -> Self
    where
        A: PostRepository + AccountRepository + 'static,
    {
        let archive = Arc::new(archive);
        Self {
            posts: archive.clone(),
            accounts: archive,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = configs::load().context("loading configuration")?;
    init_tracing(&settings.log);

    let archive = open_archive(&settings).await?;
    let remote = Arc::new(
        MastodonClient::new(MastodonConfig {
            scheme: settings.remote.scheme.clone(),
            page_size: settings.remote.page_size,
            request_timeout: settings.remote.request_timeout(),
            user_agent: settings.remote.user_agent.clone(),
        })
        .context("building remote client")?,
    );

    let sync = SyncService::new(
        archive.posts.clone(),
        archive.accounts.clone(),
        remote.clone(),
        Arc::new(FixedInterval(settings.sync.pacing_interval())),
    );
    let accounts = AccountService::new(archive.accounts, archive.posts, remote);

    let state = AppState::new(Arc::new(sync), Arc::new(accounts))
        .with_display_tz(settings.display.tz()?)
        .with_backfill_timeout(settings.sync.backfill_timeout());

    let addr = settings.server.addr()?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    info!(%addr, "statuslog listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    info!("statuslog stopped");
    Ok(())
}

fn init_tracing(log: &LogSettings) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log.filter));
    let registry = tracing_subscriber::registry().with(filter);
    match log.format {
        LogFormat::Json => registry.with(fmt::layer().json()).init(),
        LogFormat::Pretty => registry.with(fmt::layer()).init(),
    }
}

async fn open_archive(settings: &Settings) -> anyhow::Result<Archive> {
    let url = settings.database.url.expose_secret();
    let pool = PoolSettings {
        max_connections: settings.database.max_connections,
        acquire_timeout: settings.database.acquire_timeout(),
    };

    if url.starts_with("postgres://") || url.starts_with("postgresql://") {
        #[cfg(feature = "db-postgres")]
        {
            let archive = PgArchive::connect(url, pool)
                .await
                .context("connecting to postgres")?;
            archive.migrate().await.context("migrating postgres")?;
            info!("using postgres archive");
            return Ok(Archive::new(archive));
        }
        #[cfg(not(feature = "db-postgres"))]
        bail!("a postgres url was configured but this build lacks the db-postgres feature");
    }

    if url.starts_with("sqlite:") {
        #[cfg(feature = "db-sqlite")]
        {
            let archive = SqliteArchive::connect(url, pool)
                .await
                .context("opening sqlite database")?;
            archive.migrate().await.context("migrating sqlite")?;
            info!("using sqlite archive");
            return Ok(Archive::new(archive));
        }
        #[cfg(not(feature = "db-sqlite"))]
        bail!("a sqlite url was configured but this build lacks the db-sqlite feature");
    }

    bail!("database.url must start with postgres:// or sqlite:")
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
