//! Gatekeep session service binary.
//!
//! Connects the durable store, the key-value cache and the mailer, runs
//! migrations and serves the HTTP API until interrupted.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use gatekeep_api::config::ApiConfig;
use gatekeep_core::cache::{KvCache, MemoryCache, RedisCache};
use gatekeep_core::mail::{LogMailer, Mailer, SmtpMailer};
use gatekeep_core::session::SessionService;
use gatekeep_core::settings::{RevocationPolicy, SessionSettings};
use gatekeep_core::store::{MemoryUserStore, PgUserStore, UserStore};
use sqlx::postgres::PgPoolOptions;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// CLI arguments. Each falls back to its environment variable, then to
/// [`ApiConfig::from_env`] defaults.
#[derive(Parser, Debug)]
#[command(name = "gatekeep_server", about = "Gatekeep session service")]
struct Args {
    /// Port to listen on (0 = ephemeral). Overrides the port of `BIND_ADDR`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// PostgreSQL connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Redis connection URL. Without one, an in-process cache is used.
    #[arg(long, env = "REDIS_URL")]
    redis_url: Option<String>,

    /// Maximum number of database connections in the pool.
    #[arg(long, env = "MAX_CONNECTIONS", default_value_t = 5)]
    max_connections: u32,

    /// Upper bound for each store/cache call, in milliseconds.
    #[arg(long, env = "OP_TIMEOUT_MS", default_value_t = 5000)]
    op_timeout_ms: u64,

    /// Treat sessions as live when the revocation cache is unreachable.
    #[arg(long, env = "REVOCATION_FAIL_OPEN", default_value_t = false)]
    revocation_fail_open: bool,

    /// Keep users in memory instead of PostgreSQL. Data is lost on exit.
    #[arg(long, default_value_t = false)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                tracing_subscriber::EnvFilter::new("info,gatekeep_api=debug,gatekeep_core=debug")
            }),
        )
        .init();

    let args = Args::parse();

    let mut config = ApiConfig::from_env();
    if let Some(url) = args.database_url {
        config.database_url = url;
    }
    if args.redis_url.is_some() {
        config.redis_url = args.redis_url;
    }
    if let Some(port) = args.port {
        let host = config
            .bind_addr
            .rsplit_once(':')
            .map_or("127.0.0.1", |(host, _)| host);
        config.bind_addr = format!("{host}:{port}");
    }

    let settings = SessionSettings {
        op_timeout: Duration::from_millis(args.op_timeout_ms),
        revocation_policy: if args.revocation_fail_open {
            RevocationPolicy::FailOpen
        } else {
            RevocationPolicy::FailClosed
        },
        ..SessionSettings::default()
    };

    info!(
        bind_addr = %config.bind_addr,
        max_connections = args.max_connections,
        op_timeout_ms = args.op_timeout_ms,
        revocation_policy = ?settings.revocation_policy,
        "starting gatekeep_server"
    );

    let db: Arc<dyn UserStore> = if args.ephemeral {
        warn!("ephemeral mode: users are kept in memory only");
        Arc::new(MemoryUserStore::new())
    } else {
        let pool = PgPoolOptions::new()
            .max_connections(args.max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect(&config.database_url)
            .await?;

        info!("running database migrations");
        gatekeep_core::migrate::migrate(&pool).await?;
        Arc::new(PgUserStore::new(pool, settings.op_timeout))
    };

    let kv: Arc<dyn KvCache> = match &config.redis_url {
        Some(url) => Arc::new(RedisCache::connect(url, settings.op_timeout).await?),
        None => {
            warn!("REDIS_URL not set, using in-process cache; revocations are not shared");
            Arc::new(MemoryCache::new())
        }
    };

    let mailer: Arc<dyn Mailer> = match &config.smtp {
        Some(smtp) => {
            info!(host = %smtp.host, port = smtp.port, "SMTP mailer configured");
            Arc::new(SmtpMailer::new(smtp)?)
        }
        None => {
            warn!("SMTP not configured, verification emails will only be logged");
            Arc::new(LogMailer)
        }
    };

    let sessions = SessionService::build(config.jwt_secret.as_bytes(), &settings, db, kv, mailer);
    let app = gatekeep_api::router(gatekeep_api::AppState::new(sessions));

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, "REST API listening");

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("interrupt received, shutting down");
            }
            shutdown.cancel();
        }
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}
