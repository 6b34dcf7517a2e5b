//! API server configuration.

use gatekeep_core::auth::jwt::resolve_jwt_secret;
use gatekeep_core::mail::SmtpConfig;

/// Configuration for the API server.
#[derive(Clone, Debug)]
pub struct ApiConfig {
    /// Address to bind the HTTP listener (e.g. "127.0.0.1:3100").
    pub bind_addr: String,
    /// PostgreSQL connection URL.
    pub database_url: String,
    /// Redis connection URL. `None` runs on the in-process cache.
    pub redis_url: Option<String>,
    /// JWT signing secret.
    pub jwt_secret: String,
    /// Outbound mail relay. `None` logs mail instead of sending it.
    pub smtp: Option<SmtpConfig>,
}

impl ApiConfig {
    /// Reads configuration from environment variables with sensible defaults.
    ///
    /// | Variable           | Default                                 |
    /// |--------------------|-----------------------------------------|
    /// | `BIND_ADDR`        | `127.0.0.1:3100`                        |
    /// | `DATABASE_URL`     | `postgres://localhost:5432/gatekeep`    |
    /// | `REDIS_URL`        | unset (in-process cache)                |
    /// | `JWT_SECRET_KEY` / `JWT_SECRET` | generated & persisted to file |
    /// | `SMTP_SERVER`      | unset (mail is logged, not sent)        |
    /// | `SMTP_PORT`        | `587`                                   |
    /// | `SENDER_EMAIL`     | required with `SMTP_SERVER`             |
    /// | `SMTP_USERNAME`    | `SENDER_EMAIL`                          |
    /// | `EMAIL_PASS`       | empty                                   |
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:3100".into()),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgres://localhost:5432/gatekeep".into()),
            redis_url: non_empty_var("REDIS_URL"),
            jwt_secret: resolve_jwt_secret(),
            smtp: smtp_from_env(),
        }
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn smtp_from_env() -> Option<SmtpConfig> {
    let host = non_empty_var("SMTP_SERVER")?;
    let sender = non_empty_var("SENDER_EMAIL")?;
    let port = std::env::var("SMTP_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(587);
    Some(SmtpConfig {
        host,
        port,
        username: non_empty_var("SMTP_USERNAME").unwrap_or_else(|| sender.clone()),
        password: std::env::var("EMAIL_PASS").unwrap_or_default(),
        sender,
    })
}
