use crate::{
    api,
    cli::commands::stores::KvBackend,
    session::{
        AuthConfig, Authenticator, CookieKey, CookieSealer, LoginRateLimiter, SessionRegistry,
    },
    store::{KvStore, MemoryStore, PgUserStore, RedisStore},
    tx::{StoreBackends, TxSource},
};
use anyhow::{Context, Result};
use axum::Router;
use neo4rs::Graph;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use url::Url;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub kv_backend: KvBackend,
    pub redis_url: String,
    pub graph_uri: String,
    pub graph_user: String,
    pub graph_password: SecretString,
    pub cookie_secret: SecretString,
    pub auth_config: AuthConfig,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the cookie key cannot be derived, a store is
/// unreachable, or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    // Derived once; every sealer shares it for the life of the process.
    let cookie_key = CookieKey::derive(&args.cookie_secret).context("Invalid cookie secret")?;

    info!("Connecting to database {}", redacted_dsn(&args.dsn));
    let pool = PgPoolOptions::new()
        .min_connections(1)
        .max_connections(5)
        .max_lifetime(Duration::from_secs(60 * 2))
        .test_before_acquire(true)
        .connect(&args.dsn)
        .await
        .context("Failed to connect to database")?;

    let kv: Arc<dyn KvStore> = match args.kv_backend {
        KvBackend::Redis => Arc::new(
            RedisStore::connect(&args.redis_url)
                .await
                .context("Failed to connect to key/value store")?,
        ),
        KvBackend::Memory => {
            warn!("Using in-process key/value store; sessions do not survive restarts");
            Arc::new(MemoryStore::new())
        }
    };

    let graph = Graph::new(
        args.graph_uri.as_str(),
        args.graph_user.as_str(),
        args.graph_password.expose_secret(),
    )
    .await
    .context("Failed to connect to graph store")?;

    let authenticator = Arc::new(Authenticator::new(
        args.auth_config,
        CookieSealer::new(&cookie_key),
        Arc::new(PgUserStore::new(pool.clone())),
        SessionRegistry::new(kv.clone()),
        LoginRateLimiter::new(kv),
    ));
    let tx_source: Arc<dyn TxSource> = Arc::new(StoreBackends::new(pool, graph));

    let app = api::router(authenticator, tx_source, Router::new());
    api::new(args.port, app).await
}

/// DSN with the password removed, for logs.
fn redacted_dsn(dsn: &str) -> String {
    match Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.to_string()
        }
        Err(_) => "<unparseable dsn>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn redacted_dsn_hides_password() {
        let redacted = redacted_dsn("postgres://app:hunter2@db:5432/tandem");
        assert!(!redacted.contains("hunter2"));
        assert!(redacted.contains("app"));
        assert!(redacted.contains("db:5432"));
    }

    #[test]
    fn redacted_dsn_never_echoes_garbage() {
        assert_eq!(redacted_dsn("not a url :: secret"), "<unparseable dsn>");
    }
}
