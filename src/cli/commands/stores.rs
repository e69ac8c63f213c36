//! Connection settings for the relational, key/value and graph stores.

use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;

pub const ARG_DSN: &str = "dsn";
pub const ARG_KV_BACKEND: &str = "kv-backend";
pub const ARG_REDIS_URL: &str = "redis-url";
pub const ARG_GRAPH_URI: &str = "graph-uri";
pub const ARG_GRAPH_USER: &str = "graph-user";
pub const ARG_GRAPH_PASSWORD: &str = "graph-password";

/// Where rate-limit counters and device-token sets live.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KvBackend {
    Redis,
    /// Process-local; only for tests and single-instance development.
    Memory,
}

#[derive(Debug, Clone)]
pub struct Options {
    pub dsn: String,
    pub kv_backend: KvBackend,
    pub redis_url: String,
    pub graph_uri: String,
    pub graph_user: String,
    pub graph_password: SecretString,
}

impl Options {
    /// Parse store arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read_required = |id: &str| -> anyhow::Result<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
                .ok_or_else(|| anyhow::anyhow!("missing required argument: --{id}"))
        };

        let kv_backend = match matches.get_one::<String>(ARG_KV_BACKEND).map(String::as_str) {
            Some("memory") => KvBackend::Memory,
            _ => KvBackend::Redis,
        };

        Ok(Self {
            dsn: read_required(ARG_DSN)?,
            kv_backend,
            redis_url: read_required(ARG_REDIS_URL)?,
            graph_uri: read_required(ARG_GRAPH_URI)?,
            graph_user: read_required(ARG_GRAPH_USER)?,
            graph_password: SecretString::from(read_required(ARG_GRAPH_PASSWORD)?),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_DSN)
                .short('d')
                .long(ARG_DSN)
                .help("Database connection string")
                .env("TANDEM_DSN")
                .required(true),
        )
        .arg(
            Arg::new(ARG_KV_BACKEND)
                .long(ARG_KV_BACKEND)
                .help("Key/value store for rate limits and device sessions")
                .env("TANDEM_KV_BACKEND")
                .default_value("redis")
                .value_parser(["redis", "memory"]),
        )
        .arg(
            Arg::new(ARG_REDIS_URL)
                .long(ARG_REDIS_URL)
                .help("Redis connection URL")
                .env("TANDEM_REDIS_URL")
                .default_value("redis://127.0.0.1:6379"),
        )
        .arg(
            Arg::new(ARG_GRAPH_URI)
                .long(ARG_GRAPH_URI)
                .help("Graph store Bolt address")
                .env("TANDEM_GRAPH_URI")
                .default_value("127.0.0.1:7687"),
        )
        .arg(
            Arg::new(ARG_GRAPH_USER)
                .long(ARG_GRAPH_USER)
                .help("Graph store user")
                .env("TANDEM_GRAPH_USER")
                .default_value("neo4j"),
        )
        .arg(
            Arg::new(ARG_GRAPH_PASSWORD)
                .long(ARG_GRAPH_PASSWORD)
                .help("Graph store password")
                .env("TANDEM_GRAPH_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}
