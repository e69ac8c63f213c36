//! Command-line argument dispatch.
//!
//! Maps validated CLI arguments to the action to run, currently only the API
//! server with its store and session configuration.

use crate::cli::actions::{server::Args, Action};
use crate::cli::commands::{auth, stores};
use anyhow::Result;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or blank.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);

    let store_opts = stores::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;
    let auth_config = auth_opts.auth_config();

    Ok(Action::Server(Args {
        port,
        dsn: store_opts.dsn,
        kv_backend: store_opts.kv_backend,
        redis_url: store_opts.redis_url,
        graph_uri: store_opts.graph_uri,
        graph_user: store_opts.graph_user,
        graph_password: store_opts.graph_password,
        cookie_secret: auth_opts.cookie_secret,
        auth_config,
    }))
}
