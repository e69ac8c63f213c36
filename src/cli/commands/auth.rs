use clap::{builder::BoolishValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;

use crate::session::{AuthConfig, SameSite};

pub const ARG_COOKIE_SECRET: &str = "cookie-secret";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_COOKIE_STRICT: &str = "cookie-strict";
pub const ARG_REQUIRE_EMAIL_VERIFICATION: &str = "require-email-verification";

#[derive(Debug, Clone)]
pub struct Options {
    pub cookie_secret: SecretString,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub cookie_strict: bool,
    pub require_email_verification: bool,
}

impl Options {
    /// Parse session arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the cookie secret is missing or blank.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let cookie_secret = matches
            .get_one::<String>(ARG_COOKIE_SECRET)
            .cloned()
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --{ARG_COOKIE_SECRET}"))?;
        let flag = |id: &str| matches.get_flag(id);

        Ok(Self {
            cookie_secret: SecretString::from(cookie_secret),
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(604_800),
            cookie_secure: flag(ARG_COOKIE_SECURE),
            cookie_strict: flag(ARG_COOKIE_STRICT),
            require_email_verification: flag(ARG_REQUIRE_EMAIL_VERIFICATION),
        })
    }

    #[must_use]
    pub fn auth_config(&self) -> AuthConfig {
        let same_site = if self.cookie_strict {
            SameSite::Strict
        } else {
            SameSite::Lax
        };
        AuthConfig::new()
            .with_session_ttl_seconds(self.session_ttl_seconds)
            .with_same_site(same_site)
            .with_cookie_secure(self.cookie_secure)
            .with_require_email_verification(self.require_email_verification)
    }
}

fn switch(id: &'static str, env: &'static str, help: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .action(ArgAction::SetTrue)
        .value_parser(BoolishValueParser::new())
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_COOKIE_SECRET)
                .long(ARG_COOKIE_SECRET)
                .help("Secret the session cookie encryption key is derived from")
                .env("TANDEM_COOKIE_SECRET")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("TANDEM_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(switch(
            ARG_COOKIE_SECURE,
            "TANDEM_COOKIE_SECURE",
            "Mark the session cookie Secure (HTTPS only)",
        ))
        .arg(switch(
            ARG_COOKIE_STRICT,
            "TANDEM_COOKIE_STRICT",
            "Use SameSite=Strict instead of Lax",
        ))
        .arg(switch(
            ARG_REQUIRE_EMAIL_VERIFICATION,
            "TANDEM_REQUIRE_EMAIL_VERIFICATION",
            "Reject logins from accounts with an unverified email",
        ))
}
