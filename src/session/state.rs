//! Session and cookie policy configuration.

use std::fmt;

const DEFAULT_SESSION_TTL_SECONDS: i64 = 7 * 24 * 60 * 60;

/// `SameSite` attribute of the session cookie.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum SameSite {
    #[default]
    Lax,
    /// Elevated variant for deployments that never need cross-site navigation with a session.
    Strict,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lax => f.write_str("Lax"),
            Self::Strict => f.write_str("Strict"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthConfig {
    session_ttl_seconds: i64,
    same_site: SameSite,
    cookie_secure: bool,
    require_email_verification: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            same_site: SameSite::Lax,
            cookie_secure: false,
            require_email_verification: false,
        }
    }

    /// Cookie `Max-Age`; non-positive values fall back to the default so the cookie is always bounded.
    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = if seconds > 0 {
            seconds
        } else {
            DEFAULT_SESSION_TTL_SECONDS
        };
        self
    }

    #[must_use]
    pub fn with_same_site(mut self, same_site: SameSite) -> Self {
        self.same_site = same_site;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn with_require_email_verification(mut self, required: bool) -> Self {
        self.require_email_verification = required;
        self
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn same_site(&self) -> SameSite {
        self.same_site
    }

    #[must_use]
    pub fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    #[must_use]
    pub fn require_email_verification(&self) -> bool {
        self.require_email_verification
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_config_defaults_and_overrides() {
        let config = AuthConfig::new();
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
        assert_eq!(config.same_site(), SameSite::Lax);
        assert!(!config.cookie_secure());
        assert!(!config.require_email_verification());

        let config = config
            .with_session_ttl_seconds(3600)
            .with_same_site(SameSite::Strict)
            .with_cookie_secure(true)
            .with_require_email_verification(true);

        assert_eq!(config.session_ttl_seconds(), 3600);
        assert_eq!(config.same_site(), SameSite::Strict);
        assert!(config.cookie_secure());
        assert!(config.require_email_verification());
    }

    #[test]
    fn non_positive_ttl_keeps_cookie_bounded() {
        let config = AuthConfig::new().with_session_ttl_seconds(0);
        assert_eq!(config.session_ttl_seconds(), DEFAULT_SESSION_TTL_SECONDS);
    }
}
