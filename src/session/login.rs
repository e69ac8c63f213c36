//! Credential verification, session recovery and logout.

use anyhow::anyhow;
use axum::http::{HeaderMap, HeaderValue};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tracing::{debug, info};
use ulid::Ulid;

use super::{
    codec,
    cookie::{self, CookieSealer},
    password::{verify_dummy, verify_password},
    rate_limit::LoginRateLimiter,
    registry::SessionRegistry,
    state::AuthConfig,
    Session, UserType,
};
use crate::{error::AuthError, store::UserStore};

/// Rate-limit key for requests whose client address cannot be determined.
pub const UNKNOWN_CLIENT_IP: &str = "unknown";

const DEVICE_TOKEN_BYTES: usize = 16;
const MAX_DEVICE_TOKEN_LEN: usize = 128;

pub struct Credentials {
    pub identifier: String,
    pub password: SecretString,
    /// Token of a device that signed in before, if the client kept one.
    pub device_token: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identifier", &self.identifier)
            .field("password", &"***")
            .field("device_token", &self.device_token.as_ref().map(|_| "***"))
            .finish()
    }
}

/// Public view of the signed-in user.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Ulid,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub profile: UserProfile,
    pub session: Session,
    /// `Set-Cookie` value carrying the sealed session.
    pub cookie: HeaderValue,
}

/// Orchestrates the rate limiter, user store and session registry.
#[derive(Clone)]
pub struct Authenticator {
    config: AuthConfig,
    sealer: CookieSealer,
    users: Arc<dyn UserStore>,
    registry: SessionRegistry,
    limiter: LoginRateLimiter,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        sealer: CookieSealer,
        users: Arc<dyn UserStore>,
        registry: SessionRegistry,
        limiter: LoginRateLimiter,
    ) -> Self {
        Self {
            config,
            sealer,
            users,
            registry,
            limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn registry(&self) -> &SessionRegistry {
        &self.registry
    }

    /// Verify credentials and open a session for the device.
    ///
    /// Each step runs only if the previous one succeeded: rate-limit check,
    /// user lookup, password comparison, email verification, registry insert.
    ///
    /// # Errors
    /// `RateLimited` once the client IP exceeded its failure budget,
    /// `InvalidCredentials` for an unknown identifier or wrong password,
    /// `EmailNotVerified` when verification is required, and `Store` /
    /// `Internal` for backend failures.
    pub async fn login(
        &self,
        credentials: Credentials,
        client_ip: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let client_ip = client_ip.unwrap_or(UNKNOWN_CLIENT_IP);
        self.limiter.check(client_ip).await?;

        let identifier = normalize_identifier(&credentials.identifier);
        let Some(user) = self.users.find_by_identifier(&identifier).await? else {
            verify_dummy(credentials.password).await?;
            self.limiter.record_failure(client_ip).await?;
            return Err(AuthError::InvalidCredentials);
        };

        let stored_hash = user.password_hash.expose_secret().to_string();
        if !verify_password(credentials.password, stored_hash).await? {
            self.limiter.record_failure(client_ip).await?;
            return Err(AuthError::InvalidCredentials);
        }

        if self.config.require_email_verification() && !user.email_verified {
            return Err(AuthError::EmailNotVerified);
        }

        let device_token = match credentials.device_token {
            Some(token) if valid_device_token(&token) => token,
            _ => generate_device_token()?,
        };
        self.registry.register(user.id, &device_token).await?;

        let plaintext = codec::encode(user.id, &user.username, &device_token, user.user_type)?;
        let sealed = self.sealer.seal(&plaintext)?;
        let cookie = cookie::session_cookie(&self.config, &sealed)
            .map_err(|err| AuthError::Internal(anyhow!("invalid session cookie header: {err}")))?;

        info!(user_id = %user.id, "user logged in");

        Ok(LoginOutcome {
            profile: UserProfile {
                id: user.id,
                username: user.username.clone(),
                email: user.email,
                user_type: user.user_type,
            },
            session: Session {
                id: user.id,
                username: user.username,
                device_token,
                user_type: user.user_type,
            },
            cookie,
        })
    }

    /// Decrypt and decode a raw `SID` cookie value.
    ///
    /// Does not consult the registry; use [`Self::already_logged_in`] to
    /// establish validity.
    ///
    /// # Errors
    /// `Decrypt` or `CorruptedSession` on any failure.
    pub fn recover(&self, cookie_value: &str) -> Result<Session, AuthError> {
        let plaintext = self.sealer.open(cookie_value)?;
        Ok(codec::decode(&plaintext)?)
    }

    /// Recover the caller's session and check that its device is still signed in.
    ///
    /// Returns `Ok(None)` when there is no cookie, it does not decode, or the
    /// device was revoked.
    ///
    /// # Errors
    /// Only registry failures are errors.
    pub async fn already_logged_in(&self, headers: &HeaderMap) -> Result<Option<Session>, AuthError> {
        let Some(value) = cookie::session_cookie_value(headers) else {
            return Ok(None);
        };
        let session = match self.recover(&value) {
            Ok(session) => session,
            Err(err) => {
                debug!("ignoring session cookie: {err}");
                return Ok(None);
            }
        };
        if self
            .registry
            .is_active(session.id, &session.device_token)
            .await?
        {
            Ok(Some(session))
        } else {
            Ok(None)
        }
    }

    /// Sign out the caller's device and return the clearing cookie.
    ///
    /// Logging out without a cookie, with an undecodable one, or twice in a
    /// row all succeed.
    ///
    /// # Errors
    /// Registry failures while removing the device.
    pub async fn logout(&self, headers: &HeaderMap) -> Result<HeaderValue, AuthError> {
        if let Some(session) =
            cookie::session_cookie_value(headers).and_then(|value| self.recover(&value).ok())
        {
            self.registry
                .revoke(session.id, &session.device_token)
                .await?;
            info!(user_id = %session.id, "user logged out");
        }
        cookie::clear_session_cookie(&self.config)
            .map_err(|err| AuthError::Internal(anyhow!("invalid clear cookie header: {err}")))
    }

    /// Revoke every device of `user_id`.
    pub async fn sign_out_everywhere(&self, user_id: Ulid) -> Result<(), AuthError> {
        self.registry.revoke_all(user_id).await?;
        info!(%user_id, "signed out all devices");
        Ok(())
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Authenticator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Emails are case-insensitive; usernames are only trimmed.
fn normalize_identifier(identifier: &str) -> String {
    let trimmed = identifier.trim();
    if trimmed.contains('@') {
        trimmed.to_lowercase()
    } else {
        trimmed.to_string()
    }
}

fn valid_device_token(token: &str) -> bool {
    !token.is_empty()
        && token.len() <= MAX_DEVICE_TOKEN_LEN
        && token.bytes().all(|byte| byte.is_ascii_graphic())
}

fn generate_device_token() -> Result<String, AuthError> {
    let mut bytes = [0u8; DEVICE_TOKEN_BYTES];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(|err| AuthError::Internal(anyhow!("failed to generate device token: {err}")))?;
    Ok(hex::encode(bytes))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::{
        error::StoreError,
        session::{cookie::CookieKey, hash_password},
        store::{MemoryStore, UserRecord},
    };
    use argon2::{Algorithm, Argon2, Params, Version};
    use async_trait::async_trait;
    use axum::http::header::COOKIE;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct OneUser {
        record: UserRecord,
        lookups: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for OneUser {
        async fn find_by_identifier(
            &self,
            identifier: &str,
        ) -> Result<Option<UserRecord>, StoreError> {
            self.lookups.fetch_add(1, Ordering::SeqCst);
            let matches = identifier == self.record.username || identifier == self.record.email;
            Ok(matches.then(|| self.record.clone()))
        }
    }

    fn user(verified: bool) -> UserRecord {
        let argon2 = Argon2::new(
            Algorithm::Argon2id,
            Version::V0x13,
            Params::new(1024, 1, 1, None).unwrap(),
        );
        UserRecord {
            id: Ulid::new(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password_hash: SecretString::from(hash_password(&argon2, "wonderland").unwrap()),
            email_verified: verified,
            user_type: UserType::Standard,
        }
    }

    fn authenticator(config: AuthConfig, record: UserRecord) -> (Authenticator, Arc<OneUser>) {
        let kv = Arc::new(MemoryStore::new());
        let users = Arc::new(OneUser {
            record,
            lookups: AtomicUsize::new(0),
        });
        let key = CookieKey::derive(&SecretString::from("test secret".to_string())).unwrap();
        let auth = Authenticator::new(
            config,
            CookieSealer::new(&key),
            users.clone(),
            SessionRegistry::new(kv.clone()),
            LoginRateLimiter::new(kv),
        );
        (auth, users)
    }

    fn credentials(identifier: &str, password: &str) -> Credentials {
        Credentials {
            identifier: identifier.to_string(),
            password: SecretString::from(password.to_string()),
            device_token: None,
        }
    }

    fn cookie_headers(set_cookie: &HeaderValue) -> HeaderMap {
        let pair = set_cookie.to_str().unwrap().split(';').next().unwrap().to_string();
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(&pair).unwrap());
        headers
    }

    #[test]
    fn normalize_identifier_lowercases_emails_only() {
        assert_eq!(normalize_identifier(" Alice@Example.COM "), "alice@example.com");
        assert_eq!(normalize_identifier(" Alice "), "Alice");
    }

    #[test]
    fn device_token_validation() {
        assert!(valid_device_token("abc123"));
        assert!(!valid_device_token(""));
        assert!(!valid_device_token("has space"));
        assert!(!valid_device_token(&"a".repeat(MAX_DEVICE_TOKEN_LEN + 1)));
    }

    #[test]
    fn generated_device_token_is_16_bytes_hex() {
        let token = generate_device_token().unwrap();
        assert_eq!(token.len(), DEVICE_TOKEN_BYTES * 2);
        assert_ne!(token, generate_device_token().unwrap());
    }

    #[tokio::test]
    async fn login_by_email_registers_device() {
        let (auth, _) = authenticator(AuthConfig::new(), user(true));
        let outcome = auth
            .login(credentials("ALICE@example.com", "wonderland"), Some("10.0.0.1"))
            .await
            .unwrap();

        assert_eq!(outcome.profile.username, "alice");
        assert!(auth
            .registry()
            .is_active(outcome.session.id, &outcome.session.device_token)
            .await
            .unwrap());

        let headers = cookie_headers(&outcome.cookie);
        assert_eq!(auth.already_logged_in(&headers).await.unwrap(), Some(outcome.session));
    }

    #[tokio::test]
    async fn supplied_device_token_is_reused() {
        let (auth, _) = authenticator(AuthConfig::new(), user(true));
        let mut creds = credentials("alice", "wonderland");
        creds.device_token = Some("returning-device".to_string());

        let outcome = auth.login(creds, Some("10.0.0.1")).await.unwrap();
        assert_eq!(outcome.session.device_token, "returning-device");
    }

    #[tokio::test]
    async fn unknown_user_and_wrong_password_look_identical() {
        let (auth, _) = authenticator(AuthConfig::new(), user(true));
        let unknown = auth
            .login(credentials("bob", "wonderland"), Some("10.0.0.1"))
            .await
            .unwrap_err();
        let wrong = auth
            .login(credentials("alice", "looking-glass"), Some("10.0.0.1"))
            .await
            .unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
        assert!(matches!(wrong, AuthError::InvalidCredentials));
    }

    fn verifications() -> usize {
        crate::session::password::VERIFICATIONS.with(std::cell::Cell::get)
    }

    #[tokio::test]
    async fn unknown_user_costs_a_password_verification() {
        let (auth, users) = authenticator(AuthConfig::new(), user(true));

        let before = verifications();
        let _ = auth.login(credentials("bob", "wonderland"), Some("10.0.0.1")).await;
        assert_eq!(verifications(), before + 1);

        let _ = auth.login(credentials("alice", "looking-glass"), Some("10.0.0.1")).await;
        assert_eq!(verifications(), before + 2);
        assert_eq!(users.lookups.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unverified_email_does_not_count_as_failure() {
        let config = AuthConfig::new().with_require_email_verification(true);
        let record = user(false);
        let user_id = record.id;
        let (auth, _) = authenticator(config, record);
        for _ in 0..8 {
            let err = auth
                .login(credentials("alice", "wonderland"), Some("10.0.0.1"))
                .await
                .unwrap_err();
            assert!(matches!(err, AuthError::EmailNotVerified));
        }
        assert_eq!(auth.registry().active_devices(user_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn verified_email_logs_in_when_verification_required() {
        let config = AuthConfig::new().with_require_email_verification(true);
        let (auth, _) = authenticator(config, user(true));
        let outcome = auth
            .login(credentials("alice", "wonderland"), Some("10.0.0.1"))
            .await
            .unwrap();
        assert_eq!(auth.registry().active_devices(outcome.session.id).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn missing_ip_uses_shared_counter() {
        let (auth, users) = authenticator(AuthConfig::new(), user(true));
        for _ in 0..5 {
            let _ = auth.login(credentials("alice", "nope"), None).await;
        }
        let err = auth
            .login(credentials("alice", "wonderland"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::RateLimited { .. }));
        assert_eq!(users.lookups.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn garbage_cookie_is_not_logged_in() {
        let (auth, _) = authenticator(AuthConfig::new(), user(true));
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("SID=deadbeef"));
        assert_eq!(auth.already_logged_in(&headers).await.unwrap(), None);
        assert!(auth.logout(&headers).await.is_ok());
    }

    #[tokio::test]
    async fn sign_out_everywhere_revokes_all_devices() {
        let (auth, _) = authenticator(AuthConfig::new(), user(true));
        let first = auth
            .login(credentials("alice", "wonderland"), Some("10.0.0.1"))
            .await
            .unwrap();
        let second = auth
            .login(credentials("alice", "wonderland"), Some("10.0.0.2"))
            .await
            .unwrap();
        assert_eq!(auth.registry().active_devices(first.session.id).await.unwrap(), 2);

        auth.sign_out_everywhere(first.session.id).await.unwrap();
        assert_eq!(auth.already_logged_in(&cookie_headers(&first.cookie)).await.unwrap(), None);
        assert_eq!(auth.already_logged_in(&cookie_headers(&second.cookie)).await.unwrap(), None);
    }
}
