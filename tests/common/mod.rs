//! Shared fixtures: an in-memory user table and a fully wired authenticator.

#![allow(dead_code, clippy::unwrap_used)]

use argon2::{Algorithm, Argon2, Params, Version};
use async_trait::async_trait;
use axum::http::{header::COOKIE, HeaderMap, HeaderValue};
use secrecy::SecretString;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};
use tandem::{
    error::StoreError,
    session::{
        hash_password, AuthConfig, Authenticator, CookieKey, CookieSealer, LoginRateLimiter,
        SessionRegistry, UserType,
    },
    store::{MemoryStore, UserRecord, UserStore},
};
use ulid::Ulid;

pub const PASSWORD: &str = "correct horse battery staple";

/// User table that counts lookups, so tests can assert the store was never reached.
pub struct Users {
    records: Vec<UserRecord>,
    lookups: AtomicUsize,
}

impl Users {
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UserStore for Users {
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .records
            .iter()
            .find(|record| record.username == identifier || record.email == identifier)
            .cloned())
    }
}

pub fn user(username: &str) -> UserRecord {
    let argon2 = Argon2::new(
        Algorithm::Argon2id,
        Version::V0x13,
        Params::new(1024, 1, 1, None).unwrap(),
    );
    UserRecord {
        id: Ulid::new(),
        username: username.to_string(),
        email: format!("{username}@example.com"),
        password_hash: SecretString::from(hash_password(&argon2, PASSWORD).unwrap()),
        email_verified: true,
        user_type: UserType::Standard,
    }
}

pub struct Fixture {
    pub auth: Arc<Authenticator>,
    pub users: Arc<Users>,
    pub kv: Arc<MemoryStore>,
    pub key: CookieKey,
}

pub fn fixture(config: AuthConfig, records: Vec<UserRecord>) -> Fixture {
    let kv = Arc::new(MemoryStore::new());
    let users = Arc::new(Users {
        records,
        lookups: AtomicUsize::new(0),
    });
    let key = CookieKey::derive(&SecretString::from("integration secret".to_string())).unwrap();
    let auth = Arc::new(Authenticator::new(
        config,
        CookieSealer::new(&key),
        users.clone(),
        SessionRegistry::new(kv.clone()),
        LoginRateLimiter::new(kv.clone()),
    ));
    Fixture {
        auth,
        users,
        kv,
        key,
    }
}

/// Request headers presenting the cookie from a `Set-Cookie` value.
pub fn cookie_headers(set_cookie: &HeaderValue) -> HeaderMap {
    let pair = set_cookie
        .to_str()
        .unwrap()
        .split(';')
        .next()
        .unwrap()
        .to_string();
    let mut headers = HeaderMap::new();
    headers.insert(COOKIE, HeaderValue::from_str(&pair).unwrap());
    headers
}

/// The sealed `SID` value from a `Set-Cookie` header.
pub fn sealed_value(set_cookie: &HeaderValue) -> String {
    let headers = cookie_headers(set_cookie);
    tandem::session::cookie::session_cookie_value(&headers).unwrap()
}
