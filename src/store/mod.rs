//! Collaborator stores used by the session subsystem.
//!
//! Every mutation is a single store-side operation (`INCR`, `SADD`, `SREM`,
//! `DEL`); request code never reads, modifies and writes back a value.

use async_trait::async_trait;
use secrecy::SecretString;
use std::{fmt, time::Duration};
use ulid::Ulid;

use crate::{error::StoreError, session::UserType};

pub mod memory;
pub mod redis_store;
pub mod users;

pub use memory::MemoryStore;
pub use redis_store::RedisStore;
pub use users::PgUserStore;

/// Key/value store with expiring keys, integer counters and string sets.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// `GET key` as an integer counter; `None` when absent or expired.
    async fn get_count(&self, key: &str) -> Result<Option<i64>, StoreError>;
    /// `INCR key`, returning the new value.
    async fn incr(&self, key: &str) -> Result<i64, StoreError>;
    /// `EXPIRE key ttl`.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError>;
    /// `SADD set member`.
    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError>;
    /// `SREM set member`; removing an absent member is not an error.
    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError>;
    /// `SISMEMBER set member`.
    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError>;
    /// `SCARD set`.
    async fn scard(&self, key: &str) -> Result<usize, StoreError>;
    /// `DEL key`.
    async fn del(&self, key: &str) -> Result<(), StoreError>;
}

/// Login-relevant columns of a user row.
#[derive(Clone)]
pub struct UserRecord {
    pub id: Ulid,
    pub username: String,
    pub email: String,
    pub password_hash: SecretString,
    pub email_verified: bool,
    pub user_type: UserType,
}

impl fmt::Debug for UserRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserRecord")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("email", &self.email)
            .field("password_hash", &"***")
            .field("email_verified", &self.email_verified)
            .field("user_type", &self.user_type)
            .finish()
    }
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Look up a user by username or email.
    async fn find_by_identifier(&self, identifier: &str) -> Result<Option<UserRecord>, StoreError>;
}
