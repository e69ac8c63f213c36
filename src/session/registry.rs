//! Per-user set of signed-in device tokens.
//!
//! Membership is the authoritative record of which sessions are valid.

use std::sync::Arc;
use ulid::Ulid;

use crate::{error::StoreError, store::KvStore};

#[derive(Clone)]
pub struct SessionRegistry {
    kv: Arc<dyn KvStore>,
}

fn devices_key(user_id: Ulid) -> String {
    format!("sessions:{user_id}")
}

impl SessionRegistry {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Mark `device_token` as signed in for `user_id`.
    pub async fn register(&self, user_id: Ulid, device_token: &str) -> Result<(), StoreError> {
        self.kv.sadd(&devices_key(user_id), device_token).await
    }

    /// Sign out one device. Revoking an unknown device is not an error.
    pub async fn revoke(&self, user_id: Ulid, device_token: &str) -> Result<(), StoreError> {
        self.kv.srem(&devices_key(user_id), device_token).await
    }

    /// Sign out every device of `user_id`.
    pub async fn revoke_all(&self, user_id: Ulid) -> Result<(), StoreError> {
        self.kv.del(&devices_key(user_id)).await
    }

    pub async fn is_active(&self, user_id: Ulid, device_token: &str) -> Result<bool, StoreError> {
        self.kv.sismember(&devices_key(user_id), device_token).await
    }

    pub async fn active_devices(&self, user_id: Ulid) -> Result<usize, StoreError> {
        self.kv.scard(&devices_key(user_id)).await
    }
}
