//! In-process key/value store with expiring keys.
//!
//! Behaves like the Redis commands it stands in for, including type errors
//! when a counter is used as a set or vice versa. State is per process, so it
//! only suits tests and single-instance development.

use anyhow::anyhow;
use async_trait::async_trait;
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard},
    time::Duration,
};
use tokio::time::Instant;

use super::KvStore;
use crate::error::{Backend, StoreError};

enum Value {
    Counter(i64),
    Set(HashSet<String>),
}

struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, HashMap<String, Entry>>, StoreError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| StoreError::new(Backend::KeyValue, operation, anyhow!("poisoned lock")))?;
        let now = Instant::now();
        entries.retain(|_, entry| entry.live(now));
        Ok(entries)
    }
}

fn wrong_type(operation: &'static str) -> StoreError {
    StoreError::new(
        Backend::KeyValue,
        operation,
        anyhow!("operation against a key holding the wrong kind of value"),
    )
}

#[async_trait]
impl KvStore for MemoryStore {
    async fn get_count(&self, key: &str) -> Result<Option<i64>, StoreError> {
        let entries = self.lock("GET")?;
        match entries.get(key).map(|entry| &entry.value) {
            None => Ok(None),
            Some(Value::Counter(count)) => Ok(Some(*count)),
            Some(Value::Set(_)) => Err(wrong_type("GET")),
        }
    }

    async fn incr(&self, key: &str) -> Result<i64, StoreError> {
        let mut entries = self.lock("INCR")?;
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Counter(0),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Counter(count) => {
                *count = count
                    .checked_add(1)
                    .ok_or_else(|| StoreError::new(Backend::KeyValue, "INCR", anyhow!("overflow")))?;
                Ok(*count)
            }
            Value::Set(_) => Err(wrong_type("INCR")),
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<(), StoreError> {
        let mut entries = self.lock("EXPIRE")?;
        if let Some(entry) = entries.get_mut(key) {
            entry.expires_at = Some(Instant::now() + ttl);
        }
        Ok(())
    }

    async fn sadd(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.lock("SADD")?;
        let entry = entries.entry(key.to_string()).or_insert(Entry {
            value: Value::Set(HashSet::new()),
            expires_at: None,
        });
        match &mut entry.value {
            Value::Set(members) => {
                members.insert(member.to_string());
                Ok(())
            }
            Value::Counter(_) => Err(wrong_type("SADD")),
        }
    }

    async fn srem(&self, key: &str, member: &str) -> Result<(), StoreError> {
        let mut entries = self.lock("SREM")?;
        let now_empty = match entries.get_mut(key).map(|entry| &mut entry.value) {
            None => return Ok(()),
            Some(Value::Set(members)) => {
                members.remove(member);
                members.is_empty()
            }
            Some(Value::Counter(_)) => return Err(wrong_type("SREM")),
        };
        // Redis drops a set once its last member is removed.
        if now_empty {
            entries.remove(key);
        }
        Ok(())
    }

    async fn sismember(&self, key: &str, member: &str) -> Result<bool, StoreError> {
        let entries = self.lock("SISMEMBER")?;
        match entries.get(key).map(|entry| &entry.value) {
            None => Ok(false),
            Some(Value::Set(members)) => Ok(members.contains(member)),
            Some(Value::Counter(_)) => Err(wrong_type("SISMEMBER")),
        }
    }

    async fn scard(&self, key: &str) -> Result<usize, StoreError> {
        let entries = self.lock("SCARD")?;
        match entries.get(key).map(|entry| &entry.value) {
            None => Ok(0),
            Some(Value::Set(members)) => Ok(members.len()),
            Some(Value::Counter(_)) => Err(wrong_type("SCARD")),
        }
    }

    async fn del(&self, key: &str) -> Result<(), StoreError> {
        self.lock("DEL")?.remove(key);
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn counter_increments_from_absent() {
        let store = MemoryStore::new();
        assert_eq!(store.get_count("ip").await.unwrap(), None);
        assert_eq!(store.incr("ip").await.unwrap(), 1);
        assert_eq!(store.incr("ip").await.unwrap(), 2);
        assert_eq!(store.get_count("ip").await.unwrap(), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn expired_keys_disappear() {
        let store = MemoryStore::new();
        store.incr("ip").await.unwrap();
        store.expire("ip", Duration::from_secs(2)).await.unwrap();

        tokio::time::advance(Duration::from_secs(1)).await;
        assert_eq!(store.get_count("ip").await.unwrap(), Some(1));

        tokio::time::advance(Duration::from_secs(2)).await;
        assert_eq!(store.get_count("ip").await.unwrap(), None);
        assert_eq!(store.incr("ip").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn expire_on_missing_key_is_noop() {
        let store = MemoryStore::new();
        store.expire("missing", Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.get_count("missing").await.unwrap(), None);
    }

    #[tokio::test]
    async fn set_membership() {
        let store = MemoryStore::new();
        store.sadd("user", "a").await.unwrap();
        store.sadd("user", "a").await.unwrap();
        store.sadd("user", "b").await.unwrap();
        assert_eq!(store.scard("user").await.unwrap(), 2);
        assert!(store.sismember("user", "a").await.unwrap());

        store.srem("user", "a").await.unwrap();
        store.srem("user", "a").await.unwrap();
        assert!(!store.sismember("user", "a").await.unwrap());
        assert_eq!(store.scard("user").await.unwrap(), 1);

        store.del("user").await.unwrap();
        assert_eq!(store.scard("user").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn wrong_type_is_an_error() {
        let store = MemoryStore::new();
        store.incr("counter").await.unwrap();
        assert!(store.sadd("counter", "x").await.is_err());
        store.sadd("set", "x").await.unwrap();
        assert!(store.incr("set").await.is_err());
    }
}
