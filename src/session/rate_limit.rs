//! Per-IP failed login counter with linear backoff.
//!
//! Flow Overview:
//! 1) `check` reads the counter for the client IP; more than
//!    `MAX_FAILED_ATTEMPTS` recorded failures rejects the attempt.
//! 2) `record_failure` increments the counter and resets its TTL to
//!    `attempts * 2` seconds, so every new failure extends the lockout.
//!
//! `INCR` and `EXPIRE` are two separate commands. Concurrent failures from one
//! IP can interleave between them; the worst case is a slightly shorter
//! backoff, never a skipped credential check.

use std::{sync::Arc, time::Duration};
use tracing::warn;

use crate::{error::AuthError, store::KvStore};

pub const MAX_FAILED_ATTEMPTS: i64 = 4;
const BACKOFF_SECONDS_PER_ATTEMPT: u64 = 2;

#[derive(Clone)]
pub struct LoginRateLimiter {
    kv: Arc<dyn KvStore>,
}

fn attempts_key(client_ip: &str) -> String {
    format!("login_attempts:{client_ip}")
}

fn backoff(attempts: i64) -> Duration {
    let attempts = u64::try_from(attempts).unwrap_or(0);
    Duration::from_secs(attempts.saturating_mul(BACKOFF_SECONDS_PER_ATTEMPT))
}

impl LoginRateLimiter {
    #[must_use]
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    /// Reject the attempt if the IP has too many recorded failures.
    ///
    /// The count is read before the attempt, so the first rejected attempt is
    /// the one after `MAX_FAILED_ATTEMPTS + 1` failures: five wrong passwords
    /// in a row, then the sixth attempt is `RateLimited` for 10 seconds.
    ///
    /// # Errors
    /// Returns `AuthError::RateLimited` with the caller-facing wait time, or
    /// `AuthError::Store` if the counter cannot be read.
    pub async fn check(&self, client_ip: &str) -> Result<(), AuthError> {
        let attempts = self
            .kv
            .get_count(&attempts_key(client_ip))
            .await?
            .unwrap_or(0);
        if attempts > MAX_FAILED_ATTEMPTS {
            warn!(client_ip, attempts, "login rate limited");
            return Err(AuthError::RateLimited {
                retry_after: backoff(attempts),
            });
        }
        Ok(())
    }

    /// Count one failed attempt and extend the backoff window.
    ///
    /// Returns the new attempt count.
    pub async fn record_failure(&self, client_ip: &str) -> Result<i64, AuthError> {
        let key = attempts_key(client_ip);
        let attempts = self.kv.incr(&key).await?;
        self.kv.expire(&key, backoff(attempts)).await?;
        Ok(attempts)
    }
}
