//! Argon2id password hashing and verification.
//!
//! Verification re-derives the hash with the parameters embedded in the stored
//! PHC string and compares in constant time. It is deliberately slow, so it
//! runs on the blocking pool.
//!
//! A login for an unknown identifier verifies against a fixed dummy hash so
//! that it costs the same as a wrong password.

use anyhow::anyhow;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use once_cell::sync::OnceCell;
use secrecy::{ExposeSecret, SecretString};

use crate::error::AuthError;

const DUMMY_PASSWORD: &str = "tandem-unknown-user";

static DUMMY_HASH: OnceCell<String> = OnceCell::new();

#[cfg(test)]
thread_local! {
    /// Verifications started on this thread.
    pub(super) static VERIFICATIONS: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
}

/// Hash a password into a PHC string with the given Argon2 instance.
///
/// # Errors
/// Returns `AuthError::Internal` if hashing fails.
pub fn hash_password(argon2: &Argon2<'_>, password: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    argon2
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Internal(anyhow!("failed to hash password: {err}")))
}

/// Compare `password` against a stored PHC hash.
///
/// Returns `Ok(false)` on mismatch; a malformed stored hash is an internal error.
pub(super) async fn verify_password(
    password: SecretString,
    stored_hash: String,
) -> Result<bool, AuthError> {
    #[cfg(test)]
    VERIFICATIONS.with(|count| count.set(count.get() + 1));

    tokio::task::spawn_blocking(move || {
        let parsed = PasswordHash::new(&stored_hash)
            .map_err(|err| AuthError::Internal(anyhow!("malformed stored password hash: {err}")))?;
        match Argon2::default().verify_password(password.expose_secret().as_bytes(), &parsed) {
            Ok(()) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(err) => Err(AuthError::Internal(anyhow!(
                "password verification failed: {err}"
            ))),
        }
    })
    .await
    .map_err(|err| AuthError::Internal(anyhow!("password verification task failed: {err}")))?
}

/// Default-parameter hash of a password no account has, built on first use.
fn dummy_hash() -> Result<&'static str, AuthError> {
    DUMMY_HASH
        .get_or_try_init(|| hash_password(&Argon2::default(), DUMMY_PASSWORD))
        .map(String::as_str)
}

/// Run a full verification against the dummy hash and discard the result.
pub(super) async fn verify_dummy(password: SecretString) -> Result<(), AuthError> {
    let stored_hash = tokio::task::spawn_blocking(|| dummy_hash().map(str::to_string))
        .await
        .map_err(|err| AuthError::Internal(anyhow!("dummy hash task failed: {err}")))??;
    verify_password(password, stored_hash).await.map(|_| ())
}
