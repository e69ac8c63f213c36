//! Cookie transport: authenticated encryption of the session token.
//!
//! The sealed value is `hex(nonce (12 bytes) || ciphertext)` using
//! ChaCha20-Poly1305. The key is derived once from the configured secret with
//! HMAC-SHA256 and held in an immutable [`CookieKey`].

use anyhow::anyhow;
use axum::http::{
    header::{InvalidHeaderValue, COOKIE},
    HeaderMap, HeaderValue,
};
use chacha20poly1305::{
    aead::{Aead, KeyInit, Payload},
    ChaCha20Poly1305, Key, Nonce,
};
use hmac::{Hmac, Mac};
use rand::{rngs::OsRng, RngCore};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;

use super::state::AuthConfig;
use crate::error::{AuthError, DecryptError};

pub const SESSION_COOKIE_NAME: &str = "SID";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;
const KEY_LABEL: &[u8] = b"tandem session cookie key v1";
const AAD: &[u8] = b"tandem:sid:v1";

type HmacSha256 = Hmac<Sha256>;

/// Cookie encryption key, derived once at startup.
#[derive(Clone)]
pub struct CookieKey(Key);

impl CookieKey {
    /// Derive the key from the configured secret.
    ///
    /// # Errors
    /// Returns an error if the secret is empty.
    pub fn derive(secret: &SecretString) -> anyhow::Result<Self> {
        let secret = secret.expose_secret();
        if secret.trim().is_empty() {
            return Err(anyhow!("cookie secret is not configured"));
        }
        let mut mac = <HmacSha256 as Mac>::new_from_slice(secret.as_bytes())
            .map_err(|err| anyhow!("invalid cookie secret: {err}"))?;
        mac.update(KEY_LABEL);
        let digest = mac.finalize().into_bytes();
        Ok(Self(Key::clone_from_slice(&digest)))
    }
}

impl std::fmt::Debug for CookieKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CookieKey(***)")
    }
}

#[derive(Clone)]
pub struct CookieSealer {
    cipher: ChaCha20Poly1305,
}

impl CookieSealer {
    #[must_use]
    pub fn new(key: &CookieKey) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(&key.0),
        }
    }

    /// Encrypt `plaintext` under a fresh random nonce.
    ///
    /// # Errors
    /// Returns `AuthError::Internal` if the system RNG or the cipher fails.
    #[allow(deprecated)]
    pub fn seal(&self, plaintext: &[u8]) -> Result<String, AuthError> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .map_err(|err| AuthError::Internal(anyhow!("failed to generate cookie nonce: {err}")))?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext,
                    aad: AAD,
                },
            )
            .map_err(|_| AuthError::Internal(anyhow!("cookie encryption failed")))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);
        Ok(hex::encode(sealed))
    }

    /// Authenticate and decrypt a sealed cookie value.
    ///
    /// # Errors
    /// Returns `DecryptError` for any encoding, length or authentication failure.
    #[allow(deprecated)]
    pub fn open(&self, sealed: &str) -> Result<Vec<u8>, DecryptError> {
        let data = hex::decode(sealed).map_err(|_| DecryptError)?;
        if data.len() < NONCE_LEN + TAG_LEN {
            return Err(DecryptError);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        self.cipher
            .decrypt(
                Nonce::from_slice(nonce_bytes),
                Payload {
                    msg: ciphertext,
                    aad: AAD,
                },
            )
            .map_err(|_| DecryptError)
    }
}

impl std::fmt::Debug for CookieSealer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CookieSealer")
    }
}

/// Build the `Set-Cookie` value carrying a sealed session.
pub fn session_cookie(config: &AuthConfig, sealed: &str) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    let same_site = config.same_site();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={sealed}; Path=/; HttpOnly; SameSite={same_site}; Max-Age={ttl_seconds}"
    );
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Build the immediately-expiring empty cookie used on logout.
pub fn clear_session_cookie(config: &AuthConfig) -> Result<HeaderValue, InvalidHeaderValue> {
    let same_site = config.same_site();
    let mut cookie =
        format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite={same_site}; Max-Age=0");
    if config.cookie_secure() {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

/// Extract the raw `SID` cookie value from request headers.
pub fn session_cookie_value(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let (key, value) = pair.trim().split_once('=')?;
            (key.trim() == SESSION_COOKIE_NAME)
                .then(|| value.trim().to_string())
                .filter(|value| !value.is_empty())
        })
}
