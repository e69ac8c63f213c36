//! Session credentials.
//!
//! A session is carried by the client as an encrypted `SID` cookie holding the
//! user id, username, device token and user type. Decrypting the cookie is
//! necessary but not sufficient: the device token must also still be a member
//! of the user's device set in the session registry. Removing that member
//! revokes the session immediately, no matter how many copies of the cookie
//! exist.
//!
//! ## Login
//!
//! 1. Failed attempts are counted per client IP. More than 4 recorded failures
//!    reject the attempt before the user store is touched.
//! 2. Unknown identifiers and wrong passwords produce the same error and both
//!    bump the counter, which expires after `attempts * 2` seconds.
//! 3. Unverified emails are rejected with a distinct error when verification
//!    is required; this does not count as a failed attempt.
//! 4. On success the device token is registered and the sealed cookie issued.

use serde::{Deserialize, Serialize};
use std::fmt;
use ulid::Ulid;

pub mod codec;
pub mod cookie;
pub mod login;
mod password;
pub mod rate_limit;
pub mod registry;
pub mod state;

pub use codec::{decode, encode};
pub use cookie::{CookieKey, CookieSealer};
pub use login::{Authenticator, Credentials, LoginOutcome};
pub use password::hash_password;
pub use rate_limit::LoginRateLimiter;
pub use registry::SessionRegistry;
pub use state::{AuthConfig, SameSite};

/// Account category, consumed by downstream authorization checks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    Standard,
    Moderator,
    Admin,
    Bot,
}

impl UserType {
    /// Single ASCII digit used in the session token.
    #[must_use]
    pub const fn digit(self) -> u8 {
        match self {
            Self::Standard => b'0',
            Self::Moderator => b'1',
            Self::Admin => b'2',
            Self::Bot => b'3',
        }
    }

    #[must_use]
    pub const fn from_digit(digit: u8) -> Option<Self> {
        match digit {
            b'0' => Some(Self::Standard),
            b'1' => Some(Self::Moderator),
            b'2' => Some(Self::Admin),
            b'3' => Some(Self::Bot),
            _ => None,
        }
    }
}

impl TryFrom<i16> for UserType {
    type Error = i16;

    fn try_from(value: i16) -> Result<Self, Self::Error> {
        u8::try_from(value)
            .ok()
            .and_then(|value| value.checked_add(b'0'))
            .and_then(Self::from_digit)
            .ok_or(value)
    }
}

/// Authenticated caller, recovered from the cookie or created at login.
///
/// Never persisted; only the device token's registry membership outlives the request.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub id: Ulid,
    pub username: String,
    pub device_token: String,
    pub user_type: UserType,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("device_token", &"***")
            .field("user_type", &self.user_type)
            .finish()
    }
}
