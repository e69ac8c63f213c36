//! Session token encoding.
//!
//! Plaintext layout, before sealing:
//!
//! ```text
//! version(1) | id(26, ULID text) | len(2, BE) username | len(2, BE) device_token | user_type(1, ASCII digit)
//! ```
//!
//! Variable-length fields are length-prefixed so no byte value inside a
//! username or device token can be confused with a field boundary. Decoding
//! must consume the buffer exactly.

use ulid::Ulid;

use super::{Session, UserType};
use crate::error::{AuthError, CorruptedSessionError};

const VERSION: u8 = 1;
const ID_LEN: usize = 26;

/// Encode session fields into the plaintext that gets sealed into the cookie.
///
/// # Errors
/// Returns `AuthError::Unencodable` if `username` or `device_token` is empty or
/// longer than `u16::MAX` bytes.
pub fn encode(
    id: Ulid,
    username: &str,
    device_token: &str,
    user_type: UserType,
) -> Result<Vec<u8>, AuthError> {
    let username_len = field_len(username).ok_or(AuthError::Unencodable("username"))?;
    let device_len = field_len(device_token).ok_or(AuthError::Unencodable("device_token"))?;

    let mut out = Vec::with_capacity(1 + ID_LEN + 2 + username.len() + 2 + device_token.len() + 1);
    out.push(VERSION);
    out.extend_from_slice(id.to_string().as_bytes());
    out.extend_from_slice(&username_len.to_be_bytes());
    out.extend_from_slice(username.as_bytes());
    out.extend_from_slice(&device_len.to_be_bytes());
    out.extend_from_slice(device_token.as_bytes());
    out.push(user_type.digit());
    Ok(out)
}

/// Decode a plaintext token back into a session.
///
/// Pure: no I/O, no caching. Any structural or semantic mismatch fails closed.
///
/// # Errors
/// Returns `CorruptedSessionError` if the token is not a well-formed session.
pub fn decode(token: &[u8]) -> Result<Session, CorruptedSessionError> {
    let mut reader = Reader { buf: token };

    if reader.byte()? != VERSION {
        return Err(CorruptedSessionError);
    }

    let id = parse_id(reader.take(ID_LEN)?)?;
    let username = reader.prefixed_str()?;
    let device_token = reader.prefixed_str()?;
    let user_type = UserType::from_digit(reader.byte()?).ok_or(CorruptedSessionError)?;

    if !reader.buf.is_empty() {
        return Err(CorruptedSessionError);
    }

    Ok(Session {
        id,
        username,
        device_token,
        user_type,
    })
}

fn field_len(value: &str) -> Option<u16> {
    if value.is_empty() {
        return None;
    }
    u16::try_from(value.len()).ok()
}

/// Only canonical (upper-case Crockford) ULIDs are accepted. `from_string`
/// silently drops bits past 128, so the re-encode check also rejects overflow.
fn parse_id(raw: &[u8]) -> Result<Ulid, CorruptedSessionError> {
    let text = std::str::from_utf8(raw).map_err(|_| CorruptedSessionError)?;
    let id = Ulid::from_string(text).map_err(|_| CorruptedSessionError)?;
    if id.to_string() != text {
        return Err(CorruptedSessionError);
    }
    Ok(id)
}

struct Reader<'a> {
    buf: &'a [u8],
}

impl<'a> Reader<'a> {
    fn take(&mut self, len: usize) -> Result<&'a [u8], CorruptedSessionError> {
        if self.buf.len() < len {
            return Err(CorruptedSessionError);
        }
        let (head, tail) = self.buf.split_at(len);
        self.buf = tail;
        Ok(head)
    }

    fn byte(&mut self) -> Result<u8, CorruptedSessionError> {
        let (&first, rest) = self.buf.split_first().ok_or(CorruptedSessionError)?;
        self.buf = rest;
        Ok(first)
    }

    fn prefixed_str(&mut self) -> Result<String, CorruptedSessionError> {
        let len_bytes = self.take(2)?;
        let len = usize::from(u16::from_be_bytes([len_bytes[0], len_bytes[1]]));
        if len == 0 {
            return Err(CorruptedSessionError);
        }
        let raw = self.take(len)?;
        String::from_utf8(raw.to_vec()).map_err(|_| CorruptedSessionError)
    }
}
