//! Request extractors for the caller's session and address.

use anyhow::anyhow;
use axum::{
    extract::{ConnectInfo, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use crate::{
    error::AuthError,
    session::{Authenticator, Session},
};

/// Registry-validated session of the caller; rejects with 401 when absent.
///
/// The lookup result is cached in the request extensions, so the cookie is
/// decrypted and the registry consulted at most once per request.
#[derive(Clone, Debug)]
pub struct CurrentSession(pub Session);

#[derive(Clone)]
struct CachedSession(Option<Session>);

impl<S: Send + Sync> FromRequestParts<S> for CurrentSession {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        if let Some(CachedSession(cached)) = parts.extensions.get::<CachedSession>() {
            return cached.clone().map(Self).ok_or(AuthError::Unauthenticated);
        }
        let auth = parts
            .extensions
            .get::<Arc<Authenticator>>()
            .cloned()
            .ok_or_else(|| AuthError::Internal(anyhow!("authenticator extension missing")))?;

        let session = auth.already_logged_in(&parts.headers).await?;
        parts.extensions.insert(CachedSession(session.clone()));
        session.map(Self).ok_or(AuthError::Unauthenticated)
    }
}

/// Client address used as the rate-limit key, if one can be determined.
#[derive(Clone, Debug)]
pub struct ClientIp(pub Option<String>);

impl<S: Send + Sync> FromRequestParts<S> for ClientIp {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let peer = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| addr.ip().to_string());
        Ok(Self(extract_client_ip(&parts.headers).or(peer)))
    }
}

/// Extract a client IP from common proxy headers.
pub fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
