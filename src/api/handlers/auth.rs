//! Login, logout and session endpoints.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::{
    api::extract::{ClientIp, CurrentSession},
    error::AuthError,
    session::{login::UserProfile, Authenticator, Credentials, UserType},
};

#[derive(Deserialize)]
pub struct LoginRequest {
    pub identifier: String,
    pub password: String,
    #[serde(default)]
    pub device_token: Option<String>,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub user: UserProfile,
    /// Returned so the client can present it on its next login from this device.
    pub device_token: String,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub username: String,
    pub user_type: UserType,
}

pub async fn login(
    Extension(auth): Extension<Arc<Authenticator>>,
    ClientIp(client_ip): ClientIp,
    Json(request): Json<LoginRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let credentials = Credentials {
        identifier: request.identifier,
        password: SecretString::from(request.password),
        device_token: request.device_token,
    };
    let outcome = auth.login(credentials, client_ip.as_deref()).await?;

    let body = LoginResponse {
        user: outcome.profile,
        device_token: outcome.session.device_token,
    };
    Ok((StatusCode::OK, [(SET_COOKIE, outcome.cookie)], Json(body)))
}

// Always clears the cookie, even if the session was already revoked.
pub async fn logout(
    Extension(auth): Extension<Arc<Authenticator>>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, AuthError> {
    let cookie = auth.logout(&headers).await?;
    Ok((StatusCode::NO_CONTENT, [(SET_COOKIE, cookie)]))
}

pub async fn session(CurrentSession(session): CurrentSession) -> Json<SessionResponse> {
    Json(SessionResponse {
        user_id: session.id.to_string(),
        username: session.username,
        user_type: session.user_type,
    })
}
