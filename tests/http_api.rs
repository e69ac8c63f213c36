//! Router-level tests: auth endpoints and the unit-of-work middleware.

#![allow(clippy::unwrap_used)]

mod common;

use anyhow::Result;
use async_trait::async_trait;
use axum::{
    body::{to_bytes, Body},
    http::{
        header::{CONTENT_TYPE, COOKIE, RETRY_AFTER, SET_COOKIE},
        Request, StatusCode,
    },
    response::Response,
    routing::post,
    Router,
};
use common::{fixture, user, PASSWORD};
use serde_json::json;
use std::{
    any::Any,
    sync::{Arc, Mutex},
};
use tandem::{
    api::{self, LoginResponse, SessionResponse},
    error::{Backend, TxError},
    session::AuthConfig,
    tx::{self, Group, Tx, TxSource},
};
use tower::ServiceExt;

type Journal = Arc<Mutex<Vec<&'static str>>>;

struct Probe {
    journal: Journal,
}

#[async_trait]
impl Tx for Probe {
    fn key(&self) -> &'static str {
        "probe"
    }

    fn backend(&self) -> Backend {
        Backend::Relational
    }

    async fn commit(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push("commit");
        Ok(())
    }

    async fn rollback(&mut self) -> anyhow::Result<()> {
        self.journal.lock().unwrap().push("rollback");
        Ok(())
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

struct ProbeSource {
    journal: Journal,
}

#[async_trait]
impl TxSource for ProbeSource {
    async fn begin(&self) -> Result<Group, TxError> {
        self.journal.lock().unwrap().push("begin");
        let mut group = Group::new();
        group.register(Box::new(Probe {
            journal: self.journal.clone(),
        }))?;
        Ok(group)
    }
}

async fn write_through_current_group() -> StatusCode {
    let Ok(context) = tx::current() else {
        return StatusCode::INTERNAL_SERVER_ERROR;
    };
    let mut group = context.lock().await;
    match group.handle_mut::<Probe>("probe") {
        Ok(probe) => {
            probe.journal.lock().unwrap().push("write");
            StatusCode::CREATED
        }
        Err(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

async fn reject() -> StatusCode {
    StatusCode::UNPROCESSABLE_ENTITY
}

fn app(records: Vec<tandem::store::UserRecord>) -> (Router, Journal) {
    let fx = fixture(AuthConfig::new(), records);
    let journal = Journal::default();
    let source: Arc<dyn TxSource> = Arc::new(ProbeSource {
        journal: journal.clone(),
    });
    let business = Router::new()
        .route("/v1/widgets", post(write_through_current_group))
        .route("/v1/widgets/reject", post(reject));
    (api::router(fx.auth, source, business), journal)
}

fn login_request(identifier: &str, password: &str) -> Request<Body> {
    Request::post("/v1/auth/login")
        .header(CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "identifier": identifier, "password": password }).to_string(),
        ))
        .unwrap()
}

fn session_cookie(response: &Response) -> String {
    let set_cookie = response.headers().get(SET_COOKIE).unwrap().to_str().unwrap();
    set_cookie.split(';').next().unwrap().to_string()
}

#[tokio::test]
async fn login_sets_cookie_and_session_endpoint_reads_it() -> Result<()> {
    let (app, journal) = app(vec![user("alice")]);

    let response = app
        .clone()
        .oneshot(login_request("Alice@Example.com", PASSWORD))
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let cookie = session_cookie(&response);
    assert!(cookie.starts_with("SID="));
    let body: LoginResponse = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(body.user.username, "alice");

    let response = app
        .oneshot(
            Request::get("/v1/auth/session")
                .header(COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let session: SessionResponse = serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await?)?;
    assert_eq!(session.username, "alice");
    assert_eq!(session.user_id, body.user.id.to_string());

    assert!(journal.lock().unwrap().is_empty(), "auth routes opened a group");
    Ok(())
}

#[tokio::test]
async fn session_without_cookie_is_unauthorized() -> Result<()> {
    let (app, _) = app(vec![]);
    let response = app
        .oneshot(Request::get("/v1/auth/session").body(Body::empty())?)
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn logout_revokes_and_clears() -> Result<()> {
    let (app, _) = app(vec![user("alice")]);
    let response = app.clone().oneshot(login_request("alice", PASSWORD)).await?;
    let cookie = session_cookie(&response);

    let logout = || {
        Request::post("/v1/auth/logout")
            .header(COOKIE, &cookie)
            .body(Body::empty())
    };
    let response = app.clone().oneshot(logout()?).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(session_cookie(&response).starts_with("SID="));

    let response = app.clone().oneshot(logout()?).await?;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);

    let response = app
        .oneshot(
            Request::get("/v1/auth/session")
                .header(COOKIE, &cookie)
                .body(Body::empty())?,
        )
        .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    Ok(())
}

#[tokio::test]
async fn repeated_failures_return_retry_after() -> Result<()> {
    let (app, _) = app(vec![user("alice")]);
    for _ in 0..5 {
        let response = app.clone().oneshot(login_request("alice", "nope")).await?;
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }

    let response = app.oneshot(login_request("alice", PASSWORD)).await?;
    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    assert_eq!(response.headers().get(RETRY_AFTER).unwrap(), "10");
    Ok(())
}

#[tokio::test]
async fn successful_write_commits_its_group() -> Result<()> {
    let (app, journal) = app(vec![]);
    let response = app
        .oneshot(Request::post("/v1/widgets").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(*journal.lock().unwrap(), ["begin", "write", "commit"]);
    Ok(())
}

#[tokio::test]
async fn rejected_write_rolls_back_its_group() -> Result<()> {
    let (app, journal) = app(vec![]);
    let response = app
        .oneshot(Request::post("/v1/widgets/reject").body(Body::empty())?)
        .await?;

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(*journal.lock().unwrap(), ["begin", "rollback"]);
    Ok(())
}
