use crate::{
    api::handlers::{auth, health},
    session::Authenticator,
    tx::TxSource,
};
use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware,
    routing::{get, post},
    Extension, Router,
};
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{info, info_span, Span};
use ulid::Ulid;

mod error;
pub mod extract;
pub(crate) mod handlers;
pub mod unit_of_work;

pub use extract::{ClientIp, CurrentSession};
pub use handlers::auth::{LoginRequest, LoginResponse, SessionResponse};

/// Build the application router.
///
/// `units_of_work` carries the business routes; each mutating request to them
/// runs inside a transaction group opened from `tx_source`. The auth and
/// health routes never open a group.
pub fn router(
    authenticator: Arc<Authenticator>,
    tx_source: Arc<dyn TxSource>,
    units_of_work: Router,
) -> Router {
    let units_of_work =
        units_of_work.layer(middleware::from_fn_with_state(tx_source, unit_of_work::unit_of_work));

    Router::new()
        .route("/health", get(health::health).options(health::health))
        .route("/v1/auth/login", post(auth::login))
        .route("/v1/auth/logout", post(auth::logout))
        .route("/v1/auth/session", get(auth::session))
        .merge(units_of_work)
        .layer(Extension(authenticator))
}

/// Start the server
/// # Errors
/// Return error if failed to start the server
pub async fn new(port: u16, app: Router) -> Result<()> {
    let app = app.layer(
        ServiceBuilder::new()
            .layer(SetRequestHeaderLayer::if_not_present(
                HeaderName::from_static("x-request-id"),
                |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
            ))
            .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                "x-request-id",
            )))
            .layer(TraceLayer::new_for_http().make_span_with(make_span)),
    );

    let listener = TcpListener::bind(format!("::0:{port}"))
        .await
        .with_context(|| format!("Failed to bind port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async {
        let _ = tokio::signal::ctrl_c().await;
        info!("Gracefully shutdown");
    })
    .await?;

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
