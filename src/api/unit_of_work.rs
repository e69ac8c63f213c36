//! Wraps mutating requests in a transaction group.
//!
//! The group is available to handlers as an `Extension<TxContext>` and to
//! deeper code through [`crate::tx::current`]. A 2xx or 3xx response commits,
//! anything else rolls back. If the request future is dropped before either
//! happens, the group's drop schedules the rollback.

use axum::{
    extract::{Request, State},
    http::Method,
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::error;

use crate::tx::{self, TxContext, TxSource};

fn is_mutating(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

pub async fn unit_of_work(
    State(source): State<Arc<dyn TxSource>>,
    mut request: Request,
    next: Next,
) -> Response {
    if !is_mutating(request.method()) {
        return next.run(request).await;
    }

    let group = match source.begin().await {
        Ok(group) => group,
        Err(err) => return err.into_response(),
    };
    let context = TxContext::new(group);
    request.extensions_mut().insert(context.clone());

    let response = tx::scope(context.clone(), next.run(request)).await;

    let status = response.status();
    if status.is_success() || status.is_redirection() {
        if let Err(err) = context.commit().await {
            return err.into_response();
        }
    } else if let Err(err) = context.rollback().await {
        error!("Failed to roll back after {status}: {err:?}");
    }
    response
}
