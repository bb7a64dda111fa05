//! Request pipeline stages, outermost first: limiter, recovery, database, session.

use std::any::Any;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;

use axum::extract::{ConnectInfo, Request, State};
use axum::http::header::CONTENT_LENGTH;
use axum::http::{Extensions, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use futures_util::FutureExt; // for catch_unwind on async blocks
use tracing::error;
use uuid::Uuid;

use super::AppState;
use crate::error::{status_message, AppError};
use crate::identity::{Access, RequestContext, SessionOutcome};
use crate::storage::Database;

/// Peer address recorded by the listener, or "unknown" when served without one.
pub fn client_addr(extensions: &Extensions) -> String {
    extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() { (*s).to_string() }
    else if let Some(s) = payload.downcast_ref::<String>() { s.clone() }
    else { "panic".to_string() }
}

/// Reject declared bodies over the cap before anything downstream runs. Bodies
/// without a length are capped when read (`DefaultBodyLimit`, relay buffering).
pub async fn limiter(State(state): State<AppState>, req: Request, next: Next) -> Response {
    let declared = req
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());
    if declared.is_some_and(|len| len > state.body_limit as u64) {
        return AppError::too_large("body_too_large", "request body exceeds limit").into_response();
    }
    next.run(req).await
}

/// Convert a panic anywhere downstream into a 500 without taking the connection down.
pub async fn recovery(req: Request, next: Next) -> Response {
    let client = client_addr(req.extensions());
    match AssertUnwindSafe(next.run(req)).catch_unwind().await {
        Ok(resp) => resp,
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(target: "panic", client = %client, error = %msg, "handlers: Handler panic");
            let status = StatusCode::INTERNAL_SERVER_ERROR;
            (status, status_message(status)).into_response()
        }
    }
}

/// Hold a database handle for the rest of the request. The lease lives in this frame,
/// so it is released on completion, on abort and while unwinding from a panic.
pub async fn database(State(state): State<AppState>, mut req: Request, next: Next) -> Response {
    let lease = state.pool.acquire();
    req.extensions_mut().insert(lease.database());
    let resp = next.run(req).await;
    drop(lease);
    resp
}

pub async fn session_optional(State(state): State<AppState>, req: Request, next: Next) -> Response {
    resolve_session(&state, req, next, false).await
}

pub async fn session_required(State(state): State<AppState>, req: Request, next: Next) -> Response {
    resolve_session(&state, req, next, true).await
}

async fn resolve_session(state: &AppState, mut req: Request, next: Next, required: bool) -> Response {
    let client = client_addr(req.extensions());
    let Some(db) = req.extensions().get::<Database>().cloned() else {
        error!(target: "session", client = %client, "session: no database handle on request");
        return AppError::internal("pipeline_error", "session stage without database stage").into_response();
    };

    let access = match state.resolver.resolve(req.headers(), &db) {
        SessionOutcome::Valid(session) => Access::Authenticated(session),
        SessionOutcome::Absent => Access::Anonymous,
        SessionOutcome::Failed(e) => {
            error!(target: "session", client = %client, error = %e, "session: lookup failed");
            return AppError::from(e).into_response();
        }
    };

    if required && matches!(access, Access::Anonymous) {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    req.extensions_mut().insert(RequestContext {
        access,
        request_id: Uuid::new_v4().to_string(),
        client,
    });
    next.run(req).await
}
