//! The gateway's own endpoints. Everything else in the authenticated group goes to the relay.

use axum::extract::{Path, Request, State};
use axum::http::header::SET_COOKIE;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info};

use super::pipeline::client_addr;
use super::AppState;
use crate::error::{AppError, AppResult};
use crate::identity::{
    clear_session_cookie, login_local, set_session_cookie, LoginRequest, RequestContext, SessionCookie, SessionManager,
};
use crate::settings::{self, Provider, ProviderType};
use crate::storage::Database;

/// Public projection of a provider; secrets and certificates stay server-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSummary {
    pub id: String,
    #[serde(rename = "type")]
    pub provider_type: ProviderType,
    pub label: String,
}

impl From<&Provider> for ProviderSummary {
    fn from(p: &Provider) -> Self {
        Self { id: p.id.clone(), provider_type: p.provider_type(), label: p.label.clone() }
    }
}

pub async fn check() -> &'static str {
    "ok"
}

/// Sign-in options: local credentials plus every configured provider.
pub async fn login_page() -> Json<serde_json::Value> {
    let auth = settings::auth();
    let providers: Vec<ProviderSummary> = auth.providers.iter().map(ProviderSummary::from).collect();
    Json(json!({ "local": true, "providers": providers }))
}

pub async fn index(Extension(ctx): Extension<RequestContext>) -> Json<serde_json::Value> {
    match ctx.principal() {
        Some(p) => Json(json!({ "authenticated": true, "user_id": p.user_id, "roles": p.roles })),
        None => Json(json!({ "authenticated": false })),
    }
}

pub async fn provider_get(Path(id): Path<String>) -> AppResult<Json<ProviderSummary>> {
    match settings::get_provider(&id) {
        Some(p) => Ok(Json(ProviderSummary::from(&p))),
        None => Err(AppError::not_found("provider_not_found".to_string(), format!("no provider {}", id))),
    }
}

/// Exchange local credentials for a session cookie.
pub async fn auth_session_post(
    State(state): State<AppState>,
    Extension(db): Extension<Database>,
    req: Request,
) -> Response {
    let client = client_addr(req.extensions());
    let body = match axum::body::to_bytes(req.into_body(), state.body_limit).await {
        Ok(b) => b,
        Err(_) => return AppError::too_large("body_too_large", "request body exceeds limit").into_response(),
    };
    let mut login: LoginRequest = match serde_json::from_slice(&body) {
        Ok(l) => l,
        Err(e) => return AppError::user("bad_request".to_string(), e.to_string()).into_response(),
    };
    login.ip = Some(client.clone());

    let sm = SessionManager::new(settings::auth().session_ttl());
    let username = login.username.clone();
    // argon2 verification is CPU bound; keep it off the async workers
    let outcome = match tokio::task::spawn_blocking(move || login_local(&db, &sm, &login)).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
        Err(e) => Err(AppError::internal("login_task".to_string(), e.to_string())),
    };
    let resp = match outcome {
        Ok(r) => r,
        Err(e) => {
            if e.http_status() >= 500 {
                error!(client = %client, error = %e, "auth: session create failed");
            } else {
                info!(client = %client, user = %username, "auth: login rejected");
            }
            return e.into_response();
        }
    };

    let cookie = match set_session_cookie(state.resolver.cookie_name(), &SessionCookie::new(resp.session.id.clone())) {
        Ok(v) => v,
        Err(e) => return AppError::internal("cookie_error".to_string(), e.to_string()).into_response(),
    };
    (StatusCode::OK, [(SET_COOKIE, cookie)], Json(json!({ "status": "ok" }))).into_response()
}

pub async fn logout(
    State(state): State<AppState>,
    Extension(db): Extension<Database>,
    Extension(ctx): Extension<RequestContext>,
) -> Response {
    if let Some(session) = ctx.session() {
        if let Err(e) = SessionManager::default().revoke(&db, &session.id) {
            error!(client = %ctx.client, error = %e, "auth: session revoke failed");
            return AppError::from(e).into_response();
        }
    }
    match clear_session_cookie(state.resolver.cookie_name()) {
        Ok(v) => ([(SET_COOKIE, v)], Redirect::to("/login")).into_response(),
        Err(e) => AppError::internal("cookie_error".to_string(), e.to_string()).into_response(),
    }
}
