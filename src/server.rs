//!
//! zerogate HTTP server
//! --------------------
//! Axum router for the gateway. Every request passes the same ordered stages:
//! body limit, panic recovery, database handle, session resolution and finally the
//! handler. Routes are grouped by how far into that chain they go:
//!
//! - `public`: limit and recovery only (health check, login page).
//! - `database`: adds a per-request database handle (credential exchange).
//! - `session`: adds optional session resolution; anonymous requests proceed.
//! - `authenticated`: adds required session resolution; anonymous requests get 401.
//!   Everything not routed explicitly here is relayed to the upstream backend.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{any, get, post};
use axum::Router;
use tracing::info;

use crate::config::GatewayConfig;
use crate::identity::SessionResolver;
use crate::settings::{self, SettingsRegistry};
use crate::storage::{DatabasePool, FileStore, SharedStore};

pub mod handlers;
pub mod pipeline;
pub mod proxy;

/// Shared server state injected into all handlers and middleware.
#[derive(Clone)]
pub struct AppState {
    pub pool: DatabasePool,
    pub resolver: SessionResolver,
    /// Base URL requests are relayed to; `None` disables the relay.
    pub upstream: Option<reqwest::Url>,
    pub http: reqwest::Client,
    pub body_limit: usize,
}

impl AppState {
    pub fn new(config: &GatewayConfig, store: SharedStore) -> anyhow::Result<Self> {
        let upstream = match config.upstream.as_deref() {
            Some(raw) => Some(reqwest::Url::parse(raw).with_context(|| format!("Invalid upstream URL: {}", raw))?),
            None => None,
        };
        let http = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("While building upstream HTTP client")?;
        Ok(Self {
            pool: DatabasePool::new(store),
            resolver: SessionResolver::new(config.cookie_name.clone()),
            upstream,
            http,
            body_limit: config.body_limit,
        })
    }
}

/// Routes, grouped by the pipeline stages they run behind.
pub struct RouteGroups {
    pub public: Router<AppState>,
    pub database: Router<AppState>,
    pub session: Router<AppState>,
    pub authenticated: Router<AppState>,
}

impl RouteGroups {
    pub fn empty() -> Self {
        Self {
            public: Router::new(),
            database: Router::new(),
            session: Router::new(),
            authenticated: Router::new(),
        }
    }

    /// The gateway's own endpoints.
    pub fn standard() -> Self {
        Self {
            public: Router::new()
                .route("/check", get(handlers::check))
                .route("/login", get(handlers::login_page)),
            database: Router::new()
                .route("/auth/session", post(handlers::auth_session_post)),
            session: Router::new()
                .route("/", get(handlers::index))
                .route("/auth/providers/{id}", get(handlers::provider_get)),
            authenticated: Router::new()
                .route("/logout", get(handlers::logout))
                .route("/{*path}", any(proxy::relay)),
        }
    }
}

/// Wrap each route group in its pipeline stages and combine them.
///
/// Layers added later run first, so the outermost stage is listed last.
pub fn assemble(state: AppState, groups: RouteGroups) -> Router {
    let session = groups.session.layer(from_fn_with_state(state.clone(), pipeline::session_optional));
    let authenticated = groups.authenticated.layer(from_fn_with_state(state.clone(), pipeline::session_required));
    let db_group = groups.database
        .merge(session)
        .merge(authenticated)
        .layer(from_fn_with_state(state.clone(), pipeline::database));

    Router::new()
        .merge(groups.public)
        .merge(db_group)
        .layer(from_fn(pipeline::recovery))
        .layer(from_fn_with_state(state.clone(), pipeline::limiter))
        .layer(DefaultBodyLimit::max(state.body_limit))
        .with_state(state)
}

pub fn router(state: AppState) -> Router {
    assemble(state, RouteGroups::standard())
}

/// Serve `app` on an already bound listener, exposing peer addresses to handlers.
pub async fn serve(listener: tokio::net::TcpListener, app: Router) -> anyhow::Result<()> {
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}

/// Open the store, register and load settings, start the refresh watcher and serve.
pub async fn run(config: GatewayConfig) -> anyhow::Result<()> {
    info!(
        target: "startup",
        "zerogate starting: bind={}, port={}, data_dir='{}', upstream={:?}, cookie='{}'",
        config.bind, config.http_port, config.data_dir, config.upstream, config.cookie_name
    );

    let store: SharedStore = Arc::new(
        FileStore::new(&config.data_dir)
            .with_context(|| format!("Failed to create or access data directory: {}", config.data_dir))?,
    );
    crate::security::ensure_default_admin(store.as_ref())
        .context("While ensuring default administrator")?;

    let mut registry = SettingsRegistry::new();
    settings::register_all(&mut registry).context("While registering settings")?;
    let registry = Arc::new(registry);
    registry.load_all(store.as_ref()).context("While loading settings")?;
    info!(target: "startup", keys = ?registry.keys(), providers = settings::auth().providers.len(), "settings loaded");
    let _watcher = settings::spawn_watcher(registry.clone(), store.clone(), config.settings_poll());

    let state = AppState::new(&config, store)?;
    let addr: SocketAddr = format!("{}:{}", config.bind, config.http_port).parse()
        .with_context(|| format!("Invalid bind address {}:{}", config.bind, config.http_port))?;
    info!("Starting server on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    serve(listener, router(state)).await
}
