//! HTTP server.
//!
//! Serves the JSON API in [`api`](crate::api) plus a health check.
//!
//! # Error Contract
//!
//! All error responses share one shape:
//!
//! ```json
//! { "error": { "code": "not_found", "message": "Item not found" } }
//! ```
//!
//! Error codes: `bad_request` (400), `unauthorized` (401), `forbidden` (403),
//! `not_found` (404), `conflict` (409), `upstream` (502), `internal` (500).
//!
//! # CORS
//!
//! With no `[server].cors_origins` configured, all origins, methods, and
//! headers are permitted. Otherwise only the listed origins are allowed.

use std::sync::Arc;

use anyhow::Context;
use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tokio::signal::ctrl_c;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::api::{self, AppState};
use crate::auth::create_auth_provider;
use crate::config::Config;
use crate::distance::create_distance_service;
use crate::embedding::create_provider;
use crate::llm::create_chat_model;
use crate::matcher::ItemMatcher;
use crate::store::{DocumentStore, SqliteStore};
use crate::{db, migrate};

/// Wires the SQLite store and the configured external providers into an
/// [`AppState`]. Migrations run first, so a fresh database works without
/// `grocer init`.
pub async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let pool = db::connect(config).await?;
    migrate::apply(&pool).await?;
    let store: Arc<dyn DocumentStore> = Arc::new(SqliteStore::new(pool));

    let matcher = ItemMatcher::new(
        store.clone(),
        Arc::from(create_chat_model(&config.llm)?),
        Arc::from(create_provider(&config.embedding)?),
        Arc::from(create_distance_service(&config.maps)?),
        config.matching.clone(),
        config.llm.temperature,
    );

    Ok(AppState {
        config: Arc::new(config.clone()),
        store,
        auth: Arc::from(create_auth_provider(&config.auth)?),
        matcher: Arc::new(matcher),
    })
}

fn cors_layer(origins: &[String]) -> anyhow::Result<CorsLayer> {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|o| {
            HeaderValue::from_str(o).with_context(|| format!("invalid CORS origin: {}", o))
        })
        .collect::<anyhow::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Builds the full application router for `state`.
pub fn router(state: AppState) -> anyhow::Result<Router> {
    let cors = cors_layer(&state.config.server.cors_origins)?;

    let api = Router::new()
        .route("/auth/register", post(api::auth::register))
        .route("/auth/login", post(api::auth::login))
        .route("/auth/me", get(api::auth::me))
        .route(
            "/items",
            get(api::items::list_items).post(api::items::create_item),
        )
        .route(
            "/items/{id}",
            get(api::items::get_item).put(api::items::update_item),
        )
        .route(
            "/orders",
            get(api::orders::list_orders).post(api::orders::create_order),
        )
        .route(
            "/orders/{id}",
            get(api::orders::get_order).put(api::orders::update_order),
        )
        .route(
            "/lists",
            get(api::lists::list_lists).post(api::lists::create_list),
        )
        .route(
            "/lists/{id}",
            get(api::lists::get_list).put(api::lists::update_list),
        )
        .route(
            "/general-items",
            get(api::general_items::list_general_items)
                .post(api::general_items::create_general_item),
        )
        .route("/assistant/match", post(api::assistant::match_items));

    Ok(Router::new()
        .route("/health", get(handle_health))
        .nest("/api", api)
        .layer(cors)
        .with_state(state))
}

/// Starts the HTTP server on `[server].bind` and runs until Ctrl+C or
/// SIGTERM.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let state = build_state(config).await?;
    let app = router(state)?;

    let listener = tokio::net::TcpListener::bind(&config.server.bind)
        .await
        .with_context(|| format!("failed to bind {}", config.server.bind))?;
    tracing::info!(bind = %config.server.bind, "server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        tracing::info!("received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                tracing::info!("received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// JSON response body for `GET /health`.
#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}
